//! Factor attribution layer
//!
//! Each factor's share of the summed severity×probability. When every product
//! is zero the shares are equal.

use super::templates::{AudienceProfile, TemplateCatalog};
use super::types::{ExplanationLayer, FactorShare, LayerDetail, LayerError, LayerKind};
use crate::risk::{RiskAssessment, RiskFactor};

pub fn factor_shares(factors: &[RiskFactor]) -> Result<Vec<FactorShare>, LayerError> {
    if factors.is_empty() {
        return Err(LayerError::NoFactors);
    }
    let total: f64 = factors.iter().map(|f| f.score()).sum();
    let equal = 1.0 / factors.len() as f64;

    let mut shares: Vec<FactorShare> = factors
        .iter()
        .map(|f| FactorShare {
            factor_id: f.id.clone(),
            analyzer: f.analyzer,
            share: if total > 0.0 { f.score() / total } else { equal },
        })
        .collect();
    shares.sort_by(|a, b| b.share.total_cmp(&a.share).then_with(|| a.factor_id.cmp(&b.factor_id)));
    Ok(shares)
}

/// Readable name: "Water (drought)"
pub(crate) fn factor_label(share: &FactorShare) -> String {
    match share.factor_id.split_once(':') {
        Some((_, what)) => format!("{} ({})", share.analyzer.display_name(), what.replace(['-', '_'], " ")),
        None => share.analyzer.display_name().to_string(),
    }
}

pub fn attribution_layer(
    assessment: &RiskAssessment,
    catalog: &TemplateCatalog,
    audience: &AudienceProfile,
) -> Result<ExplanationLayer, LayerError> {
    let shares = factor_shares(&assessment.factors)?;
    let (title, locale) = catalog.render("attribution.title", audience, &[])?;

    let mut lines = Vec::with_capacity(shares.len());
    for share in &shares {
        let (line, _) = catalog.render(
            "attribution.line",
            audience,
            &[
                ("factor", factor_label(share)),
                ("factor_id", share.factor_id.clone()),
                ("share", format!("{:.0}", share.share * 100.0)),
            ],
        )?;
        lines.push(line);
    }

    Ok(ExplanationLayer {
        kind: LayerKind::FactorAttribution,
        title,
        lines,
        detail: LayerDetail::Attribution { shares },
        locale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{AnalyzerKind, Timeframe};
    use approx::assert_relative_eq;

    fn factor(id: &str, severity: f64, probability: f64) -> RiskFactor {
        RiskFactor {
            id: id.to_string(),
            analyzer: AnalyzerKind::Water,
            domain: AnalyzerKind::Water.domain(),
            severity,
            probability,
            timeframe: Timeframe::new("t", 0, 1),
            mitigations: vec![],
            basis: String::new(),
            confidence: 1.0,
            model_version: "t/1".to_string(),
            alert: None,
        }
    }

    #[test]
    fn test_shares_sum_to_one() {
        let shares = factor_shares(&[factor("water:a", 0.5, 0.5), factor("water:b", 0.25, 0.3)]).unwrap();
        let total: f64 = shares.iter().map(|s| s.share).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_eq!(shares[0].factor_id, "water:a");
    }

    #[test]
    fn test_zero_products_share_equally() {
        let shares = factor_shares(&[factor("water:a", 0.0, 0.5), factor("water:b", 0.3, 0.0)]).unwrap();
        assert_relative_eq!(shares[0].share, 0.5);
        assert_relative_eq!(shares[1].share, 0.5);
    }

    #[test]
    fn test_no_factors_fails() {
        assert_eq!(factor_shares(&[]), Err(LayerError::NoFactors));
    }

    #[test]
    fn test_label_is_readable() {
        let share = FactorShare { factor_id: "water:drought".to_string(), analyzer: AnalyzerKind::Water, share: 1.0 };
        assert_eq!(factor_label(&share), "Water (drought)");
    }
}
