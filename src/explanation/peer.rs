//! Peer narrative layer, from cohort aggregates only

use super::templates::{AudienceProfile, TemplateCatalog};
use super::types::{ExplanationLayer, LayerDetail, LayerError, LayerKind};
use crate::cohort::{AggregateStats, CohortLookup};

/// "good 60%, poor 40%"
fn outcome_summary(stats: &AggregateStats) -> String {
    let mut outcomes: Vec<(&String, &f64)> = stats.outcome_proportions.iter().collect();
    outcomes.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
    outcomes
        .iter()
        .map(|(label, share)| format!("{} {:.0}%", label, *share * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn peer_layer(
    cohort: &CohortLookup,
    catalog: &TemplateCatalog,
    audience: &AudienceProfile,
) -> Result<ExplanationLayer, LayerError> {
    let stats = match cohort {
        CohortLookup::Available(stats) => stats,
        CohortLookup::NotAvailable { reason } => return Err(LayerError::CohortUnavailable(reason.clone())),
    };
    let (title, locale) = catalog.render("peer.title", audience, &[])?;

    let mut values = vec![
        ("count", stats.farm_count.to_string()),
        ("yield_index", format!("{:.2}", stats.mean_yield_index)),
        ("outcomes", outcome_summary(stats)),
    ];
    let (line, _) = match stats.top_practice() {
        Some((practice, share)) => {
            values.push(("practice", practice.replace('_', " ")));
            values.push(("share", format!("{:.0}", share * 100.0)));
            catalog.render("peer.practice", audience, &values)?
        }
        None => catalog.render("peer.no_practice", audience, &values)?,
    };

    Ok(ExplanationLayer {
        kind: LayerKind::PeerNarrative,
        title,
        lines: vec![line],
        detail: LayerDetail::Peer { stats: stats.clone() },
        locale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn stats(practices: &[(&str, f64)]) -> AggregateStats {
        AggregateStats {
            cluster_id: 0,
            region: "IN-MH".to_string(),
            farm_count: 14,
            mean_farm_size_ha: 1.6,
            mean_yield_index: 0.82,
            outcome_proportions: BTreeMap::from([("good".to_string(), 0.6), ("poor".to_string(), 0.4)]),
            practice_proportions: practices.iter().map(|(p, s)| (p.to_string(), *s)).collect(),
            snapshot_version: 3,
        }
    }

    #[test]
    fn test_unavailable_cohort_fails_layer() {
        let lookup = CohortLookup::NotAvailable { reason: "below k".to_string() };
        let err = peer_layer(&lookup, &TemplateCatalog::builtin(), &AudienceProfile::default()).unwrap_err();
        assert_eq!(err, LayerError::CohortUnavailable("below k".to_string()));
    }

    #[test]
    fn test_top_practice_is_narrated() {
        let lookup = CohortLookup::Available(stats(&[("mulching", 0.5), ("drip_irrigation", 0.2)]));
        let layer = peer_layer(&lookup, &TemplateCatalog::builtin(), &AudienceProfile::default()).unwrap();
        assert!(layer.lines[0].contains("50% of 14"));
        assert!(layer.lines[0].contains("mulching"));
    }

    #[test]
    fn test_no_practice_template() {
        let lookup = CohortLookup::Available(stats(&[]));
        let layer = peer_layer(&lookup, &TemplateCatalog::builtin(), &AudienceProfile::default()).unwrap();
        assert!(layer.lines[0].contains("14 similar farms"));
        assert_eq!(outcome_summary(lookup.stats().unwrap()), "good 60%, poor 40%");
    }
}
