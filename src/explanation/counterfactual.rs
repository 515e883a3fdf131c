//! Counterfactual layer: the smallest single change that lowers the level

use super::templates::{AudienceProfile, TemplateCatalog};
use super::types::{CounterfactualFinding, ExplanationLayer, LayerDetail, LayerError, LayerKind};
use crate::aggregator::overall_level;
use crate::analyzers::{candidates_for, AnalyzerSet, AuxiliaryData, ContextChange};
use crate::config::{BandThresholds, MachineryConfig};
use crate::context::NormalizedFarmContext;
use crate::risk::{AnalyzerKind, RiskAssessment, RiskLevel};
use crate::utils::CancelToken;

/// Re-evaluates the assessment under a hypothetical change
pub trait Reassessor: Send + Sync {
    /// Overall level if `change` were applied
    fn level_with(&self, change: &ContextChange) -> RiskLevel;

    /// Changes worth trying for an analyzer, smallest first
    fn candidates(&self, kind: AnalyzerKind) -> Vec<ContextChange>;
}

/// Reassessor that reruns the analyzers inline on a perturbed copy
pub struct InlineReassessor {
    analyzers: AnalyzerSet,
    context: NormalizedFarmContext,
    aux: AuxiliaryData,
    bands: BandThresholds,
    machinery: MachineryConfig,
}

impl InlineReassessor {
    pub fn new(
        analyzers: AnalyzerSet,
        context: NormalizedFarmContext,
        aux: AuxiliaryData,
        bands: BandThresholds,
        machinery: MachineryConfig,
    ) -> Self {
        Self { analyzers, context, aux, bands, machinery }
    }
}

impl Reassessor for InlineReassessor {
    fn level_with(&self, change: &ContextChange) -> RiskLevel {
        let mut ctx = self.context.clone();
        let mut aux = self.aux.clone();
        change.apply(&mut ctx, &mut aux);
        let (factors, _) = self.analyzers.analyze_inline(&ctx, &aux);
        overall_level(&factors, &self.bands).0
    }

    fn candidates(&self, kind: AnalyzerKind) -> Vec<ContextChange> {
        candidates_for(kind, &self.context, &self.machinery).into_vec()
    }
}

/// Analyzers responsible for the current level
fn driving_analyzers(assessment: &RiskAssessment, bands: &BandThresholds) -> Vec<AnalyzerKind> {
    let mut kinds: Vec<AnalyzerKind> = if assessment.safety_override {
        assessment.factors.iter().filter(|f| f.alert.is_some()).map(|f| f.analyzer).collect()
    } else {
        assessment
            .factors
            .iter()
            .filter(|f| f.band(bands) == assessment.level || f.alert.is_some())
            .map(|f| f.analyzer)
            .collect()
    };
    kinds.sort();
    kinds.dedup();
    kinds
}

/// Try candidates in order of magnitude; first one that lowers the level wins
pub fn search(
    assessment: &RiskAssessment,
    reassessor: &dyn Reassessor,
    bands: &BandThresholds,
    max_candidates: usize,
    cancel: &CancelToken,
) -> Result<(Option<CounterfactualFinding>, usize), LayerError> {
    if assessment.factors.is_empty() {
        return Err(LayerError::NoFactors);
    }
    if assessment.level == RiskLevel::Low {
        return Ok((None, 0));
    }

    let mut candidates: Vec<ContextChange> = Vec::new();
    for kind in driving_analyzers(assessment, bands) {
        for change in reassessor.candidates(kind) {
            if !candidates.contains(&change) {
                candidates.push(change);
            }
        }
    }
    candidates.sort_by(|a, b| a.magnitude().total_cmp(&b.magnitude()));
    candidates.truncate(max_candidates);

    let mut tried = 0;
    for change in candidates {
        if cancel.is_cancelled() {
            return Err(LayerError::Cancelled);
        }
        tried += 1;
        let level = reassessor.level_with(&change);
        if level < assessment.level {
            return Ok((Some(CounterfactualFinding { change, from_level: assessment.level, to_level: level }), tried));
        }
    }
    Ok((None, tried))
}

pub fn counterfactual_layer(
    assessment: &RiskAssessment,
    reassessor: &dyn Reassessor,
    bands: &BandThresholds,
    max_candidates: usize,
    catalog: &TemplateCatalog,
    audience: &AudienceProfile,
    cancel: &CancelToken,
) -> Result<ExplanationLayer, LayerError> {
    let (finding, tried) = search(assessment, reassessor, bands, max_candidates, cancel)?;
    let (title, locale) = catalog.render("counterfactual.title", audience, &[])?;

    let line = match &finding {
        Some(f) => catalog.render(
            "counterfactual.found",
            audience,
            &[
                ("change", f.change.describe()),
                ("from", f.from_level.display_text().to_string()),
                ("to", f.to_level.display_text().to_string()),
                ("tried", tried.to_string()),
            ],
        )?,
        None => catalog.render(
            "counterfactual.none",
            audience,
            &[("from", assessment.level.display_text().to_string()), ("tried", tried.to_string())],
        )?,
    };

    Ok(ExplanationLayer {
        kind: LayerKind::Counterfactual,
        title,
        lines: vec![line.0],
        detail: LayerDetail::Counterfactual { finding, candidates_tried: tried },
        locale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::*;
    use crate::config::AdvisorConfig;
    use crate::analyzers::MachineSoilAnalyzer;
    use crate::context::Machinery;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn assess(json: &str) -> (RiskAssessment, InlineReassessor) {
        let config = AdvisorConfig::default();
        let ctx = normalize(&context_json(json));
        let aux = normals();
        let set = AnalyzerSet::empty().with_analyzer(Arc::new(MachineSoilAnalyzer::new(config.machinery)));
        let (factors, unavailable) = set.analyze_inline(&ctx, &aux);
        let cohort = crate::cohort::CohortLookup::NotAvailable { reason: "none".to_string() };
        let assessment = crate::aggregator::RiskAggregator::new(&config).aggregate(crate::aggregator::AggregationInput {
            prediction_id: "pred-test".to_string(),
            factors,
            unavailable,
            quality: crate::context::QualityReport::from_fields(vec![]),
            expected_analyzers: set.len(),
            cohort: &cohort,
            cohort_snapshot_version: None,
        });
        let reassessor = InlineReassessor::new(set, ctx, aux, config.bands, config.machinery);
        (assessment, reassessor)
    }

    #[test]
    fn test_machine_swap_clears_alert() {
        let (assessment, reassessor) =
            assess(r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#);
        assert_eq!(assessment.level, RiskLevel::High);
        let (finding, tried) =
            search(&assessment, &reassessor, &BandThresholds::default(), 12, &CancelToken::new()).unwrap();
        let finding = finding.expect("a lowering change");
        assert_eq!(tried, 1);
        assert_eq!(finding.to_level, RiskLevel::Low);
        assert_eq!(
            finding.change,
            ContextChange::SwapMachinery { from: Machinery::HeavyTillage, to: Machinery::ManualTools }
        );
    }

    struct CountingReassessor {
        calls: AtomicUsize,
    }

    impl Reassessor for CountingReassessor {
        fn level_with(&self, _: &ContextChange) -> RiskLevel {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RiskLevel::High
        }

        fn candidates(&self, _: AnalyzerKind) -> Vec<ContextChange> {
            (1..=20).map(|d| ContextChange::ShiftSowing { days: d }).collect()
        }
    }

    #[test]
    fn test_search_is_bounded() {
        let (assessment, _) = assess(r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#);
        let reassessor = CountingReassessor { calls: AtomicUsize::new(0) };
        let (finding, tried) = search(&assessment, &reassessor, &BandThresholds::default(), 5, &CancelToken::new()).unwrap();
        assert!(finding.is_none());
        assert_eq!(tried, 5);
        assert_eq!(reassessor.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_cancelled_search_stops() {
        let (assessment, _) = assess(r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#);
        let reassessor = CountingReassessor { calls: AtomicUsize::new(0) };
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            search(&assessment, &reassessor, &BandThresholds::default(), 5, &cancel),
            Err(LayerError::Cancelled)
        );
        assert_eq!(reassessor.calls.load(Ordering::SeqCst), 0);
    }
}
