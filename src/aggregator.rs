//! Aggregation and confidence building
//!
//! Combines analyzer factors into one assessment. The overall level is the
//! worst factor band; a hard alert lifts it to HIGH whatever the numbers say.
//! Aggregation never fails: with nothing to aggregate it returns a provisional
//! MEDIUM assessment that points the farmer to a human expert.

use rustc_hash::FxHashMap;

use crate::cohort::CohortLookup;
use crate::config::{AdvisorConfig, BandThresholds, ConfidenceWeights};
use crate::context::QualityReport;
use crate::risk::{
    Alternative, AnalyzerKind, AnalyzerUnavailable, HardAlert, RiskAssessment, RiskFactor, RiskLevel, Timeframe,
};
use crate::utils::clamp01;

/// Everything the aggregator needs for one request
#[derive(Debug)]
pub struct AggregationInput<'a> {
    pub prediction_id: String,
    pub factors: Vec<RiskFactor>,
    pub unavailable: Vec<AnalyzerUnavailable>,
    pub quality: QualityReport,
    /// Analyzers that were asked to run
    pub expected_analyzers: usize,
    pub cohort: &'a CohortLookup,
    pub cohort_snapshot_version: Option<u64>,
}

/// Overall level and whether a hard alert forced it
pub fn overall_level(factors: &[RiskFactor], bands: &BandThresholds) -> (RiskLevel, bool) {
    let worst = factors.iter().map(|f| f.band(bands)).max();
    let alerted = factors.iter().any(|f| f.alert.is_some());
    match (worst, alerted) {
        (Some(level), true) => (RiskLevel::High, level < RiskLevel::High),
        (Some(level), false) => (level, false),
        (None, _) => (RiskLevel::Medium, false),
    }
}

#[derive(Debug, Clone)]
pub struct RiskAggregator {
    bands: BandThresholds,
    weights: ConfidenceWeights,
    max_alternatives: usize,
}

impl RiskAggregator {
    pub fn new(config: &AdvisorConfig) -> Self {
        Self { bands: config.bands, weights: config.confidence, max_alternatives: config.max_alternatives }
    }

    pub fn bands(&self) -> &BandThresholds {
        &self.bands
    }

    pub fn aggregate(&self, input: AggregationInput<'_>) -> RiskAssessment {
        let AggregationInput {
            prediction_id,
            mut factors,
            unavailable,
            quality,
            expected_analyzers,
            cohort,
            cohort_snapshot_version,
        } = input;

        // Deterministic order regardless of task completion order
        factors.sort_by(|a, b| a.analyzer.cmp(&b.analyzer).then_with(|| a.id.cmp(&b.id)));

        let insufficient_data = factors.is_empty();
        let (level, safety_override) = overall_level(&factors, &self.bands);
        let alerts: Vec<HardAlert> = factors.iter().filter_map(|f| f.alert.clone()).collect();

        let mut confidence = self.confidence(&factors, &unavailable, &quality, expected_analyzers);
        if insufficient_data {
            confidence = confidence.min(self.weights.insufficient_data_cap);
        }

        let mut alternatives = self.alternatives(&factors);
        if insufficient_data {
            alternatives.push(consult_expert());
        }

        let timeframe = self.timeframe(&factors, level, safety_override);
        let reasoning = self.reasoning(&factors, &alerts, &unavailable, &quality, cohort, safety_override);
        let degraded = insufficient_data || !unavailable.is_empty();

        RiskAssessment {
            prediction_id,
            level,
            confidence,
            reasoning,
            factors,
            timeframe,
            alternatives,
            alerts,
            quality,
            unavailable,
            insufficient_data,
            safety_override,
            peer_stats: cohort.stats().cloned(),
            cohort_snapshot_version,
            degraded,
        }
    }

    /// Weighted blend of analyzer confidence and data completeness
    ///
    /// Unavailable analyzers count as zero confidence in the mean and add a
    /// flat penalty on top.
    fn confidence(
        &self,
        factors: &[RiskFactor],
        unavailable: &[AnalyzerUnavailable],
        quality: &QualityReport,
        expected: usize,
    ) -> f64 {
        let mut per_analyzer: FxHashMap<AnalyzerKind, (f64, usize)> = FxHashMap::default();
        for f in factors {
            let entry = per_analyzer.entry(f.analyzer).or_insert((0.0, 0));
            entry.0 += f.confidence;
            entry.1 += 1;
        }

        let slots = expected.max(per_analyzer.len() + unavailable.len());
        let factor_mean = if slots == 0 {
            0.0
        } else {
            let sum: f64 = per_analyzer.values().map(|(s, n)| s / *n as f64).sum();
            sum / slots as f64
        };

        clamp01(
            self.weights.factor_weight * factor_mean + self.weights.completeness_weight * quality.completeness
                - self.weights.unavailable_penalty * unavailable.len() as f64,
        )
    }

    /// De-duplicated mitigations: biggest reduction first, then cheapest
    fn alternatives(&self, factors: &[RiskFactor]) -> Vec<Alternative> {
        let mut by_id: FxHashMap<&str, &Alternative> = FxHashMap::default();
        for alt in factors.iter().flat_map(|f| f.mitigations.iter()) {
            by_id
                .entry(alt.id.as_str())
                .and_modify(|existing| {
                    if alt.risk_reduction > existing.risk_reduction {
                        *existing = alt;
                    }
                })
                .or_insert(alt);
        }

        let mut out: Vec<Alternative> = by_id.into_values().cloned().collect();
        out.sort_by(|a, b| {
            b.risk_reduction
                .total_cmp(&a.risk_reduction)
                .then(a.cost.total_cmp(&b.cost))
                .then_with(|| a.id.cmp(&b.id))
        });
        out.truncate(self.max_alternatives);
        out
    }

    /// Earliest timeframe among the factors that set the overall level
    fn timeframe(&self, factors: &[RiskFactor], level: RiskLevel, safety_override: bool) -> Option<Timeframe> {
        factors
            .iter()
            .filter(|f| f.band(&self.bands) == level || (safety_override && f.alert.is_some()))
            .min_by(|a, b| a.timeframe.starts_in_days.cmp(&b.timeframe.starts_in_days).then_with(|| a.id.cmp(&b.id)))
            .map(|f| f.timeframe.clone())
    }

    fn reasoning(
        &self,
        factors: &[RiskFactor],
        alerts: &[HardAlert],
        unavailable: &[AnalyzerUnavailable],
        quality: &QualityReport,
        cohort: &CohortLookup,
        safety_override: bool,
    ) -> Vec<String> {
        let mut lines = Vec::new();

        let mut ordered: Vec<&RiskFactor> = factors.iter().collect();
        ordered.sort_by(|a, b| b.severity.total_cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
        for f in ordered {
            lines.push(format!(
                "{}: {} -> {} (severity {:.2} x probability {:.2})",
                f.analyzer.display_name(),
                f.basis,
                f.band(&self.bands).display_text(),
                f.severity,
                f.probability
            ));
        }

        for alert in alerts {
            lines.push(alert.message.clone());
        }
        if safety_override {
            lines.push("Safety override: a hard alert raises the overall level to HIGH".to_string());
        }

        let fallbacks: Vec<&str> = quality.fallback_fields().map(|f| f.field.display_name()).collect();
        if !fallbacks.is_empty() {
            lines.push(format!(
                "Data quality: {:.0}% complete; estimated from regional or default values: {}",
                quality.completeness * 100.0,
                fallbacks.join(", ")
            ));
        }

        for u in unavailable {
            lines.push(format!(
                "{} analysis unavailable ({}); confidence reduced",
                u.analyzer.display_name(),
                u.reason
            ));
        }

        match cohort {
            CohortLookup::Available(stats) => lines.push(format!(
                "Peer cohort: {} similar farms in {}, mean yield index {:.2}",
                stats.farm_count, stats.region, stats.mean_yield_index
            )),
            CohortLookup::NotAvailable { reason } => lines.push(format!("Peer comparison unavailable: {}", reason)),
        }

        if factors.is_empty() {
            lines.push(
                "No risk factors could be computed; treat this as provisional and consult an expert".to_string(),
            );
        }
        lines
    }
}

fn consult_expert() -> Alternative {
    Alternative {
        id: "consult-expert".to_string(),
        description: "Consult a local agronomist or extension officer before committing to the season plan"
            .to_string(),
        risk_reduction: 0.0,
        cost: 0.0,
        time_to_implement_days: 3,
        suitability: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextField, DataQualityIndicator, FieldQuality};
    use crate::risk::{AlertKind, RiskDomain};
    use approx::assert_relative_eq;

    fn factor(id: &str, analyzer: AnalyzerKind, severity: f64, probability: f64, confidence: f64) -> RiskFactor {
        RiskFactor {
            id: id.to_string(),
            analyzer,
            domain: analyzer.domain(),
            severity,
            probability,
            timeframe: Timeframe::new(id, 10, 30),
            mitigations: vec![Alternative {
                id: format!("{}-fix", id),
                description: "fix".to_string(),
                risk_reduction: severity * probability / 2.0,
                cost: 10.0,
                time_to_implement_days: 5,
                suitability: 0.8,
            }],
            basis: "basis".to_string(),
            confidence,
            model_version: "test/1".to_string(),
            alert: None,
        }
    }

    fn quality(completeness_source: DataQualityIndicator) -> QualityReport {
        QualityReport::from_fields(
            ContextField::ALL
                .iter()
                .map(|&field| FieldQuality { field, source: completeness_source, note: None })
                .collect(),
        )
    }

    fn input(factors: Vec<RiskFactor>, unavailable: Vec<AnalyzerUnavailable>, cohort: &CohortLookup) -> AggregationInput<'_> {
        AggregationInput {
            prediction_id: "pred-test".to_string(),
            factors,
            unavailable,
            quality: quality(DataQualityIndicator::FarmSpecific),
            expected_analyzers: 4,
            cohort,
            cohort_snapshot_version: None,
        }
    }

    fn no_cohort() -> CohortLookup {
        CohortLookup::NotAvailable { reason: "none".to_string() }
    }

    #[test]
    fn test_worst_case_level() {
        let cohort = no_cohort();
        let aggregator = RiskAggregator::new(&AdvisorConfig::default());
        let a = aggregator.aggregate(input(
            vec![
                factor("low", AnalyzerKind::Water, 0.2, 0.3, 1.0),
                factor("mid", AnalyzerKind::PhysicalLoad, 0.6, 0.5, 1.0),
            ],
            vec![],
            &cohort,
        ));
        assert_eq!(a.level, RiskLevel::Medium);
        assert!(!a.safety_override);
        assert_eq!(a.timeframe.unwrap().label, "mid");
    }

    #[test]
    fn test_alert_forces_high() {
        let cohort = no_cohort();
        let mut alerted = factor("machine", AnalyzerKind::MachineSoil, 0.3, 0.3, 1.0);
        alerted.alert = Some(HardAlert {
            kind: AlertKind::DoNotUse,
            analyzer: AnalyzerKind::MachineSoil,
            subject: "rotavator".to_string(),
            message: "Do-NOT-Use: rotavator".to_string(),
            alternatives: vec!["manual tools".to_string()],
        });
        let a = RiskAggregator::new(&AdvisorConfig::default()).aggregate(input(vec![alerted], vec![], &cohort));
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.safety_override);
        assert_eq!(a.alerts.len(), 1);
        assert!(a.reasoning.iter().any(|r| r.starts_with("Safety override")));
    }

    #[test]
    fn test_empty_is_insufficient_data() {
        let cohort = no_cohort();
        let unavailable = AnalyzerKind::ALL
            .iter()
            .map(|&analyzer| AnalyzerUnavailable { analyzer, reason: "timeout".to_string() })
            .collect();
        let a = RiskAggregator::new(&AdvisorConfig::default()).aggregate(input(vec![], unavailable, &cohort));
        assert_eq!(a.level, RiskLevel::Medium);
        assert!(a.insufficient_data);
        assert!(a.confidence <= 0.25);
        assert!(a.alternatives.iter().any(|alt| alt.id == "consult-expert"));
        assert!(a.degraded);
    }

    #[test]
    fn test_confidence_formula() {
        let cohort = no_cohort();
        let a = RiskAggregator::new(&AdvisorConfig::default()).aggregate(input(
            vec![
                factor("w", AnalyzerKind::Water, 0.1, 0.1, 0.8),
                factor("s", AnalyzerKind::SoilConfidence, 0.1, 0.1, 0.6),
                factor("p", AnalyzerKind::PhysicalLoad, 0.1, 0.1, 1.0),
            ],
            vec![AnalyzerUnavailable { analyzer: AnalyzerKind::MachineSoil, reason: "panic".to_string() }],
            &cohort,
        ));
        // 0.6 * (2.4 / 4) + 0.4 * 1.0 - 0.05
        assert_relative_eq!(a.confidence, 0.6 * 0.6 + 0.4 - 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_alternatives_sorted_and_capped() {
        let cohort = no_cohort();
        let factors: Vec<RiskFactor> = (0..8)
            .map(|i| factor(&format!("f{}", i), AnalyzerKind::Water, 0.1 * i as f64, 0.9, 1.0))
            .collect();
        let a = RiskAggregator::new(&AdvisorConfig::default()).aggregate(input(factors, vec![], &cohort));
        assert_eq!(a.alternatives.len(), 5);
        assert!(a.alternatives.windows(2).all(|w| w[0].risk_reduction >= w[1].risk_reduction));
    }

    #[test]
    fn test_factors_sorted_deterministically() {
        let cohort = no_cohort();
        let aggregator = RiskAggregator::new(&AdvisorConfig::default());
        let f1 = factor("a", AnalyzerKind::PhysicalLoad, 0.3, 0.3, 1.0);
        let f2 = factor("b", AnalyzerKind::Water, 0.3, 0.3, 1.0);
        let x = aggregator.aggregate(input(vec![f1.clone(), f2.clone()], vec![], &cohort));
        let y = aggregator.aggregate(input(vec![f2, f1], vec![], &cohort));
        assert_eq!(x, y);
    }
}
