//! Scenario comparator
//!
//! Each scenario is a full synthetic farm context. Scenarios are validated,
//! analyzed inline and aggregated in parallel, then ranked under the same
//! safety-first policy as single assessments.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::{AggregationInput, RiskAggregator};
use crate::analyzers::{AnalyzerSet, AuxiliaryData};
use crate::cohort::{CohortPattern, CohortSnapshot};
use crate::context::{validate, FarmContext, NormalizedFarmContext, RegionalProfileSource};
use crate::risk::{RiskAssessment, RiskLevel};

/// One candidate decision path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Farm context as it would look under this scenario
    pub context: FarmContext,
    #[serde(default)]
    pub implementation_cost: f64,
    #[serde(default)]
    pub time_to_implement_days: u32,
    #[serde(default = "default_suitability")]
    pub suitability: f64,
}

fn default_suitability() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedScenario {
    /// 1-based
    pub rank: usize,
    pub scenario_id: String,
    pub description: String,
    pub level: RiskLevel,
    /// Highest severity×probability among the scenario's factors
    pub risk_score: f64,
    /// Worst score among candidates minus this score
    pub risk_reduction: f64,
    pub implementation_cost: f64,
    pub time_to_implement_days: u32,
    pub suitability: f64,
    pub assessment: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedScenario {
    pub scenario_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRanking {
    pub ranked: Vec<RankedScenario>,
    pub rejected: Vec<RejectedScenario>,
}

impl ScenarioRanking {
    pub fn best(&self) -> Option<&RankedScenario> {
        self.ranked.first()
    }
}

/// Highest factor product; zero without factors
pub fn risk_score(assessment: &RiskAssessment) -> f64 {
    assessment.factors.iter().map(|f| f.score()).fold(0.0, f64::max)
}

/// Safety-first ranking order
///
/// Lower level first, then larger risk reduction, cheaper, and finally id.
pub fn rank_order(a: &RankedScenario, b: &RankedScenario) -> Ordering {
    a.level
        .cmp(&b.level)
        .then_with(|| b.risk_reduction.total_cmp(&a.risk_reduction))
        .then_with(|| a.implementation_cost.total_cmp(&b.implementation_cost))
        .then_with(|| a.scenario_id.cmp(&b.scenario_id))
}

/// Pipeline pieces the comparator reuses
pub struct ScenarioComparator<'a> {
    pub analyzers: &'a AnalyzerSet,
    pub aggregator: &'a RiskAggregator,
    pub regional: &'a dyn RegionalProfileSource,
    pub cohorts: &'a CohortSnapshot,
}

impl<'a> ScenarioComparator<'a> {
    fn assess(
        &self,
        scenario: &Scenario,
        crop: Option<&str>,
        aux_for: &(dyn Fn(&NormalizedFarmContext) -> AuxiliaryData + Sync),
        prediction_id: &(dyn Fn(&FarmContext) -> String + Sync),
    ) -> Result<RiskAssessment, RejectedScenario> {
        let (ctx, quality) = validate(&scenario.context, self.regional, crop)
            .map_err(|e| RejectedScenario { scenario_id: scenario.id.clone(), reason: e.to_string() })?;
        let aux = aux_for(&ctx);
        let (factors, unavailable) = self.analyzers.analyze_inline(&ctx, &aux);

        let pattern = CohortPattern {
            crop_pattern: ctx.crop_pattern.clone(),
            input_philosophy: ctx.input_philosophy.value,
        };
        let cohort = self.cohorts.lookup(&ctx.location.region_code, &pattern);

        Ok(self.aggregator.aggregate(AggregationInput {
            prediction_id: prediction_id(&scenario.context),
            factors,
            unavailable,
            quality,
            expected_analyzers: self.analyzers.len(),
            cohort: &cohort,
            cohort_snapshot_version: Some(self.cohorts.version),
        }))
    }

    /// Assess every scenario in parallel and rank the valid ones
    pub fn rank(
        &self,
        scenarios: &[Scenario],
        crop: Option<&str>,
        aux_for: &(dyn Fn(&NormalizedFarmContext) -> AuxiliaryData + Sync),
        prediction_id: &(dyn Fn(&FarmContext) -> String + Sync),
    ) -> ScenarioRanking {
        let results: Vec<Result<RiskAssessment, RejectedScenario>> =
            scenarios.par_iter().map(|s| self.assess(s, crop, aux_for, prediction_id)).collect();

        let mut assessed = Vec::new();
        let mut rejected = Vec::new();
        for (scenario, result) in scenarios.iter().zip(results) {
            match result {
                Ok(assessment) => assessed.push((scenario, assessment)),
                Err(r) => {
                    debug!(scenario = %r.scenario_id, reason = %r.reason, "scenario rejected");
                    rejected.push(r);
                }
            }
        }

        let worst = assessed.iter().map(|(_, a)| risk_score(a)).fold(0.0, f64::max);
        let mut ranked: Vec<RankedScenario> = assessed
            .into_iter()
            .map(|(scenario, assessment)| {
                let score = risk_score(&assessment);
                RankedScenario {
                    rank: 0,
                    scenario_id: scenario.id.clone(),
                    description: scenario.description.clone(),
                    level: assessment.level,
                    risk_score: score,
                    risk_reduction: worst - score,
                    implementation_cost: scenario.implementation_cost,
                    time_to_implement_days: scenario.time_to_implement_days,
                    suitability: scenario.suitability,
                    assessment,
                }
            })
            .collect();
        ranked.sort_by(rank_order);
        for (i, r) in ranked.iter_mut().enumerate() {
            r.rank = i + 1;
        }

        info!(ranked = ranked.len(), rejected = rejected.len(), "scenarios compared");
        ScenarioRanking { ranked, rejected }
    }
}
