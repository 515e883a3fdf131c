//! Physical workload versus household labor capacity
//!
//! Demand per work period is the crop's labor table row × the cultivation
//! method multiplier × farm size. A load index above 1.0 means the household
//! cannot cover that period alone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lookup_tables::{labor_hours_per_ha, less_intensive, WorkPeriod};
use super::{AuxiliaryData, RiskAnalyzer};
use crate::config::PhysicalConfig;
use crate::context::{CultivationMethod, NormalizedFarmContext};
use crate::error::AnalyzerError;
use crate::risk::{AnalyzerKind, Alternative, RiskDomain, RiskFactor, Timeframe};
use crate::utils::{clamp01, mean};

pub const MODEL_VERSION: &str = "labor-rules/1";

/// Load index reported when declared capacity is zero
const NO_CAPACITY_LOAD: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodLoad {
    pub period: WorkPeriod,
    pub demand_hours_week: f64,
    pub capacity_hours_week: f64,
    pub load_index: f64,
    pub exceeds_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub periods: Vec<PeriodLoad>,
}

impl LoadProfile {
    pub fn peak(&self) -> Option<&PeriodLoad> {
        self.periods.iter().max_by(|a, b| a.load_index.total_cmp(&b.load_index))
    }

    pub fn over_capacity(&self) -> impl Iterator<Item = &PeriodLoad> {
        self.periods.iter().filter(|p| p.exceeds_capacity)
    }
}

fn load_for(crop: &str, method: CultivationMethod, farm_size_ha: f64, capacity: f64) -> LoadProfile {
    let periods = WorkPeriod::ALL
        .iter()
        .map(|&period| {
            let demand = labor_hours_per_ha(crop, method, period) * farm_size_ha;
            let load = if capacity > 0.0 { demand / capacity } else { NO_CAPACITY_LOAD };
            PeriodLoad {
                period,
                demand_hours_week: demand,
                capacity_hours_week: capacity,
                load_index: load,
                exceeds_capacity: load > 1.0,
            }
        })
        .collect();
    LoadProfile { periods }
}

/// Load index per work period for the context as declared
pub fn load_profile(ctx: &NormalizedFarmContext) -> LoadProfile {
    load_for(
        &ctx.primary_crop,
        ctx.cultivation_method.value,
        ctx.farm_size_ha.value,
        ctx.labor.value.weekly_capacity_hours(),
    )
}

fn severity_for(peak: f64) -> f64 {
    clamp01((peak - 0.8) / 1.2)
}

fn probability_for(peak: f64) -> f64 {
    if peak > 1.0 {
        0.85
    } else {
        clamp01(0.3 + 0.5 * peak)
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalLoadAnalyzer {
    config: PhysicalConfig,
}

impl PhysicalLoadAnalyzer {
    pub fn new(config: PhysicalConfig) -> Self {
        Self { config }
    }

    fn timeframe(period: WorkPeriod, aux: &AuxiliaryData) -> Timeframe {
        match period {
            WorkPeriod::Sowing => aux.sowing_window(),
            WorkPeriod::Weeding => aux.weeding_window(),
            WorkPeriod::Harvest => aux.harvest_window(),
        }
    }

    fn mitigations(&self, ctx: &NormalizedFarmContext, profile: &LoadProfile, score: f64) -> Vec<Alternative> {
        let mut out = Vec::new();
        let capacity = ctx.labor.value.weekly_capacity_hours();

        if let Some(method) = less_intensive(ctx.cultivation_method.value) {
            let switched = load_for(&ctx.primary_crop, method, ctx.farm_size_ha.value, capacity);
            let new_peak = switched.peak().map(|p| p.load_index).unwrap_or(0.0);
            let new_score = severity_for(new_peak) * probability_for(new_peak);
            let cost_per_ha = match method {
                CultivationMethod::Mechanized => 120.0,
                _ => 45.0,
            };
            out.push(Alternative {
                id: format!("labor:switch-to-{}", method.display_name()),
                description: format!("Switch field operations to {} methods", method.display_name()),
                risk_reduction: clamp01(score - new_score),
                cost: cost_per_ha * ctx.farm_size_ha.value,
                time_to_implement_days: 14,
                suitability: 0.6,
            });
        }

        let excess_hours: f64 = profile
            .over_capacity()
            .map(|p| (p.demand_hours_week - p.capacity_hours_week).max(0.0) * p.period.weeks())
            .sum();
        if ctx.labor.value.can_hire_labor && excess_hours > 0.0 {
            out.push(Alternative {
                id: "labor:hire-seasonal".to_string(),
                description: format!("Hire seasonal help for about {:.0} person-hours", excess_hours),
                risk_reduction: clamp01(0.8 * score),
                cost: excess_hours * self.config.hired_wage_per_hour,
                time_to_implement_days: 7,
                suitability: 0.75,
            });
        }

        out.push(Alternative {
            id: "labor:sharing-group".to_string(),
            description: "Join or form a labor-sharing group with neighbouring farms".to_string(),
            risk_reduction: clamp01(0.4 * score),
            cost: 0.0,
            time_to_implement_days: 10,
            suitability: 0.8,
        });
        out
    }
}

impl RiskAnalyzer for PhysicalLoadAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::PhysicalLoad
    }

    fn analyze(&self, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Result<Vec<RiskFactor>, AnalyzerError> {
        let profile = load_profile(ctx);
        let peak = profile
            .peak()
            .cloned()
            .ok_or_else(|| AnalyzerError::InvalidInput("no work periods".to_string()))?;

        let severity = severity_for(peak.load_index);
        let probability = probability_for(peak.load_index);
        let score = severity * probability;

        let loads: Vec<String> = profile
            .periods
            .iter()
            .map(|p| format!("{} {:.2}", p.period.display_name(), p.load_index))
            .collect();
        let mut basis = format!(
            "{} {} on {:.1} ha needs {:.0} h/week at {} against {:.0} h/week household capacity (load: {})",
            ctx.cultivation_method.value.display_name(),
            ctx.primary_crop,
            ctx.farm_size_ha.value,
            peak.demand_hours_week,
            peak.period.display_name(),
            peak.capacity_hours_week,
            loads.join(", ")
        );
        let over: Vec<&str> = profile.over_capacity().map(|p| p.period.display_name()).collect();
        if !over.is_empty() {
            basis.push_str(&format!("; exceeds capacity during {}", over.join(", ")));
        }

        let confidence = clamp01(mean([
            ctx.labor.weight(),
            ctx.cultivation_method.weight(),
            ctx.farm_size_ha.weight(),
            ctx.crop_history.weight(),
        ]));

        debug!(farm_id = %ctx.farm_id, peak = peak.load_index, "physical load analysis complete");

        Ok(vec![RiskFactor {
            id: "labor:peak-load".to_string(),
            analyzer: AnalyzerKind::PhysicalLoad,
            domain: RiskDomain::Physical,
            severity,
            probability,
            timeframe: Self::timeframe(peak.period, aux),
            mitigations: self.mitigations(ctx, &profile, score),
            basis,
            confidence,
            model_version: MODEL_VERSION.to_string(),
            alert: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;

    const OVERLOADED: &str = r#", "farm_size_ha": 3.0, "cultivation_method": "manual",
        "labor": {"household_workers": 2, "hours_per_worker_week": 40, "can_hire_labor": true},
        "crop_history": [{"season": "2024", "crop": "cotton"}]"#;

    #[test]
    fn test_load_index_per_period() {
        let ctx = normalize(&context_json(OVERLOADED));
        let profile = load_profile(&ctx);
        // cotton harvest: 80 h/ha/week × 3 ha / 80 h capacity
        let harvest = profile.periods.iter().find(|p| p.period == WorkPeriod::Harvest).unwrap();
        assert_relative_eq!(harvest.load_index, 3.0, epsilon = 1e-9);
        assert!(harvest.exceeds_capacity);
        assert_eq!(profile.peak().unwrap().period, WorkPeriod::Harvest);
    }

    #[test]
    fn test_overload_is_high_with_hiring_option() {
        let analyzer = PhysicalLoadAnalyzer::new(PhysicalConfig::default());
        let ctx = normalize(&context_json(OVERLOADED));
        let factor = &analyzer.analyze(&ctx, &normals()).unwrap()[0];
        assert_relative_eq!(factor.severity, 1.0);
        assert!(factor.basis.contains("exceeds capacity during"));
        assert!(factor.mitigations.iter().any(|m| m.id == "labor:hire-seasonal"));
        assert!(factor.mitigations.iter().any(|m| m.id == "labor:switch-to-animal-drawn"));
    }

    #[test]
    fn test_small_mechanized_farm_is_light() {
        let ctx = normalize(&context_json(
            r#", "farm_size_ha": 0.5, "cultivation_method": "mechanized",
               "labor": {"household_workers": 3, "hours_per_worker_week": 40}"#,
        ));
        let factor = &PhysicalLoadAnalyzer::new(PhysicalConfig::default()).analyze(&ctx, &normals()).unwrap()[0];
        assert_eq!(factor.severity, 0.0);
        assert!(load_profile(&ctx).over_capacity().next().is_none());
        assert!(factor.mitigations.iter().all(|m| !m.id.starts_with("labor:switch")));
    }
}
