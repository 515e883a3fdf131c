//! Water risk
//!
//! Seasonal rainfall adequacy for the primary crop. Effective rainfall is the
//! outlook's expected total, discounted for late monsoon onset and poor water
//! retention, plus whatever irrigation covers. The chance of a shortfall comes
//! from a normal approximation around that figure.

use tracing::debug;

use super::lookup_tables::crop_water;
use super::{AuxiliaryData, OutlookProvenance, RiskAnalyzer};
use crate::config::WaterConfig;
use crate::context::{IrrigationAccess, NormalizedFarmContext};
use crate::error::AnalyzerError;
use crate::risk::{AnalyzerKind, Alternative, RiskDomain, RiskFactor};
use crate::utils::{clamp01, mean, prob_below};

pub const MODEL_VERSION: &str = "water-rules/1";

/// Drought alternative template: per-hectare cost and share of risk removed
struct DroughtOption {
    id: &'static str,
    description: &'static str,
    cost_per_ha: f64,
    reduction_share: f64,
    days: u32,
    suitability: f64,
}

const DROUGHT_OPTIONS: [DroughtOption; 4] = [
    DroughtOption {
        id: "water:mulch",
        description: "Mulch fields with crop residue to hold soil moisture",
        cost_per_ha: 15.0,
        reduction_share: 0.25,
        days: 7,
        suitability: 0.9,
    },
    DroughtOption {
        id: "water:drought-tolerant-variety",
        description: "Sow a drought-tolerant variety of the same crop",
        cost_per_ha: 20.0,
        reduction_share: 0.3,
        days: 14,
        suitability: 0.8,
    },
    DroughtOption {
        id: "water:farm-pond",
        description: "Dig a farm pond to store early-season runoff",
        cost_per_ha: 300.0,
        reduction_share: 0.45,
        days: 60,
        suitability: 0.6,
    },
    DroughtOption {
        id: "water:drip-irrigation",
        description: "Install drip irrigation on the main plot",
        cost_per_ha: 900.0,
        reduction_share: 0.6,
        days: 30,
        suitability: 0.5,
    },
];

#[derive(Debug, Clone)]
pub struct WaterAnalyzer {
    config: WaterConfig,
}

/// Intermediate water balance, exposed for the causal narrative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterBalance {
    pub need_mm: f64,
    pub effective_mm: f64,
    pub sd_mm: f64,
    /// Days the rains are expected after planned sowing (negative = early)
    pub onset_delay_days: i32,
    pub shortfall_probability: f64,
}

impl WaterAnalyzer {
    pub fn new(config: WaterConfig) -> Self {
        Self { config }
    }

    /// Water balance for the context, or `None` without an outlook
    pub fn balance(ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Option<WaterBalance> {
        let outlook = aux.outlook.as_ref()?;
        let need = crop_water(&ctx.primary_crop).water_need_mm;
        let retention = ctx.water_retention.value;

        let delay = outlook.onset_in_days.saturating_sub(aux.season.sowing_offset());
        let alignment = 1.0 - (delay.max(0) as f64 / 100.0).min(0.4);
        let irrigation_bonus = match ctx.irrigation.value {
            IrrigationAccess::None => 0.0,
            IrrigationAccess::Partial => 0.25 * need,
            IrrigationAccess::Full => 0.6 * need,
        };
        let effective = outlook.expected_rainfall_mm * alignment * (0.7 + 0.3 * retention) + irrigation_bonus;

        Some(WaterBalance {
            need_mm: need,
            effective_mm: effective,
            sd_mm: outlook.rainfall_sd_mm,
            onset_delay_days: delay,
            shortfall_probability: clamp01(prob_below(need, effective, outlook.rainfall_sd_mm)),
        })
    }

    fn confidence(ctx: &NormalizedFarmContext, provenance: OutlookProvenance) -> f64 {
        let data = mean([
            ctx.water_retention.weight(),
            ctx.irrigation.weight(),
            ctx.flood_risk.weight(),
            ctx.crop_history.weight(),
        ]);
        clamp01(provenance.weight() * (0.5 + 0.5 * data))
    }

    fn drought_alternatives(&self, ctx: &NormalizedFarmContext, score: f64, delay: i32) -> Vec<Alternative> {
        let farm_size = ctx.farm_size_ha.value;
        let mut alternatives: Vec<Alternative> = DROUGHT_OPTIONS
            .iter()
            .map(|o| Alternative {
                id: o.id.to_string(),
                description: o.description.to_string(),
                risk_reduction: clamp01(o.reduction_share * score),
                cost: o.cost_per_ha * farm_size,
                time_to_implement_days: o.days,
                suitability: o.suitability,
            })
            .collect();

        if delay > 0 {
            alternatives.push(Alternative {
                id: "water:shift-sowing".to_string(),
                description: format!("Delay sowing by about {} days to match expected rain onset", delay),
                risk_reduction: clamp01(0.2 * score),
                cost: 0.0,
                time_to_implement_days: 0,
                suitability: 0.85,
            });
        }

        // Never push a household into debt to mitigate drought
        alternatives.retain(|a| a.cost <= self.config.debt_risk_threshold);
        alternatives
    }
}

impl RiskAnalyzer for WaterAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Water
    }

    fn analyze(&self, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Result<Vec<RiskFactor>, AnalyzerError> {
        let balance = Self::balance(ctx, aux).ok_or(AnalyzerError::MissingAuxiliary("seasonal outlook"))?;
        let outlook_source = aux.outlook.as_ref().map(|o| o.source.as_str()).unwrap_or("unknown");
        let confidence = Self::confidence(ctx, aux.provenance);
        let retention = ctx.water_retention.value;

        let crop = crop_water(&ctx.primary_crop);
        let severity = clamp01(crop.drought_sensitivity * (0.6 + 0.4 * (1.0 - retention)));
        let probability = balance.shortfall_probability;
        let score = severity * probability;

        let harvest = aux.harvest_window();
        let mut factors = vec![RiskFactor {
            id: "water:drought".to_string(),
            analyzer: AnalyzerKind::Water,
            domain: RiskDomain::Weather,
            severity,
            probability,
            timeframe: aux.sowing_window(),
            mitigations: self.drought_alternatives(ctx, score, balance.onset_delay_days),
            basis: format!(
                "{} needs ~{:.0} mm; effective rainfall ~{:.0} mm (±{:.0}, {}), {:.0}% chance of shortfall; \
                 critical periods: sowing from day {}, harvest from day {}",
                ctx.primary_crop,
                balance.need_mm,
                balance.effective_mm,
                balance.sd_mm,
                outlook_source,
                probability * 100.0,
                aux.season.sowing_in_days,
                harvest.starts_in_days
            ),
            confidence,
            model_version: MODEL_VERSION.to_string(),
            alert: None,
        }];

        let flood_risk = ctx.flood_risk.value;
        if flood_risk >= self.config.flood_factor_floor {
            let flood_severity = clamp01(0.35 + 0.4 * retention);
            factors.push(RiskFactor {
                id: "water:waterlogging".to_string(),
                analyzer: AnalyzerKind::Water,
                domain: RiskDomain::Weather,
                severity: flood_severity,
                probability: flood_risk,
                timeframe: harvest,
                mitigations: vec![Alternative {
                    id: "water:drainage-channels".to_string(),
                    description: "Open field drainage channels before the heavy rains".to_string(),
                    risk_reduction: clamp01(0.4 * flood_severity * flood_risk),
                    cost: 25.0 * ctx.farm_size_ha.value,
                    time_to_implement_days: 10,
                    suitability: 0.8,
                }],
                basis: format!(
                    "{:.0}% seasonal flood risk with water retention {:.2}",
                    flood_risk * 100.0,
                    retention
                ),
                confidence,
                model_version: MODEL_VERSION.to_string(),
                alert: None,
            });
        }

        debug!(
            farm_id = %ctx.farm_id,
            shortfall = probability,
            factors = factors.len(),
            "water analysis complete"
        );
        Ok(factors)
    }
}
