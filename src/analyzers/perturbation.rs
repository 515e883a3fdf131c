//! Single-change context perturbations for counterfactual search

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::lookup_tables::{compatibility, compatible_machines, is_harmful, less_intensive};
use super::AuxiliaryData;
use crate::config::MachineryConfig;
use crate::context::{CultivationMethod, Machinery, NormalizedFarmContext, SoilCondition};
use crate::risk::AnalyzerKind;

/// One change a farmer could make before the season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ContextChange {
    ShiftSowing { days: u32 },
    Mulch { retention_gain: f64 },
    SwapMachinery { from: Machinery, to: Machinery },
    WaitForDrainage { days: u32 },
    HireLabor { workers: u32 },
    SwitchMethod { to: CultivationMethod },
    AddCompost,
    Lime,
}

impl ContextChange {
    /// Apply to copies of the context and auxiliary data
    pub fn apply(&self, ctx: &mut NormalizedFarmContext, aux: &mut AuxiliaryData) {
        match self {
            ContextChange::ShiftSowing { days } => {
                aux.season.sowing_in_days = aux.season.sowing_in_days.saturating_add(*days);
            }
            ContextChange::Mulch { retention_gain } => {
                ctx.water_retention.value = (ctx.water_retention.value + retention_gain).min(1.0);
            }
            ContextChange::SwapMachinery { from, to } => {
                for m in ctx.planned_machinery.value.iter_mut().filter(|m| **m == *from) {
                    *m = *to;
                }
            }
            ContextChange::WaitForDrainage { days } => {
                for _ in 0..(days / 7).max(1) {
                    ctx.soil_condition.value = ctx.soil_condition.value.drained();
                }
                aux.season.sowing_in_days = aux.season.sowing_in_days.saturating_add(*days);
            }
            ContextChange::HireLabor { workers } => {
                ctx.labor.value.household_workers += workers;
            }
            ContextChange::SwitchMethod { to } => {
                ctx.cultivation_method.value = *to;
            }
            ContextChange::AddCompost => {
                ctx.soil_test.value.organic_carbon_pct += 0.2;
            }
            ContextChange::Lime => {
                let ph = ctx.soil_test.value.ph;
                if ph < 6.5 {
                    ctx.soil_test.value.ph = (ph + 0.8).min(6.5);
                }
            }
        }
    }

    /// Analyzer whose output the change targets
    pub fn affects(&self) -> AnalyzerKind {
        match self {
            ContextChange::ShiftSowing { .. } | ContextChange::Mulch { .. } => AnalyzerKind::Water,
            ContextChange::SwapMachinery { .. } | ContextChange::WaitForDrainage { .. } => AnalyzerKind::MachineSoil,
            ContextChange::HireLabor { .. } | ContextChange::SwitchMethod { .. } => AnalyzerKind::PhysicalLoad,
            ContextChange::AddCompost | ContextChange::Lime => AnalyzerKind::SoilConfidence,
        }
    }

    /// How big a change this is for the farmer; smaller is tried first
    pub fn magnitude(&self) -> f64 {
        match self {
            ContextChange::ShiftSowing { days } => *days as f64 / 30.0,
            ContextChange::Mulch { retention_gain } => retention_gain * 2.0,
            ContextChange::SwapMachinery { .. } => 0.5,
            ContextChange::WaitForDrainage { days } => *days as f64 / 10.0,
            ContextChange::HireLabor { workers } => 0.5 * *workers as f64,
            ContextChange::SwitchMethod { .. } => 1.0,
            ContextChange::AddCompost => 0.4,
            ContextChange::Lime => 0.6,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ContextChange::ShiftSowing { days } => format!("sow {} days later", days),
            ContextChange::Mulch { .. } => "mulch the fields to hold moisture".to_string(),
            ContextChange::SwapMachinery { from, to } => {
                format!("use {} instead of {}", to.display_name(), from.display_name())
            }
            ContextChange::WaitForDrainage { days } => format!("wait {} days for the field to drain", days),
            ContextChange::HireLabor { workers } if *workers == 1 => "hire one extra worker".to_string(),
            ContextChange::HireLabor { workers } => format!("hire {} extra workers", workers),
            ContextChange::SwitchMethod { to } => format!("switch to {} cultivation", to.display_name()),
            ContextChange::AddCompost => "add compost to build organic matter".to_string(),
            ContextChange::Lime => "apply lime to correct acidity".to_string(),
        }
    }
}

/// Bounded candidate set for one analyzer, smallest change first
pub fn candidates_for(
    kind: AnalyzerKind,
    ctx: &NormalizedFarmContext,
    machinery: &MachineryConfig,
) -> SmallVec<[ContextChange; 4]> {
    let mut out: SmallVec<[ContextChange; 4]> = SmallVec::new();
    match kind {
        AnalyzerKind::Water => {
            out.push(ContextChange::ShiftSowing { days: 7 });
            out.push(ContextChange::ShiftSowing { days: 14 });
            out.push(ContextChange::Mulch { retention_gain: 0.15 });
        }
        AnalyzerKind::MachineSoil => {
            let condition = ctx.soil_condition.value;
            for &machine in &ctx.planned_machinery.value {
                if is_harmful(machine, condition) || compatibility(machine, condition) < machinery.compatible_score_floor {
                    if let Some((to, _)) =
                        compatible_machines(condition, machinery.compatible_score_floor, machine).first()
                    {
                        out.push(ContextChange::SwapMachinery { from: machine, to: *to });
                    }
                }
            }
            match condition {
                SoilCondition::Wet => out.push(ContextChange::WaitForDrainage { days: 7 }),
                SoilCondition::Waterlogged => {
                    out.push(ContextChange::WaitForDrainage { days: 7 });
                    out.push(ContextChange::WaitForDrainage { days: 14 });
                }
                _ => {}
            }
        }
        AnalyzerKind::PhysicalLoad => {
            out.push(ContextChange::HireLabor { workers: 1 });
            out.push(ContextChange::HireLabor { workers: 2 });
            if let Some(to) = less_intensive(ctx.cultivation_method.value) {
                out.push(ContextChange::SwitchMethod { to });
            }
        }
        AnalyzerKind::SoilConfidence => {
            out.push(ContextChange::AddCompost);
            if ctx.soil_test.value.ph < 6.0 {
                out.push(ContextChange::Lime);
            }
        }
    }
    out.sort_by(|a, b| a.magnitude().total_cmp(&b.magnitude()));
    out
}
