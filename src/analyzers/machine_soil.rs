//! Machinery × soil-condition compatibility
//!
//! Every planned machine is scored against the current field condition.
//! Known damaging combinations raise a `Do-NOT-Use` alert whatever the score,
//! and every alert names at least one alternative.

use tracing::{debug, warn};

use super::lookup_tables::{compatibility, compatible_machines, is_harmful};
use super::{slug, AuxiliaryData, RiskAnalyzer};
use crate::config::MachineryConfig;
use crate::context::{Machinery, NormalizedFarmContext, SoilCondition};
use crate::error::AnalyzerError;
use crate::risk::{AlertKind, AnalyzerKind, Alternative, HardAlert, RiskDomain, RiskFactor};
use crate::utils::{clamp01, mean};

pub const MODEL_VERSION: &str = "machine-soil-matrix/1";

#[derive(Debug, Clone)]
pub struct MachineSoilAnalyzer {
    config: MachineryConfig,
}

impl MachineSoilAnalyzer {
    pub fn new(config: MachineryConfig) -> Self {
        Self { config }
    }

    /// Compaction severity added by repeated heavy tillage
    fn compaction_bonus(ctx: &NormalizedFarmContext) -> f64 {
        (0.08 * ctx.heavy_tillage_events().saturating_sub(1) as f64).min(0.3)
    }

    fn alternatives(&self, machine: Machinery, condition: SoilCondition, farm_size_ha: f64) -> Vec<Alternative> {
        let mut out: Vec<Alternative> = compatible_machines(condition, self.config.compatible_score_floor, machine)
            .into_iter()
            .map(|(m, score)| Alternative {
                id: format!("machinery:use-{}", slug(&m)),
                description: format!("Use {} instead of {}", m.display_name(), machine.display_name()),
                risk_reduction: clamp01(score - compatibility(machine, condition)),
                cost: hire_cost_per_ha(m) * farm_size_ha,
                time_to_implement_days: 2,
                suitability: score,
            })
            .collect();

        if condition != condition.drained() {
            out.push(Alternative {
                id: "machinery:defer-field-work".to_string(),
                description: format!("Defer {} until the field drains (about a week)", machine.display_name()),
                risk_reduction: clamp01(compatibility(machine, condition.drained()) - compatibility(machine, condition)),
                cost: 0.0,
                time_to_implement_days: 7,
                suitability: 0.7,
            });
        }

        if out.is_empty() {
            // Nothing clears the floor: manual work is always possible
            out.push(Alternative {
                id: "machinery:use-manual_tools".to_string(),
                description: format!("Use manual tools instead of {}", machine.display_name()),
                risk_reduction: clamp01(compatibility(Machinery::ManualTools, condition) - compatibility(machine, condition)),
                cost: hire_cost_per_ha(Machinery::ManualTools) * farm_size_ha,
                time_to_implement_days: 1,
                suitability: compatibility(Machinery::ManualTools, condition),
            });
        }
        out
    }

    fn factor_for(
        &self,
        ctx: &NormalizedFarmContext,
        aux: &AuxiliaryData,
        machine: Machinery,
        confidence: f64,
    ) -> RiskFactor {
        let condition = ctx.soil_condition.value;
        let score = compatibility(machine, condition);
        let harmful = is_harmful(machine, condition);
        let bonus = Self::compaction_bonus(ctx);
        let bonus = if machine.is_heavy() { bonus } else { bonus / 2.0 };

        let severity = clamp01(1.0 - score + bonus);
        let probability = if harmful { 0.9 } else { clamp01(0.3 + 0.5 * (1.0 - score)) };
        let mitigations = self.alternatives(machine, condition, ctx.farm_size_ha.value);

        let alert = harmful.then(|| HardAlert {
            kind: AlertKind::DoNotUse,
            analyzer: AnalyzerKind::MachineSoil,
            subject: machine.display_name().to_string(),
            message: format!(
                "{}: do not use {} on {} soil; it compacts and smears the field",
                AlertKind::DoNotUse.label(),
                machine.display_name(),
                condition.display_name()
            ),
            alternatives: mitigations.iter().map(|a| a.description.clone()).collect(),
        });

        let mut basis = format!(
            "{} on {} soil scores {:.2} compatibility",
            machine.display_name(),
            condition.display_name(),
            score
        );
        if bonus > 0.0 {
            basis.push_str(&format!(
                "; {} heavy-tillage seasons add compaction risk",
                ctx.heavy_tillage_events()
            ));
        }

        RiskFactor {
            id: format!("machine-soil:{}", slug(&machine)),
            analyzer: AnalyzerKind::MachineSoil,
            domain: RiskDomain::Soil,
            severity,
            probability,
            timeframe: aux.sowing_window(),
            mitigations,
            basis,
            confidence,
            model_version: MODEL_VERSION.to_string(),
            alert,
        }
    }
}

/// Rough hire/operating cost per hectare
fn hire_cost_per_ha(machine: Machinery) -> f64 {
    match machine {
        Machinery::HeavyTillage => 45.0,
        Machinery::Rotavator => 35.0,
        Machinery::PowerTiller => 25.0,
        Machinery::SeedDrill => 20.0,
        Machinery::CombineHarvester => 60.0,
        Machinery::BullockPlough => 15.0,
        Machinery::ManualTools => 30.0,
    }
}

impl RiskAnalyzer for MachineSoilAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::MachineSoil
    }

    fn analyze(&self, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Result<Vec<RiskFactor>, AnalyzerError> {
        let confidence = clamp01(mean([
            ctx.soil_condition.weight(),
            ctx.planned_machinery.weight(),
            ctx.soil_handling_history.weight(),
        ]));

        let mut machines = ctx.planned_machinery.value.clone();
        machines.sort();
        machines.dedup();
        if machines.is_empty() {
            machines.push(Machinery::ManualTools);
        }

        let factors: Vec<RiskFactor> = machines
            .into_iter()
            .map(|m| self.factor_for(ctx, aux, m, confidence))
            .collect();

        for alert in factors.iter().filter_map(|f| f.alert.as_ref()) {
            warn!(farm_id = %ctx.farm_id, machine = %alert.subject, "harmful machinery/soil combination");
        }
        debug!(farm_id = %ctx.farm_id, factors = factors.len(), "machine-soil analysis complete");
        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn analyzer() -> MachineSoilAnalyzer {
        MachineSoilAnalyzer::new(MachineryConfig::default())
    }

    #[test]
    fn test_heavy_tillage_on_wet_soil_alerts() {
        let ctx = normalize(&context_json(r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#));
        let factors = analyzer().analyze(&ctx, &normals()).unwrap();
        assert_eq!(factors.len(), 1);
        let alert = factors[0].alert.as_ref().unwrap();
        assert_eq!(alert.kind, AlertKind::DoNotUse);
        assert!(!alert.alternatives.is_empty());
        assert!(factors[0].mitigations.iter().any(|m| m.id == "machinery:use-bullock_plough"));
        assert!(factors[0].mitigations.iter().any(|m| m.id == "machinery:defer-field-work"));
    }

    #[test]
    fn test_waterlogged_always_has_alternative() {
        for machine in Machinery::ALL {
            let json = context_json(&format!(
                r#", "soil_condition": "waterlogged", "planned_machinery": ["{}"]"#,
                slug(&machine)
            ));
            let factors = analyzer().analyze(&normalize(&json), &normals()).unwrap();
            assert!(!factors[0].mitigations.is_empty(), "{:?} has no alternative", machine);
        }
    }

    #[test]
    fn test_compatible_machine_has_no_alert() {
        let ctx = normalize(&context_json(r#", "soil_condition": "moist", "planned_machinery": ["seed_drill"]"#));
        let factors = analyzer().analyze(&ctx, &normals()).unwrap();
        assert!(factors[0].alert.is_none());
        assert!(factors[0].score() < 0.2);
    }

    #[test]
    fn test_repeated_heavy_tillage_adds_severity() {
        let base = r#", "soil_condition": "moist", "planned_machinery": ["heavy_tillage"]"#;
        let history = r#", "soil_handling_history": [
            {"season": "2021", "practice": "heavy_tillage"},
            {"season": "2022", "practice": "heavy_tillage"},
            {"season": "2023", "practice": "heavy_tillage"}]"#;
        let plain = analyzer().analyze(&normalize(&context_json(base)), &normals()).unwrap();
        let worn = analyzer()
            .analyze(&normalize(&context_json(&format!("{}{}", base, history))), &normals())
            .unwrap();
        assert!(worn[0].severity > plain[0].severity);
        assert!(worn[0].basis.contains("heavy-tillage seasons"));
    }
}
