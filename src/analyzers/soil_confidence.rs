//! Soil stress and data confidence
//!
//! Soil-test values drive a stress severity; the test's provenance and age
//! drive how far those values can be trusted. Actions that only make sense
//! with reliable test data (liming, targeted fertilization) are held back when
//! data confidence is below the configured threshold.

use std::sync::Arc;

use tracing::debug;

use super::{slug, AuxiliaryData, RiskAnalyzer};
use crate::adapters::{Features, RiskModel};
use crate::config::SoilConfig;
use crate::context::{DataQualityIndicator, NormalizedFarmContext, SoilCondition};
use crate::error::AnalyzerError;
use crate::risk::{AnalyzerKind, Alternative, RiskDomain, RiskFactor};
use crate::utils::{clamp01, mean};

pub const MODEL_VERSION: &str = "soil-rules/1";

/// Stress components, each in [0,1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilStress {
    pub ph: f64,
    pub organic_carbon: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub compaction: f64,
}

impl SoilStress {
    pub fn severity(&self) -> f64 {
        clamp01(
            0.25 * self.ph
                + 0.2 * self.organic_carbon
                + 0.15 * self.nitrogen
                + 0.1 * self.phosphorus
                + 0.1 * self.potassium
                + 0.2 * self.compaction,
        )
    }
}

pub fn stress(ctx: &NormalizedFarmContext) -> SoilStress {
    let t = &ctx.soil_test.value;
    let condition_penalty = if ctx.soil_condition.value == SoilCondition::Compacted { 0.3 } else { 0.0 };
    SoilStress {
        ph: clamp01(((t.ph - 6.5).abs() - 0.5) / 2.0),
        organic_carbon: clamp01((0.75 - t.organic_carbon_pct) / 0.75),
        nitrogen: clamp01((280.0 - t.nitrogen_kg_ha) / 280.0),
        phosphorus: clamp01((22.0 - t.phosphorus_kg_ha) / 22.0),
        potassium: clamp01((140.0 - t.potassium_kg_ha) / 140.0),
        compaction: clamp01(0.15 * ctx.heavy_tillage_events() as f64 + condition_penalty),
    }
}

fn source_trust(source: DataQualityIndicator) -> f64 {
    match source {
        DataQualityIndicator::FarmSpecific => 1.0,
        DataQualityIndicator::RegionalFallback => 0.55,
        DataQualityIndicator::Default => 0.35,
    }
}

/// Trust in the soil-test values: provenance discounted by sample age
pub fn data_confidence(ctx: &NormalizedFarmContext) -> f64 {
    let age = ctx.soil_test.value.age_days as f64;
    let decay = if age <= 365.0 { 1.0 } else { (1.0 - (age - 365.0) / 1460.0).max(0.5) };
    clamp01(source_trust(ctx.soil_test.source) * decay)
}

/// Actions split by whether they can be recommended on the available data
#[derive(Debug, Clone, PartialEq)]
pub struct SoilActionPlan {
    pub data_confidence: f64,
    pub safe: Vec<Alternative>,
    pub risky: Vec<Alternative>,
}

fn action(id: &str, description: &str, reduction: f64, cost: f64, days: u32, suitability: f64) -> Alternative {
    Alternative {
        id: id.to_string(),
        description: description.to_string(),
        risk_reduction: clamp01(reduction),
        cost,
        time_to_implement_days: days,
        suitability,
    }
}

/// Build the safe/risky action split for a context
pub fn plan_actions(ctx: &NormalizedFarmContext, config: &SoilConfig) -> SoilActionPlan {
    let s = stress(ctx);
    let score = s.severity();
    let ha = ctx.farm_size_ha.value;
    let ph = ctx.soil_test.value.ph;
    let confidence = data_confidence(ctx);

    let mut safe = vec![action(
        "soil:compost",
        "Apply compost or farmyard manure",
        0.3 * score,
        40.0 * ha,
        14,
        0.9,
    )];
    if s.compaction > 0.0 {
        safe.push(action(
            "soil:reduce-tillage",
            "Cut heavy tillage passes; switch to minimum tillage",
            0.5 * s.compaction * score,
            0.0,
            0,
            0.7,
        ));
    }
    if s.organic_carbon > 0.3 {
        safe.push(action("soil:green-manure", "Grow a green-manure cover crop", 0.2 * score, 15.0 * ha, 45, 0.75));
    }

    let mut data_dependent = Vec::new();
    if ph < 5.5 {
        data_dependent.push(action("soil:lime", "Apply agricultural lime", 0.5 * s.ph * score + 0.05, 60.0 * ha, 21, 0.7));
    }
    if ph > 8.0 {
        data_dependent.push(action("soil:gypsum", "Apply gypsum to correct alkalinity", 0.4 * s.ph * score + 0.05, 50.0 * ha, 21, 0.6));
    }
    if s.nitrogen > 0.3 {
        data_dependent.push(action("soil:nitrogen", "Targeted nitrogen top-dressing", 0.3 * score, 35.0 * ha, 7, 0.8));
    }
    if s.phosphorus > 0.3 {
        data_dependent.push(action("soil:phosphate", "Apply phosphate at sowing", 0.2 * score, 45.0 * ha, 7, 0.75));
    }
    if s.potassium > 0.3 {
        data_dependent.push(action("soil:potash", "Apply potash", 0.15 * score, 30.0 * ha, 7, 0.75));
    }

    let risky = if confidence < config.confidence_threshold {
        safe.push(action(
            "soil:fresh-test",
            "Get a fresh soil test before buying amendments",
            0.1 * score + 0.05,
            10.0,
            14,
            0.95,
        ));
        data_dependent
    } else {
        safe.extend(data_dependent);
        Vec::new()
    };

    SoilActionPlan { data_confidence: confidence, safe, risky }
}

pub struct SoilConfidenceAnalyzer {
    config: SoilConfig,
    model: Option<Arc<dyn RiskModel>>,
}

impl SoilConfidenceAnalyzer {
    pub fn new(config: SoilConfig) -> Self {
        Self { config, model: None }
    }

    /// Blend rule severity with a trained model's score
    pub fn with_model(mut self, model: Arc<dyn RiskModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Analyzer confidence from field provenance only
    fn confidence(ctx: &NormalizedFarmContext) -> f64 {
        let context = mean([ctx.soil_handling_history.weight(), ctx.soil_condition.weight()]);
        clamp01(0.7 * source_trust(ctx.soil_test.source) + 0.3 * context)
    }

    fn features(ctx: &NormalizedFarmContext) -> Features {
        let t = &ctx.soil_test.value;
        let mut f = Features::default();
        f.push("ph", t.ph);
        f.push("organic_carbon_pct", t.organic_carbon_pct);
        f.push("nitrogen_kg_ha", t.nitrogen_kg_ha);
        f.push("phosphorus_kg_ha", t.phosphorus_kg_ha);
        f.push("potassium_kg_ha", t.potassium_kg_ha);
        f.push("heavy_tillage_events", ctx.heavy_tillage_events() as f64);
        f
    }
}

impl RiskAnalyzer for SoilConfidenceAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::SoilConfidence
    }

    fn analyze(&self, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Result<Vec<RiskFactor>, AnalyzerError> {
        let t = &ctx.soil_test.value;
        if !t.ph.is_finite() || !t.organic_carbon_pct.is_finite() {
            return Err(AnalyzerError::InvalidInput("soil test values are not finite".to_string()));
        }

        let components = stress(ctx);
        let plan = plan_actions(ctx, &self.config);

        let (severity, model_version) = match &self.model {
            Some(model) => {
                let prediction = model.predict(&Self::features(ctx));
                let blended = clamp01(0.5 * components.severity() + 0.5 * clamp01(prediction.score));
                (blended, format!("{}+{}", MODEL_VERSION, prediction.model_version))
            }
            None => (components.severity(), MODEL_VERSION.to_string()),
        };
        let probability = clamp01(0.4 + 0.5 * severity + 0.3 * (1.0 - plan.data_confidence));

        let mut basis = format!(
            "pH {:.1}, organic carbon {:.2}%, N {:.0} / P {:.0} / K {:.0} kg/ha ({} soil data, confidence {:.2})",
            t.ph,
            t.organic_carbon_pct,
            t.nitrogen_kg_ha,
            t.phosphorus_kg_ha,
            t.potassium_kg_ha,
            ctx.soil_test.source.as_str(),
            plan.data_confidence
        );
        if components.compaction > 0.0 {
            basis.push_str(&format!(
                "; {} heavy-tillage seasons, field {}",
                ctx.heavy_tillage_events(),
                ctx.soil_condition.value.display_name()
            ));
        }
        if !plan.risky.is_empty() {
            let held: Vec<String> = plan.risky.iter().map(|a| a.id.trim_start_matches("soil:").to_string()).collect();
            basis.push_str(&format!("; held back until re-tested: {}", held.join(", ")));
        }

        debug!(
            farm_id = %ctx.farm_id,
            severity,
            data_confidence = plan.data_confidence,
            source = %slug(&ctx.soil_test.source),
            "soil analysis complete"
        );

        Ok(vec![RiskFactor {
            id: "soil:stress".to_string(),
            analyzer: AnalyzerKind::SoilConfidence,
            domain: RiskDomain::Soil,
            severity,
            probability,
            timeframe: aux.whole_season(),
            mitigations: plan.safe,
            basis,
            confidence: Self::confidence(ctx),
            model_version,
            alert: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::adapters::Prediction;
    use approx::assert_relative_eq;

    const TESTED: &str = r#", "soil_test": {"ph": 5.1, "organic_carbon_pct": 0.3, "nitrogen_kg_ha": 150,
        "phosphorus_kg_ha": 8, "potassium_kg_ha": 200, "age_days": 90}"#;

    struct FixedModel;

    impl RiskModel for FixedModel {
        fn predict(&self, _features: &Features) -> Prediction {
            Prediction { label: "stressed".to_string(), score: 1.0, model_version: "soil-gbm/2024.3".to_string() }
        }
    }

    #[test]
    fn test_fresh_test_trusts_data_dependent_actions() {
        let ctx = normalize(&context_json(TESTED));
        let plan = plan_actions(&ctx, &SoilConfig::default());
        assert_relative_eq!(plan.data_confidence, 1.0);
        assert!(plan.risky.is_empty());
        assert!(plan.safe.iter().any(|a| a.id == "soil:lime"));
    }

    #[test]
    fn test_fallback_data_moves_actions_to_risky() {
        let ctx = normalize(&context_json(""));
        let plan = plan_actions(&ctx, &SoilConfig::default());
        assert!(plan.data_confidence < 0.6);
        assert!(plan.safe.iter().any(|a| a.id == "soil:fresh-test"));
        assert!(plan.safe.iter().all(|a| a.id != "soil:gypsum" && a.id != "soil:nitrogen"));
        assert!(!plan.risky.is_empty());
    }

    #[test]
    fn test_old_test_decays_confidence() {
        let old = TESTED.replace("\"age_days\": 90", "\"age_days\": 1460");
        let ctx = normalize(&context_json(&old));
        assert!(data_confidence(&ctx) < 0.6);
        assert!(!plan_actions(&ctx, &SoilConfig::default()).risky.is_empty());
    }

    #[test]
    fn test_missing_test_lowers_factor_confidence() {
        let analyzer = SoilConfidenceAnalyzer::new(SoilConfig::default());
        let with = analyzer.analyze(&normalize(&context_json(TESTED)), &normals()).unwrap();
        let without = analyzer.analyze(&normalize(&context_json("")), &normals()).unwrap();
        assert!(without[0].confidence < with[0].confidence);
    }

    #[test]
    fn test_model_version_recorded() {
        let analyzer = SoilConfidenceAnalyzer::new(SoilConfig::default()).with_model(Arc::new(FixedModel));
        let factors = analyzer.analyze(&normalize(&context_json(TESTED)), &normals()).unwrap();
        assert_eq!(factors[0].model_version, "soil-rules/1+soil-gbm/2024.3");
        let rules_only = SoilConfidenceAnalyzer::new(SoilConfig::default())
            .analyze(&normalize(&context_json(TESTED)), &normals())
            .unwrap();
        assert!(factors[0].severity > rules_only[0].severity);
    }

    #[test]
    fn test_heavy_tillage_history_adds_compaction() {
        let history = r#", "soil_handling_history": [
            {"season": "2022", "practice": "heavy_tillage"},
            {"season": "2023", "practice": "heavy_tillage"}]"#;
        let ctx = normalize(&context_json(history));
        assert_relative_eq!(stress(&ctx).compaction, 0.3, epsilon = 1e-9);
    }
}
