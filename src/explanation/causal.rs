//! Causal narrative layer
//!
//! A fixed knowledge graph links each factor family to the mechanism that
//! turns a farm condition into a loss. Conditions are filled from the same
//! context and auxiliary data the analyzers read.

use super::templates::{AudienceProfile, TemplateCatalog};
use super::types::{CausalChain, ExplanationLayer, LayerDetail, LayerError, LayerKind};
use crate::analyzers::{load_profile, AuxiliaryData, WaterAnalyzer};
use crate::context::{Machinery, NormalizedFarmContext};
use crate::risk::{RiskAssessment, RiskFactor};

/// Factors narrated per explanation
const MAX_CHAINS: usize = 3;

struct CausalLink {
    prefix: &'static str,
    mechanism: &'static str,
    outcome: &'static str,
}

const KNOWLEDGE_GRAPH: &[CausalLink] = &[
    CausalLink {
        prefix: "water:drought",
        mechanism: "soil moisture runs short while the crop establishes",
        outcome: "patchy germination and lower yield",
    },
    CausalLink {
        prefix: "water:waterlogging",
        mechanism: "standing water starves the roots of oxygen",
        outcome: "root rot and a thinner stand",
    },
    CausalLink {
        prefix: "soil:stress",
        mechanism: "nutrients are less available to the crop",
        outcome: "weaker plants and lower yield",
    },
    CausalLink {
        prefix: "labor:peak-load",
        mechanism: "field work falls behind in the busiest weeks",
        outcome: "late weeding or harvest and avoidable crop loss",
    },
    CausalLink {
        prefix: "machine-soil:",
        mechanism: "the machine compresses and smears the soil structure",
        outcome: "compaction that restricts roots for several seasons",
    },
];

fn link_for(factor_id: &str) -> Option<&'static CausalLink> {
    KNOWLEDGE_GRAPH.iter().find(|l| factor_id.starts_with(l.prefix))
}

/// Machine named by a `machine-soil:{machine}` factor id
fn machine_from_id(factor_id: &str) -> Option<Machinery> {
    let slug = factor_id.strip_prefix("machine-soil:")?;
    serde_json::from_value(serde_json::Value::String(slug.to_string())).ok()
}

fn condition_for(factor: &RiskFactor, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Option<String> {
    let id = factor.id.as_str();
    if id.starts_with("water:drought") {
        let balance = WaterAnalyzer::balance(ctx, aux)?;
        return Some(format!(
            "about {:.0} mm of usable rain expected against a {} need of {:.0} mm",
            balance.effective_mm, ctx.primary_crop, balance.need_mm
        ));
    }
    if id.starts_with("water:waterlogging") {
        return Some(format!(
            "a {:.0}% flood risk on soil that holds water (retention {:.2})",
            ctx.flood_risk.value * 100.0,
            ctx.water_retention.value
        ));
    }
    if id.starts_with("soil:stress") {
        let t = &ctx.soil_test.value;
        return Some(format!("soil pH {:.1} with {:.2}% organic carbon", t.ph, t.organic_carbon_pct));
    }
    if id.starts_with("labor:peak-load") {
        let profile = load_profile(ctx);
        let peak = profile.peak()?;
        return Some(format!(
            "{} needs about {:.0} hours a week against {:.0} available",
            peak.period.display_name(),
            peak.demand_hours_week,
            peak.capacity_hours_week
        ));
    }
    if id.starts_with("machine-soil:") {
        let machine = machine_from_id(id)?;
        return Some(format!(
            "{} planned on {} soil",
            machine.display_name(),
            ctx.soil_condition.value.display_name()
        ));
    }
    None
}

pub fn causal_chains(
    assessment: &RiskAssessment,
    ctx: &NormalizedFarmContext,
    aux: &AuxiliaryData,
) -> Result<Vec<CausalChain>, LayerError> {
    if assessment.factors.is_empty() {
        return Err(LayerError::NoFactors);
    }
    let mut ranked: Vec<&RiskFactor> = assessment.factors.iter().collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.id.cmp(&b.id)));

    Ok(ranked
        .into_iter()
        .filter_map(|f| {
            let link = link_for(&f.id)?;
            let condition = condition_for(f, ctx, aux)?;
            Some(CausalChain {
                factor_id: f.id.clone(),
                condition,
                mechanism: link.mechanism.to_string(),
                outcome: link.outcome.to_string(),
            })
        })
        .take(MAX_CHAINS)
        .collect())
}

pub fn causal_layer(
    assessment: &RiskAssessment,
    ctx: &NormalizedFarmContext,
    aux: &AuxiliaryData,
    catalog: &TemplateCatalog,
    audience: &AudienceProfile,
) -> Result<ExplanationLayer, LayerError> {
    let chains = causal_chains(assessment, ctx, aux)?;
    let (title, locale) = catalog.render("causal.title", audience, &[])?;

    let mut lines = Vec::with_capacity(chains.len());
    for chain in &chains {
        let (line, _) = catalog.render(
            "causal.chain",
            audience,
            &[
                ("condition", chain.condition.clone()),
                ("mechanism", chain.mechanism.clone()),
                ("outcome", chain.outcome.clone()),
            ],
        )?;
        lines.push(line);
    }

    Ok(ExplanationLayer { kind: LayerKind::CausalNarrative, title, lines, detail: LayerDetail::Causal { chains }, locale })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::*;
    use crate::analyzers::AnalyzerSet;
    use crate::config::AdvisorConfig;

    fn assessment_for(ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> RiskAssessment {
        let config = AdvisorConfig::default();
        let set = AnalyzerSet::standard(&config);
        let (factors, unavailable) = set.analyze_inline(ctx, aux);
        let cohort = crate::cohort::CohortLookup::NotAvailable { reason: "none".to_string() };
        crate::aggregator::RiskAggregator::new(&config).aggregate(crate::aggregator::AggregationInput {
            prediction_id: "pred-test".to_string(),
            factors,
            unavailable,
            quality: crate::context::QualityReport::from_fields(vec![]),
            expected_analyzers: set.len(),
            cohort: &cohort,
            cohort_snapshot_version: None,
        })
    }

    #[test]
    fn test_machine_id_parses() {
        assert_eq!(machine_from_id("machine-soil:heavy_tillage"), Some(Machinery::HeavyTillage));
        assert_eq!(machine_from_id("machine-soil:spaceship"), None);
        assert_eq!(machine_from_id("water:drought"), None);
    }

    #[test]
    fn test_chains_are_bounded_and_ranked() {
        let ctx = normalize(&context_json(r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage", "seed_drill"]"#));
        let aux = normals();
        let assessment = assessment_for(&ctx, &aux);
        let chains = causal_chains(&assessment, &ctx, &aux).unwrap();
        assert!(!chains.is_empty());
        assert!(chains.len() <= MAX_CHAINS);
        assert_eq!(chains[0].factor_id, "machine-soil:heavy_tillage");
        assert!(chains[0].condition.contains("wet"));
    }

    #[test]
    fn test_rendered_lines_match_chains() {
        let ctx = normalize(&context_json(""));
        let aux = normals();
        let assessment = assessment_for(&ctx, &aux);
        let layer =
            causal_layer(&assessment, &ctx, &aux, &TemplateCatalog::builtin(), &AudienceProfile::default()).unwrap();
        match &layer.detail {
            LayerDetail::Causal { chains } => assert_eq!(chains.len(), layer.lines.len()),
            other => panic!("unexpected detail {:?}", other),
        }
    }
}
