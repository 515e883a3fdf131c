//! Explanation synthesizer
//!
//! Runs the four layer producers concurrently under a per-layer timeout and
//! the request deadline. A failed, panicked or late layer is listed in
//! `omitted`; the others are unaffected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use tracing::{debug, info};

use super::attribution::attribution_layer;
use super::causal::causal_layer;
use super::counterfactual::{counterfactual_layer, Reassessor};
use super::peer::peer_layer;
use super::templates::{AudienceProfile, TemplateCatalog};
use super::types::{ExplanationChain, ExplanationLayer, LayerError, LayerKind, OmittedLayer};
use crate::analyzers::AuxiliaryData;
use crate::cohort::CohortLookup;
use crate::config::{AdvisorConfig, BandThresholds};
use crate::context::NormalizedFarmContext;
use crate::error::Degradation;
use crate::risk::RiskAssessment;
use crate::utils::{run_with_deadline, CancelToken, TaskOutcome};

/// Everything the layer producers read; shared read-only across tasks
#[derive(Clone)]
pub struct ExplanationRequest {
    pub assessment: Arc<RiskAssessment>,
    pub context: Arc<NormalizedFarmContext>,
    pub aux: Arc<AuxiliaryData>,
    pub cohort: CohortLookup,
    pub reassessor: Arc<dyn Reassessor>,
    pub audience: AudienceProfile,
}

type LayerTask = Box<dyn FnOnce(&CancelToken) -> (Result<ExplanationLayer, LayerError>, Duration) + Send>;

#[derive(Debug, Clone)]
pub struct ExplanationSynthesizer {
    catalog: Arc<TemplateCatalog>,
    bands: BandThresholds,
    max_candidates: usize,
}

impl ExplanationSynthesizer {
    pub fn new(catalog: Arc<TemplateCatalog>, config: &AdvisorConfig) -> Self {
        Self {
            catalog,
            bands: config.bands,
            max_candidates: config.explanation.max_counterfactual_candidates,
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    fn task(&self, kind: LayerKind, req: &ExplanationRequest) -> LayerTask {
        let catalog = Arc::clone(&self.catalog);
        let bands = self.bands;
        let max_candidates = self.max_candidates;
        let req = req.clone();
        Box::new(move |cancel: &CancelToken| {
            let start = Instant::now();
            let layer = match kind {
                LayerKind::FactorAttribution => attribution_layer(&req.assessment, &catalog, &req.audience),
                LayerKind::Counterfactual => counterfactual_layer(
                    &req.assessment,
                    req.reassessor.as_ref(),
                    &bands,
                    max_candidates,
                    &catalog,
                    &req.audience,
                    cancel,
                ),
                LayerKind::CausalNarrative => {
                    causal_layer(&req.assessment, &req.context, &req.aux, &catalog, &req.audience)
                }
                LayerKind::PeerNarrative => peer_layer(&req.cohort, &catalog, &req.audience),
            };
            (layer, start.elapsed())
        })
    }

    /// Produce the explanation chain plus any degradations it incurred
    pub fn synthesize(
        &self,
        request: ExplanationRequest,
        pool: &ThreadPool,
        per_layer: Duration,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> (ExplanationChain, Vec<Degradation>) {
        let start = Instant::now();
        let tasks: Vec<LayerTask> = LayerKind::ALL.iter().map(|&kind| self.task(kind, &request)).collect();
        let outcomes = run_with_deadline(pool, tasks, per_layer, deadline, cancel);

        let mut layers = Vec::new();
        let mut omitted = Vec::new();
        let mut degradations = Vec::new();

        for (kind, outcome) in LayerKind::ALL.iter().copied().zip(outcomes) {
            let failure = match outcome {
                TaskOutcome::Completed((Ok(layer), elapsed)) => {
                    debug!(layer = kind.key(), elapsed_ms = elapsed.as_secs_f64() * 1000.0, "layer rendered");
                    layers.push(layer);
                    continue;
                }
                TaskOutcome::Completed((Err(e), _)) => e,
                TaskOutcome::Panicked(msg) => {
                    omitted.push(OmittedLayer { kind, reason: format!("layer panicked: {}", msg) });
                    degradations.push(Degradation::LayerOmitted { layer: kind, reason: "layer panicked".to_string() });
                    continue;
                }
                TaskOutcome::TimedOut => LayerError::Cancelled,
                TaskOutcome::Cancelled => LayerError::Cancelled,
            };

            let reason = match (&failure, deadline <= Instant::now()) {
                (LayerError::Cancelled, true) => "request deadline reached".to_string(),
                (LayerError::Cancelled, false) => "layer timed out".to_string(),
                _ => failure.to_string(),
            };
            // A missing cohort is already reported as its own degradation
            if !matches!(failure, LayerError::CohortUnavailable(_)) {
                degradations.push(Degradation::LayerOmitted { layer: kind, reason: reason.clone() });
            }
            omitted.push(OmittedLayer { kind, reason });
        }

        let resolved = self.catalog.resolve_locale(&request.audience.locale).to_string();
        let rendered_locale = layers
            .iter()
            .map(|l| l.locale.clone())
            .find(|l| *l != resolved)
            .unwrap_or(resolved);

        info!(
            prediction_id = %request.assessment.prediction_id,
            layers = layers.len(),
            omitted = omitted.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "explanation synthesized"
        );

        (
            ExplanationChain { layers, omitted, audience: request.audience, rendered_locale },
            degradations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_support::*;
    use crate::analyzers::{AnalyzerSet, ContextChange};
    use crate::explanation::counterfactual::InlineReassessor;
    use crate::risk::{AnalyzerKind, RiskLevel};
    use rayon::ThreadPoolBuilder;

    fn request(ctx_json: &str, cohort: CohortLookup, reassessor: Option<Arc<dyn Reassessor>>) -> ExplanationRequest {
        let config = AdvisorConfig::default();
        let ctx = normalize(&context_json(ctx_json));
        let aux = normals();
        let set = AnalyzerSet::standard(&config);
        let (factors, unavailable) = set.analyze_inline(&ctx, &aux);
        let assessment = crate::aggregator::RiskAggregator::new(&config).aggregate(crate::aggregator::AggregationInput {
            prediction_id: "pred-test".to_string(),
            factors,
            unavailable,
            quality: crate::context::QualityReport::from_fields(vec![]),
            expected_analyzers: set.len(),
            cohort: &cohort,
            cohort_snapshot_version: None,
        });
        let reassessor = reassessor.unwrap_or_else(|| {
            Arc::new(InlineReassessor::new(set, ctx.clone(), aux.clone(), config.bands, config.machinery))
        });
        ExplanationRequest {
            assessment: Arc::new(assessment),
            context: Arc::new(ctx),
            aux: Arc::new(aux),
            cohort,
            reassessor,
            audience: AudienceProfile::default(),
        }
    }

    fn synthesizer() -> ExplanationSynthesizer {
        ExplanationSynthesizer::new(Arc::new(TemplateCatalog::builtin()), &AdvisorConfig::default())
    }

    #[test]
    fn test_missing_cohort_omits_only_peer_layer() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let req = request("", CohortLookup::NotAvailable { reason: "no cohort".to_string() }, None);
        let (chain, degradations) = synthesizer().synthesize(
            req,
            &pool,
            Duration::from_secs(5),
            Instant::now() + Duration::from_secs(5),
            &CancelToken::new(),
        );
        assert_eq!(chain.layers.len(), 3);
        assert_eq!(chain.omitted.len(), 1);
        assert_eq!(chain.omitted[0].kind, LayerKind::PeerNarrative);
        assert!(degradations.is_empty());
        assert_eq!(chain.rendered_locale, "en");
        assert!(!chain.locale_fell_back());
    }

    struct SlowReassessor;

    impl Reassessor for SlowReassessor {
        fn level_with(&self, _: &ContextChange) -> RiskLevel {
            std::thread::sleep(Duration::from_millis(400));
            RiskLevel::High
        }

        fn candidates(&self, _: AnalyzerKind) -> Vec<ContextChange> {
            vec![ContextChange::AddCompost, ContextChange::ShiftSowing { days: 7 }]
        }
    }

    #[test]
    fn test_slow_layer_is_omitted_not_fatal() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let req = request(
            r#", "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#,
            CohortLookup::NotAvailable { reason: "no cohort".to_string() },
            Some(Arc::new(SlowReassessor)),
        );
        let (chain, degradations) = synthesizer().synthesize(
            req,
            &pool,
            Duration::from_millis(100),
            Instant::now() + Duration::from_secs(5),
            &CancelToken::new(),
        );
        assert!(chain.layer(LayerKind::Counterfactual).is_none());
        assert!(chain.layer(LayerKind::FactorAttribution).is_some());
        assert!(degradations
            .iter()
            .any(|d| matches!(d, Degradation::LayerOmitted { layer: LayerKind::Counterfactual, .. })));
    }
}
