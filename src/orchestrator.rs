//! Risk Interpretation Orchestrator
//!
//! Drives one request through validation, concurrent analysis, aggregation and
//! explanation. Each stage transition is checked; anything short of a
//! structural validation failure degrades the request instead of failing it.

use std::hash::Hasher;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::{
    ActualOutcome, FarmContextStore, Fetch, HistoricalWeatherStore, NoForecast, OutcomeEvent, OutcomeSink,
    RegionalNormals, SeasonWindow, WeatherQuery, WeatherSource,
};
use crate::aggregator::{AggregationInput, RiskAggregator};
use crate::analyzers::{AnalyzerSet, AuxiliaryData, OutlookProvenance, RiskAnalyzer};
use crate::cohort::{CohortBuilder, CohortLookup, CohortPattern, CohortRegistry};
use crate::comparator::{RejectedScenario, Scenario, ScenarioComparator, ScenarioRanking};
use crate::config::AdvisorConfig;
use crate::context::{validate, BuiltinRegionalProfiles, FarmContext, NormalizedFarmContext, RegionalProfileSource};
use crate::error::{AdvisorError, AnalyzerError, Degradation, Result};
use crate::explanation::{
    AudienceProfile, ExplanationChain, ExplanationRequest, ExplanationSynthesizer, InlineReassessor, TemplateCatalog,
};
use crate::risk::{AnalyzerUnavailable, RiskAssessment, RiskFactor};
use crate::utils::{run_with_deadline, CancelToken, TaskOutcome};

/// Request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Validating,
    Analyzing,
    Aggregating,
    Explaining,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Validating, Analyzing)
                | (Analyzing, Aggregating)
                | (Aggregating, Explaining)
                | (Explaining, Complete)
                | (Validating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }
}

/// Per-request state machine with the DEGRADED flag
#[derive(Debug, Clone)]
pub struct RequestState {
    stage: PipelineStage,
    visited: Vec<PipelineStage>,
    degraded: bool,
    degradations: Vec<Degradation>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestState {
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Validating,
            visited: vec![PipelineStage::Validating],
            degraded: false,
            degradations: Vec::new(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn advance(&mut self, next: PipelineStage) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(AdvisorError::IllegalTransition { from: self.stage, to: next });
        }
        self.stage = next;
        self.visited.push(next);
        Ok(())
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        if degradation.degrades_request() {
            self.degraded = true;
        }
        self.degradations.push(degradation);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }
}

/// What the caller is asking about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskQuery {
    /// Crop to assess; defaults to the farm's most recent crop
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub season: SeasonWindow,
    #[serde(default)]
    pub audience: AudienceProfile,
    /// Overrides `timeouts.request_ms`
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Audit trail for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTrace {
    pub prediction_id: String,
    pub stages: Vec<PipelineStage>,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
    pub cohort_snapshot_version: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub assessment: RiskAssessment,
    pub explanation: ExplanationChain,
    pub trace: RequestTrace,
}

/// Content hash of everything that determines an assessment
pub fn prediction_id(context: &FarmContext, query: &RiskQuery, snapshot_version: u64) -> String {
    let mut hasher = FxHasher::default();
    // Struct field order is fixed, so the JSON form is stable
    hasher.write(serde_json::to_string(context).unwrap_or_default().as_bytes());
    hasher.write(query.crop.as_deref().unwrap_or("").as_bytes());
    hasher.write(serde_json::to_string(&query.season).unwrap_or_default().as_bytes());
    hasher.write_u64(snapshot_version);
    format!("pred-{:016x}", hasher.finish())
}

type AnalyzerTask = Box<dyn FnOnce(&CancelToken) -> std::result::Result<Vec<RiskFactor>, AnalyzerError> + Send>;

/// The pipeline driver exposed to callers
pub struct RiskInterpreter {
    config: AdvisorConfig,
    pool: ThreadPool,
    analyzers: AnalyzerSet,
    aggregator: RiskAggregator,
    synthesizer: ExplanationSynthesizer,
    regional: Arc<dyn RegionalProfileSource>,
    weather: Arc<dyn WeatherSource>,
    history: Arc<dyn HistoricalWeatherStore>,
    cohorts: Arc<CohortRegistry>,
    farms: Option<Arc<dyn FarmContextStore>>,
    outcomes: Option<Arc<dyn OutcomeSink>>,
}

impl RiskInterpreter {
    /// Interpreter with built-in regional profiles, no live forecast and an
    /// empty cohort snapshot
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("risk-worker-{}", i))
            .build()
            .map_err(|e| AdvisorError::Collaborator(anyhow::Error::new(e).context("Failed to build worker pool")))?;

        let regional: Arc<dyn RegionalProfileSource> = Arc::new(BuiltinRegionalProfiles::default());
        Ok(Self {
            analyzers: AnalyzerSet::standard(&config),
            aggregator: RiskAggregator::new(&config),
            synthesizer: ExplanationSynthesizer::new(Arc::new(TemplateCatalog::builtin()), &config),
            history: Arc::new(RegionalNormals::new(Arc::clone(&regional))),
            regional,
            weather: Arc::new(NoForecast),
            cohorts: Arc::new(CohortRegistry::new(CohortBuilder::from_config(&config.cohort))),
            farms: None,
            outcomes: None,
            pool,
            config,
        })
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherSource>) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoricalWeatherStore>) -> Self {
        self.history = history;
        self
    }

    /// Replace regional profiles; historical normals follow them
    pub fn with_regional(mut self, regional: Arc<dyn RegionalProfileSource>) -> Self {
        self.history = Arc::new(RegionalNormals::new(Arc::clone(&regional)));
        self.regional = regional;
        self
    }

    pub fn with_cohorts(mut self, cohorts: Arc<CohortRegistry>) -> Self {
        self.cohorts = cohorts;
        self
    }

    pub fn with_farm_store(mut self, farms: Arc<dyn FarmContextStore>) -> Self {
        self.farms = Some(farms);
        self
    }

    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.outcomes = Some(sink);
        self
    }

    pub fn with_analyzers(mut self, analyzers: AnalyzerSet) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<TemplateCatalog>) -> Self {
        self.synthesizer = ExplanationSynthesizer::new(catalog, &self.config);
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn cohorts(&self) -> &Arc<CohortRegistry> {
        &self.cohorts
    }

    /// Seasonal outlook: live forecast within the adapter timeout, else normals
    fn auxiliary(&self, ctx: &NormalizedFarmContext, season: &SeasonWindow, deadline: Instant) -> AuxiliaryData {
        let query = WeatherQuery {
            region_code: ctx.location.region_code.clone(),
            latitude: ctx.location.latitude,
            longitude: ctx.location.longitude,
            season: season.clone(),
        };

        let weather = Arc::clone(&self.weather);
        let forecast_query = query.clone();
        let fetched = run_with_deadline(
            &self.pool,
            vec![move |_: &CancelToken| weather.fetch(&forecast_query)],
            self.config.timeouts.adapter(),
            deadline,
            &CancelToken::new(),
        );

        let forecast = match fetched.into_iter().next() {
            Some(TaskOutcome::Completed(Fetch::Data(outlook))) => Some(outlook),
            Some(TaskOutcome::Completed(Fetch::Unavailable { reason })) => {
                debug!(reason = %reason, "forecast unavailable, using normals");
                None
            }
            _ => {
                warn!(region = %query.region_code, "forecast fetch timed out or failed, using normals");
                None
            }
        };

        match forecast {
            Some(outlook) => AuxiliaryData::new(season.clone(), Some(outlook), OutlookProvenance::Forecast),
            None => AuxiliaryData::new(
                season.clone(),
                self.history.seasonal_normals(&query),
                OutlookProvenance::HistoricalNormals,
            ),
        }
    }

    fn run_analyzers(
        &self,
        ctx: &Arc<NormalizedFarmContext>,
        aux: &Arc<AuxiliaryData>,
        deadline: Instant,
        cancel: &CancelToken,
        state: &mut RequestState,
    ) -> (Vec<RiskFactor>, Vec<AnalyzerUnavailable>) {
        let analyzers: Vec<Arc<dyn RiskAnalyzer>> = self.analyzers.analyzers().to_vec();
        let tasks: Vec<AnalyzerTask> = analyzers
            .iter()
            .map(|analyzer| {
                let analyzer = Arc::clone(analyzer);
                let ctx = Arc::clone(ctx);
                let aux = Arc::clone(aux);
                Box::new(move |_: &CancelToken| analyzer.analyze(&ctx, &aux)) as AnalyzerTask
            })
            .collect();

        let outcomes = run_with_deadline(&self.pool, tasks, self.config.timeouts.analyzer(), deadline, cancel);

        let mut factors = Vec::new();
        let mut unavailable = Vec::new();
        let mut late = false;
        for (analyzer, outcome) in analyzers.iter().zip(outcomes) {
            let kind = analyzer.kind();
            let reason = match outcome {
                TaskOutcome::Completed(Ok(mut produced)) if !produced.is_empty() => {
                    factors.append(&mut produced);
                    continue;
                }
                TaskOutcome::Completed(Ok(_)) => "produced no factors".to_string(),
                TaskOutcome::Completed(Err(e)) => e.to_string(),
                TaskOutcome::Panicked(msg) => format!("analyzer panicked: {}", msg),
                TaskOutcome::TimedOut => {
                    late = true;
                    "timed out".to_string()
                }
                TaskOutcome::Cancelled => "cancelled".to_string(),
            };
            warn!(analyzer = kind.display_name(), reason = %reason, "analyzer unavailable");
            state.degrade(Degradation::AnalyzerUnavailable { analyzer: kind, reason: reason.clone() });
            unavailable.push(AnalyzerUnavailable { analyzer: kind, reason });
        }

        if late && Instant::now() >= deadline {
            cancel.cancel();
            state.degrade(Degradation::DeadlineExceeded { stage: "analyzing".to_string() });
        }
        (factors, unavailable)
    }

    /// Assess one farm context
    pub fn analyze_risk(&self, raw: &FarmContext, query: &RiskQuery) -> Result<RiskReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let budget = query.timeout_ms.map(Duration::from_millis).unwrap_or_else(|| self.config.timeouts.request());
        let deadline = start + budget;
        let cancel = CancelToken::new();
        let mut state = RequestState::new();

        // Validating
        let validated =
            query.season.validate().and_then(|()| validate(raw, self.regional.as_ref(), query.crop.as_deref()));
        let (ctx, quality) = match validated {
            Ok(v) => v,
            Err(e) => {
                warn!(farm_id = %raw.farm_id, error = %e, "context rejected");
                state.advance(PipelineStage::Failed)?;
                return Err(e.into());
            }
        };
        for field in quality.fallback_fields() {
            state.degrade(Degradation::DataQuality {
                field: field.field,
                note: field.note.clone().unwrap_or_else(|| field.source.as_str().to_string()),
            });
        }

        let snapshot = self.cohorts.snapshot();
        let prediction_id = prediction_id(raw, query, snapshot.version);
        info!(
            prediction_id = %prediction_id,
            region = %ctx.region_bucket,
            crop = %ctx.primary_crop,
            completeness = quality.completeness,
            "context validated"
        );

        // Analyzing
        state.advance(PipelineStage::Analyzing)?;
        let t_analyze = Instant::now();
        let aux = Arc::new(self.auxiliary(&ctx, &query.season, deadline));
        let ctx = Arc::new(ctx);
        let (factors, unavailable) = self.run_analyzers(&ctx, &aux, deadline, &cancel, &mut state);
        info!(
            factors = factors.len(),
            unavailable = unavailable.len(),
            elapsed_ms = t_analyze.elapsed().as_secs_f64() * 1000.0,
            "analyzers finished"
        );

        // Aggregating
        state.advance(PipelineStage::Aggregating)?;
        let pattern =
            CohortPattern { crop_pattern: ctx.crop_pattern.clone(), input_philosophy: ctx.input_philosophy.value };
        let cohort = snapshot.lookup(&ctx.location.region_code, &pattern);
        if let CohortLookup::NotAvailable { reason } = &cohort {
            state.degrade(Degradation::CohortUnavailable { reason: reason.clone() });
        }

        let mut assessment = self.aggregator.aggregate(AggregationInput {
            prediction_id: prediction_id.clone(),
            factors,
            unavailable,
            quality,
            expected_analyzers: self.analyzers.len(),
            cohort: &cohort,
            cohort_snapshot_version: Some(snapshot.version),
        });
        if assessment.insufficient_data {
            state.degrade(Degradation::InsufficientData);
        }
        assessment.degraded |= state.is_degraded();
        info!(
            prediction_id = %prediction_id,
            level = assessment.level.display_text(),
            confidence = assessment.confidence,
            safety_override = assessment.safety_override,
            "assessment aggregated"
        );

        // Explaining
        state.advance(PipelineStage::Explaining)?;
        let assessment = Arc::new(assessment);
        let reassessor = InlineReassessor::new(
            self.analyzers.clone(),
            (*ctx).clone(),
            (*aux).clone(),
            self.config.bands,
            self.config.machinery,
        );
        let (explanation, layer_notes) = self.synthesizer.synthesize(
            ExplanationRequest {
                assessment: Arc::clone(&assessment),
                context: Arc::clone(&ctx),
                aux: Arc::clone(&aux),
                cohort,
                reassessor: Arc::new(reassessor),
                audience: query.audience.clone(),
            },
            &self.pool,
            self.config.timeouts.explanation(),
            deadline,
            &cancel,
        );
        for note in layer_notes {
            state.degrade(note);
        }

        state.advance(PipelineStage::Complete)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(prediction_id = %prediction_id, degraded = state.is_degraded(), elapsed_ms, "request complete");

        // Layer timeouts land after aggregation and must still mark the assessment
        let mut assessment = Arc::try_unwrap(assessment).unwrap_or_else(|shared| (*shared).clone());
        assessment.degraded |= state.is_degraded();

        let RequestState { visited, degraded, degradations, .. } = state;
        Ok(RiskReport {
            assessment,
            explanation,
            trace: RequestTrace {
                prediction_id,
                stages: visited,
                degraded,
                degradations,
                cohort_snapshot_version: snapshot.version,
                started_at,
                elapsed_ms,
            },
        })
    }

    /// Assess a farm loaded from the configured context store
    pub fn analyze_stored_farm(&self, farm_id: &str, query: &RiskQuery) -> Result<RiskReport> {
        let store = self
            .farms
            .as_ref()
            .ok_or_else(|| AdvisorError::Config("no farm context store configured".to_string()))?;
        let context = store.load(farm_id)?.ok_or_else(|| AdvisorError::FarmNotFound(farm_id.to_string()))?;
        self.analyze_risk(&context, query)
    }

    /// Rank alternative scenarios under the safety-first policy
    pub fn compare_scenarios(&self, scenarios: &[Scenario], query: &RiskQuery) -> ScenarioRanking {
        let deadline = Instant::now()
            + query.timeout_ms.map(Duration::from_millis).unwrap_or_else(|| self.config.timeouts.request());
        if let Err(e) = query.season.validate() {
            warn!(error = %e, scenarios = scenarios.len(), "season rejected; no scenario ranked");
            let rejected = scenarios
                .iter()
                .map(|s| RejectedScenario { scenario_id: s.id.clone(), reason: e.to_string() })
                .collect();
            return ScenarioRanking { rejected, ..ScenarioRanking::default() };
        }
        let snapshot = self.cohorts.snapshot();
        let comparator = ScenarioComparator {
            analyzers: &self.analyzers,
            aggregator: &self.aggregator,
            regional: self.regional.as_ref(),
            cohorts: &snapshot,
        };
        let version = snapshot.version;
        comparator.rank(
            scenarios,
            query.crop.as_deref(),
            &|ctx| self.auxiliary(ctx, &query.season, deadline),
            &|context| prediction_id(context, query, version),
        )
    }

    /// Send the observed outcome of an earlier assessment to the outcome sink
    pub fn record_outcome(&self, prediction_id: &str, outcome: ActualOutcome) -> Result<OutcomeEvent> {
        let sink = self
            .outcomes
            .as_ref()
            .ok_or_else(|| AdvisorError::Config("no outcome sink configured".to_string()))?;
        let event = OutcomeEvent { prediction_id: prediction_id.to_string(), outcome, recorded_at: Utc::now() };
        sink.record(event.clone())?;
        info!(prediction_id, label = %event.outcome.label, "outcome recorded");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryFarmStore, MemoryOutcomeSink, SeasonalOutlook};
    use crate::analyzers::test_support::context_json;
    use crate::error::ValidationError;
    use crate::risk::{AnalyzerKind, RiskLevel};

    fn interpreter() -> RiskInterpreter {
        RiskInterpreter::new(AdvisorConfig::default()).unwrap()
    }

    #[test]
    fn test_transitions() {
        let mut state = RequestState::new();
        assert!(state.advance(PipelineStage::Aggregating).is_err());
        state.advance(PipelineStage::Analyzing).unwrap();
        assert!(state.advance(PipelineStage::Failed).is_err());
        state.advance(PipelineStage::Aggregating).unwrap();
        state.advance(PipelineStage::Explaining).unwrap();
        state.advance(PipelineStage::Complete).unwrap();
        assert!(state.stage().is_terminal());
        assert!(state.advance(PipelineStage::Validating).is_err());
    }

    #[test]
    fn test_data_quality_does_not_set_degraded() {
        let mut state = RequestState::new();
        state.degrade(Degradation::CohortUnavailable { reason: "none".to_string() });
        assert!(!state.is_degraded());
        state.degrade(Degradation::InsufficientData);
        assert!(state.is_degraded());
        assert_eq!(state.degradations().len(), 2);
    }

    #[test]
    fn test_full_request_visits_every_stage() {
        let raw = FarmContext::from_json(&context_json("")).unwrap();
        let report = interpreter().analyze_risk(&raw, &RiskQuery::default()).unwrap();
        assert_eq!(
            report.trace.stages,
            vec![
                PipelineStage::Validating,
                PipelineStage::Analyzing,
                PipelineStage::Aggregating,
                PipelineStage::Explaining,
                PipelineStage::Complete
            ]
        );
        assert_eq!(report.assessment.covered_analyzers(), AnalyzerKind::ALL.to_vec());
        assert!(report.assessment.prediction_id.starts_with("pred-"));
        assert!(report.explanation.layer(crate::explanation::LayerKind::FactorAttribution).is_some());
    }

    #[test]
    fn test_invalid_context_fails_fast() {
        let mut raw = FarmContext::from_json(&context_json("")).unwrap();
        raw.farm_id = "  ".to_string();
        let err = interpreter().analyze_risk(&raw, &RiskQuery::default()).unwrap_err();
        assert!(matches!(err, AdvisorError::Validation(ValidationError::MissingIdentity)));
    }

    #[test]
    fn test_prediction_id_is_content_hash() {
        let raw = FarmContext::from_json(&context_json("")).unwrap();
        let query = RiskQuery::default();
        assert_eq!(prediction_id(&raw, &query, 1), prediction_id(&raw, &query, 1));
        assert_ne!(prediction_id(&raw, &query, 1), prediction_id(&raw, &query, 2));
    }

    struct SlowForecast;

    impl WeatherSource for SlowForecast {
        fn fetch(&self, _: &WeatherQuery) -> Fetch<SeasonalOutlook> {
            std::thread::sleep(Duration::from_millis(500));
            Fetch::Data(SeasonalOutlook {
                expected_rainfall_mm: 2000.0,
                rainfall_sd_mm: 10.0,
                onset_in_days: 0,
                source: "slow".to_string(),
            })
        }
    }

    #[test]
    fn test_slow_forecast_falls_back_to_normals() {
        let mut config = AdvisorConfig::default();
        config.timeouts.adapter_ms = 50;
        let interpreter = RiskInterpreter::new(config).unwrap().with_weather(Arc::new(SlowForecast));
        let raw = FarmContext::from_json(&context_json("")).unwrap();
        let report = interpreter.analyze_risk(&raw, &RiskQuery::default()).unwrap();
        let water = report.assessment.factors.iter().find(|f| f.analyzer == AnalyzerKind::Water).unwrap();
        assert!(water.basis.contains("normals"));
    }

    #[test]
    fn test_stored_farm_and_outcome() {
        let raw = FarmContext::from_json(&context_json("")).unwrap();
        let sink = Arc::new(MemoryOutcomeSink::default());
        let interpreter = interpreter()
            .with_farm_store(Arc::new(InMemoryFarmStore::new(vec![raw])))
            .with_outcome_sink(sink.clone());

        let report = interpreter.analyze_stored_farm("farm-001", &RiskQuery::default()).unwrap();
        assert!(matches!(
            interpreter.analyze_stored_farm("farm-404", &RiskQuery::default()),
            Err(AdvisorError::FarmNotFound(_))
        ));

        let outcome = ActualOutcome { label: "good".to_string(), yield_index: Some(0.9), notes: None };
        interpreter.record_outcome(&report.assessment.prediction_id, outcome).unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prediction_id, report.assessment.prediction_id);
    }

    #[test]
    fn test_heavy_tillage_on_wet_soil_is_high() {
        let raw = FarmContext::from_json(&context_json(
            r#", "water": {"retention": 0.1, "flood_risk": 0.0}, "soil_condition": "wet", "planned_machinery": ["heavy_tillage"]"#,
        ))
        .unwrap();
        let report = interpreter().analyze_risk(&raw, &RiskQuery::default()).unwrap();
        assert_eq!(report.assessment.level, RiskLevel::High);
        assert!(!report.assessment.alerts.is_empty());
        assert!(report.assessment.alternatives.iter().any(|a| a.id.starts_with("machinery:use-")));
    }
}
