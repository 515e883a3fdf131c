//! Farm Risk Interpreter
//!
//! Context-specific agricultural risk assessment for smallholder farms.
//!
//! Pipeline layout:
//! - `context/`: raw farm context, regional fallbacks, validator
//! - `analyzers/`: water, soil-confidence, physical-load, machine-soil
//! - `cohort/`: k-anonymous, l-diverse peer cohorts behind a swappable snapshot
//! - `aggregator`: worst-case level, safety-first override, confidence
//! - `explanation/`: attribution, counterfactual, causal and peer layers
//! - `comparator`: safety-first scenario ranking
//! - `orchestrator`: per-request state machine and the public entry point
//!
//! The interpreter advises; it never decides for the farmer.

pub mod adapters;
pub mod aggregator;
pub mod analyzers;
pub mod cohort;
pub mod comparator;
pub mod config;
pub mod context;
pub mod error;
pub mod explanation;
pub mod orchestrator;
pub mod risk;
pub mod utils;

// Re-export commonly used types
pub use adapters::{ActualOutcome, OutcomeEvent, SeasonWindow};
pub use cohort::{CohortRefresher, CohortRegistry};
pub use comparator::{Scenario, ScenarioRanking};
pub use config::AdvisorConfig;
pub use context::{FarmContext, NormalizedFarmContext, QualityReport};
pub use error::{AdvisorError, Degradation, ValidationError};
pub use explanation::{AudienceProfile, ExplanationChain, JsonFormatter, LiteracyLevel, MarkdownFormatter};
pub use orchestrator::{PipelineStage, RiskInterpreter, RiskQuery, RiskReport};
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
