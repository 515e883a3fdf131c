//! Error types and the non-fatal degradation vocabulary
//!
//! Only structural validation failures surface as hard errors. Everything else
//! the pipeline survives is recorded as a [`Degradation`] so it stays visible
//! in the output instead of being silently swallowed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ContextField;
use crate::explanation::LayerKind;
use crate::risk::AnalyzerKind;

/// Common result type for interpreter operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Structural problems with a farm context. Fatal: the pipeline never starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Context JSON could not be parsed at all
    #[error("farm context could not be parsed: {0}")]
    Unparseable(String),

    /// Farm identity missing or blank
    #[error("farm identity is missing")]
    MissingIdentity,

    /// Farm identity present but unusable
    #[error("farm identity is malformed: {0:?}")]
    InvalidIdentity(String),

    /// Region code does not follow the `CC(-SEG)*` form
    #[error("region code is malformed: {0:?}")]
    InvalidRegion(String),

    /// Coordinates out of range or not finite
    #[error("coordinates out of range: lat={latitude}, lon={longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    /// Season window starts too far ahead or runs too long
    #[error("season window out of range: sowing in {sowing_in_days} days, {length_days} days long")]
    InvalidSeason { sowing_in_days: u32, length_days: u32 },
}

/// Reasons a single analyzer could not produce factors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    /// Required auxiliary data (forecast, normals, ...) was not available
    #[error("missing auxiliary data: {0}")]
    MissingAuxiliary(&'static str),

    /// Inputs were present but could not be used
    #[error("invalid analyzer input: {0}")]
    InvalidInput(String),
}

/// Top-level error returned to callers
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Context failed structural validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Request stage machine was driven through an illegal transition
    #[error("illegal pipeline transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: crate::orchestrator::PipelineStage,
        to: crate::orchestrator::PipelineStage,
    },

    /// Farm not found in the context store
    #[error("farm not found: {0}")]
    FarmNotFound(String),

    /// A collaborator (store, sink, thread pool) failed
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

/// Non-fatal conditions recorded on a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// A context field was filled from a fallback source
    DataQuality { field: ContextField, note: String },

    /// An analyzer failed, panicked or timed out
    AnalyzerUnavailable { analyzer: AnalyzerKind, reason: String },

    /// No cohort satisfying the privacy floors matched this farm
    CohortUnavailable { reason: String },

    /// An explanation layer could not be generated
    LayerOmitted { layer: LayerKind, reason: String },

    /// No analyzer produced any factor
    InsufficientData,

    /// The request deadline passed before all tasks completed
    DeadlineExceeded { stage: String },
}

impl Degradation {
    /// Whether this condition sets the request's DEGRADED flag
    ///
    /// Fallback-filled fields lower confidence but do not degrade the request.
    pub fn degrades_request(&self) -> bool {
        !matches!(self, Degradation::DataQuality { .. } | Degradation::CohortUnavailable { .. })
    }
}
