use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzers::ContextChange;
use crate::cohort::AggregateStats;
use crate::explanation::templates::AudienceProfile;
use crate::risk::{AnalyzerKind, RiskLevel};

/// The four explanation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    FactorAttribution,
    Counterfactual,
    CausalNarrative,
    PeerNarrative,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::FactorAttribution,
        LayerKind::Counterfactual,
        LayerKind::CausalNarrative,
        LayerKind::PeerNarrative,
    ];

    /// Template key prefix for this layer
    pub fn key(&self) -> &'static str {
        match self {
            LayerKind::FactorAttribution => "attribution",
            LayerKind::Counterfactual => "counterfactual",
            LayerKind::CausalNarrative => "causal",
            LayerKind::PeerNarrative => "peer",
        }
    }
}

/// Complete explanation for one assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationChain {
    /// Produced layers, in `LayerKind` order
    pub layers: Vec<ExplanationLayer>,
    pub omitted: Vec<OmittedLayer>,
    pub audience: AudienceProfile,
    /// Locale the text was actually rendered in
    pub rendered_locale: String,
}

impl ExplanationChain {
    pub fn layer(&self, kind: LayerKind) -> Option<&ExplanationLayer> {
        self.layers.iter().find(|l| l.kind == kind)
    }

    pub fn locale_fell_back(&self) -> bool {
        self.rendered_locale != self.audience.locale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationLayer {
    pub kind: LayerKind,
    pub title: String,
    /// Rendered sentences for the audience
    pub lines: Vec<String>,
    pub detail: LayerDetail,
    /// Locale the lines were rendered in
    pub locale: String,
}

/// Structured facts behind each layer, independent of wording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDetail {
    Attribution { shares: Vec<FactorShare> },
    Counterfactual { finding: Option<CounterfactualFinding>, candidates_tried: usize },
    Causal { chains: Vec<CausalChain> },
    Peer { stats: AggregateStats },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorShare {
    pub factor_id: String,
    pub analyzer: AnalyzerKind,
    /// Share of total severity×probability; shares sum to 1
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualFinding {
    pub change: ContextChange,
    pub from_level: RiskLevel,
    pub to_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalChain {
    pub factor_id: String,
    pub condition: String,
    pub mechanism: String,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedLayer {
    pub kind: LayerKind,
    pub reason: String,
}

/// Why a single layer could not be produced
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    #[error("assessment has no factors")]
    NoFactors,

    #[error("peer cohort unavailable: {0}")]
    CohortUnavailable(String),

    #[error("template {0:?} not found in catalog")]
    MissingTemplate(String),

    #[error("layer cancelled")]
    Cancelled,
}
