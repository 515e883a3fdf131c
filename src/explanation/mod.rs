//! Layered, audience-adapted explanations
//!
//! Four independent producers (attribution, counterfactual, causal, peer)
//! feed one `ExplanationChain`. Wording comes from a `TemplateCatalog`.

pub mod types;
pub mod templates;
pub mod attribution;
pub mod counterfactual;
pub mod causal;
pub mod peer;
pub mod synthesizer;
pub mod formatters;

pub use types::{
    CausalChain, CounterfactualFinding, ExplanationChain, ExplanationLayer, FactorShare, LayerDetail, LayerError,
    LayerKind, OmittedLayer,
};
pub use templates::{AudienceProfile, LiteracyLevel, TemplateCatalog, TemplateVariants};
pub use attribution::{attribution_layer, factor_shares};
pub use counterfactual::{counterfactual_layer, InlineReassessor, Reassessor};
pub use causal::{causal_chains, causal_layer};
pub use peer::peer_layer;
pub use synthesizer::{ExplanationRequest, ExplanationSynthesizer};
pub use formatters::{JsonFormatter, MarkdownFormatter};
