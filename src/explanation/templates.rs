//! Audience-aware wording
//!
//! Templates map a key to one sentence per literacy level, per locale.
//! Placeholders are `{name}` and are filled from the layer's facts; templates
//! change wording only. Unknown locales fall back to `en`, and a missing
//! literacy variant falls back to `standard`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::types::LayerError;

pub const FALLBACK_LOCALE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteracyLevel {
    Basic,
    #[default]
    Standard,
    Technical,
}

impl LiteracyLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(LiteracyLevel::Basic),
            "standard" => Some(LiteracyLevel::Standard),
            "technical" => Some(LiteracyLevel::Technical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudienceProfile {
    #[serde(default)]
    pub literacy: LiteracyLevel,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    FALLBACK_LOCALE.to_string()
}

impl Default for AudienceProfile {
    fn default() -> Self {
        Self { literacy: LiteracyLevel::Standard, locale: default_locale() }
    }
}

/// One template in its literacy variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariants {
    #[serde(default)]
    pub basic: Option<String>,
    pub standard: String,
    #[serde(default)]
    pub technical: Option<String>,
}

impl TemplateVariants {
    fn pick(&self, literacy: LiteracyLevel) -> &str {
        match literacy {
            LiteracyLevel::Basic => self.basic.as_deref().unwrap_or(&self.standard),
            LiteracyLevel::Standard => &self.standard,
            LiteracyLevel::Technical => self.technical.as_deref().unwrap_or(&self.standard),
        }
    }
}

/// locale → key → variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    locales: BTreeMap<String, BTreeMap<String, TemplateVariants>>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn variants(basic: &str, standard: &str, technical: &str) -> TemplateVariants {
    TemplateVariants {
        basic: Some(basic.to_string()),
        standard: standard.to_string(),
        technical: Some(technical.to_string()),
    }
}

impl TemplateCatalog {
    /// Built-in English catalog
    pub fn builtin() -> Self {
        let mut en = BTreeMap::new();
        en.insert(
            "attribution.title".to_string(),
            variants("What worries us most", "Where the risk comes from", "Factor attribution"),
        );
        en.insert(
            "attribution.line".to_string(),
            variants(
                "{factor}: {share}% of the worry",
                "{factor} contributes {share}% of the overall risk",
                "{factor_id}: share {share}% (severity x probability)",
            ),
        );
        en.insert(
            "counterfactual.title".to_string(),
            variants("What could change this", "What would lower the risk", "Counterfactual analysis"),
        );
        en.insert(
            "counterfactual.found".to_string(),
            variants(
                "If you {change}, the risk goes down from {from} to {to}.",
                "If you {change}, the overall risk would drop from {from} to {to}.",
                "Minimal single change found after {tried} candidates: {change} ({from} -> {to}).",
            ),
        );
        en.insert(
            "counterfactual.none".to_string(),
            variants(
                "No single simple change brings the risk below {from}.",
                "None of the {tried} single changes we tried lowers the risk below {from}.",
                "No single change among {tried} candidates lowers the band below {from}.",
            ),
        );
        en.insert(
            "causal.title".to_string(),
            variants("Why this matters", "How the risks arise", "Causal narrative"),
        );
        en.insert(
            "causal.chain".to_string(),
            variants(
                "{condition}. So {mechanism}. This can mean {outcome}.",
                "Because of {condition}, {mechanism}, which can lead to {outcome}.",
                "{condition} -> {mechanism} -> {outcome}",
            ),
        );
        en.insert(
            "peer.title".to_string(),
            variants("Farms like yours", "What similar farms did", "Peer cohort comparison"),
        );
        en.insert(
            "peer.practice".to_string(),
            variants(
                "{share}% of {count} farms like yours chose {practice}.",
                "{share}% of {count} similar farms chose {practice}; their average yield index was {yield_index}.",
                "Cohort n={count}: {practice} adopted by {share}%; mean yield index {yield_index}; outcomes {outcomes}.",
            ),
        );
        en.insert(
            "peer.no_practice".to_string(),
            variants(
                "We compared you with {count} farms like yours.",
                "Compared with {count} similar farms, whose average yield index was {yield_index}.",
                "Cohort n={count}: mean yield index {yield_index}; outcomes {outcomes}.",
            ),
        );

        let mut locales = BTreeMap::new();
        locales.insert(FALLBACK_LOCALE.to_string(), en);
        Self { locales }
    }

    /// Parse a catalog from JSON; must contain the fallback locale
    pub fn from_json(json: &str) -> Result<Self> {
        let locales: BTreeMap<String, BTreeMap<String, TemplateVariants>> =
            serde_json::from_str(json).with_context(|| "Failed to parse template catalog JSON")?;
        if !locales.contains_key(FALLBACK_LOCALE) {
            anyhow::bail!("Template catalog has no '{}' locale", FALLBACK_LOCALE);
        }
        Ok(Self { locales })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template catalog: {:?}", path))?;
        Self::from_json(&contents)
    }

    /// Locale that will be used for `requested` ("hi-IN" tries "hi-IN", then "hi")
    pub fn resolve_locale(&self, requested: &str) -> &str {
        let language = requested.split(|c: char| c == '-' || c == '_').next().unwrap_or(requested);
        [requested, language]
            .iter()
            .find_map(|l| self.locales.get_key_value(*l).map(|(k, _)| k.as_str()))
            .unwrap_or(FALLBACK_LOCALE)
    }

    /// Render `key` for an audience; returns the text and the locale used
    pub fn render(
        &self,
        key: &str,
        audience: &AudienceProfile,
        values: &[(&str, String)],
    ) -> std::result::Result<(String, String), LayerError> {
        let locale = self.resolve_locale(&audience.locale);
        let template = self
            .locales
            .get(locale)
            .and_then(|t| t.get(key))
            .or_else(|| self.locales.get(FALLBACK_LOCALE).and_then(|t| t.get(key)))
            .ok_or_else(|| LayerError::MissingTemplate(key.to_string()))?;

        let used = if self.locales.get(locale).map(|t| t.contains_key(key)).unwrap_or(false) {
            locale
        } else {
            FALLBACK_LOCALE
        };
        Ok((fill(template.pick(audience.literacy), values), used.to_string()))
    }
}

/// Replace `{name}` placeholders; unknown placeholders are left as-is
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in values {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
