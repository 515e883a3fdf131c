//! Risk data model shared by analyzers, aggregator and explanation layers

use serde::{Deserialize, Serialize};

use crate::cohort::AggregateStats;
use crate::config::BandThresholds;
use crate::context::QualityReport;

/// Overall risk classification
///
/// Ordered so that `max` picks the riskier level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Band for a severity×probability product
    pub fn from_score(score: f64, bands: &BandThresholds) -> Self {
        match score {
            s if s < bands.low_below => RiskLevel::Low,
            s if s < bands.medium_below => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn display_text(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Domain tag carried by every factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDomain {
    Weather,
    Soil,
    Market,
    Physical,
    Financial,
}

/// Which analyzer produced a factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Water,
    SoilConfidence,
    PhysicalLoad,
    MachineSoil,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 4] = [
        AnalyzerKind::Water,
        AnalyzerKind::SoilConfidence,
        AnalyzerKind::PhysicalLoad,
        AnalyzerKind::MachineSoil,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            AnalyzerKind::Water => "Water",
            AnalyzerKind::SoilConfidence => "Soil",
            AnalyzerKind::PhysicalLoad => "Physical load",
            AnalyzerKind::MachineSoil => "Machinery & soil",
        }
    }

    pub fn domain(&self) -> RiskDomain {
        match self {
            AnalyzerKind::Water => RiskDomain::Weather,
            AnalyzerKind::SoilConfidence => RiskDomain::Soil,
            AnalyzerKind::PhysicalLoad => RiskDomain::Physical,
            AnalyzerKind::MachineSoil => RiskDomain::Soil,
        }
    }
}

/// When a risk applies, relative to the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub starts_in_days: u32,
    pub duration_days: u32,
}

impl Timeframe {
    pub fn new(label: impl Into<String>, starts_in_days: u32, duration_days: u32) -> Self {
        Self { label: label.into(), starts_in_days, duration_days }
    }
}

/// A candidate decision path: a mitigation or an alternative practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    pub description: String,
    /// Expected reduction in severity×probability, in [0,1]
    pub risk_reduction: f64,
    /// Whole-farm implementation cost
    pub cost: f64,
    pub time_to_implement_days: u32,
    /// Fit with this farm's practices, in [0,1]
    pub suitability: f64,
}

/// Hard alert kinds that override numeric scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "Do-NOT-Use")]
    DoNotUse,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::DoNotUse => "Do-NOT-Use",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardAlert {
    pub kind: AlertKind,
    pub analyzer: AnalyzerKind,
    pub subject: String,
    pub message: String,
    /// Always non-empty
    pub alternatives: Vec<String>,
}

/// One domain-scoped risk contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub id: String,
    pub analyzer: AnalyzerKind,
    pub domain: RiskDomain,
    pub severity: f64,
    pub probability: f64,
    pub timeframe: Timeframe,
    pub mitigations: Vec<Alternative>,
    /// Quantitative basis cited in reasoning
    pub basis: String,
    /// Analyzer confidence in this factor, in [0,1]
    pub confidence: f64,
    /// Rule set or model artifact version that produced the factor
    pub model_version: String,
    pub alert: Option<HardAlert>,
}

impl RiskFactor {
    pub fn score(&self) -> f64 {
        self.severity * self.probability
    }

    pub fn band(&self, bands: &BandThresholds) -> RiskLevel {
        RiskLevel::from_score(self.score(), bands)
    }
}

/// Analyzer that contributed no factors, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerUnavailable {
    pub analyzer: AnalyzerKind,
    pub reason: String,
}

/// The unit returned to callers. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub prediction_id: String,
    pub level: RiskLevel,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub factors: Vec<RiskFactor>,
    pub timeframe: Option<Timeframe>,
    pub alternatives: Vec<Alternative>,
    pub alerts: Vec<HardAlert>,
    pub quality: QualityReport,
    pub unavailable: Vec<AnalyzerUnavailable>,
    pub insufficient_data: bool,
    /// Level raised above the factor maximum by a hard alert
    pub safety_override: bool,
    pub peer_stats: Option<AggregateStats>,
    pub cohort_snapshot_version: Option<u64>,
    pub degraded: bool,
}

impl RiskAssessment {
    /// Analyzer kinds that produced at least one factor
    pub fn covered_analyzers(&self) -> Vec<AnalyzerKind> {
        let mut kinds: Vec<AnalyzerKind> = self.factors.iter().map(|f| f.analyzer).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Versions of the rule sets/models behind this assessment
    pub fn model_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.factors.iter().map(|f| f.model_version.clone()).collect();
        versions.sort();
        versions.dedup();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        let bands = BandThresholds::default();
        assert_eq!(RiskLevel::from_score(0.0, &bands), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.199, &bands), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.2, &bands), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.499, &bands), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.5, &bands), RiskLevel::High);
    }

    #[test]
    fn test_levels_order_by_risk() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert_eq!(RiskLevel::Low.max(RiskLevel::High), RiskLevel::High);
    }

    #[test]
    fn test_alert_kind_serializes_with_label() {
        let json = serde_json::to_string(&AlertKind::DoNotUse).unwrap();
        assert_eq!(json, "\"Do-NOT-Use\"");
    }
}
