//! Domain risk analyzers
//!
//! Each analyzer reads a normalized farm context plus auxiliary data and emits
//! one or more `RiskFactor`s. Analyzers are pure given their inputs; the
//! orchestrator decides where and how long they run.

pub mod lookup_tables;
pub mod machine_soil;
pub mod perturbation;
pub mod physical_load;
pub mod soil_confidence;
pub mod water;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::{SeasonWindow, SeasonalOutlook};
use crate::config::AdvisorConfig;
use crate::context::NormalizedFarmContext;
use crate::error::AnalyzerError;
use crate::risk::{AnalyzerKind, AnalyzerUnavailable, RiskFactor, Timeframe};

pub use machine_soil::MachineSoilAnalyzer;
pub use perturbation::{candidates_for, ContextChange};
pub use physical_load::{load_profile, LoadProfile, PeriodLoad, PhysicalLoadAnalyzer};
pub use soil_confidence::{plan_actions, SoilActionPlan, SoilConfidenceAnalyzer};
pub use water::WaterAnalyzer;

/// Contract shared by every domain analyzer
pub trait RiskAnalyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Emit at least one factor, or fail
    fn analyze(&self, ctx: &NormalizedFarmContext, aux: &AuxiliaryData) -> Result<Vec<RiskFactor>, AnalyzerError>;
}

/// Where the seasonal outlook came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlookProvenance {
    Forecast,
    HistoricalNormals,
    Unavailable,
}

impl OutlookProvenance {
    /// Trust placed in the outlook itself
    pub fn weight(&self) -> f64 {
        match self {
            OutlookProvenance::Forecast => 0.9,
            OutlookProvenance::HistoricalNormals => 0.65,
            OutlookProvenance::Unavailable => 0.0,
        }
    }
}

/// Data fetched from collaborators before analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryData {
    pub season: SeasonWindow,
    pub outlook: Option<SeasonalOutlook>,
    pub provenance: OutlookProvenance,
}

impl AuxiliaryData {
    pub fn new(season: SeasonWindow, outlook: Option<SeasonalOutlook>, provenance: OutlookProvenance) -> Self {
        let provenance = if outlook.is_some() { provenance } else { OutlookProvenance::Unavailable };
        Self { season, outlook, provenance }
    }

    /// Timeframe of a work period inside the season window
    pub fn sowing_window(&self) -> Timeframe {
        Timeframe::new("sowing and establishment", self.season.sowing_in_days, 30)
    }

    pub fn weeding_window(&self) -> Timeframe {
        Timeframe::new("weeding", self.season.sowing_in_days.saturating_add(25), 30)
    }

    pub fn harvest_window(&self) -> Timeframe {
        let start = self.season.sowing_in_days.saturating_add(self.season.length_days.saturating_sub(21));
        Timeframe::new("harvest", start, 21)
    }

    pub fn whole_season(&self) -> Timeframe {
        Timeframe::new(self.season.label.clone(), self.season.sowing_in_days, self.season.length_days)
    }
}

/// The capability set run for every request
#[derive(Clone)]
pub struct AnalyzerSet {
    analyzers: Vec<Arc<dyn RiskAnalyzer>>,
}

impl AnalyzerSet {
    /// Water, soil-confidence, physical-load and machine-soil analyzers
    pub fn standard(config: &AdvisorConfig) -> Self {
        Self {
            analyzers: vec![
                Arc::new(WaterAnalyzer::new(config.water)),
                Arc::new(SoilConfidenceAnalyzer::new(config.soil)),
                Arc::new(PhysicalLoadAnalyzer::new(config.physical)),
                Arc::new(MachineSoilAnalyzer::new(config.machinery)),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { analyzers: Vec::new() }
    }

    /// Add an analyzer, replacing any existing one of the same kind
    pub fn with_analyzer(mut self, analyzer: Arc<dyn RiskAnalyzer>) -> Self {
        self.analyzers.retain(|a| a.kind() != analyzer.kind());
        self.analyzers.push(analyzer);
        self
    }

    pub fn analyzers(&self) -> &[Arc<dyn RiskAnalyzer>] {
        &self.analyzers
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Run every analyzer on the calling thread
    ///
    /// Used where per-task timeouts are not needed (scenario comparison and
    /// counterfactual re-analysis). Panics are contained per analyzer.
    pub fn analyze_inline(
        &self,
        ctx: &NormalizedFarmContext,
        aux: &AuxiliaryData,
    ) -> (Vec<RiskFactor>, Vec<AnalyzerUnavailable>) {
        let mut factors = Vec::new();
        let mut unavailable = Vec::new();
        for analyzer in &self.analyzers {
            match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(ctx, aux))) {
                Ok(Ok(mut produced)) if !produced.is_empty() => factors.append(&mut produced),
                Ok(Ok(_)) => unavailable.push(AnalyzerUnavailable {
                    analyzer: analyzer.kind(),
                    reason: "produced no factors".to_string(),
                }),
                Ok(Err(e)) => unavailable.push(AnalyzerUnavailable { analyzer: analyzer.kind(), reason: e.to_string() }),
                Err(_) => unavailable.push(AnalyzerUnavailable {
                    analyzer: analyzer.kind(),
                    reason: "analyzer panicked".to_string(),
                }),
            }
        }
        (factors, unavailable)
    }
}

impl std::fmt::Debug for AnalyzerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.analyzers.iter().map(|a| a.kind())).finish()
    }
}

/// Snake-case id fragment for a serde enum value
pub(crate) fn slug<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::context::{validate, BuiltinRegionalProfiles, FarmContext};

    pub fn context_json(extra: &str) -> String {
        format!(
            r#"{{
                "farm_id": "farm-001",
                "location": {{"region_code": "IN-MH-PUNE", "latitude": 18.52, "longitude": 73.85}}
                {}
            }}"#,
            extra
        )
    }

    pub fn normalize(json: &str) -> NormalizedFarmContext {
        let raw = FarmContext::from_json(json).unwrap();
        validate(&raw, &BuiltinRegionalProfiles::default(), None).unwrap().0
    }

    pub fn normals() -> AuxiliaryData {
        AuxiliaryData::new(
            SeasonWindow::default(),
            Some(SeasonalOutlook {
                expected_rainfall_mm: 720.0,
                rainfall_sd_mm: 210.0,
                onset_in_days: 24,
                source: "regional normals (IN-MH)".to_string(),
            }),
            OutlookProvenance::HistoricalNormals,
        )
    }
}
