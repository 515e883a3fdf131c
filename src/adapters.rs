//! External collaborator interfaces
//!
//! Weather feeds, historical stores, model artifacts, farm/cohort repositories
//! and the outcome sink are owned by other teams. The pipeline only depends on
//! the traits here; the in-process implementations cover the defaults and tests.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cohort::CohortSourceRecord;
use crate::context::{FarmContext, RegionalProfileSource};
use crate::error::ValidationError;

/// Result of an adapter fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Data(T),
    Unavailable { reason: String },
}

impl<T> Fetch<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Fetch::Unavailable { reason: reason.into() }
    }

    pub fn data(self) -> Option<T> {
        match self {
            Fetch::Data(d) => Some(d),
            Fetch::Unavailable { .. } => None,
        }
    }
}

/// Season the assessment is about, relative to the request date
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub label: String,
    /// Days from now until planned sowing
    pub sowing_in_days: u32,
    /// Sowing to end of harvest
    pub length_days: u32,
}

impl SeasonWindow {
    pub const MAX_SOWING_IN_DAYS: u32 = 365;
    pub const MAX_LENGTH_DAYS: u32 = 730;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sowing_in_days > Self::MAX_SOWING_IN_DAYS || self.length_days > Self::MAX_LENGTH_DAYS {
            return Err(ValidationError::InvalidSeason {
                sowing_in_days: self.sowing_in_days,
                length_days: self.length_days,
            });
        }
        Ok(())
    }

    /// Sowing offset as a signed day count
    pub fn sowing_offset(&self) -> i32 {
        i32::try_from(self.sowing_in_days).unwrap_or(i32::MAX)
    }
}

impl Default for SeasonWindow {
    fn default() -> Self {
        Self { label: "upcoming season".to_string(), sowing_in_days: 14, length_days: 120 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub region_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub season: SeasonWindow,
}

/// Seasonal rainfall expectation for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalOutlook {
    pub expected_rainfall_mm: f64,
    pub rainfall_sd_mm: f64,
    /// Days from now until rains are expected to set in
    pub onset_in_days: i32,
    /// Provider name, for reasoning statements
    pub source: String,
}

/// Live seasonal forecast provider
pub trait WeatherSource: Send + Sync {
    fn fetch(&self, query: &WeatherQuery) -> Fetch<SeasonalOutlook>;
}

/// Read access to historical weather normals
pub trait HistoricalWeatherStore: Send + Sync {
    fn seasonal_normals(&self, query: &WeatherQuery) -> Option<SeasonalOutlook>;
}

/// Weather source used when no forecast provider is wired in
#[derive(Debug, Clone, Default)]
pub struct NoForecast;

impl WeatherSource for NoForecast {
    fn fetch(&self, _query: &WeatherQuery) -> Fetch<SeasonalOutlook> {
        Fetch::unavailable("no forecast provider configured")
    }
}

/// Historical normals served from regional profiles
pub struct RegionalNormals {
    regional: Arc<dyn RegionalProfileSource>,
}

impl RegionalNormals {
    pub fn new(regional: Arc<dyn RegionalProfileSource>) -> Self {
        Self { regional }
    }
}

impl HistoricalWeatherStore for RegionalNormals {
    fn seasonal_normals(&self, query: &WeatherQuery) -> Option<SeasonalOutlook> {
        let (profile, source) = match self.regional.profile(&query.region_code) {
            Some(p) => {
                let name = format!("regional normals ({})", p.region_prefix);
                (p, name)
            }
            None => (self.regional.global_default(), "global normals".to_string()),
        };
        Some(SeasonalOutlook {
            expected_rainfall_mm: profile.seasonal_rainfall_mm,
            rainfall_sd_mm: profile.rainfall_sd_mm,
            onset_in_days: query.season.sowing_offset().saturating_add(profile.onset_delay_days),
            source,
        })
    }
}

/// Named numeric features passed to a model artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features(pub Vec<(String, f64)>);

impl Features {
    pub fn push(&mut self, name: &str, value: f64) {
        self.0.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Risk score in [0,1]
    pub score: f64,
    pub model_version: String,
}

/// Versioned, swappable model artifact (trained elsewhere)
pub trait RiskModel: Send + Sync {
    fn predict(&self, features: &Features) -> Prediction;
}

/// Read access to stored farm contexts
pub trait FarmContextStore: Send + Sync {
    fn load(&self, farm_id: &str) -> anyhow::Result<Option<FarmContext>>;
}

#[derive(Debug, Default)]
pub struct InMemoryFarmStore {
    farms: FxHashMap<String, FarmContext>,
}

impl InMemoryFarmStore {
    pub fn new(farms: impl IntoIterator<Item = FarmContext>) -> Self {
        Self { farms: farms.into_iter().map(|f| (f.farm_id.clone(), f)).collect() }
    }
}

impl FarmContextStore for InMemoryFarmStore {
    fn load(&self, farm_id: &str) -> anyhow::Result<Option<FarmContext>> {
        Ok(self.farms.get(farm_id).cloned())
    }
}

/// Read access to the records cohorts are built from
pub trait CohortSourceStore: Send + Sync {
    fn records(&self) -> anyhow::Result<Vec<CohortSourceRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryCohortSource {
    records: Mutex<Vec<CohortSourceRecord>>,
}

impl InMemoryCohortSource {
    pub fn new(records: Vec<CohortSourceRecord>) -> Self {
        Self { records: Mutex::new(records) }
    }

    /// Replace the stored records (next rebuild picks them up)
    pub fn replace(&self, records: Vec<CohortSourceRecord>) {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records;
    }
}

impl CohortSourceStore for InMemoryCohortSource {
    fn records(&self) -> anyhow::Result<Vec<CohortSourceRecord>> {
        Ok(self.records.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// What actually happened after an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualOutcome {
    pub label: String,
    #[serde(default)]
    pub yield_index: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Outcome event for the continuous-learning collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub prediction_id: String,
    pub outcome: ActualOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Write sink for outcome events
pub trait OutcomeSink: Send + Sync {
    fn record(&self, event: OutcomeEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryOutcomeSink {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl MemoryOutcomeSink {
    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl OutcomeSink for MemoryOutcomeSink {
    fn record(&self, event: OutcomeEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        Ok(())
    }
}
