//! Interpreter configuration
//!
//! Every threshold the pipeline uses lives here. Missing keys in a JSON config
//! file fall back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::AdvisorError;

/// Complete interpreter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub bands: BandThresholds,
    pub confidence: ConfidenceWeights,
    pub water: WaterConfig,
    pub soil: SoilConfig,
    pub physical: PhysicalConfig,
    pub machinery: MachineryConfig,
    pub cohort: CohortConfig,
    pub timeouts: TimeoutConfig,
    pub explanation: ExplanationConfig,
    /// Maximum alternatives attached to an assessment
    pub max_alternatives: usize,
    /// Worker threads for request tasks (0 = one per CPU)
    pub worker_threads: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            bands: BandThresholds::default(),
            confidence: ConfidenceWeights::default(),
            water: WaterConfig::default(),
            soil: SoilConfig::default(),
            physical: PhysicalConfig::default(),
            machinery: MachineryConfig::default(),
            cohort: CohortConfig::default(),
            timeouts: TimeoutConfig::default(),
            explanation: ExplanationConfig::default(),
            max_alternatives: 5,
            worker_threads: 0,
        }
    }
}

/// Severity×probability cut points between LOW/MEDIUM/HIGH
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandThresholds {
    /// Products below this are LOW
    pub low_below: f64,
    /// Products below this (and not LOW) are MEDIUM; the rest HIGH
    pub medium_below: f64,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self { low_below: 0.2, medium_below: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub factor_weight: f64,
    pub completeness_weight: f64,
    /// Subtracted once per unavailable analyzer
    pub unavailable_penalty: f64,
    /// Ceiling for insufficient-data assessments
    pub insufficient_data_cap: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            factor_weight: 0.6,
            completeness_weight: 0.4,
            unavailable_penalty: 0.05,
            insufficient_data_cap: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    /// Largest whole-farm implementation cost a drought alternative may carry
    pub debt_risk_threshold: f64,
    /// Flood risk at or above which a waterlogging factor is emitted
    pub flood_factor_floor: f64,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self { debt_risk_threshold: 500.0, flood_factor_floor: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilConfig {
    /// Below this data confidence, data-dependent actions are treated as risky
    pub confidence_threshold: f64,
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self { confidence_threshold: 0.6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConfig {
    /// Hired labor cost per person-hour
    pub hired_wage_per_hour: f64,
}

impl Default for PhysicalConfig {
    fn default() -> Self {
        Self { hired_wage_per_hour: 1.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineryConfig {
    /// Compatibility score a machine needs to be suggested as an alternative
    pub compatible_score_floor: f64,
}

impl Default for MachineryConfig {
    fn default() -> Self {
        Self { compatible_score_floor: 0.6 }
    }
}

/// Privacy floors for cohort aggregates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Minimum farms per cohort (k-anonymity)
    pub k: usize,
    /// Minimum distinct outcome labels per cohort (l-diversity)
    pub l: usize,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self { k: 10, l: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub analyzer_ms: u64,
    pub adapter_ms: u64,
    pub explanation_ms: u64,
    pub request_ms: u64,
}

impl TimeoutConfig {
    pub fn analyzer(&self) -> Duration {
        Duration::from_millis(self.analyzer_ms)
    }

    pub fn adapter(&self) -> Duration {
        Duration::from_millis(self.adapter_ms)
    }

    pub fn explanation(&self) -> Duration {
        Duration::from_millis(self.explanation_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            analyzer_ms: 2_000,
            adapter_ms: 1_500,
            explanation_ms: 2_000,
            request_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Upper bound on counterfactual candidates tried per request
    pub max_counterfactual_candidates: usize,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self { max_counterfactual_candidates: 12 }
    }
}

impl AdvisorConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AdvisorConfig = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break pipeline invariants
    pub fn validate(&self) -> std::result::Result<(), AdvisorError> {
        let b = &self.bands;
        if !(0.0 < b.low_below && b.low_below < b.medium_below && b.medium_below <= 1.0) {
            return Err(AdvisorError::Config(format!(
                "band thresholds must satisfy 0 < low ({}) < medium ({}) <= 1",
                b.low_below, b.medium_below
            )));
        }

        let c = &self.confidence;
        for (name, v) in [
            ("factor_weight", c.factor_weight),
            ("completeness_weight", c.completeness_weight),
            ("unavailable_penalty", c.unavailable_penalty),
            ("insufficient_data_cap", c.insufficient_data_cap),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AdvisorError::Config(format!("confidence.{} must be in [0,1], got {}", name, v)));
            }
        }
        if (c.factor_weight + c.completeness_weight - 1.0).abs() > 1e-6 {
            return Err(AdvisorError::Config(
                "confidence.factor_weight + completeness_weight must equal 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.soil.confidence_threshold) {
            return Err(AdvisorError::Config("soil.confidence_threshold must be in [0,1]".to_string()));
        }
        if self.water.debt_risk_threshold < 0.0 {
            return Err(AdvisorError::Config("water.debt_risk_threshold must be >= 0".to_string()));
        }
        if self.cohort.k == 0 || self.cohort.l == 0 {
            return Err(AdvisorError::Config("cohort.k and cohort.l must be >= 1".to_string()));
        }
        if self.timeouts.analyzer_ms == 0 || self.timeouts.request_ms == 0 {
            return Err(AdvisorError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}
