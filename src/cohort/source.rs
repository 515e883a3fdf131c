//! Cohort source records and their loaders
//!
//! Source tables carry one row per farm-season. List columns (crops,
//! practices) are pipe-separated strings.

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::context::InputPhilosophy;

/// One farm-season outcome used to build cohorts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSourceRecord {
    /// Dropped during aggregation; never reaches a snapshot
    #[serde(default)]
    pub farm_id: Option<String>,
    pub region_code: String,
    pub crops: Vec<String>,
    pub input_philosophy: InputPhilosophy,
    pub farm_size_ha: f64,
    /// Yield relative to the regional mean (1.0 = average)
    pub yield_index: f64,
    /// Outcome label, e.g. "good", "loss", "partial-loss"
    pub outcome: String,
    /// Practices the farm adopted that season
    #[serde(default)]
    pub practices: Vec<String>,
}

pub const REQUIRED_COLUMNS: [&str; 6] =
    ["region_code", "crops", "input_philosophy", "farm_size_ha", "yield_index", "outcome"];

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split('|')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .with_context(|| format!("Column '{}' not found", name))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' is not numeric", name))?;
    Ok(column
        .f64()
        .with_context(|| format!("Column '{}' is not f64", name))?
        .clone())
}

fn str_column(df: &DataFrame, name: &str) -> Result<StringChunked> {
    Ok(df
        .column(name)
        .with_context(|| format!("Column '{}' not found", name))?
        .str()
        .with_context(|| format!("Column '{}' is not string type", name))?
        .clone())
}

/// Convert a DataFrame to records, skipping rows with missing required values
pub fn records_from_dataframe(df: &DataFrame) -> Result<Vec<CohortSourceRecord>> {
    let missing: Vec<&str> = REQUIRED_COLUMNS.iter().copied().filter(|c| df.column(c).is_err()).collect();
    if !missing.is_empty() {
        anyhow::bail!("Cohort source is missing columns: {}", missing.join(", "));
    }

    let region = str_column(df, "region_code")?;
    let crops = str_column(df, "crops")?;
    let philosophy = str_column(df, "input_philosophy")?;
    let size = f64_column(df, "farm_size_ha")?;
    let yield_index = f64_column(df, "yield_index")?;
    let outcome = str_column(df, "outcome")?;
    let farm_id = df.column("farm_id").ok().and_then(|c| c.str().ok()).cloned();
    let practices = df.column("practices").ok().and_then(|c| c.str().ok()).cloned();

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for idx in 0..df.height() {
        let parsed = (|| {
            let parsed_philosophy = InputPhilosophy::parse(philosophy.get(idx)?)?;
            let ha = size.get(idx).filter(|v| v.is_finite() && *v > 0.0)?;
            let yi = yield_index.get(idx).filter(|v| v.is_finite())?;
            let label = outcome.get(idx).map(str::trim).filter(|s| !s.is_empty())?;
            Some(CohortSourceRecord {
                farm_id: farm_id.as_ref().and_then(|c| c.get(idx)).map(str::to_string),
                region_code: region.get(idx)?.trim().to_string(),
                crops: split_list(crops.get(idx)),
                input_philosophy: parsed_philosophy,
                farm_size_ha: ha,
                yield_index: yi,
                outcome: label.to_ascii_lowercase(),
                practices: split_list(practices.as_ref().and_then(|c| c.get(idx))),
            })
        })();

        match parsed {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "cohort source rows with missing values skipped");
    }
    Ok(records)
}

/// Load cohort source records from CSV
pub fn load_csv(path: &str) -> Result<Vec<CohortSourceRecord>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {}", path))?
        .finish()
        .with_context(|| format!("Failed to load cohort CSV: {}", path))?;
    records_from_dataframe(&df)
}

/// Load cohort source records from Parquet
pub fn load_parquet(path: &str) -> Result<Vec<CohortSourceRecord>> {
    let df = LazyFrame::scan_parquet(path, Default::default())
        .with_context(|| format!("Failed to scan parquet: {}", path))?
        .collect()
        .with_context(|| format!("Failed to load cohort parquet: {}", path))?;
    records_from_dataframe(&df)
}
