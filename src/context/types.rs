//! Farm context types
//!
//! `FarmContext` is what callers send: most fields optional, straight from a
//! field survey or a stored profile. `NormalizedFarmContext` is what analyzers
//! read: every field resolved and tagged with where its value came from.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Raw farm description supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmContext {
    pub farm_id: String,
    pub location: Location,

    /// Oldest first
    #[serde(default)]
    pub soil_handling_history: Vec<SoilHandlingEvent>,

    #[serde(default)]
    pub water: WaterBehavior,

    #[serde(default)]
    pub input_philosophy: Option<InputPhilosophy>,

    #[serde(default)]
    pub labor: Option<LaborProfile>,

    #[serde(default)]
    pub cultivation_method: Option<CultivationMethod>,

    #[serde(default)]
    pub farm_size_ha: Option<f64>,

    /// Oldest first
    #[serde(default)]
    pub crop_history: Vec<CropRecord>,

    #[serde(default)]
    pub soil_test: Option<SoilTest>,

    /// Observed field condition at request time
    #[serde(default)]
    pub soil_condition: Option<SoilCondition>,

    #[serde(default)]
    pub planned_machinery: Vec<Machinery>,
}

impl FarmContext {
    /// Parse a context from JSON, mapping parse failures to a validation error
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Unparseable(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// ISO-style region code, e.g. "IN-MH-PUNE"
    pub region_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterBehavior {
    /// Fraction of rainfall the field holds (0 = drains immediately)
    #[serde(default)]
    pub retention: Option<f64>,
    /// Seasonal probability of flooding/waterlogging
    #[serde(default)]
    pub flood_risk: Option<f64>,
    #[serde(default)]
    pub irrigation: Option<IrrigationAccess>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationAccess {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPhilosophy {
    Chemical,
    Organic,
    Mixed,
}

impl InputPhilosophy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputPhilosophy::Chemical => "chemical",
            InputPhilosophy::Organic => "organic",
            InputPhilosophy::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chemical" => Some(InputPhilosophy::Chemical),
            "organic" => Some(InputPhilosophy::Organic),
            "mixed" => Some(InputPhilosophy::Mixed),
            _ => None,
        }
    }
}

/// Household labor available for field work
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaborProfile {
    pub household_workers: u32,
    pub hours_per_worker_week: f64,
    /// Whether the household can pay for seasonal help
    #[serde(default)]
    pub can_hire_labor: bool,
}

impl LaborProfile {
    /// Person-hours available per week
    pub fn weekly_capacity_hours(&self) -> f64 {
        self.household_workers as f64 * self.hours_per_worker_week
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CultivationMethod {
    Manual,
    AnimalDrawn,
    Mechanized,
}

impl CultivationMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            CultivationMethod::Manual => "manual",
            CultivationMethod::AnimalDrawn => "animal-drawn",
            CultivationMethod::Mechanized => "mechanized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilHandlingEvent {
    pub season: String,
    pub practice: SoilPractice,
    #[serde(default)]
    pub machinery: Option<Machinery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoilPractice {
    HeavyTillage,
    MinimumTillage,
    NoTill,
    ResidueBurning,
    CompostApplication,
    GreenManure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    pub season: String,
    pub crop: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilTest {
    pub ph: f64,
    pub organic_carbon_pct: f64,
    pub nitrogen_kg_ha: f64,
    pub phosphorus_kg_ha: f64,
    pub potassium_kg_ha: f64,
    /// Days since the sample was taken
    #[serde(default)]
    pub age_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoilCondition {
    Dry,
    Moist,
    Wet,
    Waterlogged,
    Compacted,
}

impl SoilCondition {
    pub fn display_name(&self) -> &'static str {
        match self {
            SoilCondition::Dry => "dry",
            SoilCondition::Moist => "moist",
            SoilCondition::Wet => "wet",
            SoilCondition::Waterlogged => "waterlogged",
            SoilCondition::Compacted => "compacted",
        }
    }

    /// Condition after the field drains for about a week
    pub fn drained(&self) -> Self {
        match self {
            SoilCondition::Waterlogged => SoilCondition::Wet,
            SoilCondition::Wet => SoilCondition::Moist,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Machinery {
    HeavyTillage,
    Rotavator,
    PowerTiller,
    SeedDrill,
    CombineHarvester,
    BullockPlough,
    ManualTools,
}

impl Machinery {
    pub const ALL: [Machinery; 7] = [
        Machinery::HeavyTillage,
        Machinery::Rotavator,
        Machinery::PowerTiller,
        Machinery::SeedDrill,
        Machinery::CombineHarvester,
        Machinery::BullockPlough,
        Machinery::ManualTools,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Machinery::HeavyTillage => "heavy tractor tillage",
            Machinery::Rotavator => "rotavator",
            Machinery::PowerTiller => "power tiller",
            Machinery::SeedDrill => "seed drill",
            Machinery::CombineHarvester => "combine harvester",
            Machinery::BullockPlough => "bullock plough",
            Machinery::ManualTools => "manual tools",
        }
    }

    /// Rough ground pressure class used for compaction risk
    pub fn is_heavy(&self) -> bool {
        matches!(self, Machinery::HeavyTillage | Machinery::CombineHarvester | Machinery::Rotavator)
    }
}

/// Where a resolved field value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataQualityIndicator {
    FarmSpecific,
    RegionalFallback,
    Default,
}

impl DataQualityIndicator {
    /// Contribution to completeness and analyzer confidence
    pub fn weight(&self) -> f64 {
        match self {
            DataQualityIndicator::FarmSpecific => 1.0,
            DataQualityIndicator::RegionalFallback => 0.5,
            DataQualityIndicator::Default => 0.25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataQualityIndicator::FarmSpecific => "farm-specific",
            DataQualityIndicator::RegionalFallback => "regional-fallback",
            DataQualityIndicator::Default => "default",
        }
    }
}

/// A resolved value plus its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: DataQualityIndicator,
}

impl<T> Sourced<T> {
    pub fn farm(value: T) -> Self {
        Self { value, source: DataQualityIndicator::FarmSpecific }
    }

    pub fn new(value: T, source: DataQualityIndicator) -> Self {
        Self { value, source }
    }

    pub fn weight(&self) -> f64 {
        self.source.weight()
    }
}

/// Fields tracked by the quality report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    SoilTest,
    WaterRetention,
    FloodRisk,
    Irrigation,
    InputPhilosophy,
    Labor,
    CultivationMethod,
    FarmSize,
    CropHistory,
    SoilHandlingHistory,
    SoilCondition,
    PlannedMachinery,
}

impl ContextField {
    pub const ALL: [ContextField; 12] = [
        ContextField::SoilTest,
        ContextField::WaterRetention,
        ContextField::FloodRisk,
        ContextField::Irrigation,
        ContextField::InputPhilosophy,
        ContextField::Labor,
        ContextField::CultivationMethod,
        ContextField::FarmSize,
        ContextField::CropHistory,
        ContextField::SoilHandlingHistory,
        ContextField::SoilCondition,
        ContextField::PlannedMachinery,
    ];

    /// Relative importance in the completeness score
    pub fn completeness_weight(&self) -> f64 {
        match self {
            ContextField::SoilTest => 2.0,
            _ => 1.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContextField::SoilTest => "soil test",
            ContextField::WaterRetention => "water retention",
            ContextField::FloodRisk => "flood risk",
            ContextField::Irrigation => "irrigation access",
            ContextField::InputPhilosophy => "input philosophy",
            ContextField::Labor => "labor profile",
            ContextField::CultivationMethod => "cultivation method",
            ContextField::FarmSize => "farm size",
            ContextField::CropHistory => "crop history",
            ContextField::SoilHandlingHistory => "soil handling history",
            ContextField::SoilCondition => "soil condition",
            ContextField::PlannedMachinery => "planned machinery",
        }
    }
}

/// Per-field provenance plus a weighted completeness score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub fields: Vec<FieldQuality>,
    /// Weighted share of farm-specific data, in [0,1]
    pub completeness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuality {
    pub field: ContextField,
    pub source: DataQualityIndicator,
    pub note: Option<String>,
}

impl QualityReport {
    pub fn from_fields(fields: Vec<FieldQuality>) -> Self {
        let total: f64 = fields.iter().map(|f| f.field.completeness_weight()).sum();
        let achieved: f64 = fields
            .iter()
            .map(|f| f.field.completeness_weight() * f.source.weight())
            .sum();
        let completeness = if total > 0.0 { (achieved / total).clamp(0.0, 1.0) } else { 0.0 };
        Self { fields, completeness }
    }

    pub fn indicator(&self, field: ContextField) -> Option<DataQualityIndicator> {
        self.fields.iter().find(|f| f.field == field).map(|f| f.source)
    }

    /// Fields that were not supplied by the farm
    pub fn fallback_fields(&self) -> impl Iterator<Item = &FieldQuality> {
        self.fields.iter().filter(|f| f.source != DataQualityIndicator::FarmSpecific)
    }
}

/// Fully resolved context read by the analyzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFarmContext {
    pub farm_id: String,
    pub location: Location,
    /// Generalized, non-identifying region (first two code segments)
    pub region_bucket: String,
    pub soil_handling_history: Sourced<Vec<SoilHandlingEvent>>,
    pub water_retention: Sourced<f64>,
    pub flood_risk: Sourced<f64>,
    pub irrigation: Sourced<IrrigationAccess>,
    pub input_philosophy: Sourced<InputPhilosophy>,
    pub labor: Sourced<LaborProfile>,
    pub cultivation_method: Sourced<CultivationMethod>,
    pub farm_size_ha: Sourced<f64>,
    pub crop_history: Sourced<Vec<CropRecord>>,
    /// Crop the assessment is about
    pub primary_crop: String,
    /// Canonical crop pattern, e.g. "cotton+soybean"
    pub crop_pattern: String,
    pub soil_test: Sourced<SoilTest>,
    pub soil_condition: Sourced<SoilCondition>,
    pub planned_machinery: Sourced<Vec<Machinery>>,
}

impl NormalizedFarmContext {
    /// Count of heavy-tillage events in the soil handling history
    pub fn heavy_tillage_events(&self) -> usize {
        self.soil_handling_history
            .value
            .iter()
            .filter(|e| {
                e.practice == SoilPractice::HeavyTillage
                    || e.machinery.map(|m| m.is_heavy()).unwrap_or(false)
            })
            .count()
    }
}

/// Canonical crop pattern: sorted, de-duplicated, lower-case, joined by '+'
pub fn crop_pattern<'a, I>(crops: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<String> = crops
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        "unknown".to_string()
    } else {
        names.join("+")
    }
}

/// Generalized region: first two segments of the code, upper-cased
pub fn region_bucket(region_code: &str) -> String {
    region_code
        .split('-')
        .take(2)
        .map(|s| s.trim().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("-")
}
