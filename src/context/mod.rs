//! Farm context: raw input types, regional defaults and the validator

pub mod types;
pub mod regional;
pub mod validator;

pub use types::{
    crop_pattern, region_bucket, ContextField, CropRecord, CultivationMethod, DataQualityIndicator, FarmContext,
    FieldQuality, InputPhilosophy, IrrigationAccess, LaborProfile, Location, Machinery, NormalizedFarmContext,
    QualityReport, SoilCondition, SoilHandlingEvent, SoilPractice, SoilTest, Sourced, WaterBehavior,
};
pub use regional::{BuiltinRegionalProfiles, RegionalProfile, RegionalProfileSource};
pub use validator::validate;
