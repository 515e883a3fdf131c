//! Regional historical defaults
//!
//! Profiles are matched by longest region-code prefix ("IN-MH-PUNE" matches
//! "IN-MH" before "IN"). When nothing matches, the global default applies and
//! filled fields are tagged `default` instead of `regional-fallback`.

use serde::{Deserialize, Serialize};

use super::types::{
    CultivationMethod, InputPhilosophy, IrrigationAccess, LaborProfile, Machinery, SoilCondition, SoilTest,
};

/// Historical defaults for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalProfile {
    pub region_prefix: String,
    pub seasonal_rainfall_mm: f64,
    pub rainfall_sd_mm: f64,
    /// Typical monsoon/rain onset delay relative to the planned season start
    pub onset_delay_days: i32,
    pub soil_test: SoilTest,
    pub water_retention: f64,
    pub flood_risk: f64,
    pub irrigation: IrrigationAccess,
    pub input_philosophy: InputPhilosophy,
    pub labor: LaborProfile,
    pub cultivation_method: CultivationMethod,
    pub farm_size_ha: f64,
    pub typical_crop: String,
    pub soil_condition: SoilCondition,
    pub typical_machinery: Vec<Machinery>,
}

/// Source of regional defaults consulted by the validator and water normals
pub trait RegionalProfileSource: Send + Sync {
    /// Profile for the longest matching prefix of `region_code`
    fn profile(&self, region_code: &str) -> Option<RegionalProfile>;

    /// Profile used when no region matches
    fn global_default(&self) -> RegionalProfile {
        global_default_profile()
    }
}

/// Built-in table of regional profiles
#[derive(Debug, Clone)]
pub struct BuiltinRegionalProfiles {
    profiles: Vec<RegionalProfile>,
}

impl Default for BuiltinRegionalProfiles {
    fn default() -> Self {
        Self { profiles: builtin_profiles() }
    }
}

impl BuiltinRegionalProfiles {
    pub fn new(profiles: Vec<RegionalProfile>) -> Self {
        Self { profiles }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl RegionalProfileSource for BuiltinRegionalProfiles {
    fn profile(&self, region_code: &str) -> Option<RegionalProfile> {
        let code = region_code.trim().to_ascii_uppercase();
        self.profiles
            .iter()
            .filter(|p| prefix_matches(&code, &p.region_prefix))
            .max_by_key(|p| p.region_prefix.len())
            .cloned()
    }
}

/// Segment-aware prefix match: "IN-MH" matches "IN-MH-PUNE" but not "IN-MHX"
fn prefix_matches(code: &str, prefix: &str) -> bool {
    code == prefix || (code.starts_with(prefix) && code[prefix.len()..].starts_with('-'))
}

pub fn global_default_profile() -> RegionalProfile {
    RegionalProfile {
        region_prefix: "*".to_string(),
        seasonal_rainfall_mm: 600.0,
        rainfall_sd_mm: 180.0,
        onset_delay_days: 0,
        soil_test: SoilTest {
            ph: 6.8,
            organic_carbon_pct: 0.5,
            nitrogen_kg_ha: 240.0,
            phosphorus_kg_ha: 18.0,
            potassium_kg_ha: 180.0,
            age_days: 0,
        },
        water_retention: 0.4,
        flood_risk: 0.1,
        irrigation: IrrigationAccess::None,
        input_philosophy: InputPhilosophy::Mixed,
        labor: LaborProfile { household_workers: 2, hours_per_worker_week: 40.0, can_hire_labor: false },
        cultivation_method: CultivationMethod::Manual,
        farm_size_ha: 1.5,
        typical_crop: "maize".to_string(),
        soil_condition: SoilCondition::Moist,
        typical_machinery: vec![Machinery::ManualTools],
    }
}

fn builtin_profiles() -> Vec<RegionalProfile> {
    let base = global_default_profile();
    vec![
        RegionalProfile {
            region_prefix: "IN".to_string(),
            seasonal_rainfall_mm: 850.0,
            rainfall_sd_mm: 220.0,
            onset_delay_days: 7,
            farm_size_ha: 1.1,
            typical_crop: "rice".to_string(),
            typical_machinery: vec![Machinery::BullockPlough],
            cultivation_method: CultivationMethod::AnimalDrawn,
            ..base.clone()
        },
        RegionalProfile {
            region_prefix: "IN-MH".to_string(),
            seasonal_rainfall_mm: 720.0,
            rainfall_sd_mm: 210.0,
            onset_delay_days: 10,
            soil_test: SoilTest {
                ph: 7.8,
                organic_carbon_pct: 0.45,
                nitrogen_kg_ha: 210.0,
                phosphorus_kg_ha: 15.0,
                potassium_kg_ha: 320.0,
                age_days: 0,
            },
            water_retention: 0.55,
            flood_risk: 0.08,
            farm_size_ha: 1.4,
            typical_crop: "cotton".to_string(),
            typical_machinery: vec![Machinery::BullockPlough, Machinery::PowerTiller],
            cultivation_method: CultivationMethod::AnimalDrawn,
            ..base.clone()
        },
        RegionalProfile {
            region_prefix: "IN-PB".to_string(),
            seasonal_rainfall_mm: 520.0,
            rainfall_sd_mm: 140.0,
            onset_delay_days: 3,
            soil_test: SoilTest {
                ph: 8.1,
                organic_carbon_pct: 0.4,
                nitrogen_kg_ha: 190.0,
                phosphorus_kg_ha: 22.0,
                potassium_kg_ha: 160.0,
                age_days: 0,
            },
            water_retention: 0.45,
            flood_risk: 0.12,
            irrigation: IrrigationAccess::Full,
            input_philosophy: InputPhilosophy::Chemical,
            labor: LaborProfile { household_workers: 3, hours_per_worker_week: 45.0, can_hire_labor: true },
            cultivation_method: CultivationMethod::Mechanized,
            farm_size_ha: 3.6,
            typical_crop: "wheat".to_string(),
            typical_machinery: vec![Machinery::HeavyTillage, Machinery::SeedDrill, Machinery::CombineHarvester],
            ..base.clone()
        },
        RegionalProfile {
            region_prefix: "IN-KA".to_string(),
            seasonal_rainfall_mm: 680.0,
            rainfall_sd_mm: 200.0,
            onset_delay_days: 8,
            soil_test: SoilTest {
                ph: 6.2,
                organic_carbon_pct: 0.55,
                nitrogen_kg_ha: 230.0,
                phosphorus_kg_ha: 16.0,
                potassium_kg_ha: 210.0,
                age_days: 0,
            },
            water_retention: 0.35,
            farm_size_ha: 1.2,
            typical_crop: "millet".to_string(),
            typical_machinery: vec![Machinery::BullockPlough],
            cultivation_method: CultivationMethod::AnimalDrawn,
            ..base.clone()
        },
        RegionalProfile {
            region_prefix: "KE".to_string(),
            seasonal_rainfall_mm: 480.0,
            rainfall_sd_mm: 160.0,
            onset_delay_days: 5,
            soil_test: SoilTest {
                ph: 5.6,
                organic_carbon_pct: 0.9,
                nitrogen_kg_ha: 260.0,
                phosphorus_kg_ha: 10.0,
                potassium_kg_ha: 150.0,
                age_days: 0,
            },
            water_retention: 0.5,
            flood_risk: 0.06,
            input_philosophy: InputPhilosophy::Organic,
            farm_size_ha: 0.8,
            typical_crop: "maize".to_string(),
            typical_machinery: vec![Machinery::ManualTools],
            ..base
        },
    ]
}
