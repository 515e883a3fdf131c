//! Fixed agronomic tables read by the analyzers
//!
//! Crop water needs, manual labor demand per period, cultivation-method
//! multipliers and the machinery × soil-condition compatibility matrix.
//! Unknown crops fall back to the `generic` row.

use crate::context::{CultivationMethod, Machinery, SoilCondition};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWaterProfile {
    /// Seasonal water requirement in mm
    pub water_need_mm: f64,
    /// Yield sensitivity to drought, in [0,1]
    pub drought_sensitivity: f64,
}

const GENERIC_WATER: CropWaterProfile = CropWaterProfile { water_need_mm: 500.0, drought_sensitivity: 0.5 };

pub fn crop_water(crop: &str) -> CropWaterProfile {
    let (need, sensitivity) = match crop {
        "rice" | "paddy" => (1100.0, 0.8),
        "wheat" => (450.0, 0.5),
        "maize" | "corn" => (550.0, 0.6),
        "cotton" => (700.0, 0.6),
        "sorghum" | "jowar" => (400.0, 0.3),
        "millet" | "bajra" | "ragi" => (350.0, 0.25),
        "soybean" => (500.0, 0.55),
        "groundnut" | "peanut" => (500.0, 0.45),
        _ => return GENERIC_WATER,
    };
    CropWaterProfile { water_need_mm: need, drought_sensitivity: sensitivity }
}

/// Field-work periods the labor tables distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPeriod {
    Sowing,
    Weeding,
    Harvest,
}

impl WorkPeriod {
    pub const ALL: [WorkPeriod; 3] = [WorkPeriod::Sowing, WorkPeriod::Weeding, WorkPeriod::Harvest];

    pub fn display_name(&self) -> &'static str {
        match self {
            WorkPeriod::Sowing => "sowing",
            WorkPeriod::Weeding => "weeding",
            WorkPeriod::Harvest => "harvest",
        }
    }

    /// Length of the peak-work window in weeks
    pub fn weeks(&self) -> f64 {
        match self {
            WorkPeriod::Sowing => 3.0,
            WorkPeriod::Weeding => 4.0,
            WorkPeriod::Harvest => 3.0,
        }
    }

    fn index(&self) -> usize {
        match self {
            WorkPeriod::Sowing => 0,
            WorkPeriod::Weeding => 1,
            WorkPeriod::Harvest => 2,
        }
    }
}

/// Manual person-hours per hectare per week, indexed by `WorkPeriod`
fn manual_hours(crop: &str) -> [f64; 3] {
    match crop {
        "rice" | "paddy" => [60.0, 45.0, 70.0],
        "wheat" => [30.0, 20.0, 45.0],
        "maize" | "corn" => [35.0, 30.0, 40.0],
        "cotton" => [35.0, 40.0, 80.0],
        "sorghum" | "jowar" => [25.0, 25.0, 35.0],
        "millet" | "bajra" | "ragi" => [20.0, 20.0, 30.0],
        "soybean" => [30.0, 25.0, 35.0],
        "groundnut" | "peanut" => [35.0, 30.0, 60.0],
        _ => [30.0, 30.0, 40.0],
    }
}

fn method_multiplier(method: CultivationMethod) -> [f64; 3] {
    match method {
        CultivationMethod::Manual => [1.0, 1.0, 1.0],
        CultivationMethod::AnimalDrawn => [0.6, 0.8, 0.9],
        CultivationMethod::Mechanized => [0.25, 0.5, 0.3],
    }
}

/// Person-hours per hectare per week for a crop/method/period
pub fn labor_hours_per_ha(crop: &str, method: CultivationMethod, period: WorkPeriod) -> f64 {
    let i = period.index();
    manual_hours(crop)[i] * method_multiplier(method)[i]
}

/// Next less labor-intensive method, if any
pub fn less_intensive(method: CultivationMethod) -> Option<CultivationMethod> {
    match method {
        CultivationMethod::Manual => Some(CultivationMethod::AnimalDrawn),
        CultivationMethod::AnimalDrawn => Some(CultivationMethod::Mechanized),
        CultivationMethod::Mechanized => None,
    }
}

/// Compatibility of a machine with a soil condition, in [0,1]
pub fn compatibility(machine: Machinery, condition: SoilCondition) -> f64 {
    use SoilCondition::*;
    // Columns: Dry, Moist, Wet, Waterlogged, Compacted
    let row: [f64; 5] = match machine {
        Machinery::HeavyTillage => [0.6, 0.8, 0.15, 0.05, 0.5],
        Machinery::Rotavator => [0.5, 0.85, 0.25, 0.05, 0.4],
        Machinery::PowerTiller => [0.6, 0.9, 0.5, 0.2, 0.5],
        Machinery::SeedDrill => [0.7, 0.9, 0.45, 0.1, 0.45],
        Machinery::CombineHarvester => [0.9, 0.8, 0.35, 0.05, 0.7],
        Machinery::BullockPlough => [0.55, 0.9, 0.65, 0.3, 0.45],
        Machinery::ManualTools => [0.6, 0.95, 0.8, 0.5, 0.5],
    };
    let col = match condition {
        Dry => 0,
        Moist => 1,
        Wet => 2,
        Waterlogged => 3,
        Compacted => 4,
    };
    row[col]
}

/// Known damaging combinations; these alert regardless of score
pub fn is_harmful(machine: Machinery, condition: SoilCondition) -> bool {
    use SoilCondition::*;
    matches!(
        (machine, condition),
        (Machinery::HeavyTillage, Wet | Waterlogged)
            | (Machinery::Rotavator, Wet | Waterlogged)
            | (Machinery::CombineHarvester, Waterlogged)
            | (Machinery::SeedDrill, Waterlogged)
    )
}

/// Machines usable on `condition`, best first, excluding `except`
pub fn compatible_machines(condition: SoilCondition, floor: f64, except: Machinery) -> Vec<(Machinery, f64)> {
    let mut machines: Vec<(Machinery, f64)> = Machinery::ALL
        .iter()
        .copied()
        .filter(|m| *m != except && !is_harmful(*m, condition))
        .map(|m| (m, compatibility(m, condition)))
        .filter(|(_, score)| *score >= floor)
        .collect();
    machines.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    machines
}
