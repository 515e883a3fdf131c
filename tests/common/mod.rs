//! Shared fixtures for the integration suites

#![allow(dead_code)]

use farm_risk_interpreter::cohort::CohortSourceRecord;
use farm_risk_interpreter::context::{
    CropRecord, CultivationMethod, InputPhilosophy, IrrigationAccess, LaborProfile, Location, Machinery,
    SoilCondition, SoilHandlingEvent, SoilPractice, SoilTest, WaterBehavior,
};
use farm_risk_interpreter::FarmContext;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

pub const REGIONS: [&str; 4] = ["IN-MH-PUNE", "IN-PB-LDH", "KE-NKU", "IN-UP-AGR"];
const CROPS: [&str; 5] = ["cotton", "wheat", "maize", "soybean", "millet"];

/// Minimal context: identity and location only
pub fn bare_farm(farm_id: &str) -> FarmContext {
    FarmContext {
        farm_id: farm_id.to_string(),
        location: Location { region_code: "IN-MH-PUNE".to_string(), latitude: 18.52, longitude: 73.85 },
        soil_handling_history: Vec::new(),
        water: WaterBehavior::default(),
        input_philosophy: None,
        labor: None,
        cultivation_method: None,
        farm_size_ha: None,
        crop_history: Vec::new(),
        soil_test: None,
        soil_condition: None,
        planned_machinery: Vec::new(),
    }
}

/// Context with every optional field supplied
pub fn full_farm(farm_id: &str) -> FarmContext {
    FarmContext {
        water: WaterBehavior { retention: Some(0.5), flood_risk: Some(0.05), irrigation: Some(IrrigationAccess::None) },
        input_philosophy: Some(InputPhilosophy::Mixed),
        labor: Some(LaborProfile { household_workers: 3, hours_per_worker_week: 40.0, can_hire_labor: false }),
        cultivation_method: Some(CultivationMethod::AnimalDrawn),
        farm_size_ha: Some(1.5),
        crop_history: vec![CropRecord { season: "kharif-2024".to_string(), crop: "cotton".to_string() }],
        soil_test: Some(SoilTest {
            ph: 7.2,
            organic_carbon_pct: 0.6,
            nitrogen_kg_ha: 240.0,
            phosphorus_kg_ha: 18.0,
            potassium_kg_ha: 300.0,
            age_days: 120,
        }),
        soil_condition: Some(SoilCondition::Moist),
        planned_machinery: vec![Machinery::BullockPlough],
        ..bare_farm(farm_id)
    }
}

/// Fully specified random context; soil tests are always under a year old
pub fn random_farm(rng: &mut StdRng, idx: usize) -> FarmContext {
    let region = REGIONS.choose(rng).copied().unwrap_or("IN-MH-PUNE");
    let crop = CROPS.choose(rng).copied().unwrap_or("cotton");
    let conditions = [
        SoilCondition::Dry,
        SoilCondition::Moist,
        SoilCondition::Wet,
        SoilCondition::Waterlogged,
        SoilCondition::Compacted,
    ];
    let methods = [CultivationMethod::Manual, CultivationMethod::AnimalDrawn, CultivationMethod::Mechanized];
    let irrigation = [IrrigationAccess::None, IrrigationAccess::Partial, IrrigationAccess::Full];
    let philosophies = [InputPhilosophy::Chemical, InputPhilosophy::Organic, InputPhilosophy::Mixed];

    let machine_count = rng.gen_range(1..=3);
    let machines: Vec<Machinery> = Machinery::ALL.choose_multiple(rng, machine_count).copied().collect();
    let history: Vec<SoilHandlingEvent> = (0..rng.gen_range(0..4))
        .map(|i| SoilHandlingEvent {
            season: format!("season-{}", i),
            practice: if rng.gen_bool(0.5) { SoilPractice::HeavyTillage } else { SoilPractice::MinimumTillage },
            machinery: None,
        })
        .collect();

    FarmContext {
        farm_id: format!("farm-{:04}", idx),
        location: Location {
            region_code: region.to_string(),
            latitude: rng.gen_range(-60.0..60.0),
            longitude: rng.gen_range(-170.0..170.0),
        },
        soil_handling_history: history,
        water: WaterBehavior {
            retention: Some(rng.gen_range(0.0..1.0)),
            flood_risk: Some(rng.gen_range(0.0..0.6)),
            irrigation: irrigation.choose(rng).copied(),
        },
        input_philosophy: philosophies.choose(rng).copied(),
        labor: Some(LaborProfile {
            household_workers: rng.gen_range(1..6),
            hours_per_worker_week: rng.gen_range(10.0..60.0),
            can_hire_labor: rng.gen_bool(0.5),
        }),
        cultivation_method: methods.choose(rng).copied(),
        farm_size_ha: Some(rng.gen_range(0.2..8.0)),
        crop_history: vec![CropRecord { season: "last".to_string(), crop: crop.to_string() }],
        soil_test: Some(SoilTest {
            ph: rng.gen_range(4.5..9.0),
            organic_carbon_pct: rng.gen_range(0.1..1.5),
            nitrogen_kg_ha: rng.gen_range(50.0..400.0),
            phosphorus_kg_ha: rng.gen_range(2.0..40.0),
            potassium_kg_ha: rng.gen_range(50.0..400.0),
            age_days: rng.gen_range(0..365),
        }),
        soil_condition: conditions.choose(rng).copied(),
        planned_machinery: machines,
    }
}

pub fn cohort_record(region: &str, crop: &str, philosophy: InputPhilosophy, outcome: &str) -> CohortSourceRecord {
    CohortSourceRecord {
        farm_id: Some(format!("{}-{}-{}", region, crop, outcome)),
        region_code: region.to_string(),
        crops: vec![crop.to_string()],
        input_philosophy: philosophy,
        farm_size_ha: 1.5,
        yield_index: if outcome == "good" { 1.1 } else { 0.6 },
        outcome: outcome.to_string(),
        practices: if outcome == "good" { vec!["mulching".to_string()] } else { Vec::new() },
    }
}

/// Twelve cotton farms around Pune with mixed outcomes
pub fn pune_cotton_records() -> Vec<CohortSourceRecord> {
    (0..12)
        .map(|i| {
            let outcome = if i % 3 == 0 { "loss" } else { "good" };
            cohort_record("IN-MH-PUNE", "cotton", InputPhilosophy::Mixed, outcome)
        })
        .collect()
}
