//! Context Validator
//!
//! Structural problems (identity, location) are fatal. Every other gap is
//! filled from the regional profile and recorded in the quality report, so the
//! pipeline degrades instead of aborting.

use tracing::debug;

use super::regional::{RegionalProfile, RegionalProfileSource};
use super::types::*;
use crate::error::ValidationError;

/// Validate and normalize a raw farm context
///
/// `crop_override` is the crop the caller is asking about, if any; it takes
/// precedence over crop history when choosing the primary crop.
pub fn validate(
    raw: &FarmContext,
    regional: &dyn RegionalProfileSource,
    crop_override: Option<&str>,
) -> Result<(NormalizedFarmContext, QualityReport), ValidationError> {
    check_identity(&raw.farm_id)?;
    check_location(&raw.location)?;

    let (profile, fallback) = match regional.profile(&raw.location.region_code) {
        Some(p) => (p, DataQualityIndicator::RegionalFallback),
        None => (regional.global_default(), DataQualityIndicator::Default),
    };

    let mut resolver = Resolver { fallback, fields: Vec::new() };

    let soil_test = resolver.resolve(
        ContextField::SoilTest,
        raw.soil_test.filter(soil_test_in_range),
        raw.soil_test.is_some(),
        profile.soil_test,
    );
    let water_retention = resolver.resolve(
        ContextField::WaterRetention,
        raw.water.retention.filter(|v| is_ratio(*v)),
        raw.water.retention.is_some(),
        profile.water_retention,
    );
    let flood_risk = resolver.resolve(
        ContextField::FloodRisk,
        raw.water.flood_risk.filter(|v| is_ratio(*v)),
        raw.water.flood_risk.is_some(),
        profile.flood_risk,
    );
    let irrigation = resolver.resolve(ContextField::Irrigation, raw.water.irrigation, false, profile.irrigation);
    let input_philosophy = resolver.resolve(
        ContextField::InputPhilosophy,
        raw.input_philosophy,
        false,
        profile.input_philosophy,
    );
    let labor = resolver.resolve(
        ContextField::Labor,
        raw.labor.filter(|l| l.weekly_capacity_hours().is_finite() && l.weekly_capacity_hours() > 0.0),
        raw.labor.is_some(),
        profile.labor,
    );
    let cultivation_method = resolver.resolve(
        ContextField::CultivationMethod,
        raw.cultivation_method,
        false,
        profile.cultivation_method,
    );
    let farm_size_ha = resolver.resolve(
        ContextField::FarmSize,
        raw.farm_size_ha.filter(|v| v.is_finite() && *v > 0.0),
        raw.farm_size_ha.is_some(),
        profile.farm_size_ha,
    );
    let crop_history = resolver.resolve(
        ContextField::CropHistory,
        non_empty(raw.crop_history.clone()),
        false,
        Vec::new(),
    );
    let soil_handling_history = resolver.resolve(
        ContextField::SoilHandlingHistory,
        non_empty(raw.soil_handling_history.clone()),
        false,
        Vec::new(),
    );
    let soil_condition = resolver.resolve(
        ContextField::SoilCondition,
        raw.soil_condition,
        false,
        profile.soil_condition,
    );
    let planned_machinery = resolver.resolve(
        ContextField::PlannedMachinery,
        non_empty(raw.planned_machinery.clone()),
        false,
        profile.typical_machinery.clone(),
    );

    let primary_crop = primary_crop(crop_override, &crop_history.value, &profile);
    let pattern = if crop_history.value.is_empty() {
        crop_pattern([primary_crop.as_str()])
    } else {
        crop_pattern(crop_history.value.iter().map(|c| c.crop.as_str()))
    };

    let quality = QualityReport::from_fields(resolver.fields);
    debug!(
        farm_id = %raw.farm_id,
        completeness = quality.completeness,
        fallbacks = quality.fallback_fields().count(),
        "context validated"
    );

    let normalized = NormalizedFarmContext {
        farm_id: raw.farm_id.trim().to_string(),
        location: raw.location.clone(),
        region_bucket: region_bucket(&raw.location.region_code),
        soil_handling_history,
        water_retention,
        flood_risk,
        irrigation,
        input_philosophy,
        labor,
        cultivation_method,
        farm_size_ha,
        crop_history,
        primary_crop,
        crop_pattern: pattern,
        soil_test,
        soil_condition,
        planned_machinery,
    };

    Ok((normalized, quality))
}

struct Resolver {
    fallback: DataQualityIndicator,
    fields: Vec<FieldQuality>,
}

impl Resolver {
    /// Take the farm value if usable, otherwise the profile value
    ///
    /// `was_supplied` distinguishes "present but out of range" from "missing"
    /// for the quality note.
    fn resolve<T>(&mut self, field: ContextField, farm: Option<T>, was_supplied: bool, fallback: T) -> Sourced<T> {
        match farm {
            Some(value) => {
                self.fields.push(FieldQuality { field, source: DataQualityIndicator::FarmSpecific, note: None });
                Sourced::farm(value)
            }
            None => {
                let note = if was_supplied {
                    format!("{} out of range; using {} value", field.display_name(), self.fallback.as_str())
                } else {
                    format!("{} missing; using {} value", field.display_name(), self.fallback.as_str())
                };
                self.fields.push(FieldQuality { field, source: self.fallback, note: Some(note) });
                Sourced::new(fallback, self.fallback)
            }
        }
    }
}

fn check_identity(farm_id: &str) -> Result<(), ValidationError> {
    let trimmed = farm_id.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    if trimmed.chars().any(|c| c.is_control()) || trimmed.len() > 128 {
        return Err(ValidationError::InvalidIdentity(farm_id.to_string()));
    }
    Ok(())
}

fn check_location(location: &Location) -> Result<(), ValidationError> {
    if !valid_region_code(&location.region_code) {
        return Err(ValidationError::InvalidRegion(location.region_code.clone()));
    }
    let (lat, lon) = (location.latitude, location.longitude);
    if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidCoordinates { latitude: lat, longitude: lon });
    }
    Ok(())
}

/// `CC(-SEG)*`: two ASCII letters, then non-empty alphanumeric segments
fn valid_region_code(code: &str) -> bool {
    let mut segments = code.trim().split('-');
    let country_ok = segments
        .next()
        .map(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .unwrap_or(false);
    country_ok && segments.all(|s| !s.is_empty() && s.chars().all(|ch| ch.is_ascii_alphanumeric()))
}

fn is_ratio(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn soil_test_in_range(t: &SoilTest) -> bool {
    let values = [t.ph, t.organic_carbon_pct, t.nitrogen_kg_ha, t.phosphorus_kg_ha, t.potassium_kg_ha];
    values.iter().all(|v| v.is_finite() && *v >= 0.0) && t.ph <= 14.0 && t.organic_carbon_pct <= 100.0
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn primary_crop(crop_override: Option<&str>, history: &[CropRecord], profile: &RegionalProfile) -> String {
    crop_override
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .or_else(|| history.last().map(|r| r.crop.trim()).filter(|c| !c.is_empty()))
        .unwrap_or(profile.typical_crop.as_str())
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::regional::BuiltinRegionalProfiles;

    fn minimal(region: &str) -> FarmContext {
        FarmContext {
            farm_id: "farm-001".to_string(),
            location: Location { region_code: region.to_string(), latitude: 18.5, longitude: 73.8 },
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

    #[test]
    fn test_missing_fields_use_regional_fallback() {
        let profiles = BuiltinRegionalProfiles::default();
        let (ctx, quality) = validate(&minimal("IN-MH-PUNE"), &profiles, None).unwrap();
        assert_eq!(ctx.soil_test.source, DataQualityIndicator::RegionalFallback);
        assert_eq!(quality.indicator(ContextField::SoilTest), Some(DataQualityIndicator::RegionalFallback));
        assert_eq!(ctx.primary_crop, "cotton");
        assert_eq!(ctx.region_bucket, "IN-MH");
        assert_eq!(quality.fields.len(), ContextField::ALL.len());
    }

    #[test]
    fn test_unknown_region_uses_default() {
        let profiles = BuiltinRegionalProfiles::default();
        let (ctx, quality) = validate(&minimal("BR-SP"), &profiles, None).unwrap();
        assert_eq!(ctx.farm_size_ha.source, DataQualityIndicator::Default);
        assert!(quality.completeness < 0.3);
    }

    #[test]
    fn test_out_of_range_value_is_replaced_and_noted() {
        let profiles = BuiltinRegionalProfiles::default();
        let mut raw = minimal("IN-MH");
        raw.water.retention = Some(1.7);
        let (ctx, quality) = validate(&raw, &profiles, None).unwrap();
        assert_eq!(ctx.water_retention.source, DataQualityIndicator::RegionalFallback);
        let note = quality
            .fields
            .iter()
            .find(|f| f.field == ContextField::WaterRetention)
            .and_then(|f| f.note.clone())
            .unwrap();
        assert!(note.contains("out of range"));
    }

    #[test]
    fn test_structural_failures_are_fatal() {
        let profiles = BuiltinRegionalProfiles::default();

        let mut raw = minimal("IN-MH");
        raw.farm_id = "   ".to_string();
        assert_eq!(validate(&raw, &profiles, None).unwrap_err(), ValidationError::MissingIdentity);

        let raw = minimal("India");
        assert!(matches!(validate(&raw, &profiles, None), Err(ValidationError::InvalidRegion(_))));

        let mut raw = minimal("IN-MH");
        raw.location.latitude = 120.0;
        assert!(matches!(validate(&raw, &profiles, None), Err(ValidationError::InvalidCoordinates { .. })));

        let mut raw = minimal("IN-MH");
        raw.location.longitude = f64::NAN;
        assert!(matches!(validate(&raw, &profiles, None), Err(ValidationError::InvalidCoordinates { .. })));
    }

    #[test]
    fn test_crop_override_and_pattern() {
        let profiles = BuiltinRegionalProfiles::default();
        let mut raw = minimal("IN-MH");
        raw.crop_history = vec![
            CropRecord { season: "2023-kharif".to_string(), crop: "Soybean".to_string() },
            CropRecord { season: "2024-kharif".to_string(), crop: "Cotton".to_string() },
        ];
        let (ctx, _) = validate(&raw, &profiles, None).unwrap();
        assert_eq!(ctx.primary_crop, "cotton");
        assert_eq!(ctx.crop_pattern, "cotton+soybean");

        let (ctx, _) = validate(&raw, &profiles, Some("Sorghum")).unwrap();
        assert_eq!(ctx.primary_crop, "sorghum");
    }

    #[test]
    fn test_full_context_is_complete() {
        let profiles = BuiltinRegionalProfiles::default();
        let mut raw = minimal("IN-MH");
        raw.soil_test = Some(SoilTest {
            ph: 7.0,
            organic_carbon_pct: 0.6,
            nitrogen_kg_ha: 250.0,
            phosphorus_kg_ha: 20.0,
            potassium_kg_ha: 220.0,
            age_days: 30,
        });
        raw.water = WaterBehavior { retention: Some(0.5), flood_risk: Some(0.1), irrigation: Some(IrrigationAccess::None) };
        raw.input_philosophy = Some(InputPhilosophy::Mixed);
        raw.labor = Some(LaborProfile { household_workers: 2, hours_per_worker_week: 40.0, can_hire_labor: false });
        raw.cultivation_method = Some(CultivationMethod::Manual);
        raw.farm_size_ha = Some(1.0);
        raw.crop_history = vec![CropRecord { season: "2024".to_string(), crop: "maize".to_string() }];
        raw.soil_handling_history =
            vec![SoilHandlingEvent { season: "2024".to_string(), practice: SoilPractice::MinimumTillage, machinery: None }];
        raw.soil_condition = Some(SoilCondition::Moist);
        raw.planned_machinery = vec![Machinery::BullockPlough];

        let (_, quality) = validate(&raw, &profiles, None).unwrap();
        assert_eq!(quality.completeness, 1.0);
        assert_eq!(quality.fallback_fields().count(), 0);
    }
}
