//! Scenario comparison through the public interpreter

mod common;

use farm_risk_interpreter::context::{Machinery, SoilCondition};
use farm_risk_interpreter::{AdvisorConfig, RiskInterpreter, RiskLevel, RiskQuery, Scenario};

use common::full_farm;

fn scenario(id: &str, machinery: Machinery, cost: f64) -> Scenario {
    let mut context = full_farm("farm-1");
    context.soil_condition = Some(SoilCondition::Wet);
    context.planned_machinery = vec![machinery];
    Scenario {
        id: id.to_string(),
        description: format!("Prepare the field with {}", machinery.display_name()),
        context,
        implementation_cost: cost,
        time_to_implement_days: 3,
        suitability: 1.0,
    }
}

#[test]
fn test_safer_machinery_ranks_first() {
    let interpreter = RiskInterpreter::new(AdvisorConfig::default()).unwrap();
    let scenarios = vec![
        scenario("tractor", Machinery::HeavyTillage, 50.0),
        scenario("hand", Machinery::ManualTools, 120.0),
    ];

    let ranking = interpreter.compare_scenarios(&scenarios, &RiskQuery::default());
    assert!(ranking.rejected.is_empty());
    assert_eq!(ranking.ranked.len(), 2);

    let best = ranking.best().unwrap();
    assert_eq!(best.scenario_id, "hand");
    assert_eq!(best.rank, 1);
    assert!(best.risk_reduction > 0.0);

    let worst = &ranking.ranked[1];
    assert_eq!(worst.scenario_id, "tractor");
    assert_eq!(worst.level, RiskLevel::High);
    assert!(worst.assessment.safety_override || !worst.assessment.alerts.is_empty());
    assert_eq!(worst.risk_reduction, 0.0);
}

#[test]
fn test_ranking_is_stable_across_runs() {
    let interpreter = RiskInterpreter::new(AdvisorConfig::default()).unwrap();
    let scenarios = vec![
        scenario("drill", Machinery::SeedDrill, 80.0),
        scenario("tractor", Machinery::HeavyTillage, 50.0),
        scenario("hand", Machinery::ManualTools, 120.0),
        scenario("hand-cheap", Machinery::ManualTools, 60.0),
    ];

    let first = interpreter.compare_scenarios(&scenarios, &RiskQuery::default());
    let second = interpreter.compare_scenarios(&scenarios, &RiskQuery::default());
    let ids = |r: &farm_risk_interpreter::ScenarioRanking| {
        r.ranked.iter().map(|s| s.scenario_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));

    // Identical risk, so the cheaper manual option wins the tie
    let order = ids(&first);
    let cheap = order.iter().position(|id| id == "hand-cheap").unwrap();
    let dear = order.iter().position(|id| id == "hand").unwrap();
    assert!(cheap < dear);
    assert_eq!(order.last().map(String::as_str), Some("tractor"));

    for pair in first.ranked.windows(2) {
        assert!(pair[0].level <= pair[1].level);
    }
}

#[test]
fn test_invalid_scenario_is_rejected_not_fatal() {
    let interpreter = RiskInterpreter::new(AdvisorConfig::default()).unwrap();
    let mut broken = scenario("broken", Machinery::ManualTools, 10.0);
    broken.context.location.latitude = 123.0;
    let scenarios = vec![broken, scenario("hand", Machinery::ManualTools, 120.0)];

    let ranking = interpreter.compare_scenarios(&scenarios, &RiskQuery::default());
    assert_eq!(ranking.ranked.len(), 1);
    assert_eq!(ranking.rejected.len(), 1);
    assert_eq!(ranking.rejected[0].scenario_id, "broken");
    assert!(!ranking.rejected[0].reason.is_empty());
}

#[test]
fn test_no_scenarios_gives_empty_ranking() {
    let interpreter = RiskInterpreter::new(AdvisorConfig::default()).unwrap();
    let ranking = interpreter.compare_scenarios(&[], &RiskQuery::default());
    assert!(ranking.best().is_none());
    assert!(ranking.rejected.is_empty());
}
