//! Capacity expansion read back from native optima.

use esh_core::{ComparisonTolerance, HarmonyConfig};
use esh_results::{NormalizedResult, OemofResultier, compare};
use esh_testkit::{Scenario, WIND_BREAK_EVEN, evaluate, evaluate_all};
use esh_transform::{AdapterOptions, OemofAdapter};
use proptest::prelude::*;

fn installed_wind(result: &NormalizedResult) -> f64 {
    result.node_installed_capacity["Wind"].total()
}

#[test]
fn cheap_expansion_is_taken_in_every_framework() {
    let scenario = Scenario::expansion(10.0).unwrap();
    let results = evaluate_all(&scenario, &AdapterOptions::default(), &HarmonyConfig::default()).unwrap();

    for result in &results {
        assert_eq!(installed_wind(result), 20.0, "{}", result.framework);
        assert_eq!(result.node_original_capacity["Wind"].total(), 5.0);
        assert!((result.node_expansion_costs["Wind"] - 150.0).abs() < 1e-6);
        assert!(
            (result.global_results.capex - 150.0).abs() < 1e-6,
            "{}: capex {}",
            result.framework,
            result.global_results.capex
        );
        assert!(result.global_results.opex.abs() < 1e-9);
    }
    assert!(compare(&results, &ComparisonTolerance::default()).agrees());
}

#[test]
fn expensive_expansion_keeps_the_original_capacity() {
    let scenario = Scenario::expansion(1000.0).unwrap();
    let results = evaluate_all(&scenario, &AdapterOptions::default(), &HarmonyConfig::default()).unwrap();

    for result in &results {
        assert_eq!(installed_wind(result), 5.0, "{}", result.framework);
        assert_eq!(result.node_expansion_costs["Wind"], 0.0);
        assert!(result.global_results.capex.abs() < 1e-6);
        assert!((result.global_results.opex - 15.0 * 30.0 * 5.0).abs() < 1e-6);
    }
    assert!(compare(&results, &ComparisonTolerance::default()).agrees());
}

proptest! {
    #[test]
    fn installed_capacity_never_grows_with_expansion_costs(
        a in 0.0f64..2.0 * WIND_BREAK_EVEN,
        b in 0.0f64..2.0 * WIND_BREAK_EVEN,
    ) {
        let (cheap, dear) = if a <= b { (a, b) } else { (b, a) };
        let config = HarmonyConfig::default();
        let options = AdapterOptions::default();
        let at = |costs: f64| {
            let scenario = Scenario::expansion(costs).unwrap();
            evaluate(&OemofAdapter, &OemofResultier, &scenario, &options, &config).unwrap()
        };
        let (low, high) = (at(cheap), at(dear));

        prop_assert!(installed_wind(&low) >= installed_wind(&high));
        for result in [&low, &high] {
            let original = result.node_original_capacity["Wind"].total();
            prop_assert!(installed_wind(result) >= original);
            if installed_wind(result) == original {
                prop_assert_eq!(result.node_expansion_costs["Wind"], 0.0);
            }
        }
    }
}
