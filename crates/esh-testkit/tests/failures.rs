//! Normalization refuses incomplete or inconsistent native results.

use esh_core::HarmonyConfig;
use esh_results::{
    CalliopeResultier, FineResultier, NormalizeError, OemofResultier, PypsaResultier, Resultier,
};
use esh_testkit::{Scenario, scripted};
use esh_transform::{
    Adapter, AdapterOptions, CalliopeAdapter, ConnectorPolicy, FineAdapter, Framework, OemofAdapter,
    PypsaAdapter, TransformError,
};

fn options() -> AdapterOptions {
    AdapterOptions::default()
}

#[test]
fn infeasible_termination_is_reported() {
    let scenario = Scenario::minimal().unwrap();
    let config = HarmonyConfig::default();
    let transformation = PypsaAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    native.output.termination_condition = "infeasible".to_string();

    let err = PypsaResultier.normalize(&native, &scenario.system, &config).unwrap_err();
    assert!(matches!(
        err,
        NormalizeError::Infeasible { framework: Framework::Pypsa, ref status } if status == "infeasible"
    ));
}

#[test]
fn foreign_currency_is_a_unit_error() {
    let scenario = Scenario::minimal().unwrap();
    let config = HarmonyConfig::default();
    let transformation = FineAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    native.output.cost_unit = "1e6 USD".to_string();

    let err = FineResultier.normalize(&native, &scenario.system, &config).unwrap_err();
    assert!(matches!(err, NormalizeError::UnitConsistency { framework: Framework::Fine, .. }));
}

#[test]
fn unknown_power_unit_is_a_unit_error() {
    let scenario = Scenario::chp().unwrap();
    let config = HarmonyConfig::default();
    let transformation = CalliopeAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    native.output.units.power = "furlongs".to_string();

    let err = CalliopeResultier.normalize(&native, &scenario.system, &config).unwrap_err();
    assert!(matches!(
        err,
        NormalizeError::UnitConsistency { ref unit, .. } if unit == "furlongs"
    ));
}

#[test]
fn kilowatt_results_normalize_to_declared_units() {
    let scenario = Scenario::chp().unwrap();
    let config = HarmonyConfig::default();
    let transformation = CalliopeAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    let reference = CalliopeResultier.normalize(&native, &scenario.system, &config).unwrap();

    let mut rescaled = native.clone();
    rescaled.output.units.power = "kW".to_string();
    for series in rescaled
        .output
        .carrier_prod
        .values_mut()
        .chain(rescaled.output.carrier_con.values_mut())
    {
        series.iter_mut().for_each(|v| *v *= 1000.0);
    }
    rescaled.output.energy_cap.values_mut().for_each(|v| *v *= 1000.0);
    let result = CalliopeResultier.normalize(&rescaled, &scenario.system, &config).unwrap();

    for (node, table) in &reference.node_load {
        for (counterpart, expected) in table.columns() {
            let actual = result.load(node, counterpart).unwrap();
            for (a, e) in actual.iter().zip(expected) {
                assert!((a - e).abs() < 1e-9, "{node}/{counterpart}: {a} vs {e}");
            }
        }
    }
    assert!((result.global_results.costs - reference.global_results.costs).abs() < 1e-9);
}

#[test]
fn missing_flow_series_is_reported() {
    let scenario = Scenario::minimal().unwrap();
    let config = HarmonyConfig::default();
    let transformation = OemofAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    native
        .output
        .flows
        .retain(|f| !(f.from == "Powerline" && f.to == "Demand"));

    let err = OemofResultier.normalize(&native, &scenario.system, &config).unwrap_err();
    assert!(matches!(err, NormalizeError::MissingSeries { ref uid } if uid == "Powerline->Demand"));
}

#[test]
fn truncated_series_is_a_shape_error() {
    let scenario = Scenario::minimal().unwrap();
    let config = HarmonyConfig::default();
    let transformation = OemofAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    let demand = native
        .output
        .flows
        .iter_mut()
        .find(|f| f.from == "Powerline" && f.to == "Demand")
        .unwrap();
    demand.values.truncate(3);

    let err = OemofResultier.normalize(&native, &scenario.system, &config).unwrap_err();
    assert!(matches!(err, NormalizeError::Shape { expected: 5, actual: 3, .. }));
}

#[test]
fn imbalanced_buses_are_recorded_on_the_result() {
    let scenario = Scenario::minimal().unwrap();
    let config = HarmonyConfig::default();
    let transformation = OemofAdapter.transform(&scenario.system, &options(), &config).unwrap();
    let mut native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    let demand = native
        .output
        .flows
        .iter_mut()
        .find(|f| f.from == "Powerline" && f.to == "Demand")
        .unwrap();
    demand.values.iter_mut().for_each(|v| *v *= 2.0);

    let result = OemofResultier.normalize(&native, &scenario.system, &config).unwrap();
    assert!(!result.is_balanced());
    assert_eq!(result.imbalances.len(), scenario.system.timeframe().len());
    assert!(result.imbalances.iter().all(|v| v.bus == "Powerline"));
    assert!(result.imbalances.iter().all(|v| (v.imbalance.abs() - 10.0).abs() < 1e-9));
}

#[test]
fn rejected_connectors_fail_only_without_native_links() {
    let scenario = Scenario::connector().unwrap();
    let config = HarmonyConfig::default();
    let reject = AdapterOptions {
        connector_policy: ConnectorPolicy::Reject,
        ..AdapterOptions::default()
    };

    assert!(OemofAdapter.transform(&scenario.system, &reject, &config).is_ok());
    assert!(PypsaAdapter.transform(&scenario.system, &reject, &config).is_ok());
    for err in [
        FineAdapter.transform(&scenario.system, &reject, &config).map(|_| ()).unwrap_err(),
        CalliopeAdapter.transform(&scenario.system, &reject, &config).map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(
            err,
            TransformError::UnsupportedComponent { ref uid, .. } if uid == "Tie"
        ));
    }
}
