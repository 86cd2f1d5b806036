use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use esh_results::*;
use esh_transform::{Framework, PrunedTopology};

fn result(system: &str, costs: f64) -> NormalizedResult {
    NormalizedResult {
        framework: Framework::Oemof,
        system: system.to_string(),
        timeindex: Vec::new(),
        buses: vec!["Powerline".to_string()],
        node_load: BTreeMap::new(),
        node_installed_capacity: BTreeMap::from([("Generator".to_string(), Capacity::Scalar(15.0))]),
        node_original_capacity: BTreeMap::new(),
        node_expansion_costs: BTreeMap::new(),
        node_soc: BTreeMap::new(),
        edge_net_energy_flow: BTreeMap::new(),
        edge_specific_flow_costs: BTreeMap::new(),
        edge_specific_emissions: BTreeMap::new(),
        edge_weight: BTreeMap::new(),
        global_results: GlobalResults {
            costs,
            emissions: 2.0,
            capex: 0.0,
            opex: costs,
        },
        deviations: Vec::new(),
        pruned: PrunedTopology::default(),
        imbalances: Vec::new(),
    }
}

fn manifest(run_id: &str, system_id: &str, hour: u32) -> RunManifest {
    RunManifest {
        run_id: run_id.to_string(),
        system_id: system_id.to_string(),
        framework: Framework::Oemof,
        timestamp: Utc.with_ymd_and_hms(2026, 2, 25, hour, 0, 0).unwrap(),
        solver_version: "v1".to_string(),
        costs: 100.0,
        emissions: 2.0,
    }
}

#[test]
fn save_and_load_run() {
    let temp_dir = std::env::temp_dir().join("esh_results_test");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let store = RunStore::new(temp_dir.clone()).unwrap();
    let saved = result("sys1", 100.0);
    let manifest = RunManifest::for_result("abc123".to_string(), &saved, "v1");

    assert!(!store.has_run("abc123"));
    store.save_run(&manifest, &saved).unwrap();
    assert!(store.has_run("abc123"));

    let loaded_manifest = store.load_manifest("abc123").unwrap();
    assert_eq!(loaded_manifest, manifest);

    let loaded = store.load_result("abc123").unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.node_installed_capacity["Generator"], Capacity::Scalar(15.0));

    store.delete_run("abc123").unwrap();
    assert!(!store.has_run("abc123"));
    assert!(matches!(
        store.load_manifest("abc123"),
        Err(ResultsError::RunNotFound { .. })
    ));
}

#[test]
fn list_runs_by_system() {
    let temp_dir = std::env::temp_dir().join("esh_results_test_list");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let store = RunStore::new(temp_dir.clone()).unwrap();

    store.save_run(&manifest("0b", "sys1", 13), &result("sys1", 1.0)).unwrap();
    store.save_run(&manifest("0a", "sys1", 12), &result("sys1", 1.0)).unwrap();
    store.save_run(&manifest("0c", "sys2", 14), &result("sys2", 1.0)).unwrap();

    let sys1_runs = store.list_runs("sys1").unwrap();
    assert_eq!(sys1_runs.len(), 2);
    assert_eq!(sys1_runs[0].run_id, "0a");

    let sys2_runs = store.list_runs("sys2").unwrap();
    assert_eq!(sys2_runs.len(), 1);
}

#[test]
fn run_ids_are_hashes() {
    let temp_dir = std::env::temp_dir().join("esh_results_test_ids");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let store = RunStore::new(temp_dir).unwrap();
    let err = store.load_manifest("../escape").unwrap_err();
    assert!(matches!(err, ResultsError::InvalidHash(_)));
    assert!(!store.has_run(""));
}

#[test]
fn store_lives_next_to_the_model() {
    let model_dir = std::env::temp_dir().join("esh_results_test_model");
    let _ = std::fs::remove_dir_all(&model_dir);
    std::fs::create_dir_all(&model_dir).unwrap();

    let store = RunStore::for_model(&model_dir.join("system.yaml")).unwrap();
    store.save_run(&manifest("ff", "sys1", 1), &result("sys1", 1.0)).unwrap();
    assert!(model_dir.join(".esh/runs/ff/result.json").exists());
}
