use esh_core::HarmonyConfig;
use esh_model::{EnergySystem, ModelError, NodeKind, SocPolicy, fixtures};
use proptest::prelude::*;
use serde_json::Value;

const MINIMAL_YAML: &str = r#"
uid: minimal
Timeindex:
  start: "2024-01-01T00:00:00"
  periods: 5
Buses:
  - name: Pipeline
    carrier: gas
  - name: Powerline
    carrier: electricity
Source:
  - name: Gas Station
    carrier: gas
    output: Pipeline
    flow cost: 5.0
    Emissions: 0.2
Transformer:
  - name: Generator
    inputs: [Pipeline]
    outputs: [Powerline]
    efficiency:
      Powerline: 0.42
    flow_rates:
      Powerline: {min: 0, max: 15}
Sink:
  - name: Demand
    carrier: electricity
    input: Powerline
    timeseries:
      fix: [10, 10, 10, 10, 10]
Storage:
  - name: Battery
    carrier: electricity
    bus: Powerline
    capacity: {max: 10}
    initial_soc: 0.5
    soc_policy: free
    charge:
      flow_rates: {max: 10}
    discharge:
      flow_rates: {max: 10}
"#;

const MINIMAL_JSON: &str = r#"{
  "uid": "minimal",
  "timeframe": [
    "2024-01-01T00:00:00", "2024-01-01T01:00:00", "2024-01-01T02:00:00",
    "2024-01-01T03:00:00", "2024-01-01T04:00:00"
  ],
  "busses": [
    {"name": "Pipeline", "carrier": "gas"},
    {"name": "Powerline", "carrier": "electricity"}
  ],
  "sources": [
    {"name": "Gas Station", "carrier": "gas", "output": "Pipeline",
     "flow_costs": 5.0, "flow_emissions": 0.2}
  ],
  "transformers": [
    {"name": "Generator", "inputs": ["Pipeline"], "outputs": ["Powerline"],
     "efficiencies": {"Pipeline": 1.0, "Powerline": 0.42},
     "flow_rates": {"Powerline": {"min": 0, "max": 15}}}
  ],
  "sinks": [
    {"name": "Demand", "carrier": "electricity", "input": "Powerline",
     "timeseries": {"min": [10, 10, 10, 10, 10], "max": [10, 10, 10, 10, 10]}}
  ],
  "storages": [
    {"name": "Battery", "carrier": "electricity", "bus": "Powerline",
     "capacity": {"min": 0, "max": 10}, "initial_soc": 0.5,
     "charge": {"flow_rates": {"max": 10}},
     "discharge": {"flow_rates": {"max": 10}}}
  ]
}"#;

fn from_yaml(content: &str) -> Result<EnergySystem, ModelError> {
    let value: Value = serde_yaml::from_str(content).expect("valid yaml");
    EnergySystem::from_external(&value, &HarmonyConfig::default())
}

fn from_json(content: &str) -> Result<EnergySystem, ModelError> {
    let value: Value = serde_json::from_str(content).expect("valid json");
    EnergySystem::from_external(&value, &HarmonyConfig::default())
}

fn same_model(a: &EnergySystem, b: &EnergySystem) {
    assert_eq!(a.timeframe(), b.timeframe());
    assert_eq!(a.nodes().len(), b.nodes().len());
    for node in a.nodes() {
        let other = b.node_by_name(node.name()).expect("node present in both");
        assert_eq!(node.uid, other.uid);
        assert_eq!(node.kind, other.kind);
    }
    assert_eq!(a.flows().len(), b.flows().len());
    for flow in a.flows() {
        let label = a.label(flow);
        let other = b.flow_by_label(&label).expect("flow present in both");
        assert_eq!(flow.bounds, other.bounds, "{label}");
        assert_eq!(flow.costs, other.costs, "{label}");
        assert_eq!(flow.emissions, other.emissions, "{label}");
        assert_eq!(flow.expansion, other.expansion, "{label}");
    }
}

#[test]
fn yaml_and_json_mappings_give_the_same_model() {
    let yaml = from_yaml(MINIMAL_YAML).unwrap();
    let json = from_json(MINIMAL_JSON).unwrap();
    same_model(&yaml, &json);
}

#[test]
fn external_mapping_matches_programmatic_fixture() {
    let yaml = from_yaml(MINIMAL_YAML).unwrap();
    let fixture = fixtures::minimal_example().unwrap();
    same_model(&yaml, &fixture);

    let battery = yaml.node_by_name("Battery").unwrap();
    match &battery.kind {
        NodeKind::Storage(p) => {
            assert_eq!(p.initial_soc, 0.5);
            assert_eq!(p.soc_policy, SocPolicy::Free);
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn inverted_bounds_are_rejected_at_construction() {
    let broken = MINIMAL_JSON.replace(r#"{"min": 0, "max": 15}"#, r#"{"min": 20, "max": 15}"#);
    let err = from_json(&broken).unwrap_err();
    assert!(matches!(err, ModelError::Mapping(_)));
}

#[test]
fn dangling_flow_reference_is_a_schema_error() {
    let broken = MINIMAL_JSON.replace(r#""input": "Powerline""#, r#""input": "Nowhere""#);
    let err = from_json(&broken).unwrap_err();
    assert!(matches!(err, ModelError::Schema { .. }));
}

#[test]
fn duplicate_names_are_rejected() {
    let broken = MINIMAL_JSON.replace(r#""name": "Demand""#, r#""name": "Battery""#);
    let err = from_json(&broken).unwrap_err();
    assert!(matches!(err, ModelError::DuplicateUid { .. }));
}

#[test]
fn short_timeseries_is_rejected() {
    let broken = MINIMAL_YAML.replace("fix: [10, 10, 10, 10, 10]", "fix: [10, 10]");
    let err = from_yaml(&broken).unwrap_err();
    assert!(matches!(
        err,
        ModelError::TimeseriesLength {
            expected: 5,
            actual: 2,
            ..
        }
    ));
}

proptest! {
    #[test]
    fn bounds_accept_exactly_ordered_non_negative_pairs(min in -10.0f64..10.0, max in -10.0f64..10.0) {
        let result = esh_model::Bounds::new(min, max);
        prop_assert_eq!(result.is_ok(), min >= 0.0 && max >= min);
    }
}
