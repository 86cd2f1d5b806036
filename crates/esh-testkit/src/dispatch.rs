//! Canonical operation of a system: flow series, storage levels and
//! optimized capacities.

use std::collections::BTreeMap;

use esh_model::{EdgeLabel, EnergySystem, Flow, NodeKind};
use esh_transform::shared::synth::one_way_name;
use serde::{Deserialize, Serialize};

/// Flows without an entry carry zero at every step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    steps: usize,
    flows: BTreeMap<EdgeLabel, Vec<f64>>,
    soc: BTreeMap<String, Vec<f64>>,
    installed: BTreeMap<EdgeLabel, f64>,
    storage_installed: BTreeMap<String, f64>,
}

impl Dispatch {
    pub fn for_system(system: &EnergySystem) -> Self {
        Self {
            steps: system.timeframe().len(),
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, from: &str, to: &str, values: Vec<f64>) -> Self {
        self.flows.insert(EdgeLabel::new(from, to), values);
        self
    }

    /// Same value at every step.
    pub fn with_constant(self, from: &str, to: &str, value: f64) -> Self {
        let steps = self.steps;
        self.with_flow(from, to, vec![value; steps])
    }

    pub fn with_soc(mut self, storage: &str, values: Vec<f64>) -> Self {
        self.soc.insert(storage.to_string(), values);
        self
    }

    /// Optimized capacity of an expandable flow.
    pub fn with_installed(mut self, from: &str, to: &str, capacity: f64) -> Self {
        self.installed.insert(EdgeLabel::new(from, to), capacity);
        self
    }

    pub fn with_storage_installed(mut self, storage: &str, capacity: f64) -> Self {
        self.storage_installed.insert(storage.to_string(), capacity);
        self
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn zeros(&self) -> Vec<f64> {
        vec![0.0; self.steps]
    }

    pub fn flow(&self, system: &EnergySystem, flow: &Flow) -> Vec<f64> {
        self.flows
            .get(&system.label(flow))
            .cloned()
            .unwrap_or_else(|| self.zeros())
    }

    pub fn between(&self, from: &str, to: &str) -> Vec<f64> {
        self.flows
            .get(&EdgeLabel::new(from, to))
            .cloned()
            .unwrap_or_else(|| self.zeros())
    }

    pub fn soc(&self, storage: &str) -> Vec<f64> {
        self.soc.get(storage).cloned().unwrap_or_else(|| self.zeros())
    }

    pub fn installed(&self, system: &EnergySystem, flow: &Flow) -> Option<f64> {
        self.installed.get(&system.label(flow)).copied()
    }

    pub fn storage_installed(&self, storage: &str) -> Option<f64> {
        self.storage_installed.get(storage).copied()
    }
}

pub(crate) fn peak(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

pub(crate) fn total(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Canonical flows of the conversion called `name`: a transformer or CHP
/// node, or one direction of a connector.
pub(crate) fn conversion_flows<'a>(system: &'a EnergySystem, name: &str) -> Vec<&'a Flow> {
    if let Some(node) = system.node_by_name(name) {
        return system.inflows(node.id).chain(system.outflows(node.id)).collect();
    }
    for (node, _) in system.connectors() {
        for input in system.inflows(node.id) {
            let from = system.name_of(input.from);
            if let Some(output) = system.outflows(node.id).find(|f| system.name_of(f.to) != from)
                && one_way_name(node.name(), from, system.name_of(output.to)) == name
            {
                return vec![input, output];
            }
        }
    }
    Vec::new()
}

/// The single inflow and outflow of a storage node.
pub(crate) fn storage_flows<'a>(system: &'a EnergySystem, name: &str) -> (Option<&'a Flow>, Option<&'a Flow>) {
    match system.node_by_name(name) {
        Some(node) if matches!(node.kind, NodeKind::Storage(_)) => {
            (system.inflows(node.id).next(), system.outflows(node.id).next())
        }
        _ => (None, None),
    }
}

pub(crate) fn endpoint<'a>(system: &'a EnergySystem, name: &str) -> Option<&'a Flow> {
    system.node_by_name(name).and_then(|n| system.endpoint_flow(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    #[test]
    fn unscripted_flows_are_zero() {
        let system = fixtures::minimal_example().unwrap();
        let dispatch = Dispatch::for_system(&system).with_constant("Powerline", "Demand", 10.0);
        assert_eq!(dispatch.between("Powerline", "Demand"), vec![10.0; 5]);
        let charge = system.flow_between("Powerline", "Battery").unwrap();
        assert_eq!(dispatch.flow(&system, charge), vec![0.0; 5]);
    }

    #[test]
    fn connector_directions_resolve_to_canonical_flows() {
        let system = fixtures::connector_example().unwrap();
        let legs = conversion_flows(&system, "Tie (South to North)");
        let labels: Vec<String> = legs.iter().map(|f| system.label(f).to_string()).collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(legs[0].id, system.flow_between("South", "Tie").unwrap().id);
        assert_eq!(legs[1].id, system.flow_between("Tie", "North").unwrap().id);
        assert!(conversion_flows(&system, "Tie (East to West)").is_empty());
    }
}
