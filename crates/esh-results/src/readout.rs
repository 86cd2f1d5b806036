//! Framework-independent assembly of a `NormalizedResult`.
//!
//! Each resultier maps its native output back onto canonical edges and
//! storages as a `Readout`; `compose` derives every collection from it so
//! all frameworks produce results of identical shape.

use std::collections::BTreeMap;

use esh_core::{EdgeId, NodeId};
use esh_model::{EnergySystem, Flow, NodeKind};
use esh_transform::{Deviation, Framework, PrunedTopology};
use tracing::debug;

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::{Capacity, GlobalResults, LoadTable, NormalizedResult};

/// Native results expressed on the canonical model, in declared units.
#[derive(Clone, Debug, Default)]
pub(crate) struct Readout {
    /// MW per timestep.
    pub flows: BTreeMap<EdgeId, Vec<f64>>,
    /// Optimized capacity of expandable flows.
    pub installed: BTreeMap<EdgeId, f64>,
    /// Optimized energy capacity of expandable storages.
    pub storage_installed: BTreeMap<NodeId, f64>,
    pub soc: BTreeMap<NodeId, Vec<f64>>,
    /// Native specific values mapped back one-to-one.
    pub specific_costs: BTreeMap<EdgeId, f64>,
    pub specific_emissions: BTreeMap<EdgeId, f64>,
    pub opex: f64,
    pub capex: f64,
    pub emissions: f64,
}

impl Readout {
    pub fn set_flow(&mut self, system: &EnergySystem, flow: &Flow, values: Vec<f64>) -> NormalizeResult<()> {
        check_len(system, &system.label(flow).to_string(), &values)?;
        self.flows.insert(flow.id, values);
        Ok(())
    }

    pub fn set_soc(&mut self, system: &EnergySystem, node: NodeId, values: Vec<f64>) -> NormalizeResult<()> {
        check_len(system, system.name_of(node), &values)?;
        self.soc.insert(node, values);
        Ok(())
    }
}

pub(crate) fn check_len(system: &EnergySystem, uid: &str, values: &[f64]) -> NormalizeResult<()> {
    let expected = system.timeframe().len();
    if values.len() != expected {
        return Err(NormalizeError::Shape {
            uid: uid.to_string(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// The endpoint of `flow` that is not a bus.
fn component_of(system: &EnergySystem, flow: &Flow) -> NodeId {
    match system.node(flow.from) {
        Some(node) if node.is_bus() => flow.to,
        _ => flow.from,
    }
}

fn peak(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// Mean of specific cost and specific emission, each normalized by its
/// maximum, floored at 0.1.
pub fn edge_weight(costs: f64, emissions: f64, max_costs: f64, max_emissions: f64) -> f64 {
    let scaled = |v: f64, max: f64| if max > 0.0 { v / max } else { 0.0 };
    let mean = 0.5 * (scaled(costs, max_costs) + scaled(emissions, max_emissions));
    mean.max(0.1)
}

pub(crate) fn compose(
    system: &EnergySystem,
    framework: Framework,
    deviations: &[Deviation],
    pruned: &PrunedTopology,
    readout: Readout,
) -> NormalizeResult<NormalizedResult> {
    let n = system.timeframe().len();
    let hours = system.timeframe().step_hours();

    let mut flows: BTreeMap<EdgeId, Vec<f64>> = BTreeMap::new();
    for flow in system.flows() {
        let label = system.label(flow);
        let values = match readout.flows.get(&flow.id) {
            Some(values) => values.clone(),
            None if pruned.contains_edge(&label) => vec![0.0; n],
            None => return Err(NormalizeError::missing(label.to_string())),
        };
        flows.insert(flow.id, values);
    }
    let series = |flow: &Flow| flows.get(&flow.id).map(Vec::as_slice).unwrap_or_default();

    let mut node_load = BTreeMap::new();
    for node in system.nodes() {
        let mut table = LoadTable::default();
        for flow in system.outflows(node.id) {
            table.add(system.name_of(flow.to), 1.0, series(flow));
        }
        for flow in system.inflows(node.id) {
            table.add(system.name_of(flow.from), -1.0, series(flow));
        }
        node_load.insert(node.name().to_string(), table);
    }

    let original = |flow: &Flow| {
        if flow.bounds.is_bounded() {
            flow.bounds.max()
        } else {
            peak(series(flow))
        }
    };
    let installed = |flow: &Flow| readout.installed.get(&flow.id).copied().unwrap_or_else(|| original(flow));

    let mut node_installed_capacity = BTreeMap::new();
    let mut node_original_capacity = BTreeMap::new();
    let mut node_soc = BTreeMap::new();
    let mut node_expansion_costs: BTreeMap<String, f64> = BTreeMap::new();
    for node in system.nodes() {
        let name = node.name().to_string();
        let by_output = |measure: &dyn Fn(&Flow) -> f64| {
            let outputs: Vec<&Flow> = system.outflows(node.id).collect();
            match outputs.as_slice() {
                [single] => Capacity::Scalar(measure(single)),
                many => Capacity::PerCarrier(
                    many.iter()
                        .map(|f| (system.name_of(f.to).to_string(), measure(f)))
                        .collect(),
                ),
            }
        };
        let capacities = match &node.kind {
            NodeKind::Bus => None,
            NodeKind::Source(_) | NodeKind::Sink(_) => system
                .endpoint_flow(node)
                .map(|f| (Capacity::Scalar(installed(f)), Capacity::Scalar(original(f)))),
            NodeKind::Transformer(_) | NodeKind::Chp(_) | NodeKind::Connector(_) => {
                Some((by_output(&installed), by_output(&original)))
            }
            NodeKind::Storage(params) => {
                let capacity = params.capacity.max();
                let optimized = readout.storage_installed.get(&node.id).copied().unwrap_or(capacity);
                if let Some(x) = params.expansion {
                    *node_expansion_costs.entry(name.clone()).or_default() += (optimized - capacity) * x.costs();
                }
                let soc = match readout.soc.get(&node.id) {
                    Some(soc) => soc.clone(),
                    None if pruned.contains_node(node.name()) => vec![0.0; n],
                    None => return Err(NormalizeError::missing(node.name())),
                };
                node_soc.insert(name.clone(), soc);
                Some((Capacity::Scalar(optimized), Capacity::Scalar(capacity)))
            }
        };
        if let Some((inst, orig)) = capacities {
            node_installed_capacity.insert(name.clone(), inst);
            node_original_capacity.insert(name.clone(), orig);
            node_expansion_costs.entry(name).or_default();
        }
    }
    for flow in system.flows() {
        if let Some(x) = flow.expansion {
            let added = installed(flow) - flow.original_capacity();
            let node = system.name_of(component_of(system, flow)).to_string();
            *node_expansion_costs.entry(node).or_default() += added * x.costs();
        }
    }

    let specific_costs = |f: &Flow| readout.specific_costs.get(&f.id).copied().unwrap_or(f.costs);
    let specific_emissions = |f: &Flow| readout.specific_emissions.get(&f.id).copied().unwrap_or(f.emissions);
    let max_costs = system.flows().iter().map(specific_costs).fold(0.0, f64::max);
    let max_emissions = system.flows().iter().map(specific_emissions).fold(0.0, f64::max);

    let mut edge_net_energy_flow = BTreeMap::new();
    let mut edge_specific_flow_costs = BTreeMap::new();
    let mut edge_specific_emissions = BTreeMap::new();
    let mut edge_weight_map = BTreeMap::new();
    for flow in system.flows() {
        let label = system.label(flow);
        let (c, e) = (specific_costs(flow), specific_emissions(flow));
        edge_net_energy_flow.insert(label.clone(), series(flow).iter().sum::<f64>() * hours);
        edge_specific_flow_costs.insert(label.clone(), c);
        edge_specific_emissions.insert(label.clone(), e);
        edge_weight_map.insert(label, edge_weight(c, e, max_costs, max_emissions));
    }

    let global_results = GlobalResults {
        costs: readout.opex + readout.capex,
        emissions: readout.emissions,
        capex: readout.capex,
        opex: readout.opex,
    };
    debug!(
        framework = %framework,
        costs = global_results.costs,
        emissions = global_results.emissions,
        "composed normalized result"
    );

    Ok(NormalizedResult {
        framework,
        system: system.uid().to_string(),
        timeindex: system.timeframe().steps().to_vec(),
        buses: system.buses().map(|b| b.name().to_string()).collect(),
        node_load,
        node_installed_capacity,
        node_original_capacity,
        node_expansion_costs,
        node_soc,
        edge_net_energy_flow,
        edge_specific_flow_costs,
        edge_specific_emissions,
        edge_weight: edge_weight_map,
        global_results,
        deviations: deviations.to_vec(),
        pruned: pruned.clone(),
        imbalances: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::{EdgeLabel, fixtures};
    use proptest::prelude::*;

    fn minimal_readout(system: &EnergySystem) -> Readout {
        let mut r = Readout::default();
        let gen_out = [10.0, 10.0, 5.0, 10.0, 10.0];
        let set = |r: &mut Readout, from: &str, to: &str, v: Vec<f64>| {
            let flow = system.flow_between(from, to).unwrap();
            r.set_flow(system, flow, v).unwrap();
        };
        set(&mut r, "Gas Station", "Pipeline", gen_out.iter().map(|v| v / 0.42).collect());
        set(&mut r, "Pipeline", "Generator", gen_out.iter().map(|v| v / 0.42).collect());
        set(&mut r, "Generator", "Powerline", gen_out.to_vec());
        set(&mut r, "Powerline", "Demand", vec![10.0; 5]);
        set(&mut r, "Powerline", "Battery", vec![0.0; 5]);
        set(&mut r, "Battery", "Powerline", vec![0.0, 0.0, 5.0, 0.0, 0.0]);
        let battery = system.node_by_name("Battery").unwrap().id;
        r.set_soc(system, battery, vec![5.0, 5.0, 0.0, 0.0, 0.0]).unwrap();
        r
    }

    #[test]
    fn loads_are_signed_and_buses_balance() {
        let system = fixtures::minimal_example().unwrap();
        let result = compose(
            &system,
            Framework::Oemof,
            &[],
            &PrunedTopology::default(),
            minimal_readout(&system),
        )
        .unwrap();
        assert_eq!(result.load("Powerline", "Demand"), Some(&[10.0; 5][..]));
        assert_eq!(result.load("Powerline", "Generator").unwrap()[0], -10.0);
        assert_eq!(result.load("Powerline", "Battery").unwrap()[2], -5.0);
        assert!(result.conservation_violations(Default::default()).is_empty());
        assert_eq!(result.node_installed_capacity["Generator"], Capacity::Scalar(15.0));
        // unbounded flows report their peak
        assert_eq!(result.node_original_capacity["Demand"], Capacity::Scalar(10.0));
        assert_eq!(result.node_expansion_costs["Battery"], 0.0);
        assert_eq!(result.edge_net_energy_flow[&EdgeLabel::new("Powerline", "Demand")], 50.0);
    }

    #[test]
    fn missing_live_series_fails() {
        let system = fixtures::minimal_example().unwrap();
        let mut readout = minimal_readout(&system);
        let demand = system.flow_between("Powerline", "Demand").unwrap();
        readout.flows.remove(&demand.id);
        let err = compose(&system, Framework::Fine, &[], &PrunedTopology::default(), readout)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MissingSeries { ref uid } if uid == "Powerline->Demand"));
    }

    #[test]
    fn short_series_is_a_shape_error() {
        let system = fixtures::minimal_example().unwrap();
        let flow = system.flow_between("Powerline", "Demand").unwrap();
        let err = Readout::default().set_flow(&system, flow, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, NormalizeError::Shape { expected: 5, actual: 3, .. }));
    }

    proptest! {
        #[test]
        fn edge_weight_is_floored_and_bounded(
            c in 0.0..100.0f64,
            e in 0.0..10.0f64,
            extra_c in 0.0..100.0f64,
            extra_e in 0.0..10.0f64,
        ) {
            let w = edge_weight(c, e, c + extra_c, e + extra_e);
            prop_assert!(w >= 0.1);
            prop_assert!(w <= 1.0);
        }
    }
}
