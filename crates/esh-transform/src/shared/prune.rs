//! Removal of chains that can never carry energy.
//!
//! A flow is dead when its upper limit is zero and it cannot be expanded,
//! or when it leaves a source whose profile is zero at every step. Death
//! propagates: a conversion with one dead flow cannot operate at all, a bus
//! whose inflows are all dead cannot feed anything and vice versa. Flows
//! into sinks with a positive minimum are never removed, so an infeasible
//! demand stays visible to the solver.

use std::collections::BTreeSet;

use esh_core::{EdgeId, NodeId};
use esh_model::{EdgeLabel, EnergySystem, NodeKind};
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

/// Names of removed nodes and labels of removed edges.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrunedTopology {
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeLabel>,
}

impl PrunedTopology {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n == name)
    }

    pub fn contains_edge(&self, label: &EdgeLabel) -> bool {
        self.edges.contains(label)
    }
}

/// Internal result of a pruning pass, by id.
#[derive(Clone, Debug, Default)]
pub(crate) struct DeadSet {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl DeadSet {
    pub fn topology(&self, system: &EnergySystem) -> PrunedTopology {
        PrunedTopology {
            nodes: self
                .nodes
                .iter()
                .map(|id| system.name_of(*id).to_string())
                .collect(),
            edges: self
                .edges
                .iter()
                .filter_map(|id| system.flow(*id))
                .map(|flow| system.label(flow))
                .collect(),
        }
    }
}

fn graph_of(system: &EnergySystem) -> DiGraphMap<NodeId, EdgeId> {
    let mut graph = DiGraphMap::with_capacity(system.nodes().len(), system.flows().len());
    for node in system.nodes() {
        graph.add_node(node.id);
    }
    for flow in system.flows() {
        graph.add_edge(flow.from, flow.to, flow.id);
    }
    graph
}

fn protected(system: &EnergySystem, edge: EdgeId) -> bool {
    system
        .flow(edge)
        .and_then(|flow| system.node(flow.to))
        .is_some_and(|node| match &node.kind {
            NodeKind::Sink(p) => {
                p.profile.as_ref().is_some_and(|p| p.has_positive_minimum())
                    || system.flow(edge).is_some_and(|f| f.bounds.min() > 0.0)
            }
            _ => false,
        })
}

fn initially_dead(system: &EnergySystem, edge: EdgeId) -> bool {
    let Some(flow) = system.flow(edge) else {
        return false;
    };
    if flow.is_expandable() {
        return false;
    }
    if flow.bounds.max() == 0.0 {
        return true;
    }
    matches!(
        system.node(flow.from).map(|n| &n.kind),
        Some(NodeKind::Source(p)) if p.profile.as_ref().is_some_and(|p| p.is_all_zero())
    )
}

/// Compute the dead part of `system` by fixpoint propagation.
pub(crate) fn find_dead(system: &EnergySystem) -> DeadSet {
    let graph = graph_of(system);
    let mut dead: BTreeSet<EdgeId> = system
        .flows()
        .iter()
        .map(|f| f.id)
        .filter(|e| initially_dead(system, *e) && !protected(system, *e))
        .collect();

    let incoming = |n: NodeId| -> Vec<EdgeId> {
        graph
            .edges_directed(n, Direction::Incoming)
            .map(|(_, _, e)| *e)
            .collect()
    };
    let outgoing = |n: NodeId| -> Vec<EdgeId> {
        graph
            .edges_directed(n, Direction::Outgoing)
            .map(|(_, _, e)| *e)
            .collect()
    };

    loop {
        let before = dead.len();
        for node in system.nodes() {
            let ins = incoming(node.id);
            let outs = outgoing(node.id);
            let mut kill: Vec<EdgeId> = Vec::new();
            match &node.kind {
                NodeKind::Transformer(_) | NodeKind::Chp(_) => {
                    if ins.iter().chain(&outs).any(|e| dead.contains(e)) {
                        kill.extend(ins.iter().chain(&outs));
                    }
                }
                NodeKind::Bus => {
                    if !ins.is_empty() && ins.iter().all(|e| dead.contains(e)) {
                        kill.extend(&outs);
                    }
                    if !outs.is_empty() && outs.iter().all(|e| dead.contains(e)) {
                        kill.extend(&ins);
                    }
                }
                NodeKind::Connector(p) => {
                    for (from_bus, to_bus) in [(&p.bus_a, &p.bus_b), (&p.bus_b, &p.bus_a)] {
                        let leg_in = ins.iter().find(|e| edge_from(system, **e) == from_bus);
                        let leg_out = outs.iter().find(|e| edge_to(system, **e) == to_bus);
                        if let (Some(i), Some(o)) = (leg_in, leg_out)
                            && (dead.contains(i) || dead.contains(o))
                        {
                            kill.extend([*i, *o]);
                        }
                    }
                }
                NodeKind::Source(_) | NodeKind::Sink(_) | NodeKind::Storage(_) => {}
            }
            dead.extend(kill.into_iter().filter(|e| !protected(system, *e)));
        }
        if dead.len() == before {
            break;
        }
    }

    let nodes = system
        .nodes()
        .iter()
        .filter(|node| {
            let attached: Vec<EdgeId> = incoming(node.id)
                .into_iter()
                .chain(outgoing(node.id))
                .collect();
            !attached.is_empty() && attached.iter().all(|e| dead.contains(e))
        })
        .map(|node| node.id)
        .collect();

    DeadSet { nodes, edges: dead }
}

fn edge_from(system: &EnergySystem, edge: EdgeId) -> &str {
    system.flow(edge).map_or("", |f| system.name_of(f.from))
}

fn edge_to(system: &EnergySystem, edge: EdgeId) -> &str {
    system.flow(edge).map_or("", |f| system.name_of(f.to))
}

/// Remove chains that can never carry energy.
pub fn prune_redundant_chains(system: &EnergySystem) -> PrunedTopology {
    find_dead(system).topology(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    #[test]
    fn minimal_example_has_nothing_to_prune() {
        let system = fixtures::minimal_example().unwrap();
        assert!(prune_redundant_chains(&system).is_empty());
    }

    #[test]
    fn zero_supply_chain_is_removed_up_to_the_shared_bus() {
        let system = fixtures::redundant_chain_example().unwrap();
        let pruned = prune_redundant_chains(&system);
        assert_eq!(pruned.nodes, vec!["Coal Line", "Coal Supply", "Coal Plant"]);
        assert_eq!(pruned.edges.len(), 3);
        assert!(pruned.contains_edge(&EdgeLabel::new("Coal Plant", "Powerline")));
        assert!(!pruned.contains_node("Powerline"));
    }
}
