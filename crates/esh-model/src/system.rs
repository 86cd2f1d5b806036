//! The built, immutable energy system.

use std::collections::HashMap;

use esh_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

use crate::flow::{EdgeLabel, Flow};
use crate::node::{ChpParams, ConnectorParams, EndpointParams, Node, NodeKind, StorageParams};
use crate::node::TransformerParams;
use crate::timeframe::Timeframe;

/// System-wide limits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConstraints {
    /// Upper limit on total emissions over the timeframe (declared mass unit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emissions: Option<f64>,
}

/// Canonical energy system: nodes and flows over a timeframe.
///
/// Built once through [`SystemBuilder`](crate::SystemBuilder) and never
/// mutated afterwards; adapters only read it.
#[derive(Debug, Clone)]
pub struct EnergySystem {
    pub(crate) uid: String,
    pub(crate) timeframe: Timeframe,
    pub(crate) nodes: Vec<Node>,
    pub(crate) flows: Vec<Flow>,
    pub(crate) global_constraints: GlobalConstraints,
    pub(crate) names: HashMap<String, NodeId>,

    /// node i's inflows are in `inflows[in_offsets[i]..in_offsets[i+1]]`.
    pub(crate) in_offsets: Vec<usize>,
    pub(crate) inflows: Vec<EdgeId>,
    pub(crate) out_offsets: Vec<usize>,
    pub(crate) outflows: Vec<EdgeId>,
}

impl EnergySystem {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    pub fn global_constraints(&self) -> &GlobalConstraints {
        &self.global_constraints
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot())
    }

    pub fn flow(&self, id: EdgeId) -> Option<&Flow> {
        self.flows.get(id.slot())
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.names.get(name).and_then(|id| self.node(*id))
    }

    /// Name of a node; empty for an out of range id.
    pub fn name_of(&self, id: NodeId) -> &str {
        self.node(id).map_or("", Node::name)
    }

    pub fn label(&self, flow: &Flow) -> EdgeLabel {
        EdgeLabel::new(self.name_of(flow.from), self.name_of(flow.to))
    }

    pub fn flow_between(&self, from: &str, to: &str) -> Option<&Flow> {
        let from = *self.names.get(from)?;
        let to = *self.names.get(to)?;
        self.outflow_ids(from)
            .iter()
            .filter_map(|e| self.flow(*e))
            .find(|f| f.to == to)
    }

    pub fn flow_by_label(&self, label: &EdgeLabel) -> Option<&Flow> {
        self.flow_between(&label.from, &label.to)
    }

    pub fn inflow_ids(&self, node: NodeId) -> &[EdgeId] {
        slice_of(&self.in_offsets, &self.inflows, node)
    }

    pub fn outflow_ids(&self, node: NodeId) -> &[EdgeId] {
        slice_of(&self.out_offsets, &self.outflows, node)
    }

    pub fn inflows(&self, node: NodeId) -> impl Iterator<Item = &Flow> {
        self.inflow_ids(node).iter().filter_map(|e| self.flow(*e))
    }

    pub fn outflows(&self, node: NodeId) -> impl Iterator<Item = &Flow> {
        self.outflow_ids(node).iter().filter_map(|e| self.flow(*e))
    }

    pub fn buses(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_bus())
    }

    pub fn sources(&self) -> impl Iterator<Item = (&Node, &EndpointParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Source(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn sinks(&self) -> impl Iterator<Item = (&Node, &EndpointParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Sink(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn transformers(&self) -> impl Iterator<Item = (&Node, &TransformerParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Transformer(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn chps(&self) -> impl Iterator<Item = (&Node, &ChpParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Chp(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn storages(&self) -> impl Iterator<Item = (&Node, &StorageParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Storage(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn connectors(&self) -> impl Iterator<Item = (&Node, &ConnectorParams)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Connector(p) => Some((n, p)),
            _ => None,
        })
    }

    /// The single outflow of a source or inflow of a sink.
    pub fn endpoint_flow(&self, node: &Node) -> Option<&Flow> {
        match node.kind {
            NodeKind::Source(_) => self.outflows(node.id).next(),
            NodeKind::Sink(_) => self.inflows(node.id).next(),
            _ => None,
        }
    }

    /// Per-timestep `(min, max)` limits of a flow.
    ///
    /// Combines the flow bounds with the profile of an attached source or
    /// sink; other flows carry their bounds at every step.
    pub fn step_bounds(&self, flow: &Flow) -> Vec<(f64, f64)> {
        let n = self.timeframe.len();
        let profile = [flow.from, flow.to]
            .iter()
            .filter_map(|id| self.node(*id))
            .find_map(|node| match &node.kind {
                NodeKind::Source(p) | NodeKind::Sink(p) => p.profile.as_ref(),
                _ => None,
            });
        (0..n)
            .map(|t| match profile {
                Some(p) => (
                    flow.bounds.min().max(p.min()[t]),
                    flow.bounds.max().min(p.max()[t]),
                ),
                None => (flow.bounds.min(), flow.bounds.max()),
            })
            .collect()
    }
}

fn slice_of<'a>(offsets: &[usize], flat: &'a [EdgeId], node: NodeId) -> &'a [EdgeId] {
    let idx = node.slot();
    if idx + 1 >= offsets.len() {
        return &[];
    }
    &flat[offsets[idx]..offsets[idx + 1]]
}

/// Compact adjacency: for each node, its incident edges in edge order.
pub(crate) fn build_adjacency(
    node_count: usize,
    flows: &[Flow],
    endpoint: impl Fn(&Flow) -> NodeId,
) -> (Vec<usize>, Vec<EdgeId>) {
    let mut per_node: Vec<Vec<EdgeId>> = vec![Vec::new(); node_count];
    for flow in flows {
        if let Some(list) = per_node.get_mut(endpoint(flow).slot()) {
            list.push(flow.id);
        }
    }

    let mut offsets = Vec::with_capacity(node_count + 1);
    let mut flat = Vec::with_capacity(flows.len());
    offsets.push(0);
    for list in per_node {
        flat.extend(list);
        offsets.push(flat.len());
    }
    (offsets, flat)
}
