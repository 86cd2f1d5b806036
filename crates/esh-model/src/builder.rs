//! Incremental energy system builder.

use std::collections::HashMap;

use esh_core::{EdgeId, NodeId};

use crate::error::{ModelError, ModelResult};
use crate::flow::{Flow, FlowSpec, valid_name};
use crate::node::{Component, Node};
use crate::params::non_negative;
use crate::system::{EnergySystem, GlobalConstraints, build_adjacency};
use crate::timeframe::Timeframe;
use crate::validate;

/// Builder for an [`EnergySystem`].
///
/// Nodes are added first, then connected with flows referencing them by
/// name. `build()` validates the whole structure and freezes it.
#[derive(Debug)]
pub struct SystemBuilder {
    uid: String,
    timeframe: Timeframe,
    nodes: Vec<Node>,
    flows: Vec<Flow>,
    names: HashMap<String, NodeId>,
    global_constraints: GlobalConstraints,
}

impl SystemBuilder {
    pub fn new(uid: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            uid: uid.into(),
            timeframe,
            nodes: Vec::new(),
            flows: Vec::new(),
            names: HashMap::new(),
            global_constraints: GlobalConstraints::default(),
        }
    }

    /// Add a node and return its ID.
    pub fn add_node(&mut self, component: Component) -> ModelResult<NodeId> {
        let name = component.uid.name.clone();
        if !valid_name(&name) {
            return Err(ModelError::schema(
                &name,
                "node names must be non-empty and may not contain '->'",
            ));
        }
        if self.names.contains_key(&name) {
            return Err(ModelError::DuplicateUid { uid: name });
        }
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.names.insert(name, id);
        self.nodes.push(Node {
            id,
            uid: component.uid,
            kind: component.kind,
        });
        Ok(id)
    }

    /// Add a flow between two already added nodes.
    ///
    /// Exactly one endpoint must be a bus and each ordered pair of nodes
    /// carries at most one flow.
    pub fn connect(&mut self, def: FlowSpec) -> ModelResult<EdgeId> {
        let label = def.label().to_string();
        let from = self.lookup(&def.from, &label)?;
        let to = self.lookup(&def.to, &label)?;

        let buses = [from, to]
            .iter()
            .filter(|id| self.nodes[id.slot()].is_bus())
            .count();
        if buses != 1 {
            return Err(ModelError::schema(
                &label,
                "a flow must connect exactly one bus with one component",
            ));
        }
        if self.flows.iter().any(|f| f.from == from && f.to == to) {
            return Err(ModelError::schema(&label, "duplicate flow between the same nodes"));
        }
        if !def.costs.is_finite() {
            return Err(ModelError::schema(&label, "flow costs must be finite"));
        }
        non_negative("emissions", def.emissions).map_err(|e| ModelError::param(&label, e))?;
        if def.expansion.is_some() && !def.bounds.is_bounded() {
            return Err(ModelError::schema(
                &label,
                "an expandable flow needs a finite original capacity",
            ));
        }
        if let Some(x) = def.expansion
            && x.max_capacity() < def.bounds.max()
        {
            return Err(ModelError::schema(
                &label,
                format!(
                    "maximum capacity {} is below the original capacity {}",
                    x.max_capacity(),
                    def.bounds.max()
                ),
            ));
        }

        let id = EdgeId::from_index(self.flows.len() as u32);
        self.flows.push(Flow {
            id,
            from,
            to,
            carrier: def.carrier,
            bounds: def.bounds,
            costs: def.costs,
            emissions: def.emissions,
            expansion: def.expansion,
        });
        Ok(id)
    }

    pub fn global_constraints(&mut self, constraints: GlobalConstraints) -> &mut Self {
        self.global_constraints = constraints;
        self
    }

    /// Validate and freeze into an immutable `EnergySystem`.
    pub fn build(self) -> ModelResult<EnergySystem> {
        let (in_offsets, inflows) = build_adjacency(self.nodes.len(), &self.flows, |f| f.to);
        let (out_offsets, outflows) = build_adjacency(self.nodes.len(), &self.flows, |f| f.from);

        let system = EnergySystem {
            uid: self.uid,
            timeframe: self.timeframe,
            nodes: self.nodes,
            flows: self.flows,
            global_constraints: self.global_constraints,
            names: self.names,
            in_offsets,
            inflows,
            out_offsets,
            outflows,
        };
        validate::validate_system(&system)?;
        Ok(system)
    }

    fn lookup(&self, name: &str, context: &str) -> ModelResult<NodeId> {
        self.names.get(name).copied().ok_or_else(|| {
            ModelError::schema(context, format!("flow references unknown node '{name}'"))
        })
    }
}

impl EnergySystem {
    /// Build a system from explicit component and flow lists.
    pub fn from_components(
        uid: impl Into<String>,
        timeframe: Timeframe,
        components: impl IntoIterator<Item = Component>,
        flows: impl IntoIterator<Item = FlowSpec>,
        global_constraints: GlobalConstraints,
    ) -> ModelResult<Self> {
        let mut builder = SystemBuilder::new(uid, timeframe);
        for component in components {
            builder.add_node(component)?;
        }
        for flow in flows {
            builder.connect(flow)?;
        }
        builder.global_constraints(global_constraints);
        builder.build()
    }
}
