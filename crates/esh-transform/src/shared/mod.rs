//! Strategies shared by all adapters.

pub mod bounds;
pub mod capacity;
pub mod prune;
pub mod realloc;
pub mod synth;

use esh_core::EdgeId;
use esh_model::{ConnectorParams, EnergySystem, Flow, Node};
use tracing::warn;

use crate::adapter::{AdapterOptions, ConnectorPolicy, PrunePolicy, Transformation};
use crate::deviation::Deviation;
use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;
use prune::DeadSet;
use synth::OneWayConversion;

/// Working state of one transformation: the live part of the model and the
/// deviations collected so far.
pub(crate) struct Scope<'a> {
    pub system: &'a EnergySystem,
    pub options: &'a AdapterOptions,
    pub framework: Framework,
    dead: DeadSet,
    deviations: Vec<Deviation>,
}

impl<'a> Scope<'a> {
    pub fn new(
        system: &'a EnergySystem,
        options: &'a AdapterOptions,
        framework: Framework,
    ) -> Self {
        let prune = match options.prune {
            PrunePolicy::Always => true,
            PrunePolicy::Never => false,
            PrunePolicy::Auto => framework.needs_pruning(),
        };
        let dead = if prune {
            prune::find_dead(system)
        } else {
            DeadSet::default()
        };
        Self {
            system,
            options,
            framework,
            dead,
            deviations: Vec::new(),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + '_ {
        self.system
            .nodes()
            .iter()
            .filter(|n| !self.dead.nodes.contains(&n.id))
    }

    pub fn is_live(&self, edge: EdgeId) -> bool {
        !self.dead.edges.contains(&edge)
    }

    pub fn inflows(&self, node: &Node) -> Vec<&'a Flow> {
        self.system
            .inflows(node.id)
            .filter(|f| self.is_live(f.id))
            .collect()
    }

    pub fn outflows(&self, node: &Node) -> Vec<&'a Flow> {
        self.system
            .outflows(node.id)
            .filter(|f| self.is_live(f.id))
            .collect()
    }

    /// Live one-way conversions of a connector, or `UnsupportedComponent`
    /// when the options reject connectors.
    pub fn synthesize_connector(
        &mut self,
        node: &Node,
        params: &ConnectorParams,
    ) -> TransformResult<Vec<OneWayConversion>> {
        if self.options.connector_policy == ConnectorPolicy::Reject {
            return Err(TransformError::unsupported(node.name(), "connector", self.framework));
        }
        let (legs, deviation) =
            synth::synthesize_connector(self.system, node, params, |e| self.is_live(e))?;
        self.deviate(deviation);
        Ok(legs)
    }

    pub fn label(&self, flow: &Flow) -> String {
        self.system.label(flow).to_string()
    }

    pub fn name_of(&self, id: esh_core::NodeId) -> &'a str {
        self.system.name_of(id)
    }

    pub fn deviate(&mut self, deviation: Deviation) {
        warn!(
            framework = %self.framework,
            uid = %deviation.uid,
            cause = deviation.cause.kind(),
            "construct re-expressed"
        );
        self.deviations.push(deviation);
    }

    pub fn finish<N>(self, native: N) -> Transformation<N> {
        Transformation {
            framework: self.framework,
            native,
            deviations: self.deviations,
            pruned: self.dead.topology(self.system),
        }
    }
}

/// The only element of `flows`, or a `SchemaMismatch` naming `node`.
pub(crate) fn single_flow<'a>(flows: Vec<&'a Flow>, node: &Node) -> TransformResult<&'a Flow> {
    match flows.as_slice() {
        [flow] => Ok(*flow),
        _ => Err(TransformError::mismatch(
            node.name(),
            format!("expected one live flow, found {}", flows.len()),
        )),
    }
}

/// Per-hour loss equivalent to losing `loss_rate` per step of `step_hours`.
pub(crate) fn hourly_loss(loss_rate: f64, step_hours: f64) -> f64 {
    1.0 - (1.0 - loss_rate).powf(1.0 / step_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_loss_compounds_to_step_loss() {
        assert!((hourly_loss(0.1, 1.0) - 0.1).abs() < 1e-12);
        let h = hourly_loss(0.19, 2.0);
        assert!(((1.0 - h) * (1.0 - h) - 0.81).abs() < 1e-12);
    }
}
