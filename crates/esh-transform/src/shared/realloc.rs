//! Lossless relocation of specific costs and emissions.
//!
//! A specific value `s` on edge `E` may move to edge `U` when
//! `flow(E) = factor * flow(U)` holds at every step; the value becomes
//! `s * factor` on `U`. Such positions exist across buses with a single
//! inflow and outflow and across conversions with constant factors and a
//! single input.

use esh_core::EdgeId;
use esh_model::{EnergySystem, Flow, NodeKind};

use crate::deviation::{Deviation, DeviationCause};

/// Equivalent position of an edge's specific values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub edge: EdgeId,
    pub factor: f64,
}

/// Which quantity is being moved, for deviation reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    Costs,
    Emissions,
}

impl Quantity {
    pub fn deviation(self, system: &EnergySystem, from: &Flow, to: Position) -> Deviation {
        let from_label = system.label(from).to_string();
        let to_label = system
            .flow(to.edge)
            .map(|f| system.label(f).to_string())
            .unwrap_or_default();
        let cause = match self {
            Quantity::Costs => DeviationCause::CostReallocated {
                from: from_label.clone(),
                to: to_label,
                factor: to.factor,
            },
            Quantity::Emissions => DeviationCause::EmissionReallocated {
                from: from_label.clone(),
                to: to_label,
                factor: to.factor,
            },
        };
        Deviation::new(from_label, cause)
    }
}

/// Ratio `flow(to) / flow(from)` through a conversion node, when constant.
pub fn conversion_ratio(system: &EnergySystem, from: &Flow, to: &Flow) -> Option<f64> {
    let node = system.node(from.to)?;
    if to.from != node.id {
        return None;
    }
    match &node.kind {
        NodeKind::Transformer(p) => {
            let f_in = p.factor(system.name_of(from.from))?;
            let f_out = p.factor(system.name_of(to.to))?;
            if f_in.is_varying() || f_out.is_varying() {
                return None;
            }
            Some(f_out.mean() / f_in.mean())
        }
        NodeKind::Chp(p) => p.efficiency_of(system.name_of(to.to)),
        _ => None,
    }
}

/// One lossless step upstream of `edge`.
pub fn step_upstream(system: &EnergySystem, edge: EdgeId) -> Option<Position> {
    let flow = system.flow(edge)?;
    let node = system.node(flow.from)?;
    let mut inflows = system.inflows(node.id);
    let input = inflows.next()?;
    if inflows.next().is_some() {
        return None;
    }
    match &node.kind {
        NodeKind::Bus => {
            (system.outflow_ids(node.id).len() == 1).then_some(Position {
                edge: input.id,
                factor: 1.0,
            })
        }
        NodeKind::Transformer(_) | NodeKind::Chp(_) => {
            let ratio = conversion_ratio(system, input, flow)?;
            Some(Position {
                edge: input.id,
                factor: ratio,
            })
        }
        _ => None,
    }
}

/// Trace `edge` upstream to the outflow of a commodity source.
///
/// Returns the edge itself (factor 1) when it already leaves a source.
pub fn upstream_supply(system: &EnergySystem, edge: EdgeId) -> Option<Position> {
    let mut position = Position { edge, factor: 1.0 };
    // each step moves to a distinct upstream edge
    for _ in 0..=system.flows().len() {
        let flow = system.flow(position.edge)?;
        if matches!(system.node(flow.from)?.kind, NodeKind::Source(_)) {
            return Some(position);
        }
        let step = step_upstream(system, position.edge)?;
        position = Position {
            edge: step.edge,
            factor: position.factor * step.factor,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    #[test]
    fn generator_output_traces_to_gas_station() {
        let system = fixtures::minimal_example().unwrap();
        let out = system.flow_between("Generator", "Powerline").unwrap();
        let supply = upstream_supply(&system, out.id).unwrap();
        let gas = system.flow_between("Gas Station", "Pipeline").unwrap();
        assert_eq!(supply.edge, gas.id);
        assert!((supply.factor - 0.42).abs() < 1e-12);
    }

    #[test]
    fn chp_heat_output_traces_through_fuel_bus() {
        let system = fixtures::chp_example().unwrap();
        let heat = system.flow_between("CHP", "Heatline").unwrap();
        let step = step_upstream(&system, heat.id).unwrap();
        assert_eq!(step.edge, system.flow_between("Gas", "CHP").unwrap().id);
        assert_eq!(step.factor, 0.6);
        let supply = upstream_supply(&system, heat.id).unwrap();
        assert_eq!(
            supply.edge,
            system.flow_between("Gas Station", "Gas").unwrap().id
        );
    }

    #[test]
    fn shared_bus_blocks_tracing() {
        let system = fixtures::minimal_example().unwrap();
        let demand = system.flow_between("Powerline", "Demand").unwrap();
        assert!(upstream_supply(&system, demand.id).is_none());
    }
}
