//! Connector synthesis from one-way conversions.

use esh_core::EdgeId;
use esh_model::{ConnectorParams, EnergySystem, Node};

use crate::deviation::{Deviation, DeviationCause};
use crate::error::{TransformError, TransformResult};

/// One direction of a connector written as a conversion between two buses.
#[derive(Clone, Debug, PartialEq)]
pub struct OneWayConversion {
    pub name: String,
    pub from_bus: String,
    pub to_bus: String,
    pub efficiency: f64,
    /// Canonical flow into the connector for this direction.
    pub input: EdgeId,
    /// Canonical flow out of the connector for this direction.
    pub output: EdgeId,
}

/// Conversion name for one direction of `connector`.
pub fn one_way_name(connector: &str, from_bus: &str, to_bus: &str) -> String {
    format!("{connector} ({from_bus} to {to_bus})")
}

/// Split a connector into its one-way conversions, forward first.
///
/// Directions whose flows fail `is_live` are left out. The deviation names
/// the conversions that remain.
pub(crate) fn synthesize_connector(
    system: &EnergySystem,
    node: &Node,
    params: &ConnectorParams,
    is_live: impl Fn(EdgeId) -> bool,
) -> TransformResult<(Vec<OneWayConversion>, Deviation)> {
    let mut legs = Vec::with_capacity(2);
    for (from, to, efficiency) in [
        (&params.bus_a, &params.bus_b, params.efficiency.forward),
        (&params.bus_b, &params.bus_a, params.efficiency.backward),
    ] {
        let (Some(input), Some(output)) = (
            system.flow_between(from, node.name()),
            system.flow_between(node.name(), to),
        ) else {
            return Err(TransformError::mismatch(
                node.name(),
                format!("connector has no flow path from '{from}' to '{to}'"),
            ));
        };
        if !is_live(input.id) || !is_live(output.id) {
            continue;
        }
        legs.push(OneWayConversion {
            name: one_way_name(node.name(), from, to),
            from_bus: from.to_string(),
            to_bus: to.to_string(),
            efficiency,
            input: input.id,
            output: output.id,
        });
    }
    let deviation = Deviation::new(
        node.name(),
        DeviationCause::ConnectorSynthesized {
            conversions: legs.iter().map(|leg| leg.name.clone()).collect(),
        },
    );
    Ok((legs, deviation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    #[test]
    fn connector_splits_into_named_directions() {
        let system = fixtures::connector_example().unwrap();
        let (node, params) = system.connectors().next().unwrap();
        let (legs, deviation) = synthesize_connector(&system, node, params, |_| true).unwrap();
        let [fwd, bwd] = legs.as_slice() else {
            panic!("expected two directions, got {legs:?}");
        };
        assert_eq!(fwd.name, "Tie (North to South)");
        assert_eq!(bwd.name, "Tie (South to North)");
        assert_eq!(fwd.efficiency, 0.9);
        assert_eq!(
            fwd.input,
            system.flow_between("North", "Tie").unwrap().id
        );
        assert!(deviation.cause.is_lossless());
    }

    #[test]
    fn dead_directions_are_left_out() {
        let system = fixtures::connector_example().unwrap();
        let (node, params) = system.connectors().next().unwrap();
        let dead = system.flow_between("North", "Tie").unwrap().id;
        let (legs, deviation) = synthesize_connector(&system, node, params, |e| e != dead).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].name, "Tie (South to North)");
        assert_eq!(
            deviation.cause,
            DeviationCause::ConnectorSynthesized {
                conversions: vec!["Tie (South to North)".to_string()],
            }
        );
    }
}
