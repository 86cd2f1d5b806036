//! Structural validation of a built system.

use std::collections::BTreeSet;

use crate::error::{ModelError, ModelResult};
use crate::node::{ChpParams, ConnectorParams, EndpointParams, Node, NodeKind, StorageParams};
use crate::node::TransformerParams;
use crate::params::non_negative;
use crate::system::EnergySystem;

pub(crate) fn validate_system(system: &EnergySystem) -> ModelResult<()> {
    for node in system.nodes() {
        match &node.kind {
            NodeKind::Bus => {}
            NodeKind::Source(p) => validate_endpoint(system, node, p, true)?,
            NodeKind::Sink(p) => validate_endpoint(system, node, p, false)?,
            NodeKind::Transformer(p) => validate_transformer(system, node, p)?,
            NodeKind::Chp(p) => validate_chp(system, node, p)?,
            NodeKind::Storage(p) => validate_storage(system, node, p)?,
            NodeKind::Connector(p) => validate_connector(system, node, p)?,
        }
    }
    if let Some(limit) = system.global_constraints().emissions {
        non_negative("emission limit", limit).map_err(|e| ModelError::param(system.uid(), e))?;
    }
    Ok(())
}

fn inflow_names(system: &EnergySystem, node: &Node) -> Vec<String> {
    system
        .inflows(node.id)
        .map(|f| system.name_of(f.from).to_string())
        .collect()
}

fn outflow_names(system: &EnergySystem, node: &Node) -> Vec<String> {
    system
        .outflows(node.id)
        .map(|f| system.name_of(f.to).to_string())
        .collect()
}

fn validate_endpoint(
    system: &EnergySystem,
    node: &Node,
    params: &EndpointParams,
    is_source: bool,
) -> ModelResult<()> {
    let inflows = system.inflow_ids(node.id).len();
    let outflows = system.outflow_ids(node.id).len();
    let ok = if is_source {
        inflows == 0 && outflows == 1
    } else {
        inflows == 1 && outflows == 0
    };
    if !ok {
        return Err(ModelError::schema(
            node.name(),
            format!(
                "a {} needs exactly one {} (found {inflows} in, {outflows} out)",
                node.kind.name(),
                if is_source { "outflow" } else { "inflow" },
            ),
        ));
    }
    if let Some(profile) = &params.profile {
        check_length(system, node, profile.len())?;
    }
    Ok(())
}

fn validate_transformer(
    system: &EnergySystem,
    node: &Node,
    params: &TransformerParams,
) -> ModelResult<()> {
    let inputs = inflow_names(system, node);
    let outputs = outflow_names(system, node);
    if inputs.is_empty() || outputs.is_empty() {
        return Err(ModelError::schema(
            node.name(),
            "a transformer needs at least one input and one output",
        ));
    }
    let attached: BTreeSet<&str> = inputs.iter().chain(&outputs).map(String::as_str).collect();
    let declared: BTreeSet<&str> = params.factors.keys().map(String::as_str).collect();
    if attached != declared {
        return Err(ModelError::schema(
            node.name(),
            format!("conversion factors {declared:?} do not match attached buses {attached:?}"),
        ));
    }
    for factor in params.factors.values() {
        if let Some(len) = factor.series_len() {
            check_length(system, node, len)?;
        }
    }
    Ok(())
}

fn validate_chp(system: &EnergySystem, node: &Node, params: &ChpParams) -> ModelResult<()> {
    let inputs = inflow_names(system, node);
    let outputs: BTreeSet<String> = outflow_names(system, node).into_iter().collect();
    let expected: BTreeSet<String> = params.outputs.iter().map(|o| o.bus.clone()).collect();
    if inputs != [params.input.clone()] || expected.len() != 2 || outputs != expected {
        return Err(ModelError::schema(
            node.name(),
            "a chp needs one flow from its input bus and one flow to each of two distinct output buses",
        ));
    }
    Ok(())
}

fn validate_storage(system: &EnergySystem, node: &Node, params: &StorageParams) -> ModelResult<()> {
    params
        .check()
        .map_err(|e| ModelError::param(node.name(), e))?;
    let inputs = inflow_names(system, node);
    let outputs = outflow_names(system, node);
    if inputs != [params.bus.clone()] || outputs != [params.bus.clone()] {
        return Err(ModelError::schema(
            node.name(),
            format!("a storage needs one inflow from and one outflow to '{}'", params.bus),
        ));
    }
    if !params.capacity.is_bounded() {
        return Err(ModelError::schema(
            node.name(),
            "a storage needs a finite (original) capacity",
        ));
    }
    if let Some(x) = params.expansion
        && x.max_capacity() < params.capacity.max()
    {
        return Err(ModelError::schema(
            node.name(),
            format!(
                "maximum storage capacity {} is below the original capacity {}",
                x.max_capacity(),
                params.capacity.max()
            ),
        ));
    }
    Ok(())
}

fn validate_connector(
    system: &EnergySystem,
    node: &Node,
    params: &ConnectorParams,
) -> ModelResult<()> {
    params
        .check()
        .map_err(|e| ModelError::param(node.name(), e))?;
    if params.bus_a == params.bus_b {
        return Err(ModelError::schema(node.name(), "a connector needs two distinct buses"));
    }
    let mut inputs = inflow_names(system, node);
    let mut outputs = outflow_names(system, node);
    inputs.sort();
    outputs.sort();
    let mut expected = vec![params.bus_a.clone(), params.bus_b.clone()];
    expected.sort();
    if inputs != expected || outputs != expected {
        return Err(ModelError::schema(
            node.name(),
            format!(
                "a connector needs flows from and to both '{}' and '{}'",
                params.bus_a, params.bus_b
            ),
        ));
    }
    Ok(())
}

fn check_length(system: &EnergySystem, node: &Node, actual: usize) -> ModelResult<()> {
    let expected = system.timeframe().len();
    if actual != expected {
        return Err(ModelError::TimeseriesLength {
            uid: node.name().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SystemBuilder;
    use crate::flow::FlowSpec;
    use crate::node::Component;
    use crate::params::{Bounds, Directional, Efficiency, Expansion, Profile};
    use crate::timeframe::Timeframe;
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;

    fn builder(steps: usize) -> SystemBuilder {
        SystemBuilder::new("test", Timeframe::hourly(NaiveDateTime::default(), steps).unwrap())
    }

    #[test]
    fn sink_profile_length_must_match_timeframe() {
        let mut b = builder(3);
        b.add_node(Component::bus("Bus")).unwrap();
        b.add_node(Component::sink("Demand").with_profile(Profile::fixed(vec![1.0; 2]).unwrap()))
            .unwrap();
        b.connect(FlowSpec::new("Bus", "Demand")).unwrap();
        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            ModelError::TimeseriesLength {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn source_without_outflow_is_rejected() {
        let mut b = builder(1);
        b.add_node(Component::source("Lonely")).unwrap();
        assert!(matches!(b.build(), Err(ModelError::Schema { .. })));
    }

    #[test]
    fn transformer_factors_must_cover_attached_buses() {
        let mut b = builder(1);
        b.add_node(Component::bus("Gas")).unwrap();
        b.add_node(Component::bus("Power")).unwrap();
        let factors = BTreeMap::from([("Power".to_string(), Efficiency::Constant(0.4))]);
        b.add_node(Component::transformer("Plant", factors)).unwrap();
        b.connect(FlowSpec::new("Gas", "Plant")).unwrap();
        b.connect(FlowSpec::new("Plant", "Power")).unwrap();
        assert!(matches!(b.build(), Err(ModelError::Schema { .. })));
    }

    #[test]
    fn connector_needs_all_four_flows() {
        let mut b = builder(1);
        b.add_node(Component::bus("A")).unwrap();
        b.add_node(Component::bus("B")).unwrap();
        let params = ConnectorParams::new("A", "B", Directional::symmetric(0.9));
        b.add_node(Component::connector("Tie", params)).unwrap();
        b.connect(FlowSpec::new("A", "Tie")).unwrap();
        b.connect(FlowSpec::new("Tie", "B")).unwrap();
        assert!(b.build().is_err());
    }

    #[test]
    fn storage_rejects_initial_soc_above_one() {
        let mut b = builder(1);
        b.add_node(Component::bus("Power")).unwrap();
        let params = StorageParams::new("Power", Bounds::up_to(10.0).unwrap()).initial_soc(1.5);
        b.add_node(Component::storage("Battery", params)).unwrap();
        b.connect(FlowSpec::new("Power", "Battery")).unwrap();
        b.connect(FlowSpec::new("Battery", "Power")).unwrap();
        assert!(matches!(
            b.build(),
            Err(ModelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn storage_expansion_cannot_shrink_the_original_capacity() {
        let mut b = builder(1);
        b.add_node(Component::bus("Power")).unwrap();
        let params = StorageParams::new("Power", Bounds::up_to(10.0).unwrap())
            .expansion(Expansion::new(2.0, 4.0).unwrap());
        b.add_node(Component::storage("Battery", params)).unwrap();
        b.connect(FlowSpec::new("Power", "Battery")).unwrap();
        b.connect(FlowSpec::new("Battery", "Power")).unwrap();
        let err = b.build().unwrap_err();
        assert!(matches!(err, ModelError::Schema { ref uid, .. } if uid == "Battery"), "{err}");
    }
}
