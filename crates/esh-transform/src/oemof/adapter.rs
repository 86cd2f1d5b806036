use std::collections::BTreeMap;

use esh_core::HarmonyConfig;
use esh_model::{ConnectorParams, EnergySystem, Flow, Node, NodeKind};
use tracing::{debug, info, info_span};

use super::native::*;
use crate::adapter::{Adapter, AdapterOptions, Transformation};
use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;
use crate::shared::{Scope, single_flow};
use crate::shared::bounds::unpack_bounds;

/// Adapter for the oemof schema.
///
/// oemof expresses every canonical construct natively, so this adapter
/// reports no deviations and never prunes unless asked to.
#[derive(Clone, Copy, Debug, Default)]
pub struct OemofAdapter;

impl Adapter for OemofAdapter {
    type Input = OemofEnergySystem;

    fn framework(&self) -> Framework {
        Framework::Oemof
    }

    fn transform(
        &self,
        system: &EnergySystem,
        options: &AdapterOptions,
        _config: &HarmonyConfig,
    ) -> TransformResult<Transformation<OemofEnergySystem>> {
        let _span = info_span!("transform", framework = "oemof", system = system.uid()).entered();
        let scope = Scope::new(system, options, Framework::Oemof);

        let mut native = OemofEnergySystem {
            label: system.uid().to_string(),
            timeindex: system.timeframe().steps().to_vec(),
            buses: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            converters: Vec::new(),
            storages: Vec::new(),
            links: Vec::new(),
            emission_limit: system.global_constraints().emissions,
        };

        for node in scope.nodes() {
            debug!(node = node.name(), kind = node.kind.name(), "mapping node");
            match &node.kind {
                NodeKind::Bus => native.buses.push(OemofBus {
                    label: node.name().to_string(),
                }),
                NodeKind::Source(_) => native.sources.push(OemofSource {
                    label: node.name().to_string(),
                    outputs: flow_map(&scope, &scope.outflows(node), |f| f.to)?,
                }),
                NodeKind::Sink(_) => native.sinks.push(OemofSink {
                    label: node.name().to_string(),
                    inputs: flow_map(&scope, &scope.inflows(node), |f| f.from)?,
                }),
                NodeKind::Transformer(params) => {
                    let n = system.timeframe().len();
                    let conversion_factors = params
                        .factors
                        .iter()
                        .map(|(bus, factor)| (bus.clone(), (0..n).map(|t| factor.at(t)).collect()))
                        .collect();
                    native.converters.push(converter(&scope, node, conversion_factors)?);
                }
                NodeKind::Chp(params) => {
                    let n = system.timeframe().len();
                    let mut conversion_factors = BTreeMap::new();
                    conversion_factors.insert(params.input.clone(), vec![1.0; n]);
                    for output in &params.outputs {
                        conversion_factors.insert(output.bus.clone(), vec![output.efficiency; n]);
                    }
                    native.converters.push(converter(&scope, node, conversion_factors)?);
                }
                NodeKind::Storage(params) => {
                    let inflow = single_flow(scope.inflows(node), node)?;
                    let outflow = single_flow(scope.outflows(node), node)?;
                    let capacity = params.capacity.max();
                    let investment = params.expansion.map(|x| Investment {
                        ep_costs: x.costs(),
                        existing: capacity,
                        maximum: finite(x.max_capacity() - capacity),
                    });
                    native.storages.push(GenericStorage {
                        label: node.name().to_string(),
                        bus: params.bus.clone(),
                        nominal_storage_capacity: investment.is_none().then_some(capacity),
                        investment,
                        initial_storage_level: params.initial_soc,
                        min_storage_level: fraction_of(params.capacity.min(), capacity),
                        balanced: params.soc_policy == esh_model::SocPolicy::Cyclic,
                        inflow_conversion_factor: params.charge_efficiency,
                        outflow_conversion_factor: params.discharge_efficiency,
                        loss_rate: params.loss_rate,
                        inflow: oemof_flow(&scope, inflow)?,
                        outflow: oemof_flow(&scope, outflow)?,
                    });
                }
                NodeKind::Connector(params) => {
                    let inflows = scope.inflows(node);
                    let outflows = scope.outflows(node);
                    if let Some(f) = inflows.iter().chain(&outflows).find(|f| f.is_expandable()) {
                        return Err(TransformError::unsupported(
                            scope.label(f),
                            "expandable link",
                            Framework::Oemof,
                        ));
                    }
                    native.links.push(OemofLink {
                        label: node.name().to_string(),
                        inputs: flow_map(&scope, &inflows, |f| f.from)?,
                        outputs: flow_map(&scope, &outflows, |f| f.to)?,
                        conversion_factors: link_factors(&inflows, &outflows, &scope, params),
                    });
                }
            }
        }

        info!(
            buses = native.buses.len(),
            converters = native.converters.len(),
            storages = native.storages.len(),
            "oemof energy system ready"
        );
        Ok(scope.finish(native))
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn fraction_of(value: f64, of: f64) -> f64 {
    if of > 0.0 { value / of } else { 0.0 }
}

fn converter(
    scope: &Scope<'_>,
    node: &Node,
    conversion_factors: BTreeMap<String, Vec<f64>>,
) -> TransformResult<OemofConverter> {
    Ok(OemofConverter {
        label: node.name().to_string(),
        inputs: flow_map(scope, &scope.inflows(node), |f| f.from)?,
        outputs: flow_map(scope, &scope.outflows(node), |f| f.to)?,
        conversion_factors,
    })
}

/// Conversion factors for the directions that still have live flows on
/// both sides.
fn link_factors(
    inflows: &[&Flow],
    outflows: &[&Flow],
    scope: &Scope<'_>,
    params: &ConnectorParams,
) -> Vec<LinkFactor> {
    [
        (&params.bus_a, &params.bus_b, params.efficiency.forward),
        (&params.bus_b, &params.bus_a, params.efficiency.backward),
    ]
    .into_iter()
    .filter(|(from, to, _)| {
        inflows.iter().any(|f| scope.name_of(f.from) == from.as_str())
            && outflows.iter().any(|f| scope.name_of(f.to) == to.as_str())
    })
    .map(|(from, to, factor)| LinkFactor {
        from: from.clone(),
        to: to.clone(),
        factor,
    })
    .collect()
}

fn flow_map(
    scope: &Scope<'_>,
    flows: &[&Flow],
    counterpart: impl Fn(&Flow) -> esh_core::NodeId,
) -> TransformResult<BTreeMap<String, OemofFlow>> {
    flows
        .iter()
        .map(|f| Ok((scope.name_of(counterpart(f)).to_string(), oemof_flow(scope, f)?)))
        .collect()
}

/// Translate one canonical flow.
pub(crate) fn oemof_flow(scope: &Scope<'_>, flow: &Flow) -> TransformResult<OemofFlow> {
    let bounds = unpack_bounds(scope.system, flow)?;
    let mut native = OemofFlow {
        nominal_value: bounds.nominal,
        min: bounds.min.clone(),
        max: bounds.max.clone(),
        fix: None,
        variable_costs: flow.costs,
        emissions: flow.emissions,
        investment: None,
    };
    if let Some(expansion) = flow.expansion {
        native.nominal_value = None;
        native.investment = Some(Investment {
            ep_costs: expansion.costs(),
            existing: flow.original_capacity(),
            maximum: finite(expansion.max_capacity() - flow.original_capacity()),
        });
    } else if bounds.is_fixed() {
        native.fix = Some(bounds.max.clone());
    }
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    fn transform(system: &EnergySystem) -> Transformation<OemofEnergySystem> {
        OemofAdapter
            .transform(system, &AdapterOptions::default(), &HarmonyConfig::default())
            .unwrap()
    }

    #[test]
    fn minimal_example_maps_without_deviations() {
        let system = fixtures::minimal_example().unwrap();
        let t = transform(&system);
        assert!(t.is_exact());
        assert!(t.pruned.is_empty());
        assert_eq!(t.native.buses.len(), 2);
        assert_eq!(t.native.sources.len(), 1);
        assert_eq!(t.native.sinks.len(), 1);
        assert_eq!(t.native.converters.len(), 1);
        assert_eq!(t.native.storages.len(), 1);

        let generator = t.native.converter("Generator").unwrap();
        assert_eq!(generator.conversion_factors["Powerline"], vec![0.42; 5]);
        assert_eq!(generator.outputs["Powerline"].nominal_value, Some(15.0));

        let gas = t.native.flow("Gas Station", "Pipeline").unwrap();
        assert_eq!(gas.nominal_value, None);
        assert_eq!(gas.variable_costs, 5.0);
        assert_eq!(gas.emissions, 0.2);

        let demand = t.native.flow("Powerline", "Demand").unwrap();
        assert_eq!(demand.fix, Some(vec![1.0; 5]));

        let battery = t.native.storage("Battery").unwrap();
        assert_eq!(battery.nominal_storage_capacity, Some(10.0));
        assert_eq!(battery.initial_storage_level, 0.5);
        assert!(!battery.balanced);
    }

    #[test]
    fn chp_becomes_two_output_converter() {
        let system = fixtures::chp_example().unwrap();
        let t = transform(&system);
        let chp = t.native.converter("CHP").unwrap();
        assert_eq!(chp.outputs.len(), 2);
        assert_eq!(chp.conversion_factors["Powerline"][0], 0.8);
        assert_eq!(chp.conversion_factors["Heatline"][0], 0.6);
        assert_eq!(t.native.emission_limit, Some(100.0));
        assert!(t.is_exact());
    }

    #[test]
    fn connectors_become_links() {
        let system = fixtures::connector_example().unwrap();
        let t = transform(&system);
        assert_eq!(t.native.links.len(), 1);
        let tie = &t.native.links[0];
        assert_eq!(tie.inputs.len(), 2);
        assert_eq!(tie.conversion_factors[0].factor, 0.9);
        assert!(t.is_exact());
    }

    #[test]
    fn expandable_flow_becomes_investment() {
        let system = fixtures::expansion_example(80.0).unwrap();
        let t = transform(&system);
        let wind = t.native.flow("Wind", "Powerline").unwrap();
        assert_eq!(wind.nominal_value, None);
        let inv = wind.investment.unwrap();
        assert_eq!(inv.existing, 5.0);
        assert_eq!(inv.maximum, Some(45.0));
        assert_eq!(inv.ep_costs, 80.0);
    }

    #[test]
    fn oemof_keeps_redundant_chains_by_default() {
        let system = fixtures::redundant_chain_example().unwrap();
        let t = transform(&system);
        assert!(t.pruned.is_empty());
        assert!(t.native.converter("Coal Plant").is_some());
    }
}
