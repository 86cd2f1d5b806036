use std::collections::BTreeMap;

use esh_core::{EdgeId, HarmonyConfig};
use esh_model::{EnergySystem, Flow, Node, NodeKind, SocPolicy, StorageParams};
use tracing::{debug, info, info_span};

use super::native::*;
use crate::adapter::{Adapter, AdapterOptions, Transformation};
use crate::deviation::{Deviation, DeviationCause};
use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;
use crate::shared::bounds::unpack_bounds;
use crate::shared::capacity::{ReferenceCapacity, reference_capacity};
use crate::shared::realloc::{Quantity, upstream_supply};
use crate::shared::synth::one_way_name;
use crate::shared::{Scope, hourly_loss, single_flow};

/// Adapter for the PyPSA schema.
#[derive(Clone, Copy, Debug, Default)]
pub struct PypsaAdapter;

impl Adapter for PypsaAdapter {
    type Input = PypsaNetwork;

    fn framework(&self) -> Framework {
        Framework::Pypsa
    }

    fn transform(
        &self,
        system: &EnergySystem,
        options: &AdapterOptions,
        _config: &HarmonyConfig,
    ) -> TransformResult<Transformation<PypsaNetwork>> {
        let _span = info_span!("transform", framework = "pypsa", system = system.uid()).entered();
        let mut scope = Scope::new(system, options, Framework::Pypsa);
        let supply_emissions = relocate_emissions(&mut scope)?;
        let n = system.timeframe().len();

        let mut net = PypsaNetwork {
            name: system.uid().to_string(),
            snapshots: system.timeframe().steps().to_vec(),
            snapshot_weighting: system.timeframe().step_hours(),
            carriers: Vec::new(),
            buses: Vec::new(),
            generators: Vec::new(),
            loads: Vec::new(),
            links: Vec::new(),
            stores: Vec::new(),
            link_couplings: Vec::new(),
            global_constraints: Vec::new(),
        };

        let nodes: Vec<&Node> = scope.nodes().collect();
        for node in nodes {
            debug!(node = node.name(), kind = node.kind.name(), "mapping node");
            match &node.kind {
                NodeKind::Bus => net.buses.push(PypsaBus {
                    name: node.name().to_string(),
                    carrier: node
                        .uid
                        .carrier
                        .clone()
                        .unwrap_or_else(|| node.name().to_string()),
                }),
                NodeKind::Source(_) => {
                    let flow = single_flow(scope.outflows(node), node)?;
                    let emissions = flow.emissions + supply_emissions.get(&flow.id).unwrap_or(&0.0);
                    net.carriers.push(Carrier {
                        name: node.name().to_string(),
                        co2_emissions: emissions,
                    });
                    net.generators
                        .push(generator(&scope, node, flow, scope.name_of(flow.to), 1.0)?);
                }
                NodeKind::Sink(params) => {
                    let flow = single_flow(scope.inflows(node), node)?;
                    let bus = scope.name_of(flow.from);
                    if params.is_fixed() && flow.costs == 0.0 && !flow.is_expandable() {
                        let p_set = unpack_bounds(system, flow)?
                            .absolute_max()
                            .unwrap_or_else(|| vec![0.0; n]);
                        net.loads.push(Load {
                            name: node.name().to_string(),
                            bus: bus.to_string(),
                            p_set,
                        });
                    } else {
                        net.carriers.push(Carrier {
                            name: node.name().to_string(),
                            co2_emissions: 0.0,
                        });
                        net.generators.push(generator(&scope, node, flow, bus, -1.0)?);
                    }
                }
                NodeKind::Transformer(params) => {
                    let input = single_input(&scope, node)?;
                    let f_in = params
                        .factor(scope.name_of(input.from))
                        .map(|f| f.mean())
                        .ok_or_else(|| TransformError::mismatch(node.name(), "missing input factor"))?;
                    let mut outputs = Vec::new();
                    for out in scope.outflows(node) {
                        let factor = params.factor(scope.name_of(out.to)).ok_or_else(|| {
                            TransformError::mismatch(node.name(), "missing output factor")
                        })?;
                        let efficiency = factor.mean() / f_in;
                        let input_varies = params
                            .factor(scope.name_of(input.from))
                            .is_some_and(|f| f.is_varying());
                        if factor.is_varying() || input_varies {
                            scope.deviate(Deviation::new(
                                scope.label(out),
                                DeviationCause::EfficiencyAveraged { mean: efficiency },
                            ));
                        }
                        outputs.push((out, efficiency));
                    }
                    conversion_links(&mut scope, &mut net, node, input, &outputs)?;
                }
                NodeKind::Chp(params) => {
                    let input = single_input(&scope, node)?;
                    let mut outputs = Vec::new();
                    for out in scope.outflows(node) {
                        let efficiency = params.efficiency_of(scope.name_of(out.to)).ok_or_else(|| {
                            TransformError::mismatch(node.name(), "output without efficiency")
                        })?;
                        outputs.push((out, efficiency));
                    }
                    conversion_links(&mut scope, &mut net, node, input, &outputs)?;
                }
                NodeKind::Storage(params) => storage(&mut scope, &mut net, node, params)?,
                NodeKind::Connector(params) => {
                    for (from, to, efficiency) in [
                        (&params.bus_a, &params.bus_b, params.efficiency.forward),
                        (&params.bus_b, &params.bus_a, params.efficiency.backward),
                    ] {
                        let (Some(input), Some(output)) = (
                            system.flow_between(from, node.name()),
                            system.flow_between(node.name(), to),
                        ) else {
                            return Err(TransformError::mismatch(node.name(), "incomplete connector"));
                        };
                        if !scope.is_live(input.id) || !scope.is_live(output.id) {
                            continue;
                        }
                        let name = one_way_name(node.name(), from, to);
                        let link = two_port(&mut scope, &name, input, output, efficiency)?;
                        net.links.push(link);
                    }
                }
            }
        }

        if let Some(limit) = system.global_constraints().emissions {
            net.global_constraints.push(PypsaGlobalConstraint {
                name: "co2_limit".into(),
                kind: "primary_energy".into(),
                carrier_attribute: "co2_emissions".into(),
                sense: "<=".into(),
                constant: limit,
            });
        }

        info!(
            generators = net.generators.len(),
            links = net.links.len(),
            stores = net.stores.len(),
            "pypsa network ready"
        );
        Ok(scope.finish(net))
    }
}

/// Move emissions off edges PyPSA cannot attach them to.
///
/// PyPSA accounts emissions only through generator carriers, so every
/// other emitting edge is traced to the supplying source.
fn relocate_emissions(scope: &mut Scope<'_>) -> TransformResult<BTreeMap<EdgeId, f64>> {
    let system = scope.system;
    let mut moved = BTreeMap::new();
    for flow in system.flows() {
        if flow.emissions == 0.0 || !scope.is_live(flow.id) {
            continue;
        }
        if matches!(
            system.node(flow.from).map(|n| &n.kind),
            Some(NodeKind::Source(_))
        ) {
            continue;
        }
        let position = upstream_supply(system, flow.id).ok_or_else(|| {
            TransformError::mismatch(
                scope.label(flow),
                "emissions can only be attached to supplying generators and no lossless supply position exists",
            )
        })?;
        *moved.entry(position.edge).or_insert(0.0) += flow.emissions * position.factor;
        scope.deviate(Quantity::Emissions.deviation(system, flow, position));
    }
    Ok(moved)
}

fn single_input<'a>(scope: &Scope<'a>, node: &Node) -> TransformResult<&'a Flow> {
    let inputs = scope.inflows(node);
    if inputs.len() != 1 {
        return Err(TransformError::mismatch(
            node.name(),
            format!("links have a single input bus, found {} inputs", inputs.len()),
        ));
    }
    single_flow(inputs, node)
}

fn pu_series(values: &[f64], n: usize, default: f64) -> Vec<f64> {
    if values.is_empty() {
        vec![default; n]
    } else {
        values.to_vec()
    }
}

fn generator(
    scope: &Scope<'_>,
    node: &Node,
    flow: &Flow,
    bus: &str,
    sign: f64,
) -> TransformResult<Generator> {
    let n = scope.system.timeframe().len();
    let bounds = unpack_bounds(scope.system, flow)?;
    let capacity = match (flow.expansion, bounds.nominal) {
        (Some(x), _) => Capacity::extendable(flow.original_capacity(), x.max_capacity(), x.costs()),
        (None, Some(nominal)) => Capacity::fixed(nominal),
        (None, None) => Capacity::unconstrained(),
    };
    Ok(Generator {
        name: node.name().to_string(),
        bus: bus.to_string(),
        carrier: node.name().to_string(),
        sign,
        capacity,
        p_min_pu: pu_series(&bounds.min, n, 0.0),
        p_max_pu: pu_series(&bounds.max, n, 1.0),
        marginal_cost: flow.costs,
        efficiency: 1.0,
    })
}

fn link_capacity(cap: &ReferenceCapacity, share: f64) -> Capacity {
    match (cap.expansion, cap.nominal) {
        (Some(x), _) => Capacity::extendable(
            x.original * share,
            x.max_capacity * share,
            x.costs,
        ),
        (None, Some(nominal)) => Capacity::fixed(nominal * share),
        (None, None) => Capacity::unconstrained(),
    }
}

/// Marginal cost per unit of `p0` of a link whose output carries specific
/// costs.
fn output_cost(scope: &mut Scope<'_>, output: &Flow, link: &str, efficiency: f64) -> f64 {
    if output.costs == 0.0 {
        return 0.0;
    }
    scope.deviate(Deviation::new(
        scope.label(output),
        DeviationCause::CostReallocated {
            from: scope.label(output),
            to: link.to_string(),
            factor: efficiency,
        },
    ));
    output.costs * efficiency
}

fn two_port(
    scope: &mut Scope<'_>,
    name: &str,
    input: &Flow,
    output: &Flow,
    efficiency: f64,
) -> TransformResult<Link> {
    let cap = reference_capacity(
        scope.system,
        name,
        &[(input.id, 1.0), (output.id, efficiency)],
        Framework::Pypsa,
    )?;
    let marginal_cost = input.costs + output_cost(scope, output, name, efficiency);
    Ok(Link {
        name: name.to_string(),
        bus0: scope.name_of(input.from).to_string(),
        bus1: scope.name_of(output.to).to_string(),
        efficiency,
        capacity: link_capacity(&cap, 1.0),
        p_min_pu: cap.min_fraction,
        p_max_pu: 1.0,
        marginal_cost,
    })
}

/// Links of a single-input conversion.
///
/// One output gives one link. Two outputs give two links sharing the input
/// with efficiency `e1 + e2` each and a coupling that splits the input in
/// the ratio `e1 : e2`, which fixes the output ratio.
fn conversion_links(
    scope: &mut Scope<'_>,
    net: &mut PypsaNetwork,
    node: &Node,
    input: &Flow,
    outputs: &[(&Flow, f64)],
) -> TransformResult<()> {
    match outputs {
        [(output, efficiency)] => {
            let link = two_port(scope, node.name(), input, output, *efficiency)?;
            net.links.push(link);
        }
        [(first, e1), (second, e2)] => {
            let total = e1 + e2;
            let share = e1 / total;
            let cap = reference_capacity(
                scope.system,
                node.name(),
                &[(input.id, 1.0), (first.id, *e1), (second.id, *e2)],
                Framework::Pypsa,
            )?;
            let names = [
                names::conversion_link(node.name(), scope.name_of(first.to)),
                names::conversion_link(node.name(), scope.name_of(second.to)),
            ];
            for ((output, split), name) in [(*first, share), (*second, 1.0 - share)]
                .into_iter()
                .zip(&names)
            {
                let marginal_cost = input.costs + output_cost(scope, output, name, total);
                net.links.push(Link {
                    name: name.clone(),
                    bus0: scope.name_of(input.from).to_string(),
                    bus1: scope.name_of(output.to).to_string(),
                    efficiency: total,
                    capacity: link_capacity(&cap, split),
                    p_min_pu: cap.min_fraction,
                    p_max_pu: 1.0,
                    marginal_cost,
                });
            }
            let [primary, secondary] = names;
            net.link_couplings.push(LinkCoupling {
                primary,
                secondary,
                ratio: e1 / e2,
            });
        }
        _ => {
            return Err(TransformError::mismatch(
                node.name(),
                format!(
                    "conversions with {} outputs have no coupled-link form",
                    outputs.len()
                ),
            ));
        }
    }
    Ok(())
}

fn storage(
    scope: &mut Scope<'_>,
    net: &mut PypsaNetwork,
    node: &Node,
    params: &StorageParams,
) -> TransformResult<()> {
    let name = node.name();
    let inflow = single_flow(scope.inflows(node), node)?;
    let outflow = single_flow(scope.outflows(node), node)?;
    let private = names::storage_bus(name);
    let capacity = params.capacity.max();
    let step_hours = scope.system.timeframe().step_hours();

    net.buses.push(PypsaBus {
        name: private.clone(),
        carrier: node.uid.carrier.clone().unwrap_or_else(|| "store".into()),
    });

    let charge_name = names::storage_charge(name);
    let charge = reference_capacity(scope.system, &charge_name, &[(inflow.id, 1.0)], Framework::Pypsa)?;
    net.links.push(Link {
        name: charge_name,
        bus0: params.bus.clone(),
        bus1: private.clone(),
        efficiency: params.charge_efficiency,
        capacity: link_capacity(&charge, 1.0),
        p_min_pu: charge.min_fraction,
        p_max_pu: 1.0,
        marginal_cost: inflow.costs,
    });

    let discharge_name = names::storage_discharge(name);
    let eff = params.discharge_efficiency;
    let discharge = reference_capacity(scope.system, &discharge_name, &[(outflow.id, eff)], Framework::Pypsa)?;
    let marginal_cost = output_cost(scope, outflow, &discharge_name, eff);
    net.links.push(Link {
        name: discharge_name,
        bus0: private.clone(),
        bus1: params.bus.clone(),
        efficiency: eff,
        capacity: link_capacity(&discharge, 1.0),
        p_min_pu: discharge.min_fraction,
        p_max_pu: 1.0,
        marginal_cost,
    });

    let cyclic = params.soc_policy == SocPolicy::Cyclic;
    if cyclic && params.initial_soc > 0.0 {
        scope.deviate(Deviation::new(
            name,
            DeviationCause::InitialSocReleased {
                initial_soc: params.initial_soc,
            },
        ));
    }
    let (e_nom_extendable, e_nom_max, capital_cost) = match params.expansion {
        Some(x) => (true, x.max_capacity().is_finite().then_some(x.max_capacity()), x.costs()),
        None => (false, Some(capacity), 0.0),
    };
    net.stores.push(Store {
        name: name.to_string(),
        bus: private,
        e_nom: capacity,
        e_nom_extendable,
        e_nom_min: capacity,
        e_nom_max,
        e_min_pu: if capacity > 0.0 { params.capacity.min() / capacity } else { 0.0 },
        e_cyclic: cyclic,
        e_initial: params.initial_soc * capacity,
        standing_loss: hourly_loss(params.loss_rate, step_hours),
        capital_cost,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    fn transform(system: &EnergySystem) -> Transformation<PypsaNetwork> {
        PypsaAdapter
            .transform(system, &AdapterOptions::default(), &HarmonyConfig::default())
            .unwrap()
    }

    #[test]
    fn minimal_example_components() {
        let system = fixtures::minimal_example().unwrap();
        let t = transform(&system);
        assert!(t.is_exact(), "{:?}", t.deviations);

        let gas = t.native.generator("Gas Station").unwrap();
        assert!(gas.capacity.p_nom_extendable);
        assert_eq!(gas.capacity.capital_cost, 0.0);
        assert_eq!(gas.capacity.p_nom_max, None);
        assert_eq!(t.native.carrier("Gas Station").unwrap().co2_emissions, 0.2);

        let generator = t.native.link("Generator").unwrap();
        assert_eq!(generator.efficiency, 0.42);
        assert!((generator.capacity.p_nom - 15.0 / 0.42).abs() < 1e-9);

        assert_eq!(t.native.load("Demand").unwrap().p_set, vec![10.0; 5]);

        let store = t.native.store("Battery").unwrap();
        assert_eq!(store.e_initial, 5.0);
        assert!(!store.e_cyclic);
        assert!(t.native.link("Battery charge").is_some());
        assert!(t.native.link("Battery discharge").is_some());
    }

    #[test]
    fn chp_becomes_coupled_links_with_preserved_ratio() {
        let system = fixtures::chp_example().unwrap();
        let t = transform(&system);
        let power = t.native.link("CHP to Powerline").unwrap();
        let heat = t.native.link("CHP to Heatline").unwrap();
        assert!((power.efficiency - 1.4).abs() < 1e-12);
        assert!((heat.efficiency - 1.4).abs() < 1e-12);
        let coupling = &t.native.link_couplings[0];
        assert!((coupling.ratio - 0.8 / 0.6).abs() < 1e-12);

        // per unit of fuel: el = share * 1.4 = 0.8, heat = (1 - share) * 1.4 = 0.6
        let share = coupling.ratio / (1.0 + coupling.ratio);
        assert!((share * power.efficiency - 0.8).abs() < 1e-12);
        assert!(((1.0 - share) * heat.efficiency - 0.6).abs() < 1e-12);
    }

    #[test]
    fn chp_heat_emissions_move_to_gas_carrier() {
        let system = fixtures::chp_example().unwrap();
        let t = transform(&system);
        let carrier = t.native.carrier("Gas Station").unwrap();
        assert!((carrier.co2_emissions - (0.2 + 0.05 * 0.6)).abs() < 1e-12);
        let moved: Vec<_> = t.deviations_at("CHP->Heatline").collect();
        assert_eq!(moved.len(), 1);
        assert!(matches!(moved[0].cause, DeviationCause::EmissionReallocated { .. }));
        assert!(moved[0].cause.is_lossless());
    }

    #[test]
    fn expandable_generator_pins_original_capacity() {
        let system = fixtures::expansion_example(40.0).unwrap();
        let t = transform(&system);
        let wind = t.native.generator("Wind").unwrap();
        assert!(wind.capacity.p_nom_extendable);
        assert_eq!(wind.capacity.p_nom_min, 5.0);
        assert_eq!(wind.capacity.p_nom_max, Some(50.0));
        assert_eq!(wind.capacity.sunk_costs(), 200.0);
    }

    #[test]
    fn connectors_become_two_links() {
        let system = fixtures::connector_example().unwrap();
        let t = transform(&system);
        let fwd = t.native.link("Tie (North to South)").unwrap();
        assert_eq!(fwd.bus0, "North");
        assert_eq!(fwd.efficiency, 0.9);
        assert!(t.native.link("Tie (South to North)").is_some());
        assert!(t.is_exact());
    }

    #[test]
    fn cyclic_store_releases_initial_level() {
        let mut b = esh_model::SystemBuilder::new(
            "cyclic",
            esh_model::Timeframe::hourly(system_start(), 3).unwrap(),
        );
        b.add_node(esh_model::Component::bus("Powerline")).unwrap();
        b.add_node(esh_model::Component::source("Grid")).unwrap();
        let params = StorageParams::new("Powerline", esh_model::Bounds::up_to(4.0).unwrap())
            .initial_soc(0.25)
            .soc_policy(SocPolicy::Cyclic)
            .loss_rate(0.19);
        b.add_node(esh_model::Component::storage("Battery", params)).unwrap();
        b.connect(esh_model::FlowSpec::new("Grid", "Powerline")).unwrap();
        b.connect(esh_model::FlowSpec::new("Powerline", "Battery")).unwrap();
        b.connect(esh_model::FlowSpec::new("Battery", "Powerline")).unwrap();
        let system = b.build().unwrap();

        let t = transform(&system);
        let store = t.native.store("Battery").unwrap();
        assert!(store.e_cyclic);
        assert_eq!(store.e_initial, 1.0);
        assert!((store.standing_loss - 0.19).abs() < 1e-12);
        assert!(matches!(
            t.deviations[0].cause,
            DeviationCause::InitialSocReleased { initial_soc } if initial_soc == 0.25
        ));
        assert!(t.native.link("Battery charge").unwrap().capacity.p_nom_extendable);
    }

    #[test]
    fn varying_efficiency_is_averaged() {
        let mut b = esh_model::SystemBuilder::new(
            "varying",
            esh_model::Timeframe::hourly(system_start(), 3).unwrap(),
        );
        b.add_node(esh_model::Component::bus("Pipeline")).unwrap();
        b.add_node(esh_model::Component::bus("Powerline")).unwrap();
        b.add_node(esh_model::Component::source("Gas Station")).unwrap();
        let mut factors = esh_model::ConversionFactors::new();
        factors.insert("Pipeline".into(), esh_model::Efficiency::constant(1.0).unwrap());
        factors.insert(
            "Powerline".into(),
            esh_model::Efficiency::varying(vec![0.4, 0.5, 0.6]).unwrap(),
        );
        b.add_node(esh_model::Component::transformer("Generator", factors)).unwrap();
        b.add_node(esh_model::Component::sink("Demand")).unwrap();
        b.connect(esh_model::FlowSpec::new("Gas Station", "Pipeline")).unwrap();
        b.connect(esh_model::FlowSpec::new("Pipeline", "Generator")).unwrap();
        b.connect(esh_model::FlowSpec::new("Generator", "Powerline")).unwrap();
        b.connect(esh_model::FlowSpec::new("Powerline", "Demand")).unwrap();
        let system = b.build().unwrap();

        let t = transform(&system);
        assert!((t.native.link("Generator").unwrap().efficiency - 0.5).abs() < 1e-12);
        let averaged: Vec<_> = t.deviations_at("Generator->Powerline").collect();
        assert_eq!(averaged.len(), 1);
        assert!(matches!(
            averaged[0].cause,
            DeviationCause::EfficiencyAveraged { mean } if (mean - 0.5).abs() < 1e-12
        ));
    }

    fn system_start() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }
}
