//! Native solver output written from a canonical dispatch.
//!
//! Output follows each framework's reporting conventions (signs, keys,
//! units) and its cost accounting, so resultiers see what a solver would
//! have returned for that dispatch.

use std::collections::BTreeMap;

use esh_model::{EnergySystem, Flow, Node, NodeKind};
use esh_results::{
    CalliopeResults, FineResults, NativeResult, OemofResults, PypsaSolution,
    calliope::carrier_key,
    oemof::{FlowInvestment, FlowSeries},
};
use esh_transform::calliope::native::{CostClass, TechParent};
use esh_transform::fine::native::FineCapacity;
use esh_transform::pypsa::native::{Link, names};
use esh_transform::shared::synth::one_way_name;
use esh_transform::{CalliopeModel, FineModel, OemofEnergySystem, PypsaNetwork, Transformation};
use tracing::debug;

use crate::dispatch::{Dispatch, conversion_flows, endpoint, peak, storage_flows, total};

/// A native schema whose solver output can be scripted.
pub trait Script: Sized {
    type Output;

    fn script(transformation: &Transformation<Self>, system: &EnergySystem, dispatch: &Dispatch) -> Self::Output;
}

/// The transformation snapshot together with its scripted output.
pub fn scripted<N: Script + Clone>(
    transformation: &Transformation<N>,
    system: &EnergySystem,
    dispatch: &Dispatch,
) -> NativeResult<N, N::Output> {
    let output = N::script(transformation, system, dispatch);
    NativeResult::new(transformation.clone(), output)
}

impl Script for OemofEnergySystem {
    type Output = OemofResults;

    fn script(t: &Transformation<Self>, system: &EnergySystem, dispatch: &Dispatch) -> OemofResults {
        let model = &t.native;
        let hours = system.timeframe().step_hours();
        let mut out = OemofResults {
            termination_condition: "optimal".into(),
            ..OemofResults::default()
        };

        for (from, to, params) in model.flows() {
            let values = dispatch.between(from, to);
            out.objective += params.variable_costs * total(&values) * hours;
            if let Some(investment) = params.investment {
                let installed = system
                    .flow_between(from, to)
                    .and_then(|f| dispatch.installed(system, f))
                    .unwrap_or_else(|| investment.existing.max(peak(&values)));
                let invest = (installed - investment.existing).max(0.0);
                out.objective += investment.ep_costs * invest;
                out.flow_investments.push(FlowInvestment {
                    from: from.to_string(),
                    to: to.to_string(),
                    invest,
                });
            }
            out.flows.push(FlowSeries {
                from: from.to_string(),
                to: to.to_string(),
                values,
            });
        }

        for storage in &model.storages {
            let content = dispatch.soc(&storage.label);
            if let Some(investment) = storage.investment {
                let installed = dispatch
                    .storage_installed(&storage.label)
                    .unwrap_or_else(|| investment.existing.max(peak(&content)));
                let invest = (installed - investment.existing).max(0.0);
                out.objective += investment.ep_costs * invest;
                out.storage_invest.insert(storage.label.clone(), invest);
            }
            out.storage_content.insert(storage.label.clone(), content);
        }

        debug!(objective = out.objective, flows = out.flows.len(), "scripted oemof results");
        out
    }
}

/// `(p0, p1)` of a link, `p1` negative.
fn link_dispatch(system: &EnergySystem, dispatch: &Dispatch, link: &Link) -> (Vec<f64>, Vec<f64>) {
    let withdrawn = |p0: Vec<f64>| -> (Vec<f64>, Vec<f64>) {
        let p1 = p0.iter().map(|p| -p * link.efficiency).collect();
        (p0, p1)
    };
    let delivering = |out: Vec<f64>| -> (Vec<f64>, Vec<f64>) {
        let p0 = out
            .iter()
            .map(|p| if link.efficiency > 0.0 { p / link.efficiency } else { 0.0 })
            .collect();
        (p0, out.iter().map(|p| -p).collect())
    };

    for node in system.nodes() {
        let name = node.name();
        match &node.kind {
            NodeKind::Transformer(_) | NodeKind::Chp(_) => {
                if link.name == name {
                    let p0 = system.inflows(node.id).next().map(|f| dispatch.flow(system, f));
                    let out = system.outflows(node.id).next().map(|f| dispatch.flow(system, f));
                    if let (Some(p0), Some(out)) = (p0, out) {
                        return (p0, out.iter().map(|p| -p).collect());
                    }
                }
                for out in system.outflows(node.id) {
                    if names::conversion_link(name, system.name_of(out.to)) == link.name {
                        return delivering(dispatch.flow(system, out));
                    }
                }
            }
            NodeKind::Storage(_) => {
                let (inflow, outflow) = storage_flows(system, name);
                if names::storage_charge(name) == link.name
                    && let Some(inflow) = inflow
                {
                    return withdrawn(dispatch.flow(system, inflow));
                }
                if names::storage_discharge(name) == link.name
                    && let Some(outflow) = outflow
                {
                    return delivering(dispatch.flow(system, outflow));
                }
            }
            NodeKind::Connector(_) => {
                for input in system.inflows(node.id) {
                    let from = system.name_of(input.from);
                    if let Some(output) = system.outflows(node.id).find(|f| system.name_of(f.to) != from)
                        && one_way_name(name, from, system.name_of(output.to)) == link.name
                    {
                        let delivered = dispatch.flow(system, output);
                        return (dispatch.flow(system, input), delivered.iter().map(|p| -p).collect());
                    }
                }
            }
            _ => {}
        }
    }
    (dispatch.zeros(), dispatch.zeros())
}

impl Script for PypsaNetwork {
    type Output = PypsaSolution;

    fn script(t: &Transformation<Self>, system: &EnergySystem, dispatch: &Dispatch) -> PypsaSolution {
        let net = &t.native;
        let w = net.snapshot_weighting;
        let mut out = PypsaSolution {
            status: "ok".into(),
            termination_condition: "optimal".into(),
            ..PypsaSolution::default()
        };

        for generator in &net.generators {
            let flow = endpoint(system, &generator.name);
            let p = flow.map_or_else(|| dispatch.zeros(), |f| dispatch.flow(system, f));
            out.objective += generator.marginal_cost * total(&p) * w;
            let capacity = generator.capacity;
            if capacity.p_nom_extendable {
                let opt = flow
                    .and_then(|f| dispatch.installed(system, f))
                    .unwrap_or_else(|| capacity.p_nom_min.max(peak(&p)));
                out.objective += capacity.capital_cost * opt;
                out.generators_p_nom_opt.insert(generator.name.clone(), opt);
            }
            out.generators_p.insert(generator.name.clone(), p);
        }

        for load in &net.loads {
            let p = endpoint(system, &load.name).map_or_else(|| load.p_set.clone(), |f| dispatch.flow(system, f));
            out.loads_p.insert(load.name.clone(), p);
        }

        for link in &net.links {
            let (p0, p1) = link_dispatch(system, dispatch, link);
            out.objective += link.marginal_cost * total(&p0) * w;
            if link.capacity.p_nom_extendable {
                let opt = link.capacity.p_nom_min.max(peak(&p0));
                out.objective += link.capacity.capital_cost * opt;
                out.links_p_nom_opt.insert(link.name.clone(), opt);
            }
            out.links_p0.insert(link.name.clone(), p0);
            out.links_p1.insert(link.name.clone(), p1);
        }

        for store in &net.stores {
            let e = dispatch.soc(&store.name);
            if store.e_nom_extendable {
                let opt = dispatch
                    .storage_installed(&store.name)
                    .unwrap_or_else(|| store.e_nom_min.max(peak(&e)));
                out.objective += store.capital_cost * opt;
                out.stores_e_nom_opt.insert(store.name.clone(), opt);
            }
            out.stores_e.insert(store.name.clone(), e);
        }

        debug!(objective = out.objective, links = out.links_p0.len(), "scripted pypsa solution");
        out
    }
}

/// Capacity FINE reports for a component, in units of its operation.
fn fine_capacity(capacity: FineCapacity, installed: Option<f64>, peak_operation: f64) -> Option<f64> {
    if !capacity.has_capacity_variable {
        return None;
    }
    Some(
        capacity
            .capacity_fix
            .or(installed)
            .unwrap_or_else(|| capacity.capacity_min.unwrap_or(0.0).max(peak_operation)),
    )
}

fn fine_invest(out: &mut FineResults, name: &str, capacity: FineCapacity, value: Option<f64>) {
    if let Some(value) = value {
        out.capacity.insert(name.to_string(), value);
        if capacity.is_expandable() {
            out.capex.insert(name.to_string(), capacity.invest_per_capacity * value);
        }
    }
}

impl Script for FineModel {
    type Output = FineResults;

    fn script(t: &Transformation<Self>, system: &EnergySystem, dispatch: &Dispatch) -> FineResults {
        let model = &t.native;
        let hours = model.hours_per_time_step;
        let mut out = FineResults {
            status: "optimal".into(),
            cost_unit: model.cost_unit.clone(),
            emission_unit: model.emission_unit.clone(),
            ..FineResults::default()
        };

        for component in model.sources.iter().chain(&model.sinks) {
            let flow = endpoint(system, &component.name);
            let operation = flow.map_or_else(|| dispatch.zeros(), |f| dispatch.flow(system, f));
            let installed = flow.and_then(|f| dispatch.installed(system, f));
            let value = fine_capacity(component.capacity, installed, peak(&operation));
            fine_invest(&mut out, &component.name, component.capacity, value);
            out.opex.insert(
                component.name.clone(),
                component.commodity_cost * total(&operation) * hours,
            );
            out.operation.insert(component.name.clone(), operation);
        }

        for conversion in &model.conversions {
            let attached = conversion_flows(system, &conversion.name);
            // inputs come from a bus, outputs go to one
            let bus_of = |flow: &Flow| {
                if system.node(flow.from).is_some_and(Node::is_bus) {
                    system.name_of(flow.from)
                } else {
                    system.name_of(flow.to)
                }
            };
            let reference = attached
                .iter()
                .find(|&&f| bus_of(f) == conversion.physical_unit)
                .or_else(|| attached.first())
                .copied();
            let factor_of = |flow: &Flow| {
                conversion
                    .commodity_conversion_factors
                    .get(bus_of(flow))
                    .map_or(1.0, |f| f.abs())
            };
            let operation: Vec<f64> = match reference {
                Some(flow) => {
                    let factor = factor_of(flow);
                    dispatch.flow(system, flow).iter().map(|v| v / factor).collect()
                }
                None => dispatch.zeros(),
            };
            let installed = attached
                .iter()
                .find_map(|&f| dispatch.installed(system, f).map(|cap| cap / factor_of(f)));
            let value = fine_capacity(conversion.capacity, installed, peak(&operation));
            fine_invest(&mut out, &conversion.name, conversion.capacity, value);
            out.opex.insert(
                conversion.name.clone(),
                conversion.opex_per_operation * total(&operation) * hours,
            );
            out.operation.insert(conversion.name.clone(), operation);
        }

        for storage in &model.storages {
            let (inflow, outflow) = storage_flows(system, &storage.name);
            let charge = inflow.map_or_else(|| dispatch.zeros(), |f| dispatch.flow(system, f));
            let discharge = outflow.map_or_else(|| dispatch.zeros(), |f| dispatch.flow(system, f));
            let soc = dispatch.soc(&storage.name);
            let value = fine_capacity(storage.capacity, dispatch.storage_installed(&storage.name), peak(&soc));
            fine_invest(&mut out, &storage.name, storage.capacity, value);
            out.opex.insert(
                storage.name.clone(),
                (storage.opex_per_charge * total(&charge) + storage.opex_per_discharge * total(&discharge)) * hours,
            );
            out.charge.insert(storage.name.clone(), charge);
            out.discharge.insert(storage.name.clone(), discharge);
            out.state_of_charge.insert(storage.name.clone(), soc);
        }

        debug!(
            opex = out.opex.values().sum::<f64>(),
            capex = out.capex.values().sum::<f64>(),
            "scripted fine results"
        );
        out
    }
}

#[derive(Default)]
struct TechUse {
    produced: f64,
    consumed: f64,
    primary_peak: f64,
    installed: Option<f64>,
    storage_cap: f64,
}

impl Script for CalliopeModel {
    type Output = CalliopeResults;

    fn script(t: &Transformation<Self>, system: &EnergySystem, dispatch: &Dispatch) -> CalliopeResults {
        let model = &t.native;
        let location = model.location.as_str();
        let resolution = model.resolution;
        let mut out = CalliopeResults {
            termination_condition: "optimal".into(),
            units: model.units.clone(),
            carrier_prod: BTreeMap::new(),
            carrier_con: BTreeMap::new(),
            energy_cap: BTreeMap::new(),
            storage_cap: BTreeMap::new(),
            storage: BTreeMap::new(),
            cost_var: BTreeMap::new(),
            cost_investment: BTreeMap::new(),
        };

        for (name, tech) in &model.techs {
            let mut usage = TechUse::default();
            let mut produced: Vec<(String, Vec<f64>, bool)> = Vec::new();
            let mut consumed: Vec<(String, Vec<f64>)> = Vec::new();

            match tech.parent {
                TechParent::Supply => {
                    if let (Some(flow), Some(carrier)) = (endpoint(system, name), tech.carrier_out.as_deref()) {
                        usage.installed = dispatch.installed(system, flow);
                        produced.push((carrier.to_string(), dispatch.flow(system, flow), true));
                    }
                }
                TechParent::Demand => {
                    if let (Some(flow), Some(carrier)) = (endpoint(system, name), tech.carrier_in.as_deref()) {
                        let values = dispatch.flow(system, flow);
                        usage.installed = dispatch.installed(system, flow);
                        usage.primary_peak = peak(&values);
                        consumed.push((carrier.to_string(), values));
                    }
                }
                TechParent::Conversion | TechParent::ConversionPlus => {
                    for flow in conversion_flows(system, name) {
                        let from = system.name_of(flow.from);
                        let to = system.name_of(flow.to);
                        let values = dispatch.flow(system, flow);
                        if tech.carrier_in.as_deref() == Some(from) {
                            consumed.push((from.to_string(), values));
                        } else if tech.carrier_out.as_deref() == Some(to) {
                            usage.installed = dispatch.installed(system, flow);
                            produced.push((to.to_string(), values, true));
                        } else if tech.carrier_out_2.as_deref() == Some(to) {
                            produced.push((to.to_string(), values, false));
                        }
                    }
                }
                TechParent::Storage => {
                    let (inflow, outflow) = storage_flows(system, name);
                    if let Some(carrier) = tech.carrier.as_deref() {
                        if let Some(inflow) = inflow {
                            consumed.push((carrier.to_string(), dispatch.flow(system, inflow)));
                        }
                        if let Some(outflow) = outflow {
                            usage.installed = dispatch.installed(system, outflow);
                            produced.push((carrier.to_string(), dispatch.flow(system, outflow), true));
                        }
                    }
                    let soc = dispatch.soc(name);
                    let c = &tech.constraints;
                    usage.storage_cap = c
                        .storage_cap_equals
                        .or(dispatch.storage_installed(name))
                        .unwrap_or_else(|| c.storage_cap_min.unwrap_or(0.0).max(peak(&soc)));
                    out.storage_cap.insert(name.clone(), usage.storage_cap);
                    out.storage.insert(name.clone(), soc);
                }
            }

            for (carrier, values, primary) in produced {
                if primary {
                    usage.produced += total(&values) * resolution;
                    usage.primary_peak = peak(&values);
                }
                out.carrier_prod.insert(carrier_key(location, name, &carrier), values);
            }
            for (carrier, values) in consumed {
                usage.consumed += total(&values) * resolution;
                out.carrier_con
                    .insert(carrier_key(location, name, &carrier), values.iter().map(|v| -v).collect());
            }

            let c = &tech.constraints;
            let energy_cap = c
                .energy_cap_equals
                .or(usage.installed)
                .unwrap_or_else(|| c.energy_cap_min.unwrap_or(0.0).max(usage.primary_peak));
            out.energy_cap.insert(name.clone(), energy_cap);

            for class in CostClass::ALL {
                let costs = tech.costs(class);
                let variable = costs.om_prod * usage.produced + costs.om_con * usage.consumed;
                let investment = costs.energy_cap * energy_cap + costs.storage_cap * usage.storage_cap;
                out.cost_var.entry(class).or_default().insert(name.clone(), variable);
                out.cost_investment
                    .entry(class)
                    .or_default()
                    .insert(name.clone(), investment);
            }
        }

        debug!(techs = model.techs.len(), "scripted calliope results");
        out
    }
}
