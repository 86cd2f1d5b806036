//! PyPSA results: component-wise dispatch and optimized capacities.
//!
//! Link withdrawals `p0` are positive and deliveries `p1` negative, as
//! PyPSA reports them. Canonical edges are recovered from the component
//! names the adapter assigned.

use std::collections::BTreeMap;

use esh_core::HarmonyConfig;
use esh_model::{EnergySystem, Flow, Node, NodeKind};
use esh_transform::pypsa::native::{Link, names};
use esh_transform::shared::synth::one_way_name;
use esh_transform::{Framework, PypsaNetwork};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::NormalizedResult;
use crate::readout::Readout;
use crate::resultier::{NativeResult, Resultier, ensure_optimal, finish};

type Series = BTreeMap<String, Vec<f64>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PypsaSolution {
    pub status: String,
    pub termination_condition: String,
    pub objective: f64,
    pub generators_p: Series,
    pub generators_p_nom_opt: BTreeMap<String, f64>,
    pub loads_p: Series,
    pub links_p0: Series,
    pub links_p1: Series,
    pub links_p_nom_opt: BTreeMap<String, f64>,
    pub stores_e: Series,
    pub stores_e_nom_opt: BTreeMap<String, f64>,
}

fn series<'a>(map: &'a Series, name: &str) -> NormalizeResult<&'a [f64]> {
    map.get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| NormalizeError::missing(name))
}

fn scalar(map: &BTreeMap<String, f64>, name: &str) -> NormalizeResult<f64> {
    map.get(name)
        .copied()
        .ok_or_else(|| NormalizeError::missing(format!("{name}.p_nom_opt")))
}

fn delivered(output: &PypsaSolution, link: &str) -> NormalizeResult<Vec<f64>> {
    Ok(series(&output.links_p1, link)?.iter().map(|v| -v).collect())
}

/// A link together with how one canonical edge scales with its `p0`.
struct Member<'a> {
    link: &'a Link,
    ratio: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PypsaResultier;

impl Resultier for PypsaResultier {
    type Input = PypsaNetwork;
    type Output = PypsaSolution;

    fn framework(&self) -> Framework {
        Framework::Pypsa
    }

    fn normalize(
        &self,
        native: &NativeResult<PypsaNetwork, PypsaSolution>,
        system: &EnergySystem,
        config: &HarmonyConfig,
    ) -> NormalizeResult<NormalizedResult> {
        let _span = info_span!("normalize", framework = "pypsa", system = system.uid()).entered();
        let output = &native.output;
        ensure_optimal(Framework::Pypsa, &output.termination_condition)?;
        let net = native.native();
        let mut readout = Readout::default();

        for node in system.nodes() {
            match &node.kind {
                NodeKind::Bus => {}
                NodeKind::Source(_) | NodeKind::Sink(_) => endpoint(system, net, output, node, &mut readout)?,
                NodeKind::Transformer(_) | NodeKind::Chp(_) => {
                    conversion(system, net, output, node, &mut readout)?
                }
                NodeKind::Storage(_) => storage(system, net, output, node, &mut readout)?,
                NodeKind::Connector(_) => {
                    for input in system.inflows(node.id) {
                        let from = system.name_of(input.from);
                        let Some(output_flow) = system
                            .outflows(node.id)
                            .find(|f| system.name_of(f.to) != from)
                        else {
                            continue;
                        };
                        let name = one_way_name(node.name(), from, system.name_of(output_flow.to));
                        if net.link(&name).is_none() {
                            continue;
                        }
                        readout.set_flow(system, input, series(&output.links_p0, &name)?.to_vec())?;
                        readout.set_flow(system, output_flow, delivered(output, &name)?)?;
                    }
                }
            }
        }

        let w = net.snapshot_weighting;
        for generator in &net.generators {
            let p: f64 = series(&output.generators_p, &generator.name)?.iter().sum();
            readout.opex += generator.marginal_cost * p * w;
            if generator.sign > 0.0 {
                let co2 = net.carrier(&generator.carrier).map_or(0.0, |c| c.co2_emissions);
                readout.emissions += co2 * p * w;
            }
            if generator.capacity.p_nom_extendable && generator.capacity.capital_cost > 0.0 {
                let opt = scalar(&output.generators_p_nom_opt, &generator.name)?;
                readout.capex += generator.capacity.capital_cost * opt - generator.capacity.sunk_costs();
            }
        }
        for link in &net.links {
            let p0: f64 = series(&output.links_p0, &link.name)?.iter().sum();
            readout.opex += link.marginal_cost * p0 * w;
            if link.capacity.p_nom_extendable && link.capacity.capital_cost > 0.0 {
                let opt = scalar(&output.links_p_nom_opt, &link.name)?;
                readout.capex += link.capacity.capital_cost * opt - link.capacity.sunk_costs();
            }
        }
        for store in &net.stores {
            if store.e_nom_extendable && store.capital_cost > 0.0 {
                let opt = scalar(&output.stores_e_nom_opt, &store.name)?;
                readout.capex += store.capital_cost * (opt - store.e_nom_min);
            }
        }

        debug!(objective = output.objective, opex = readout.opex, capex = readout.capex, "pypsa accounting");
        finish(system, &native.transformation, readout, config)
    }
}

fn endpoint(
    system: &EnergySystem,
    net: &PypsaNetwork,
    output: &PypsaSolution,
    node: &Node,
    readout: &mut Readout,
) -> NormalizeResult<()> {
    let Some(flow) = system.endpoint_flow(node) else {
        return Ok(());
    };
    if net.load(node.name()).is_some() {
        return readout.set_flow(system, flow, series(&output.loads_p, node.name())?.to_vec());
    }
    let Some(generator) = net.generator(node.name()) else {
        return Ok(());
    };
    readout.set_flow(system, flow, series(&output.generators_p, node.name())?.to_vec())?;
    readout.specific_costs.insert(flow.id, generator.marginal_cost);
    if generator.sign > 0.0 {
        let co2 = net.carrier(&generator.carrier).map_or(0.0, |c| c.co2_emissions);
        readout.specific_emissions.insert(flow.id, co2);
    }
    if flow.is_expandable() {
        let opt = scalar(&output.generators_p_nom_opt, node.name())?;
        readout.installed.insert(flow.id, opt);
    }
    Ok(())
}

/// Optimized capacity of an expandable edge served by `members`.
fn installed(output: &PypsaSolution, members: &[Member<'_>]) -> NormalizeResult<f64> {
    members.iter().try_fold(0.0, |acc, m| {
        Ok(acc + scalar(&output.links_p_nom_opt, &m.link.name)? * m.ratio)
    })
}

fn conversion(
    system: &EnergySystem,
    net: &PypsaNetwork,
    output: &PypsaSolution,
    node: &Node,
    readout: &mut Readout,
) -> NormalizeResult<()> {
    let Some(input) = system.inflows(node.id).next() else {
        return Ok(());
    };
    let outputs: Vec<&Flow> = system.outflows(node.id).collect();

    if let Some(link) = net.link(node.name()) {
        let [out] = outputs.as_slice() else {
            return Err(NormalizeError::missing(node.name()));
        };
        readout.set_flow(system, input, series(&output.links_p0, &link.name)?.to_vec())?;
        readout.set_flow(system, out, delivered(output, &link.name)?)?;
        let members = [Member { link, ratio: 1.0 }];
        if input.is_expandable() {
            readout.installed.insert(input.id, installed(output, &members)?);
        }
        if out.is_expandable() {
            let members = [Member { link, ratio: link.efficiency }];
            readout.installed.insert(out.id, installed(output, &members)?);
        }
        return Ok(());
    }

    let links: Vec<(&Flow, &Link)> = outputs
        .iter()
        .filter_map(|out| {
            net.link(&names::conversion_link(node.name(), system.name_of(out.to)))
                .map(|link| (*out, link))
        })
        .collect();
    if links.is_empty() {
        // pruned
        return Ok(());
    }
    let n = system.timeframe().len();
    let mut fuel = vec![0.0; n];
    for &(out, link) in &links {
        for (f, p) in fuel.iter_mut().zip(series(&output.links_p0, &link.name)?) {
            *f += p;
        }
        readout.set_flow(system, out, delivered(output, &link.name)?)?;
    }
    readout.set_flow(system, input, fuel)?;

    // coupled links share the input in the ratio e1 : e2
    let coupling = net
        .link_couplings
        .iter()
        .find(|c| links.iter().any(|(_, l)| l.name == c.primary));
    let share = |link: &Link| match coupling {
        Some(c) if c.primary == link.name => c.ratio / (1.0 + c.ratio),
        Some(c) => 1.0 / (1.0 + c.ratio),
        None => 1.0,
    };
    if input.is_expandable() {
        let members: Vec<Member<'_>> = links.iter().map(|&(_, link)| Member { link, ratio: 1.0 }).collect();
        readout.installed.insert(input.id, installed(output, &members)?);
    }
    for &(out, link) in &links {
        if out.is_expandable() {
            let ratio = link.efficiency * share(link);
            let members: Vec<Member<'_>> = links.iter().map(|&(_, l)| Member { link: l, ratio }).collect();
            readout.installed.insert(out.id, installed(output, &members)?);
        }
    }
    Ok(())
}

fn storage(
    system: &EnergySystem,
    net: &PypsaNetwork,
    output: &PypsaSolution,
    node: &Node,
    readout: &mut Readout,
) -> NormalizeResult<()> {
    let name = node.name();
    let Some(store) = net.store(name) else {
        return Ok(());
    };
    let charge_name = names::storage_charge(name);
    let discharge_name = names::storage_discharge(name);
    let (Some(charge), Some(discharge)) = (net.link(&charge_name), net.link(&discharge_name)) else {
        return Err(NormalizeError::missing(name));
    };

    if let Some(inflow) = system.inflows(node.id).next() {
        readout.set_flow(system, inflow, series(&output.links_p0, &charge_name)?.to_vec())?;
        if inflow.is_expandable() {
            readout.installed.insert(inflow.id, installed(output, &[Member { link: charge, ratio: 1.0 }])?);
        }
    }
    if let Some(outflow) = system.outflows(node.id).next() {
        readout.set_flow(system, outflow, delivered(output, &discharge_name)?)?;
        if outflow.is_expandable() {
            let members = [Member {
                link: discharge,
                ratio: discharge.efficiency,
            }];
            readout.installed.insert(outflow.id, installed(output, &members)?);
        }
    }
    readout.set_soc(system, node.id, series(&output.stores_e, name)?.to_vec())?;
    if store.e_nom_extendable {
        readout.storage_installed.insert(node.id, scalar(&output.stores_e_nom_opt, name)?);
    }
    Ok(())
}
