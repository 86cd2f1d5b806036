//! Calliope results: carrier production and consumption per
//! `location::tech::carrier`, capacities and costs per class and tech.

use std::collections::BTreeMap;

use esh_core::{CoreError, EnergyUnit, HarmonyConfig, MassUnit, PowerUnit};
use esh_model::{EnergySystem, Flow, NodeKind};
use esh_transform::calliope::native::{CalliopeUnits, CostClass, Tech, TechParent};
use esh_transform::shared::synth::one_way_name;
use esh_transform::{CalliopeModel, Framework};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::NormalizedResult;
use crate::readout::Readout;
use crate::resultier::{NativeResult, Resultier, ensure_optimal, finish};

type Series = BTreeMap<String, Vec<f64>>;

/// Key of a carrier series.
pub fn carrier_key(location: &str, tech: &str, carrier: &str) -> String {
    format!("{location}::{tech}::{carrier}")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalliopeResults {
    pub termination_condition: String,
    /// Units the results are reported in.
    pub units: CalliopeUnits,
    /// Non-negative production.
    pub carrier_prod: Series,
    /// Non-positive consumption.
    pub carrier_con: Series,
    pub energy_cap: BTreeMap<String, f64>,
    pub storage_cap: BTreeMap<String, f64>,
    /// Stored energy per storage tech.
    pub storage: Series,
    pub cost_var: BTreeMap<CostClass, BTreeMap<String, f64>>,
    /// Investment on the full optimized capacity.
    pub cost_investment: BTreeMap<CostClass, BTreeMap<String, f64>>,
}

impl CalliopeResults {
    fn total(map: &BTreeMap<CostClass, BTreeMap<String, f64>>, class: CostClass) -> f64 {
        map.get(&class).map_or(0.0, |by_tech| by_tech.values().sum())
    }
}

struct Scale {
    power: f64,
    energy: f64,
    money: f64,
    emissions: f64,
}

impl Scale {
    fn new(units: &CalliopeUnits, config: &HarmonyConfig) -> NormalizeResult<Self> {
        let power: PowerUnit = units.power.parse().map_err(unit_error(&units.power))?;
        let energy: EnergyUnit = units.energy.parse().map_err(unit_error(&units.energy))?;
        let emissions: MassUnit = units.emissions.parse().map_err(unit_error(&units.emissions))?;
        let money = config
            .currency_factor(&units.monetary)
            .map_err(unit_error(&units.monetary))?;
        let declared = &config.units;
        Ok(Self {
            power: power.convert(1.0, declared.power),
            energy: energy.convert(1.0, declared.energy),
            money,
            emissions: emissions.convert(1.0, declared.emissions),
        })
    }
}

fn unit_error(unit: &str) -> impl FnOnce(CoreError) -> NormalizeError + '_ {
    move |e| NormalizeError::unit(Framework::Calliope, unit, e)
}

struct Lookup<'a> {
    output: &'a CalliopeResults,
    location: &'a str,
    scale: &'a Scale,
}

impl Lookup<'_> {
    fn prod(&self, tech: &str, carrier: Option<&str>) -> NormalizeResult<Vec<f64>> {
        self.carrier(&self.output.carrier_prod, tech, carrier, 1.0)
    }

    fn con(&self, tech: &str, carrier: Option<&str>) -> NormalizeResult<Vec<f64>> {
        self.carrier(&self.output.carrier_con, tech, carrier, -1.0)
    }

    fn carrier(&self, map: &Series, tech: &str, carrier: Option<&str>, sign: f64) -> NormalizeResult<Vec<f64>> {
        let key = carrier_key(self.location, tech, carrier.unwrap_or_default());
        let values = map.get(&key).ok_or_else(|| NormalizeError::missing(key.as_str()))?;
        Ok(values.iter().map(|v| sign * v * self.scale.power).collect())
    }

    fn energy_cap(&self, tech: &str) -> NormalizeResult<f64> {
        self.output
            .energy_cap
            .get(tech)
            .map(|v| v * self.scale.power)
            .ok_or_else(|| NormalizeError::missing(format!("{tech}.energy_cap")))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CalliopeResultier;

impl Resultier for CalliopeResultier {
    type Input = CalliopeModel;
    type Output = CalliopeResults;

    fn framework(&self) -> Framework {
        Framework::Calliope
    }

    fn normalize(
        &self,
        native: &NativeResult<CalliopeModel, CalliopeResults>,
        system: &EnergySystem,
        config: &HarmonyConfig,
    ) -> NormalizeResult<NormalizedResult> {
        let _span = info_span!("normalize", framework = "calliope", system = system.uid()).entered();
        let output = &native.output;
        ensure_optimal(Framework::Calliope, &output.termination_condition)?;
        let model = native.native();
        let scale = Scale::new(&output.units, config)?;
        let lookup = Lookup {
            output,
            location: &model.location,
            scale: &scale,
        };
        let mut readout = Readout::default();

        for node in system.nodes() {
            let name = node.name();
            match &node.kind {
                NodeKind::Bus => {}
                NodeKind::Source(_) | NodeKind::Sink(_) => {
                    let (Some(tech), Some(flow)) = (model.tech(name), system.endpoint_flow(node)) else {
                        continue;
                    };
                    let (values, monetary, emissions) = match tech.parent {
                        TechParent::Supply => (
                            lookup.prod(name, tech.carrier_out.as_deref())?,
                            tech.costs(CostClass::Monetary).om_prod,
                            tech.costs(CostClass::Emissions).om_prod,
                        ),
                        _ => (
                            lookup.con(name, tech.carrier_in.as_deref())?,
                            tech.costs(CostClass::Monetary).om_con,
                            tech.costs(CostClass::Emissions).om_con,
                        ),
                    };
                    readout.set_flow(system, flow, values)?;
                    readout.specific_costs.insert(flow.id, monetary);
                    readout.specific_emissions.insert(flow.id, emissions);
                    if flow.is_expandable() {
                        readout.installed.insert(flow.id, lookup.energy_cap(name)?);
                    }
                }
                NodeKind::Transformer(_) | NodeKind::Chp(_) => {
                    let Some(tech) = model.tech(name) else {
                        continue;
                    };
                    let attached: Vec<&Flow> = system.inflows(node.id).chain(system.outflows(node.id)).collect();
                    conversion_flows(system, &lookup, name, tech, &attached, &mut readout)?;
                }
                NodeKind::Connector(_) => {
                    for input in system.inflows(node.id) {
                        let from = system.name_of(input.from);
                        let Some(leg_output) = system.outflows(node.id).find(|f| system.name_of(f.to) != from)
                        else {
                            continue;
                        };
                        let leg = one_way_name(name, from, system.name_of(leg_output.to));
                        if let Some(tech) = model.tech(&leg) {
                            conversion_flows(system, &lookup, &leg, tech, &[input, leg_output], &mut readout)?;
                        }
                    }
                }
                NodeKind::Storage(_) => {
                    let Some(tech) = model.tech(name) else {
                        continue;
                    };
                    let carrier = tech.carrier.as_deref();
                    if let Some(inflow) = system.inflows(node.id).next() {
                        readout.set_flow(system, inflow, lookup.con(name, carrier)?)?;
                        if inflow.is_expandable() {
                            readout.installed.insert(inflow.id, lookup.energy_cap(name)?);
                        }
                    }
                    if let Some(outflow) = system.outflows(node.id).next() {
                        readout.set_flow(system, outflow, lookup.prod(name, carrier)?)?;
                        if outflow.is_expandable() {
                            readout.installed.insert(outflow.id, lookup.energy_cap(name)?);
                        }
                    }
                    let stored = output.storage.get(name).ok_or_else(|| NormalizeError::missing(name))?;
                    readout.set_soc(system, node.id, stored.iter().map(|v| v * scale.energy).collect())?;
                    if tech.constraints.storage_cap_equals.is_none() {
                        let cap = output
                            .storage_cap
                            .get(name)
                            .ok_or_else(|| NormalizeError::missing(format!("{name}.storage_cap")))?;
                        readout.storage_installed.insert(node.id, cap * scale.energy);
                    }
                }
            }
        }

        readout.opex = CalliopeResults::total(&output.cost_var, CostClass::Monetary) * scale.money;
        readout.emissions = (CalliopeResults::total(&output.cost_var, CostClass::Emissions)
            + CalliopeResults::total(&output.cost_investment, CostClass::Emissions))
            * scale.emissions;
        let pinned: f64 = model.techs.values().map(pinned_investment).sum();
        readout.capex =
            (CalliopeResults::total(&output.cost_investment, CostClass::Monetary) - pinned) * scale.money;

        debug!(opex = readout.opex, capex = readout.capex, emissions = readout.emissions, "calliope accounting");
        finish(system, &native.transformation, readout, config)
    }
}

/// Investment in the capacity pinned by `*_cap_min`, already present.
fn pinned_investment(tech: &Tech) -> f64 {
    let costs = tech.costs(CostClass::Monetary);
    let c = &tech.constraints;
    costs.energy_cap * c.energy_cap_min.unwrap_or(0.0) + costs.storage_cap * c.storage_cap_min.unwrap_or(0.0)
}

/// Flows of a conversion tech: the input is consumed from `carrier_in`,
/// outputs are produced on `carrier_out` and `carrier_out_2`.
fn conversion_flows(
    system: &EnergySystem,
    lookup: &Lookup<'_>,
    name: &str,
    tech: &Tech,
    attached: &[&Flow],
    readout: &mut Readout,
) -> NormalizeResult<()> {
    for &flow in attached {
        let to = system.name_of(flow.to);
        let from = system.name_of(flow.from);
        let values = if tech.carrier_in.as_deref() == Some(from) {
            lookup.con(name, Some(from))?
        } else if tech.carrier_out.as_deref() == Some(to) {
            let values = lookup.prod(name, Some(to))?;
            if flow.is_expandable() {
                readout.installed.insert(flow.id, lookup.energy_cap(name)?);
            }
            values
        } else if tech.carrier_out_2.as_deref() == Some(to) {
            lookup.prod(name, Some(to))?
        } else {
            continue;
        };
        readout.set_flow(system, flow, values)?;
    }
    Ok(())
}
