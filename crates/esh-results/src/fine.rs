//! FINE results: operation per component and cost contributions in the
//! model's native cost and emission units.

use std::collections::BTreeMap;

use esh_core::{HarmonyConfig, MassUnit};
use esh_model::{EnergySystem, Flow, NodeKind};
use esh_transform::fine::native::{FineCapacity, FineConversion};
use esh_transform::shared::synth::one_way_name;
use esh_transform::{FineModel, Framework};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::NormalizedResult;
use crate::readout::Readout;
use crate::resultier::{NativeResult, Resultier, ensure_optimal, finish};

type Series = BTreeMap<String, Vec<f64>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineResults {
    pub status: String,
    /// Unit of `opex` and `capex`, e.g. `1e6 EUR`.
    pub cost_unit: String,
    /// Unit emissions are accounted in.
    pub emission_unit: String,
    /// Operation rate per source, sink and conversion.
    pub operation: Series,
    pub charge: Series,
    pub discharge: Series,
    pub state_of_charge: Series,
    /// Optimized capacity of components with a capacity variable.
    pub capacity: BTreeMap<String, f64>,
    /// Operational costs per component.
    pub opex: BTreeMap<String, f64>,
    /// Annual investment on the full capacity per component.
    pub capex: BTreeMap<String, f64>,
}

/// Factors from native into declared units.
struct Scale {
    costs: f64,
    emission_unit: MassUnit,
    declared_emissions: MassUnit,
}

impl Scale {
    fn new(output: &FineResults, config: &HarmonyConfig) -> NormalizeResult<Self> {
        let costs = config
            .currency_factor(&output.cost_unit)
            .map_err(|e| NormalizeError::unit(Framework::Fine, &output.cost_unit, e))?;
        let emission_unit = output
            .emission_unit
            .parse()
            .map_err(|e| NormalizeError::unit(Framework::Fine, &output.emission_unit, e))?;
        Ok(Self {
            costs,
            emission_unit,
            declared_emissions: config.units.emissions,
        })
    }

    fn emissions(&self, value: f64) -> f64 {
        self.emission_unit.convert(value, self.declared_emissions)
    }
}

fn series<'a>(map: &'a Series, name: &str) -> NormalizeResult<&'a [f64]> {
    map.get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| NormalizeError::missing(name))
}

fn optimized(output: &FineResults, name: &str) -> NormalizeResult<f64> {
    output
        .capacity
        .get(name)
        .copied()
        .ok_or_else(|| NormalizeError::missing(format!("{name}.capacity")))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FineResultier;

impl Resultier for FineResultier {
    type Input = FineModel;
    type Output = FineResults;

    fn framework(&self) -> Framework {
        Framework::Fine
    }

    fn normalize(
        &self,
        native: &NativeResult<FineModel, FineResults>,
        system: &EnergySystem,
        config: &HarmonyConfig,
    ) -> NormalizeResult<NormalizedResult> {
        let _span = info_span!("normalize", framework = "fine", system = system.uid()).entered();
        let output = &native.output;
        ensure_optimal(Framework::Fine, &output.status)?;
        let model = native.native();
        let scale = Scale::new(output, config)?;
        let hours = model.hours_per_time_step;
        let mut readout = Readout::default();

        for node in system.nodes() {
            match &node.kind {
                NodeKind::Bus => {}
                NodeKind::Source(_) | NodeKind::Sink(_) => {
                    let component = match node.kind {
                        NodeKind::Source(_) => model.source(node.name()),
                        _ => model.sink(node.name()),
                    };
                    let (Some(component), Some(flow)) = (component, system.endpoint_flow(node)) else {
                        continue;
                    };
                    let operation = series(&output.operation, node.name())?;
                    readout.set_flow(system, flow, operation.to_vec())?;
                    readout
                        .specific_costs
                        .insert(flow.id, component.commodity_cost * scale.costs);
                    readout
                        .specific_emissions
                        .insert(flow.id, scale.emissions(component.emissions_per_operation));
                    if component.capacity.is_expandable() {
                        readout.installed.insert(flow.id, optimized(output, node.name())?);
                    }
                    let energy: f64 = operation.iter().sum::<f64>() * hours;
                    readout.emissions += scale.emissions(component.emissions_per_operation * energy);
                }
                NodeKind::Transformer(_) | NodeKind::Chp(_) => {
                    if let Some(conversion) = model.conversion(node.name()) {
                        let attached: Vec<(&Flow, &str)> = system
                            .inflows(node.id)
                            .map(|f| (f, system.name_of(f.from)))
                            .chain(system.outflows(node.id).map(|f| (f, system.name_of(f.to))))
                            .collect();
                        conversion_flows(system, output, &scale, conversion, &attached, hours, &mut readout)?;
                    }
                }
                NodeKind::Connector(_) => {
                    for input in system.inflows(node.id) {
                        let from = system.name_of(input.from);
                        let Some(leg_output) = system
                            .outflows(node.id)
                            .find(|f| system.name_of(f.to) != from)
                        else {
                            continue;
                        };
                        let to = system.name_of(leg_output.to);
                        if let Some(conversion) = model.conversion(&one_way_name(node.name(), from, to)) {
                            let attached = [(input, from), (leg_output, to)];
                            conversion_flows(system, output, &scale, conversion, &attached, hours, &mut readout)?;
                        }
                    }
                }
                NodeKind::Storage(_) => {
                    let Some(storage) = model.storage(node.name()) else {
                        continue;
                    };
                    let (Some(inflow), Some(outflow)) =
                        (system.inflows(node.id).next(), system.outflows(node.id).next())
                    else {
                        continue;
                    };
                    readout.set_flow(system, inflow, series(&output.charge, node.name())?.to_vec())?;
                    readout.set_flow(system, outflow, series(&output.discharge, node.name())?.to_vec())?;
                    readout.set_soc(system, node.id, series(&output.state_of_charge, node.name())?.to_vec())?;
                    if storage.capacity.is_expandable() {
                        readout
                            .storage_installed
                            .insert(node.id, optimized(output, node.name())?);
                    }
                }
            }
        }

        readout.opex = output.opex.values().sum::<f64>() * scale.costs;
        let pinned: f64 = model
            .sources
            .iter()
            .chain(&model.sinks)
            .map(|c| c.capacity)
            .chain(model.conversions.iter().map(|c| c.capacity))
            .chain(model.storages.iter().map(|s| s.capacity))
            .filter(FineCapacity::is_expandable)
            .map(|cap| cap.invest_per_capacity * cap.capacity_min.unwrap_or(0.0))
            .sum();
        readout.capex = (output.capex.values().sum::<f64>() - pinned) * scale.costs;

        debug!(opex = readout.opex, capex = readout.capex, emissions = readout.emissions, "fine accounting");
        finish(system, &native.transformation, readout, config)
    }
}

/// Canonical flows `attached` to one conversion, each moving
/// `operation * |factor|` to or from its bus.
fn conversion_flows(
    system: &EnergySystem,
    output: &FineResults,
    scale: &Scale,
    conversion: &FineConversion,
    attached: &[(&Flow, &str)],
    hours: f64,
    readout: &mut Readout,
) -> NormalizeResult<()> {
    let operation = series(&output.operation, &conversion.name)?;
    for &(flow, bus) in attached {
        let Some(factor) = conversion.commodity_conversion_factors.get(bus) else {
            continue;
        };
        let factor = factor.abs();
        readout.set_flow(system, flow, operation.iter().map(|op| op * factor).collect())?;
        if flow.is_expandable() && conversion.capacity.is_expandable() {
            readout
                .installed
                .insert(flow.id, optimized(output, &conversion.name)? * factor);
        }
    }
    let energy: f64 = operation.iter().sum::<f64>() * hours;
    readout.emissions += scale.emissions(conversion.emissions_per_operation * energy);
    Ok(())
}
