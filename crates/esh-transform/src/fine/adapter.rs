use std::collections::BTreeMap;

use esh_core::{HarmonyConfig, MassUnit};
use esh_model::{EnergySystem, Flow, Node, NodeKind, SocPolicy, StorageParams};
use tracing::{debug, info, info_span};

use super::native::*;
use crate::adapter::{Adapter, AdapterOptions, Transformation};
use crate::deviation::{Deviation, DeviationCause};
use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;
use crate::shared::bounds::unpack_bounds;
use crate::shared::capacity::{ReferenceCapacity, reference_capacity};
use crate::shared::realloc::{Position, Quantity};
use crate::shared::{Scope, hourly_loss, single_flow};

/// Scale of the native cost unit relative to the declared currency.
pub const COST_SCALE: f64 = 1e6;
/// Native emission unit.
pub const EMISSION_UNIT: MassUnit = MassUnit::Kt;

/// Adapter for the FINE schema.
#[derive(Clone, Copy, Debug, Default)]
pub struct FineAdapter;

impl Adapter for FineAdapter {
    type Input = FineModel;

    fn framework(&self) -> Framework {
        Framework::Fine
    }

    fn transform(
        &self,
        system: &EnergySystem,
        options: &AdapterOptions,
        config: &HarmonyConfig,
    ) -> TransformResult<Transformation<FineModel>> {
        let _span = info_span!("transform", framework = "fine", system = system.uid()).entered();
        let mut scope = Scope::new(system, options, Framework::Fine);
        let units = Units::new(config);

        let mut model = FineModel {
            name: system.uid().to_string(),
            locations: vec![system.uid().to_string()],
            time_steps: system.timeframe().steps().to_vec(),
            hours_per_time_step: system.timeframe().step_hours(),
            cost_unit: format!("{COST_SCALE:e} {}", config.units.currency),
            emission_unit: EMISSION_UNIT.symbol().to_string(),
            commodities: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            conversions: Vec::new(),
            storages: Vec::new(),
            co2_limit: system
                .global_constraints()
                .emissions
                .map(|limit| units.emissions(limit)),
        };

        let nodes: Vec<&Node> = scope.nodes().collect();
        for node in nodes {
            debug!(node = node.name(), kind = node.kind.name(), "mapping node");
            match &node.kind {
                NodeKind::Bus => model.commodities.push(Commodity {
                    name: node.name().to_string(),
                    unit: config.units.power.symbol().to_string(),
                }),
                NodeKind::Source(_) => {
                    let flow = single_flow(scope.outflows(node), node)?;
                    let commodity = scope.name_of(flow.to);
                    model.sources.push(endpoint(&scope, &units, node, flow, commodity)?);
                }
                NodeKind::Sink(_) => {
                    let flow = single_flow(scope.inflows(node), node)?;
                    let commodity = scope.name_of(flow.from);
                    model.sinks.push(endpoint(&scope, &units, node, flow, commodity)?);
                }
                NodeKind::Transformer(params) => {
                    let inputs = scope.inflows(node);
                    let outputs = scope.outflows(node);
                    let reference = match (inputs.as_slice(), outputs.first()) {
                        ([input], _) => *input,
                        (_, Some(output)) => *output,
                        _ => return Err(TransformError::mismatch(node.name(), "conversion without flows")),
                    };
                    let ref_bus = counterpart(&scope, node, reference);
                    let f_ref = params
                        .factor(ref_bus)
                        .ok_or_else(|| TransformError::mismatch(node.name(), "missing reference factor"))?;
                    let mut terms = Vec::new();
                    for (flow, input) in inputs
                        .iter()
                        .map(|f| (*f, true))
                        .chain(outputs.iter().map(|f| (*f, false)))
                    {
                        let bus = counterpart(&scope, node, flow);
                        let factor = params.factor(bus).ok_or_else(|| {
                            TransformError::mismatch(node.name(), format!("missing factor for '{bus}'"))
                        })?;
                        let ratio = factor.mean() / f_ref.mean();
                        if factor.is_varying() || f_ref.is_varying() {
                            scope.deviate(Deviation::new(
                                scope.label(flow),
                                DeviationCause::EfficiencyAveraged { mean: ratio },
                            ));
                        }
                        terms.push(Term { flow, ratio, input });
                    }
                    let conversion = conversion(&mut scope, &units, node.name(), reference, &terms)?;
                    model.conversions.push(conversion);
                }
                NodeKind::Chp(params) => {
                    let input = single_flow(scope.inflows(node), node)?;
                    let mut terms = vec![Term {
                        flow: input,
                        ratio: 1.0,
                        input: true,
                    }];
                    for flow in scope.outflows(node) {
                        let ratio = params
                            .efficiency_of(scope.name_of(flow.to))
                            .ok_or_else(|| TransformError::mismatch(node.name(), "output without efficiency"))?;
                        terms.push(Term {
                            flow,
                            ratio,
                            input: false,
                        });
                    }
                    let conversion = conversion(&mut scope, &units, node.name(), input, &terms)?;
                    model.conversions.push(conversion);
                }
                NodeKind::Storage(params) => {
                    let storage = storage(&scope, &units, node, params)?;
                    model.storages.push(storage);
                }
                NodeKind::Connector(params) => {
                    for leg in scope.synthesize_connector(node, params)? {
                        let (Some(input), Some(output)) = (system.flow(leg.input), system.flow(leg.output))
                        else {
                            return Err(TransformError::mismatch(node.name(), "incomplete connector"));
                        };
                        let terms = [
                            Term {
                                flow: input,
                                ratio: 1.0,
                                input: true,
                            },
                            Term {
                                flow: output,
                                ratio: leg.efficiency,
                                input: false,
                            },
                        ];
                        let conversion = conversion(&mut scope, &units, &leg.name, input, &terms)?;
                        model.conversions.push(conversion);
                    }
                }
            }
        }

        info!(
            sources = model.sources.len(),
            conversions = model.conversions.len(),
            storages = model.storages.len(),
            "fine model ready"
        );
        Ok(scope.finish(model))
    }
}

/// Conversions from declared units into the native ones.
struct Units {
    emissions: MassUnit,
}

impl Units {
    fn new(config: &HarmonyConfig) -> Self {
        Self {
            emissions: config.units.emissions,
        }
    }

    fn costs(&self, value: f64) -> f64 {
        value / COST_SCALE
    }

    fn emissions(&self, value: f64) -> f64 {
        self.emissions.convert(value, EMISSION_UNIT)
    }

    fn capacity(&self, cap: &ReferenceCapacity) -> FineCapacity {
        match (cap.expansion, cap.nominal) {
            (Some(x), _) => FineCapacity::expandable(x.original, x.max_capacity, self.costs(x.costs)),
            (None, Some(nominal)) => FineCapacity::fixed(nominal),
            (None, None) => FineCapacity::none(),
        }
    }
}

/// Bus on the other side of `flow` as seen from `node`.
fn counterpart<'a>(scope: &Scope<'a>, node: &Node, flow: &Flow) -> &'a str {
    if flow.from == node.id {
        scope.name_of(flow.to)
    } else {
        scope.name_of(flow.from)
    }
}

fn endpoint(
    scope: &Scope<'_>,
    units: &Units,
    node: &Node,
    flow: &Flow,
    commodity: &str,
) -> TransformResult<FineSourceSink> {
    let bounds = unpack_bounds(scope.system, flow)?;
    let no_minimum = || {
        if bounds.has_positive_minimum() {
            Err(TransformError::mismatch(
                scope.label(flow),
                "sources and sinks have no minimum operation rate",
            ))
        } else {
            Ok(())
        }
    };
    let (capacity, operation_rate_fix, operation_rate_max) = match (flow.expansion, bounds.nominal) {
        (Some(x), _) => {
            no_minimum()?;
            let capacity = FineCapacity::expandable(
                flow.original_capacity(),
                x.max_capacity(),
                units.costs(x.costs()),
            );
            (capacity, None, Some(bounds.max.clone()))
        }
        (None, Some(_)) if bounds.is_fixed() => (FineCapacity::none(), bounds.absolute_max(), None),
        (None, Some(nominal)) => {
            no_minimum()?;
            (FineCapacity::fixed(nominal), None, Some(bounds.max.clone()))
        }
        (None, None) => (FineCapacity::none(), None, None),
    };
    Ok(FineSourceSink {
        name: node.name().to_string(),
        commodity: commodity.to_string(),
        capacity,
        commodity_cost: units.costs(flow.costs),
        emissions_per_operation: units.emissions(flow.emissions),
        operation_rate_fix,
        operation_rate_max,
    })
}

/// One attached flow of a conversion, `ratio` units per unit of operation.
struct Term<'a> {
    flow: &'a Flow,
    ratio: f64,
    input: bool,
}

/// Conversion operated in units of `reference`.
///
/// Costs and emissions of the other attached flows are folded into the
/// per-operation values and reported.
fn conversion(
    scope: &mut Scope<'_>,
    units: &Units,
    name: &str,
    reference: &Flow,
    terms: &[Term<'_>],
) -> TransformResult<FineConversion> {
    let members: Vec<_> = terms.iter().map(|t| (t.flow.id, t.ratio)).collect();
    let cap = reference_capacity(scope.system, name, &members, Framework::Fine)?;

    let mut factors = BTreeMap::new();
    let mut opex = 0.0;
    let mut emissions = 0.0;
    for term in terms {
        let bus = if term.input {
            scope.name_of(term.flow.from)
        } else {
            scope.name_of(term.flow.to)
        };
        let sign = if term.input { -1.0 } else { 1.0 };
        factors.insert(bus.to_string(), sign * term.ratio);

        opex += term.flow.costs * term.ratio;
        emissions += term.flow.emissions * term.ratio;
        if term.flow.id != reference.id {
            let position = Position {
                edge: reference.id,
                factor: term.ratio,
            };
            if term.flow.costs != 0.0 {
                scope.deviate(Quantity::Costs.deviation(scope.system, term.flow, position));
            }
            if term.flow.emissions != 0.0 {
                scope.deviate(Quantity::Emissions.deviation(scope.system, term.flow, position));
            }
        }
    }

    let reference_is_input = terms.iter().any(|t| t.input && t.flow.id == reference.id);
    let physical_unit = if reference_is_input {
        scope.name_of(reference.from)
    } else {
        scope.name_of(reference.to)
    };
    Ok(FineConversion {
        name: name.to_string(),
        physical_unit: physical_unit.to_string(),
        capacity: units.capacity(&cap),
        commodity_conversion_factors: factors,
        opex_per_operation: units.costs(opex),
        emissions_per_operation: units.emissions(emissions),
        operation_rate_min: cap.min_fraction,
    })
}

fn storage(
    scope: &Scope<'_>,
    units: &Units,
    node: &Node,
    params: &StorageParams,
) -> TransformResult<FineStorage> {
    let inflow = single_flow(scope.inflows(node), node)?;
    let outflow = single_flow(scope.outflows(node), node)?;
    for flow in [inflow, outflow] {
        if flow.is_expandable() {
            return Err(TransformError::unsupported(
                scope.label(flow),
                "storage power expansion",
                Framework::Fine,
            ));
        }
        if flow.bounds.min() > 0.0 {
            return Err(TransformError::mismatch(
                scope.label(flow),
                "storages have no minimum charge or discharge rate",
            ));
        }
        if flow.emissions != 0.0 {
            return Err(TransformError::mismatch(
                scope.label(flow),
                "storages carry no emissions",
            ));
        }
    }

    let capacity = params.capacity.max();
    let native_capacity = match params.expansion {
        Some(x) => {
            if inflow.bounds.is_bounded() || outflow.bounds.is_bounded() {
                return Err(TransformError::mismatch(
                    node.name(),
                    "charge rates are relative to capacity and cannot stay fixed when it expands",
                ));
            }
            FineCapacity::expandable(capacity, x.max_capacity(), units.costs(x.costs()))
        }
        None => FineCapacity::fixed(capacity),
    };
    let rate = |flow: &Flow| {
        (flow.bounds.is_bounded() && capacity > 0.0).then(|| flow.bounds.max() / capacity)
    };

    Ok(FineStorage {
        name: node.name().to_string(),
        commodity: params.bus.clone(),
        capacity: native_capacity,
        charge_efficiency: params.charge_efficiency,
        discharge_efficiency: params.discharge_efficiency,
        self_discharge: hourly_loss(params.loss_rate, scope.system.timeframe().step_hours()),
        charge_rate: rate(inflow),
        discharge_rate: rate(outflow),
        state_of_charge_min: if capacity > 0.0 { params.capacity.min() / capacity } else { 0.0 },
        is_periodical: params.soc_policy == SocPolicy::Cyclic,
        initial_state_of_charge: Some(params.initial_soc),
        opex_per_charge: units.costs(inflow.costs),
        opex_per_discharge: units.costs(outflow.costs),
    })
}
