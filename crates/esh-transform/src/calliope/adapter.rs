use esh_core::HarmonyConfig;
use esh_model::{EndpointParams, EnergySystem, Flow, Node, NodeKind, SocPolicy, StorageParams};
use tracing::{debug, info, info_span};

use super::native::*;
use crate::adapter::{Adapter, AdapterOptions, Transformation};
use crate::deviation::{Deviation, DeviationCause};
use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;
use crate::shared::capacity::{ReferenceCapacity, reference_capacity};
use crate::shared::realloc::{Position, Quantity};
use crate::shared::{Scope, hourly_loss, single_flow};

/// Adapter for the Calliope schema.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalliopeAdapter;

impl Adapter for CalliopeAdapter {
    type Input = CalliopeModel;

    fn framework(&self) -> Framework {
        Framework::Calliope
    }

    fn transform(
        &self,
        system: &EnergySystem,
        options: &AdapterOptions,
        config: &HarmonyConfig,
    ) -> TransformResult<Transformation<CalliopeModel>> {
        let _span = info_span!("transform", framework = "calliope", system = system.uid()).entered();
        let mut scope = Scope::new(system, options, Framework::Calliope);

        let mut model = CalliopeModel {
            name: system.uid().to_string(),
            location: system.uid().to_string(),
            timesteps: system.timeframe().steps().to_vec(),
            resolution: system.timeframe().step_hours(),
            units: CalliopeUnits {
                power: config.units.power.symbol().to_string(),
                energy: config.units.energy.symbol().to_string(),
                monetary: config.units.currency.clone(),
                emissions: config.units.emissions.symbol().to_string(),
            },
            carriers: Vec::new(),
            techs: Default::default(),
            cyclic_storage: false,
            group_constraints: Vec::new(),
        };
        let mut storage_policy: Option<SocPolicy> = None;

        let nodes: Vec<&Node> = scope.nodes().collect();
        for node in nodes {
            debug!(node = node.name(), kind = node.kind.name(), "mapping node");
            let name = node.name().to_string();
            match &node.kind {
                NodeKind::Bus => model.carriers.push(name),
                NodeKind::Source(params) => {
                    let flow = single_flow(scope.outflows(node), node)?;
                    let mut tech = endpoint(&scope, node, params, flow, TechParent::Supply)?;
                    tech.carrier_out = Some(scope.name_of(flow.to).to_string());
                    tech.costs_mut(CostClass::Monetary).om_prod = flow.costs;
                    tech.costs_mut(CostClass::Emissions).om_prod = flow.emissions;
                    model.techs.insert(name, tech);
                }
                NodeKind::Sink(params) => {
                    let flow = single_flow(scope.inflows(node), node)?;
                    let mut tech = endpoint(&scope, node, params, flow, TechParent::Demand)?;
                    tech.carrier_in = Some(scope.name_of(flow.from).to_string());
                    tech.costs_mut(CostClass::Monetary).om_con = flow.costs;
                    tech.costs_mut(CostClass::Emissions).om_con = flow.emissions;
                    model.techs.insert(name, tech);
                }
                NodeKind::Transformer(params) => {
                    let input = single_input(&scope, node)?;
                    let outputs = scope.outflows(node);
                    let f_in = params.factor(scope.name_of(input.from));
                    let factor_of = |flow: &Flow| params.factor(scope.name_of(flow.to));
                    let tech = match (f_in, outputs.as_slice()) {
                        (Some(f_in), [output]) => {
                            let f_out = factor_of(output).ok_or_else(|| {
                                TransformError::mismatch(node.name(), "missing output factor")
                            })?;
                            let n = system.timeframe().len();
                            let energy_eff = (0..n).map(|t| f_out.at(t) / f_in.at(t)).collect();
                            let varying = f_in.is_varying() || f_out.is_varying();
                            conversion(&scope, node.name(), input, output, energy_eff, varying)?
                        }
                        (Some(f_in), [first, second]) => {
                            let (Some(f1), Some(f2)) = (factor_of(first), factor_of(second)) else {
                                return Err(TransformError::mismatch(node.name(), "missing output factor"));
                            };
                            if f_in.is_varying() || f1.is_varying() || f2.is_varying() {
                                return Err(TransformError::mismatch(
                                    node.name(),
                                    "conversion_plus needs constant carrier ratios",
                                ));
                            }
                            let primary = (*first, f1.mean() / f_in.mean());
                            let secondary = (*second, f2.mean() / f_in.mean());
                            conversion_plus(&mut scope, node.name(), input, primary, secondary)?
                        }
                        (None, _) => {
                            return Err(TransformError::mismatch(node.name(), "missing input factor"));
                        }
                        (_, outputs) => {
                            return Err(TransformError::mismatch(
                                node.name(),
                                format!("conversions have at most two outputs, found {}", outputs.len()),
                            ));
                        }
                    };
                    model.techs.insert(name, tech);
                }
                NodeKind::Chp(chp) => {
                    let input = single_input(&scope, node)?;
                    let output = |bus: &str| {
                        system
                            .flow_between(node.name(), bus)
                            .filter(|f| scope.is_live(f.id))
                            .ok_or_else(|| TransformError::mismatch(node.name(), format!("no output to '{bus}'")))
                    };
                    let primary = (output(&chp.primary().bus)?, chp.primary().efficiency);
                    let secondary = (output(&chp.secondary().bus)?, chp.secondary().efficiency);
                    let tech = conversion_plus(&mut scope, node.name(), input, primary, secondary)?;
                    model.techs.insert(name, tech);
                }
                NodeKind::Storage(params) => {
                    match storage_policy {
                        Some(policy) if policy != params.soc_policy => {
                            return Err(TransformError::mismatch(
                                node.name(),
                                "cyclic storage is a model-wide setting and storages disagree",
                            ));
                        }
                        _ => storage_policy = Some(params.soc_policy),
                    }
                    let tech = storage(&mut scope, node, params)?;
                    model.techs.insert(name, tech);
                }
                NodeKind::Connector(params) => {
                    let n = system.timeframe().len();
                    for leg in scope.synthesize_connector(node, params)? {
                        let (Some(input), Some(output)) = (system.flow(leg.input), system.flow(leg.output))
                        else {
                            return Err(TransformError::mismatch(node.name(), "incomplete connector"));
                        };
                        let tech = conversion(&scope, &leg.name, input, output, vec![leg.efficiency; n], false)?;
                        model.techs.insert(leg.name, tech);
                    }
                }
            }
        }

        model.cyclic_storage = storage_policy == Some(SocPolicy::Cyclic);
        if let Some(limit) = system.global_constraints().emissions {
            model.group_constraints.push(GroupConstraint {
                name: "emission_cap".into(),
                cost_max: [(CostClass::Emissions, limit)].into_iter().collect(),
            });
        }

        info!(
            techs = model.techs.len(),
            carriers = model.carriers.len(),
            cyclic_storage = model.cyclic_storage,
            "calliope model ready"
        );
        Ok(scope.finish(model))
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn single_input<'a>(scope: &Scope<'a>, node: &Node) -> TransformResult<&'a Flow> {
    let inputs = scope.inflows(node);
    if inputs.len() != 1 {
        return Err(TransformError::mismatch(
            node.name(),
            format!("conversion techs have a single input carrier, found {}", inputs.len()),
        ));
    }
    single_flow(inputs, node)
}

/// Write `cap` (in units of the primary output) into the tech.
fn apply_capacity(tech: &mut Tech, cap: &ReferenceCapacity) {
    match (cap.expansion, cap.nominal) {
        (Some(x), _) => {
            tech.constraints.energy_cap_min = Some(x.original);
            tech.constraints.energy_cap_max = finite(x.max_capacity);
            tech.costs_mut(CostClass::Monetary).energy_cap = x.costs;
        }
        (None, Some(nominal)) => tech.constraints.energy_cap_equals = Some(nominal),
        (None, None) => {}
    }
    if cap.min_fraction > 0.0 {
        tech.constraints.energy_cap_min_use = Some(cap.min_fraction);
    }
}

/// Only expansion on the primary output maps onto `energy_cap`.
fn primary_expansion_only(
    scope: &Scope<'_>,
    cap: &ReferenceCapacity,
    primary: &Flow,
) -> TransformResult<()> {
    match cap.expandable_edge.and_then(|e| scope.system.flow(e)) {
        Some(flow) if flow.id != primary.id => {
            let component = if flow.to == primary.from {
                "input-side capacity expansion"
            } else {
                "secondary-output capacity expansion"
            };
            Err(TransformError::unsupported(
                scope.label(flow),
                component,
                Framework::Calliope,
            ))
        }
        _ => Ok(()),
    }
}

fn endpoint(
    scope: &Scope<'_>,
    node: &Node,
    params: &EndpointParams,
    flow: &Flow,
    parent: TechParent,
) -> TransformResult<Tech> {
    let mut tech = Tech::new(parent);
    let cap = reference_capacity(scope.system, node.name(), &[(flow.id, 1.0)], Framework::Calliope)?;
    apply_capacity(&mut tech, &cap);

    if let Some(profile) = &params.profile {
        if profile.has_positive_minimum() && !profile.is_fixed() {
            return Err(TransformError::mismatch(
                node.name(),
                "a resource is either forced or an upper limit, not a lower bound",
            ));
        }
        let sign = if parent == TechParent::Demand { -1.0 } else { 1.0 };
        let resource = scope
            .system
            .step_bounds(flow)
            .iter()
            .map(|(_, hi)| sign * hi)
            .collect();
        tech.constraints.resource = Some(resource);
        tech.constraints.force_resource = profile.is_fixed();
    }
    Ok(tech)
}

/// One input, one output with per-step efficiency.
fn conversion(
    scope: &Scope<'_>,
    name: &str,
    input: &Flow,
    output: &Flow,
    energy_eff: Vec<f64>,
    varying: bool,
) -> TransformResult<Tech> {
    if varying && input.bounds.is_bounded() {
        return Err(TransformError::mismatch(
            scope.label(input),
            "an input limit under varying efficiency has no constant output capacity",
        ));
    }
    let eff = energy_eff.first().copied().unwrap_or(1.0);
    let cap = reference_capacity(
        scope.system,
        name,
        &[(input.id, 1.0 / eff), (output.id, 1.0)],
        Framework::Calliope,
    )?;
    primary_expansion_only(scope, &cap, output)?;

    let mut tech = Tech::new(TechParent::Conversion);
    tech.carrier_in = Some(scope.name_of(input.from).to_string());
    tech.carrier_out = Some(scope.name_of(output.to).to_string());
    tech.constraints.energy_eff = Some(energy_eff);
    apply_capacity(&mut tech, &cap);
    for (class, on_input, on_output) in [
        (CostClass::Monetary, input.costs, output.costs),
        (CostClass::Emissions, input.emissions, output.emissions),
    ] {
        let costs = tech.costs_mut(class);
        costs.om_con = on_input;
        costs.om_prod = on_output;
    }
    Ok(tech)
}

/// One input, two outputs in a fixed ratio.
///
/// Calliope prices only the primary output and the input, so specific
/// values of the secondary output move to the input.
fn conversion_plus(
    scope: &mut Scope<'_>,
    name: &str,
    input: &Flow,
    (primary, e1): (&Flow, f64),
    (secondary, e2): (&Flow, f64),
) -> TransformResult<Tech> {
    let cap = reference_capacity(
        scope.system,
        name,
        &[(input.id, 1.0 / e1), (primary.id, 1.0), (secondary.id, e2 / e1)],
        Framework::Calliope,
    )?;
    primary_expansion_only(scope, &cap, primary)?;

    let n = scope.system.timeframe().len();
    let mut tech = Tech::new(TechParent::ConversionPlus);
    tech.carrier_in = Some(scope.name_of(input.from).to_string());
    tech.carrier_out = Some(scope.name_of(primary.to).to_string());
    tech.carrier_out_2 = Some(scope.name_of(secondary.to).to_string());
    tech.constraints.energy_eff = Some(vec![e1; n]);
    tech.constraints.carrier_ratio_out_2 = Some(e2 / e1);
    apply_capacity(&mut tech, &cap);

    let position = Position {
        edge: input.id,
        factor: e2,
    };
    for (class, quantity, on_input, on_primary, on_secondary) in [
        (CostClass::Monetary, Quantity::Costs, input.costs, primary.costs, secondary.costs),
        (
            CostClass::Emissions,
            Quantity::Emissions,
            input.emissions,
            primary.emissions,
            secondary.emissions,
        ),
    ] {
        if on_secondary != 0.0 {
            scope.deviate(quantity.deviation(scope.system, secondary, position));
        }
        let costs = tech.costs_mut(class);
        costs.om_con = on_input + on_secondary * e2;
        costs.om_prod = on_primary;
    }
    Ok(tech)
}

fn storage(scope: &mut Scope<'_>, node: &Node, params: &StorageParams) -> TransformResult<Tech> {
    let inflow = single_flow(scope.inflows(node), node)?;
    let outflow = single_flow(scope.outflows(node), node)?;
    if inflow.bounds != outflow.bounds || inflow.expansion != outflow.expansion {
        return Err(TransformError::mismatch(
            node.name(),
            "storage techs have one energy capacity for charging and discharging",
        ));
    }

    let (charge, discharge) = (params.charge_efficiency, params.discharge_efficiency);
    let energy_eff = (charge * discharge).sqrt();
    if charge != discharge {
        scope.deviate(Deviation::new(
            node.name(),
            DeviationCause::EfficienciesConflated {
                charge,
                discharge,
                round_trip: params.round_trip_efficiency(),
            },
        ));
    }

    let n = scope.system.timeframe().len();
    let mut tech = Tech::new(TechParent::Storage);
    tech.carrier = Some(params.bus.clone());
    tech.constraints.energy_eff = Some(vec![energy_eff; n]);
    let cap = reference_capacity(scope.system, node.name(), &[(outflow.id, 1.0)], Framework::Calliope)?;
    apply_capacity(&mut tech, &cap);

    let capacity = params.capacity.max();
    match params.expansion {
        Some(x) => {
            tech.constraints.storage_cap_min = Some(capacity);
            tech.constraints.storage_cap_max = finite(x.max_capacity());
            tech.costs_mut(CostClass::Monetary).storage_cap = x.costs();
        }
        None => tech.constraints.storage_cap_equals = Some(capacity),
    }
    tech.constraints.storage_initial = Some(params.initial_soc);
    tech.constraints.storage_loss = Some(hourly_loss(
        params.loss_rate,
        scope.system.timeframe().step_hours(),
    ));
    if capacity > 0.0 && params.capacity.min() > 0.0 {
        tech.constraints.storage_discharge_depth = Some(params.capacity.min() / capacity);
    }
    for (class, on_inflow, on_outflow) in [
        (CostClass::Monetary, inflow.costs, outflow.costs),
        (CostClass::Emissions, inflow.emissions, outflow.emissions),
    ] {
        let costs = tech.costs_mut(class);
        costs.om_con = on_inflow;
        costs.om_prod = on_outflow;
    }
    Ok(tech)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ConnectorPolicy;
    use esh_model::{Bounds, Component, FlowSpec, SystemBuilder, Timeframe, fixtures};

    fn transform(system: &EnergySystem) -> Transformation<CalliopeModel> {
        CalliopeAdapter
            .transform(system, &AdapterOptions::default(), &HarmonyConfig::default())
            .unwrap()
    }

    fn two_storages(second: SocPolicy, discharge: f64) -> EnergySystem {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut b = SystemBuilder::new("storages", Timeframe::hourly(start, 3).unwrap());
        b.add_node(Component::bus("Powerline")).unwrap();
        b.add_node(Component::source("Grid")).unwrap();
        b.connect(FlowSpec::new("Grid", "Powerline")).unwrap();
        for (name, policy) in [("Battery", SocPolicy::Cyclic), ("Pumped Hydro", second)] {
            let params = StorageParams::new("Powerline", Bounds::up_to(10.0).unwrap())
                .soc_policy(policy)
                .efficiencies(0.9, discharge);
            b.add_node(Component::storage(name, params)).unwrap();
            b.connect(FlowSpec::new("Powerline", name)).unwrap();
            b.connect(FlowSpec::new(name, "Powerline")).unwrap();
        }
        b.build().unwrap()
    }

    #[test]
    fn minimal_example_techs() {
        let system = fixtures::minimal_example().unwrap();
        let t = transform(&system);
        assert!(t.is_exact(), "{:?}", t.deviations);
        assert_eq!(t.native.carriers, vec!["Pipeline", "Powerline"]);

        let gas = t.native.tech("Gas Station").unwrap();
        assert_eq!(gas.parent, TechParent::Supply);
        assert_eq!(gas.costs(CostClass::Monetary).om_prod, 5.0);
        assert_eq!(gas.costs(CostClass::Emissions).om_prod, 0.2);
        assert_eq!(gas.constraints.energy_cap_equals, None);

        let generator = t.native.tech("Generator").unwrap();
        assert_eq!(generator.parent, TechParent::Conversion);
        assert_eq!(generator.constraints.energy_eff, Some(vec![0.42; 5]));
        assert_eq!(generator.constraints.energy_cap_equals, Some(15.0));

        let demand = t.native.tech("Demand").unwrap();
        assert_eq!(demand.constraints.resource, Some(vec![-10.0; 5]));
        assert!(demand.constraints.force_resource);

        let battery = t.native.tech("Battery").unwrap();
        assert_eq!(battery.constraints.storage_cap_equals, Some(10.0));
        assert_eq!(battery.constraints.storage_initial, Some(0.5));
        assert!(!t.native.cyclic_storage);
    }

    #[test]
    fn chp_is_conversion_plus_with_secondary_values_on_input() {
        let system = fixtures::chp_example().unwrap();
        let t = transform(&system);
        let chp = t.native.tech("CHP").unwrap();
        assert_eq!(chp.parent, TechParent::ConversionPlus);
        assert_eq!(chp.carrier_out.as_deref(), Some("Powerline"));
        assert_eq!(chp.carrier_out_2.as_deref(), Some("Heatline"));
        assert!((chp.constraints.carrier_ratio_out_2.unwrap() - 0.75).abs() < 1e-12);
        assert!((chp.costs(CostClass::Emissions).om_con - 0.03).abs() < 1e-12);
        assert_eq!(t.deviations_at("CHP->Heatline").count(), 1);
        assert_eq!(
            t.native.group_constraints[0].cost_max[&CostClass::Emissions],
            100.0
        );
    }

    #[test]
    fn connector_synthesis_and_rejection() {
        let system = fixtures::connector_example().unwrap();
        let t = transform(&system);
        let forward = t.native.tech("Tie (North to South)").unwrap();
        assert_eq!(forward.carrier_in.as_deref(), Some("North"));
        assert_eq!(forward.carrier_out.as_deref(), Some("South"));
        assert_eq!(forward.constraints.energy_eff, Some(vec![0.9; 5]));
        assert!((forward.constraints.energy_cap_equals.unwrap() - 18.0).abs() < 1e-12);

        let reject = AdapterOptions {
            connector_policy: ConnectorPolicy::Reject,
            ..AdapterOptions::default()
        };
        assert!(matches!(
            CalliopeAdapter.transform(&system, &reject, &HarmonyConfig::default()),
            Err(TransformError::UnsupportedComponent { .. })
        ));
    }

    #[test]
    fn mixed_cyclic_policies_fail() {
        let system = two_storages(SocPolicy::Free, 0.9);
        let err = CalliopeAdapter
            .transform(&system, &AdapterOptions::default(), &HarmonyConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransformError::SchemaMismatch { ref uid, .. } if uid == "Pumped Hydro"));
    }

    #[test]
    fn unequal_storage_efficiencies_are_conflated() {
        let system = two_storages(SocPolicy::Cyclic, 0.4);
        let t = transform(&system);
        assert!(t.native.cyclic_storage);
        let battery = t.native.tech("Battery").unwrap();
        let eff = battery.constraints.energy_eff.as_ref().unwrap()[0];
        assert!((eff - 0.6).abs() < 1e-12);
        assert_eq!(t.deviations.len(), 2);
        assert!(t.deviations.iter().all(|d| !d.cause.is_lossless()));
    }

    #[test]
    fn expansion_on_primary_output() {
        let system = fixtures::expansion_example(40.0).unwrap();
        let t = transform(&system);
        let wind = t.native.tech("Wind").unwrap();
        assert_eq!(wind.constraints.energy_cap_min, Some(5.0));
        assert_eq!(wind.constraints.energy_cap_max, Some(50.0));
        assert_eq!(wind.costs(CostClass::Monetary).energy_cap, 40.0);
    }

    #[test]
    fn redundant_chain_is_pruned() {
        let system = fixtures::redundant_chain_example().unwrap();
        let t = transform(&system);
        assert!(t.native.tech("Coal Plant").is_none());
        assert_eq!(t.pruned.nodes.len(), 3);
    }
}
