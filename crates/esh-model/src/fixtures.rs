//! Small reference energy systems.
//!
//! Used by tests across the workspace and as starting points for
//! experiments.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ModelError, ModelResult};
use crate::flow::FlowSpec;
use crate::node::{ChpParams, Component, ConnectorParams, StorageParams};
use crate::params::{Bounds, Directional, Efficiency, Expansion, ParamError, Profile, SocPolicy};
use crate::system::{EnergySystem, GlobalConstraints};
use crate::timeframe::Timeframe;
use crate::uid::Uid;
use crate::SystemBuilder;

/// Timesteps of every reference system.
pub const STEPS: usize = 5;

fn param<T>(uid: &str, value: Result<T, ParamError>) -> ModelResult<T> {
    value.map_err(|e| ModelError::param(uid, e))
}

fn start() -> ModelResult<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ModelError::Timeframe {
            what: "invalid start date".into(),
        })
}

fn builder(uid: &str) -> ModelResult<SystemBuilder> {
    Ok(SystemBuilder::new(uid, Timeframe::hourly(start()?, STEPS)?))
}

fn factors(entries: &[(&str, f64)]) -> ModelResult<BTreeMap<String, Efficiency>> {
    entries
        .iter()
        .map(|(bus, v)| Ok((bus.to_string(), param(bus, Efficiency::constant(*v))?)))
        .collect()
}

fn add_minimal(b: &mut SystemBuilder) -> ModelResult<()> {
    b.add_node(Component::bus(Uid::new("Pipeline").with_carrier("gas")))?;
    b.add_node(Component::bus(Uid::new("Powerline").with_carrier("electricity")))?;
    b.add_node(Component::source(Uid::new("Gas Station").with_carrier("gas")))?;
    b.add_node(Component::transformer(
        "Generator",
        factors(&[("Pipeline", 1.0), ("Powerline", 0.42)])?,
    ))?;
    b.add_node(
        Component::sink(Uid::new("Demand").with_carrier("electricity"))
            .with_profile(param("Demand", Profile::fixed(vec![10.0; STEPS]))?),
    )?;
    let battery = StorageParams::new("Powerline", param("Battery", Bounds::up_to(10.0))?)
        .initial_soc(0.5)
        .soc_policy(SocPolicy::Free);
    b.add_node(Component::storage(
        Uid::new("Battery").with_carrier("electricity"),
        battery,
    ))?;

    b.connect(
        FlowSpec::new("Gas Station", "Pipeline")
            .carrier("gas")
            .costs(5.0)
            .emissions(0.2),
    )?;
    b.connect(FlowSpec::new("Pipeline", "Generator").carrier("gas"))?;
    b.connect(
        FlowSpec::new("Generator", "Powerline")
            .carrier("electricity")
            .bounds(param("Generator", Bounds::up_to(15.0))?),
    )?;
    b.connect(FlowSpec::new("Powerline", "Demand").carrier("electricity"))?;
    let rate = param("Battery", Bounds::up_to(10.0))?;
    b.connect(FlowSpec::new("Powerline", "Battery").bounds(rate))?;
    b.connect(FlowSpec::new("Battery", "Powerline").bounds(rate))?;
    Ok(())
}

/// Gas source, generator, fixed demand and a battery on two buses.
///
/// With a free end-of-horizon level the optimum discharges the initial
/// battery content (5 MWh) once and covers the rest with the generator.
pub fn minimal_example() -> ModelResult<EnergySystem> {
    let mut b = builder("minimal")?;
    add_minimal(&mut b)?;
    b.build()
}

/// Minimal example plus a coal chain that can never deliver.
///
/// `Coal Supply` has a zero flow limit, so the whole chain up to the
/// `Coal Plant -> Powerline` flow is redundant.
pub fn redundant_chain_example() -> ModelResult<EnergySystem> {
    let mut b = builder("redundant_chain")?;
    add_minimal(&mut b)?;
    b.add_node(Component::bus("Coal Line"))?;
    b.add_node(Component::source("Coal Supply"))?;
    b.add_node(Component::transformer(
        "Coal Plant",
        factors(&[("Coal Line", 1.0), ("Powerline", 0.35)])?,
    ))?;
    b.connect(
        FlowSpec::new("Coal Supply", "Coal Line")
            .bounds(param("Coal Supply", Bounds::up_to(0.0))?)
            .costs(2.0)
            .emissions(0.3),
    )?;
    b.connect(FlowSpec::new("Coal Line", "Coal Plant"))?;
    b.connect(FlowSpec::new("Coal Plant", "Powerline"))?;
    b.build()
}

/// CHP feeding a fixed power and a fixed heat demand.
///
/// Electrical and thermal efficiencies are 0.8 and 0.6 per unit of fuel,
/// matching the demands of 8 and 6 MW. The heat output carries its own
/// specific emissions and a grid import serves as expensive backup.
pub fn chp_example() -> ModelResult<EnergySystem> {
    let mut b = builder("chp")?;
    b.add_node(Component::bus("Gas"))?;
    b.add_node(Component::bus("Powerline"))?;
    b.add_node(Component::bus("Heatline"))?;
    b.add_node(Component::source("Gas Station"))?;
    b.add_node(Component::source("Grid"))?;
    let chp = param(
        "CHP",
        ChpParams::new("Gas", ("Powerline", 0.8), ("Heatline", 0.6)),
    )?;
    b.add_node(Component::chp("CHP", chp))?;
    b.add_node(
        Component::sink("Power Demand")
            .with_profile(param("Power Demand", Profile::fixed(vec![8.0; STEPS]))?),
    )?;
    b.add_node(
        Component::sink("Heat Demand")
            .with_profile(param("Heat Demand", Profile::fixed(vec![6.0; STEPS]))?),
    )?;

    b.connect(FlowSpec::new("Gas Station", "Gas").costs(3.0).emissions(0.2))?;
    b.connect(FlowSpec::new("Grid", "Powerline").costs(100.0).emissions(0.5))?;
    b.connect(FlowSpec::new("Gas", "CHP"))?;
    b.connect(FlowSpec::new("CHP", "Powerline"))?;
    b.connect(FlowSpec::new("CHP", "Heatline").emissions(0.05))?;
    b.connect(FlowSpec::new("Powerline", "Power Demand"))?;
    b.connect(FlowSpec::new("Heatline", "Heat Demand"))?;
    b.global_constraints(GlobalConstraints {
        emissions: Some(100.0),
    });
    b.build()
}

fn add_two_regions(b: &mut SystemBuilder) -> ModelResult<()> {
    b.add_node(Component::bus("North"))?;
    b.add_node(Component::bus("South"))?;
    b.add_node(Component::source("North Plant"))?;
    b.add_node(Component::source("South Plant"))?;
    b.add_node(
        Component::sink("North Demand")
            .with_profile(param("North Demand", Profile::fixed(vec![5.0; STEPS]))?),
    )?;
    b.add_node(
        Component::sink("South Demand")
            .with_profile(param("South Demand", Profile::fixed(vec![15.0; STEPS]))?),
    )?;
    let plant = param("plant", Bounds::up_to(50.0))?;
    b.connect(FlowSpec::new("North Plant", "North").bounds(plant).costs(1.0))?;
    b.connect(FlowSpec::new("South Plant", "South").bounds(plant).costs(4.0))?;
    b.connect(FlowSpec::new("North", "North Demand"))?;
    b.connect(FlowSpec::new("South", "South Demand"))?;
    Ok(())
}

/// Capacity of the tie line between the two regions.
pub const TIE_CAPACITY: f64 = 20.0;
/// Tie line efficiency in both directions.
pub const TIE_EFFICIENCY: f64 = 0.9;

/// Two regions with cheap northern and expensive southern generation,
/// joined by a lossy bidirectional tie line.
pub fn connector_example() -> ModelResult<EnergySystem> {
    let mut b = builder("two_regions")?;
    add_two_regions(&mut b)?;
    let tie = ConnectorParams::new("North", "South", Directional::symmetric(TIE_EFFICIENCY));
    b.add_node(Component::connector("Tie", tie))?;
    let cap = param("Tie", Bounds::up_to(TIE_CAPACITY))?;
    b.connect(FlowSpec::new("North", "Tie").bounds(cap))?;
    b.connect(FlowSpec::new("Tie", "South").bounds(cap))?;
    b.connect(FlowSpec::new("South", "Tie").bounds(cap))?;
    b.connect(FlowSpec::new("Tie", "North").bounds(cap))?;
    b.build()
}

/// Same two regions with the tie line written as two one-way conversions.
pub fn connector_explicit_example() -> ModelResult<EnergySystem> {
    let mut b = builder("two_regions")?;
    add_two_regions(&mut b)?;
    let cap = param("Tie", Bounds::up_to(TIE_CAPACITY))?;
    for (from, to) in [("North", "South"), ("South", "North")] {
        let name = format!("Tie ({from} to {to})");
        b.add_node(Component::transformer(
            name.as_str(),
            factors(&[(from, 1.0), (to, TIE_EFFICIENCY)])?,
        ))?;
        b.connect(FlowSpec::new(from, &name).bounds(cap))?;
        b.connect(FlowSpec::new(&name, to).bounds(cap))?;
    }
    b.build()
}

/// Demand served by an expandable wind source and an expensive gas source.
///
/// Wind has 5 MW installed, may grow to 50 MW at `expansion_costs` per MW
/// and produces at zero marginal cost.
pub fn expansion_example(expansion_costs: f64) -> ModelResult<EnergySystem> {
    let mut b = builder("expansion")?;
    b.add_node(Component::bus("Powerline"))?;
    b.add_node(Component::source("Wind"))?;
    b.add_node(Component::source("Gas Plant"))?;
    b.add_node(
        Component::sink("Demand")
            .with_profile(param("Demand", Profile::fixed(vec![20.0; STEPS]))?),
    )?;
    b.connect(
        FlowSpec::new("Wind", "Powerline")
            .bounds(param("Wind", Bounds::up_to(5.0))?)
            .expansion(param("Wind", Expansion::new(expansion_costs, 50.0))?),
    )?;
    b.connect(FlowSpec::new("Gas Plant", "Powerline").costs(30.0).emissions(0.4))?;
    b.connect(FlowSpec::new("Powerline", "Demand"))?;
    b.build()
}
