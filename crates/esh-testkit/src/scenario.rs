//! Reference systems paired with their optimal dispatch.

use esh_model::{EnergySystem, ModelResult, fixtures};

use crate::dispatch::Dispatch;

/// Break-even expansion cost per MW of wind in `expansion`: each MW
/// replaces one MW of gas at 30 per MWh over five hours.
pub const WIND_BREAK_EVEN: f64 = 150.0;

#[derive(Clone, Debug)]
pub struct Scenario {
    pub system: EnergySystem,
    pub dispatch: Dispatch,
}

impl Scenario {
    /// Generator covers demand except at step 2, where the battery
    /// discharges its initial 5 MWh.
    pub fn minimal() -> ModelResult<Self> {
        let system = fixtures::minimal_example()?;
        let generation = vec![10.0, 10.0, 5.0, 10.0, 10.0];
        let fuel: Vec<f64> = generation.iter().map(|p| p / 0.42).collect();
        let dispatch = Dispatch::for_system(&system)
            .with_flow("Gas Station", "Pipeline", fuel.clone())
            .with_flow("Pipeline", "Generator", fuel)
            .with_flow("Generator", "Powerline", generation)
            .with_constant("Powerline", "Demand", 10.0)
            .with_flow("Battery", "Powerline", vec![0.0, 0.0, 5.0, 0.0, 0.0])
            .with_soc("Battery", vec![5.0, 5.0, 0.0, 0.0, 0.0]);
        Ok(Self { system, dispatch })
    }

    /// CHP burns 10 MW of gas into 8 MW power and 6 MW heat; the grid
    /// stays idle.
    pub fn chp() -> ModelResult<Self> {
        let system = fixtures::chp_example()?;
        let dispatch = Dispatch::for_system(&system)
            .with_constant("Gas Station", "Gas", 10.0)
            .with_constant("Gas", "CHP", 10.0)
            .with_constant("CHP", "Powerline", 8.0)
            .with_constant("CHP", "Heatline", 6.0)
            .with_constant("Powerline", "Power Demand", 8.0)
            .with_constant("Heatline", "Heat Demand", 6.0);
        Ok(Self { system, dispatch })
    }

    /// Cheap northern generation exports 10 MW, 9 MW arrive in the south.
    pub fn connector() -> ModelResult<Self> {
        let system = fixtures::connector_example()?;
        let dispatch = two_regions(&system, "Tie");
        Ok(Self { system, dispatch })
    }

    /// `connector` with the tie line written as two transformers.
    pub fn connector_explicit() -> ModelResult<Self> {
        let system = fixtures::connector_explicit_example()?;
        let dispatch = two_regions(&system, "Tie (North to South)");
        Ok(Self { system, dispatch })
    }

    /// Wind expands to cover the whole demand as long as that is cheaper
    /// than burning gas, otherwise it stays at its original 5 MW.
    pub fn expansion(expansion_costs: f64) -> ModelResult<Self> {
        let system = fixtures::expansion_example(expansion_costs)?;
        let wind = if expansion_costs < WIND_BREAK_EVEN { 20.0 } else { 5.0 };
        let dispatch = Dispatch::for_system(&system)
            .with_constant("Wind", "Powerline", wind)
            .with_installed("Wind", "Powerline", wind)
            .with_constant("Gas Plant", "Powerline", 20.0 - wind)
            .with_constant("Powerline", "Demand", 20.0);
        Ok(Self { system, dispatch })
    }
}

/// `tie` carries the north to south exchange.
fn two_regions(system: &EnergySystem, tie: &str) -> Dispatch {
    Dispatch::for_system(system)
        .with_constant("North Plant", "North", 15.0)
        .with_constant("South Plant", "South", 6.0)
        .with_constant("North", "North Demand", 5.0)
        .with_constant("South", "South Demand", 15.0)
        .with_constant("North", tie, 10.0)
        .with_constant(tie, "South", 10.0 * fixtures::TIE_EFFICIENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_buses_balance() {
        for scenario in [
            Scenario::minimal().unwrap(),
            Scenario::chp().unwrap(),
            Scenario::connector().unwrap(),
            Scenario::connector_explicit().unwrap(),
            Scenario::expansion(10.0).unwrap(),
        ] {
            let system = &scenario.system;
            for bus in system.buses() {
                for t in 0..scenario.dispatch.steps() {
                    let inflow: f64 = system
                        .inflows(bus.id)
                        .map(|f| scenario.dispatch.flow(system, f)[t])
                        .sum();
                    let outflow: f64 = system
                        .outflows(bus.id)
                        .map(|f| scenario.dispatch.flow(system, f)[t])
                        .sum();
                    assert!(
                        (inflow - outflow).abs() < 1e-9,
                        "{} unbalanced at {t} in {}",
                        bus.name(),
                        system.uid()
                    );
                }
            }
        }
    }
}
