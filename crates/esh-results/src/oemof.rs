//! oemof results: flow sequences and investment scalars keyed by
//! `(from, to)` component labels.

use std::collections::BTreeMap;

use esh_core::HarmonyConfig;
use esh_model::EnergySystem;
use esh_transform::{Framework, OemofEnergySystem};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::NormalizedResult;
use crate::readout::Readout;
use crate::resultier::{NativeResult, Resultier, ensure_optimal, finish};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowSeries {
    pub from: String,
    pub to: String,
    pub values: Vec<f64>,
}

/// Optimized added capacity of an investment flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowInvestment {
    pub from: String,
    pub to: String,
    pub invest: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OemofResults {
    pub termination_condition: String,
    pub objective: f64,
    pub flows: Vec<FlowSeries>,
    #[serde(default)]
    pub flow_investments: Vec<FlowInvestment>,
    /// Storage content per timestep, by storage label.
    #[serde(default)]
    pub storage_content: BTreeMap<String, Vec<f64>>,
    /// Added storage capacity, by storage label.
    #[serde(default)]
    pub storage_invest: BTreeMap<String, f64>,
}

impl OemofResults {
    pub fn flow(&self, from: &str, to: &str) -> Option<&[f64]> {
        self.flows
            .iter()
            .find(|f| f.from == from && f.to == to)
            .map(|f| f.values.as_slice())
    }

    pub fn invest(&self, from: &str, to: &str) -> Option<f64> {
        self.flow_investments
            .iter()
            .find(|f| f.from == from && f.to == to)
            .map(|f| f.invest)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OemofResultier;

impl Resultier for OemofResultier {
    type Input = OemofEnergySystem;
    type Output = OemofResults;

    fn framework(&self) -> Framework {
        Framework::Oemof
    }

    fn normalize(
        &self,
        native: &NativeResult<OemofEnergySystem, OemofResults>,
        system: &EnergySystem,
        config: &HarmonyConfig,
    ) -> NormalizeResult<NormalizedResult> {
        let _span = info_span!("normalize", framework = "oemof", system = system.uid()).entered();
        let output = &native.output;
        ensure_optimal(Framework::Oemof, &output.termination_condition)?;
        let model = native.native();
        let hours = system.timeframe().step_hours();
        let mut readout = Readout::default();

        for flow in system.flows() {
            let from = system.name_of(flow.from);
            let to = system.name_of(flow.to);
            let Some(params) = model.flow(from, to) else {
                continue;
            };
            let values = output
                .flow(from, to)
                .ok_or_else(|| NormalizeError::missing(system.label(flow).to_string()))?;
            readout.set_flow(system, flow, values.to_vec())?;
            readout.specific_costs.insert(flow.id, params.variable_costs);
            readout.specific_emissions.insert(flow.id, params.emissions);

            if let Some(investment) = params.investment {
                let invest = output
                    .invest(from, to)
                    .ok_or_else(|| NormalizeError::missing(format!("{}.invest", system.label(flow))))?;
                readout.installed.insert(flow.id, investment.existing + invest);
                readout.capex += investment.ep_costs * invest;
            }

            let energy: f64 = values.iter().sum::<f64>() * hours;
            readout.opex += params.variable_costs * energy;
            readout.emissions += params.emissions * energy;
        }

        for storage in &model.storages {
            let Some(node) = system.node_by_name(&storage.label) else {
                continue;
            };
            let content = output
                .storage_content
                .get(&storage.label)
                .ok_or_else(|| NormalizeError::missing(storage.label.as_str()))?;
            readout.set_soc(system, node.id, content.clone())?;
            if let Some(investment) = storage.investment {
                let invest = output
                    .storage_invest
                    .get(&storage.label)
                    .copied()
                    .ok_or_else(|| NormalizeError::missing(format!("{}.invest", storage.label)))?;
                readout.storage_installed.insert(node.id, investment.existing + invest);
                readout.capex += investment.ep_costs * invest;
            }
        }

        debug!(objective = output.objective, opex = readout.opex, capex = readout.capex, "oemof accounting");
        finish(system, &native.transformation, readout, config)
    }
}
