//! oemof-style native schema.
//!
//! Components are labelled with the canonical node names. Flow limits use
//! `nominal_value` plus per-step `min`/`max` fractions; an investment flow
//! has no nominal value and states its existing capacity instead.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofEnergySystem {
    pub label: String,
    pub timeindex: Vec<NaiveDateTime>,
    pub buses: Vec<OemofBus>,
    pub sources: Vec<OemofSource>,
    pub sinks: Vec<OemofSink>,
    pub converters: Vec<OemofConverter>,
    pub storages: Vec<GenericStorage>,
    pub links: Vec<OemofLink>,
    /// Upper limit on the sum of `emissions * flow` over all flows.
    pub emission_limit: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofBus {
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub ep_costs: f64,
    pub existing: f64,
    /// Upper limit on the added capacity; `None` is unlimited.
    pub maximum: Option<f64>,
}

impl Investment {
    pub fn total_maximum(&self) -> f64 {
        self.existing + self.maximum.unwrap_or(f64::INFINITY)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OemofFlow {
    pub nominal_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<Vec<f64>>,
    pub variable_costs: f64,
    /// Specific emissions per unit of flow.
    pub emissions: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment: Option<Investment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofSource {
    pub label: String,
    pub outputs: BTreeMap<String, OemofFlow>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofSink {
    pub label: String,
    pub inputs: BTreeMap<String, OemofFlow>,
}

/// Linear converter: `flow(x) / conversion_factors[x]` is equal for every
/// attached bus `x`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofConverter {
    pub label: String,
    pub inputs: BTreeMap<String, OemofFlow>,
    pub outputs: BTreeMap<String, OemofFlow>,
    pub conversion_factors: BTreeMap<String, Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericStorage {
    pub label: String,
    pub bus: String,
    pub nominal_storage_capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment: Option<Investment>,
    /// Fraction of the capacity at the start.
    pub initial_storage_level: f64,
    pub min_storage_level: f64,
    /// Final level equals the initial one.
    pub balanced: bool,
    pub inflow_conversion_factor: f64,
    pub outflow_conversion_factor: f64,
    /// Fraction of content lost per timestep.
    pub loss_rate: f64,
    pub inflow: OemofFlow,
    pub outflow: OemofFlow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkFactor {
    pub from: String,
    pub to: String,
    pub factor: f64,
}

/// Bidirectional link between two buses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemofLink {
    pub label: String,
    pub inputs: BTreeMap<String, OemofFlow>,
    pub outputs: BTreeMap<String, OemofFlow>,
    pub conversion_factors: Vec<LinkFactor>,
}

impl OemofEnergySystem {
    pub fn converter(&self, label: &str) -> Option<&OemofConverter> {
        self.converters.iter().find(|c| c.label == label)
    }

    pub fn storage(&self, label: &str) -> Option<&GenericStorage> {
        self.storages.iter().find(|s| s.label == label)
    }

    /// Every flow as `(from, to, flow)`.
    pub fn flows(&self) -> Vec<(&str, &str, &OemofFlow)> {
        let mut flows = Vec::new();
        for s in &self.sources {
            for (bus, f) in &s.outputs {
                flows.push((s.label.as_str(), bus.as_str(), f));
            }
        }
        for s in &self.sinks {
            for (bus, f) in &s.inputs {
                flows.push((bus.as_str(), s.label.as_str(), f));
            }
        }
        for c in &self.converters {
            for (bus, f) in &c.inputs {
                flows.push((bus.as_str(), c.label.as_str(), f));
            }
            for (bus, f) in &c.outputs {
                flows.push((c.label.as_str(), bus.as_str(), f));
            }
        }
        for s in &self.storages {
            flows.push((s.bus.as_str(), s.label.as_str(), &s.inflow));
            flows.push((s.label.as_str(), s.bus.as_str(), &s.outflow));
        }
        for l in &self.links {
            for (bus, f) in &l.inputs {
                flows.push((bus.as_str(), l.label.as_str(), f));
            }
            for (bus, f) in &l.outputs {
                flows.push((l.label.as_str(), bus.as_str(), f));
            }
        }
        flows
    }

    pub fn flow(&self, from: &str, to: &str) -> Option<&OemofFlow> {
        self.flows()
            .into_iter()
            .find(|(f, t, _)| *f == from && *t == to)
            .map(|(_, _, flow)| flow)
    }
}
