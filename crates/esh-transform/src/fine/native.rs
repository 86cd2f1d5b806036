//! FINE-style native schema.
//!
//! A single location with one commodity per bus. Costs are stated in
//! `cost_unit` (typically `1e6 EUR`) and emissions in `emission_unit`.
//! Operation rates are relative to the capacity when a component has a
//! capacity variable and absolute otherwise.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FineModel {
    pub name: String,
    pub locations: Vec<String>,
    pub time_steps: Vec<NaiveDateTime>,
    pub hours_per_time_step: f64,
    pub cost_unit: String,
    pub emission_unit: String,
    pub commodities: Vec<Commodity>,
    pub sources: Vec<FineSourceSink>,
    pub sinks: Vec<FineSourceSink>,
    pub conversions: Vec<FineConversion>,
    pub storages: Vec<FineStorage>,
    /// Upper limit on total emissions in `emission_unit`.
    pub co2_limit: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub name: String,
    pub unit: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FineCapacity {
    pub has_capacity_variable: bool,
    pub capacity_fix: Option<f64>,
    pub capacity_min: Option<f64>,
    pub capacity_max: Option<f64>,
    /// Investment per unit of capacity in `cost_unit`.
    pub invest_per_capacity: f64,
}

impl FineCapacity {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(capacity: f64) -> Self {
        Self {
            has_capacity_variable: true,
            capacity_fix: Some(capacity),
            ..Self::default()
        }
    }

    pub fn expandable(original: f64, maximum: f64, invest_per_capacity: f64) -> Self {
        Self {
            has_capacity_variable: true,
            capacity_fix: None,
            capacity_min: Some(original),
            capacity_max: maximum.is_finite().then_some(maximum),
            invest_per_capacity,
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.has_capacity_variable && self.capacity_fix.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FineSourceSink {
    pub name: String,
    pub commodity: String,
    #[serde(flatten)]
    pub capacity: FineCapacity,
    /// Cost per unit of operation in `cost_unit`.
    pub commodity_cost: f64,
    pub emissions_per_operation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_rate_fix: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_rate_max: Option<Vec<f64>>,
}

/// Linear conversion whose operation is measured in `physical_unit`.
///
/// `commodity_conversion_factors` are signed per unit of operation:
/// consumed commodities negative, produced ones positive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FineConversion {
    pub name: String,
    pub physical_unit: String,
    #[serde(flatten)]
    pub capacity: FineCapacity,
    pub commodity_conversion_factors: BTreeMap<String, f64>,
    pub opex_per_operation: f64,
    pub emissions_per_operation: f64,
    pub operation_rate_min: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FineStorage {
    pub name: String,
    pub commodity: String,
    #[serde(flatten)]
    pub capacity: FineCapacity,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
    /// Fraction of content lost per hour.
    pub self_discharge: f64,
    /// Charge limit per hour relative to capacity; `None` is unlimited.
    pub charge_rate: Option<f64>,
    pub discharge_rate: Option<f64>,
    pub state_of_charge_min: f64,
    pub is_periodical: bool,
    /// Initial state of charge relative to capacity.
    pub initial_state_of_charge: Option<f64>,
    pub opex_per_charge: f64,
    pub opex_per_discharge: f64,
}

impl FineModel {
    pub fn source(&self, name: &str) -> Option<&FineSourceSink> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn sink(&self, name: &str) -> Option<&FineSourceSink> {
        self.sinks.iter().find(|s| s.name == name)
    }

    pub fn conversion(&self, name: &str) -> Option<&FineConversion> {
        self.conversions.iter().find(|c| c.name == name)
    }

    pub fn storage(&self, name: &str) -> Option<&FineStorage> {
        self.storages.iter().find(|s| s.name == name)
    }

    /// Location every component is placed at.
    pub fn location(&self) -> &str {
        self.locations.first().map(String::as_str).unwrap_or_default()
    }
}
