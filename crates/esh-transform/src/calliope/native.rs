//! Calliope-style native schema.
//!
//! Every tech sits at one location and inherits from an abstract parent.
//! Carriers are named after the canonical buses. Costs are grouped into
//! classes; `emissions` is accounted as a cost class like `monetary`.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalliopeModel {
    pub name: String,
    pub location: String,
    pub timesteps: Vec<NaiveDateTime>,
    /// Hours per timestep.
    pub resolution: f64,
    pub units: CalliopeUnits,
    pub carriers: Vec<String>,
    pub techs: BTreeMap<String, Tech>,
    /// Applies to every storage tech.
    pub cyclic_storage: bool,
    pub group_constraints: Vec<GroupConstraint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalliopeUnits {
    pub power: String,
    pub energy: String,
    pub monetary: String,
    pub emissions: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechParent {
    Supply,
    Demand,
    Conversion,
    ConversionPlus,
    Storage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    Monetary,
    Emissions,
}

impl CostClass {
    pub const ALL: [CostClass; 2] = [CostClass::Monetary, CostClass::Emissions];

    pub fn as_str(self) -> &'static str {
        match self {
            CostClass::Monetary => "monetary",
            CostClass::Emissions => "emissions",
        }
    }
}

/// Cost terms of one class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechCosts {
    /// Per unit of carrier produced.
    pub om_prod: f64,
    /// Per unit of carrier consumed.
    pub om_con: f64,
    /// Per unit of energy capacity.
    pub energy_cap: f64,
    /// Per unit of storage capacity.
    pub storage_cap: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechConstraints {
    /// Output per unit of input, per timestep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_eff: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_cap_equals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_cap_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_cap_max: Option<f64>,
    /// Minimum output as a fraction of the energy capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_cap_min_use: Option<f64>,
    /// Absolute available (supply) or required (demand, negative) resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Vec<f64>>,
    pub force_resource: bool,
    /// Secondary output per unit of primary output (conversion_plus).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_ratio_out_2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_cap_equals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_cap_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_cap_max: Option<f64>,
    /// Initial storage level as a fraction of the storage capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_initial: Option<f64>,
    /// Minimum storage level as a fraction of the storage capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_discharge_depth: Option<f64>,
    /// Fraction of content lost per hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_loss: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tech {
    pub parent: TechParent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_out_2: Option<String>,
    /// Carrier of storage techs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub constraints: TechConstraints,
    pub costs: BTreeMap<CostClass, TechCosts>,
}

impl Tech {
    pub fn new(parent: TechParent) -> Self {
        Self {
            parent,
            carrier_in: None,
            carrier_out: None,
            carrier_out_2: None,
            carrier: None,
            constraints: TechConstraints::default(),
            costs: BTreeMap::new(),
        }
    }

    pub fn costs(&self, class: CostClass) -> TechCosts {
        self.costs.get(&class).copied().unwrap_or_default()
    }

    pub(crate) fn costs_mut(&mut self, class: CostClass) -> &mut TechCosts {
        self.costs.entry(class).or_default()
    }
}

/// Upper limit on the summed costs of a class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupConstraint {
    pub name: String,
    pub cost_max: BTreeMap<CostClass, f64>,
}

impl CalliopeModel {
    pub fn tech(&self, name: &str) -> Option<&Tech> {
        self.techs.get(name)
    }

    pub fn techs_of(&self, parent: TechParent) -> impl Iterator<Item = (&str, &Tech)> {
        self.techs
            .iter()
            .filter(move |(_, t)| t.parent == parent)
            .map(|(name, t)| (name.as_str(), t))
    }
}
