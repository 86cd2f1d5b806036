//! PyPSA-style native schema.
//!
//! Dispatch variables are non-negative: generators produce `p`, links move
//! `p0` out of `bus0` and deliver `efficiency * p0` to `bus1`. Stores sit on
//! private buses and exchange energy through charge/discharge links.
//! Capital costs apply to the full optimized capacity.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PypsaNetwork {
    pub name: String,
    pub snapshots: Vec<NaiveDateTime>,
    /// Hours represented by each snapshot.
    pub snapshot_weighting: f64,
    pub carriers: Vec<Carrier>,
    pub buses: Vec<PypsaBus>,
    pub generators: Vec<Generator>,
    pub loads: Vec<Load>,
    pub links: Vec<Link>,
    pub stores: Vec<Store>,
    pub link_couplings: Vec<LinkCoupling>,
    pub global_constraints: Vec<PypsaGlobalConstraint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    /// Emissions per MWh of primary energy.
    pub co2_emissions: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PypsaBus {
    pub name: String,
    pub carrier: String,
}

/// Extendable-capacity attributes shared by generators and links.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    /// `None` is unlimited.
    pub p_nom_max: Option<f64>,
    pub capital_cost: f64,
}

impl Capacity {
    pub fn fixed(p_nom: f64) -> Self {
        Self {
            p_nom,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: Some(p_nom),
            capital_cost: 0.0,
        }
    }

    /// Free, unlimited capacity standing in for "no limit".
    pub fn unconstrained() -> Self {
        Self {
            p_nom: 0.0,
            p_nom_extendable: true,
            p_nom_min: 0.0,
            p_nom_max: None,
            capital_cost: 0.0,
        }
    }

    pub fn extendable(original: f64, maximum: f64, capital_cost: f64) -> Self {
        Self {
            p_nom: original,
            p_nom_extendable: true,
            p_nom_min: original,
            p_nom_max: maximum.is_finite().then_some(maximum),
            capital_cost,
        }
    }

    /// Capital costs already sunk in the pinned minimum capacity.
    pub fn sunk_costs(&self) -> f64 {
        self.capital_cost * self.p_nom_min
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    pub carrier: String,
    /// `1` for production, `-1` for withdrawal.
    pub sign: f64,
    #[serde(flatten)]
    pub capacity: Capacity,
    pub p_min_pu: Vec<f64>,
    pub p_max_pu: Vec<f64>,
    pub marginal_cost: f64,
    pub efficiency: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub name: String,
    pub bus: String,
    pub p_set: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    pub efficiency: f64,
    #[serde(flatten)]
    pub capacity: Capacity,
    pub p_min_pu: f64,
    pub p_max_pu: f64,
    /// Cost per unit of `p0`.
    pub marginal_cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub name: String,
    pub bus: String,
    pub e_nom: f64,
    pub e_nom_extendable: bool,
    pub e_nom_min: f64,
    pub e_nom_max: Option<f64>,
    pub e_min_pu: f64,
    pub e_cyclic: bool,
    /// Absolute initial energy (MWh); ignored when `e_cyclic`.
    pub e_initial: f64,
    /// Fraction lost per hour.
    pub standing_loss: f64,
    pub capital_cost: f64,
}

/// Extra constraint `p0(primary) = ratio * p0(secondary)` at every snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkCoupling {
    pub primary: String,
    pub secondary: String,
    pub ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PypsaGlobalConstraint {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub carrier_attribute: String,
    pub sense: String,
    pub constant: f64,
}

/// Names PyPSA components get for canonical constructs.
pub mod names {
    /// Link of a conversion feeding `output_bus`, used when a conversion
    /// is split into coupled two-port links.
    pub fn conversion_link(node: &str, output_bus: &str) -> String {
        format!("{node} to {output_bus}")
    }

    pub fn storage_bus(storage: &str) -> String {
        format!("{storage} bus")
    }

    pub fn storage_charge(storage: &str) -> String {
        format!("{storage} charge")
    }

    pub fn storage_discharge(storage: &str) -> String {
        format!("{storage} discharge")
    }
}

impl PypsaNetwork {
    pub fn generator(&self, name: &str) -> Option<&Generator> {
        self.generators.iter().find(|g| g.name == name)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn store(&self, name: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.name == name)
    }

    pub fn load(&self, name: &str) -> Option<&Load> {
        self.loads.iter().find(|l| l.name == name)
    }

    pub fn carrier(&self, name: &str) -> Option<&Carrier> {
        self.carriers.iter().find(|c| c.name == name)
    }
}
