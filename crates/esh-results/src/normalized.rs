//! The uniform result schema shared by every framework.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use esh_core::{Tolerances, nearly_equal};
use esh_model::EdgeLabel;
use esh_transform::{Deviation, Framework, PrunedTopology};
use serde::{Deserialize, Serialize};

/// Signed per-timestep load of one node, one column per counterpart node.
///
/// Outflows are positive, inflows negative (MW). Two flows between the
/// same pair of nodes share a column and are netted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadTable {
    columns: BTreeMap<String, Vec<f64>>,
}

impl LoadTable {
    pub(crate) fn add(&mut self, counterpart: &str, sign: f64, values: &[f64]) {
        let column = self
            .columns
            .entry(counterpart.to_string())
            .or_insert_with(|| vec![0.0; values.len()]);
        for (c, v) in column.iter_mut().zip(values) {
            *c += sign * v;
        }
    }

    pub fn column(&self, counterpart: &str) -> Option<&[f64]> {
        self.columns.get(counterpart).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum across columns at timestep `t`.
    pub fn row_sum(&self, t: usize) -> f64 {
        self.columns.values().filter_map(|c| c.get(t)).sum()
    }
}

/// Installed or original capacity of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capacity {
    Scalar(f64),
    /// Keyed by output bus.
    PerCarrier(BTreeMap<String, f64>),
}

impl Capacity {
    pub fn total(&self) -> f64 {
        match self {
            Capacity::Scalar(v) => *v,
            Capacity::PerCarrier(m) => m.values().sum(),
        }
    }

    pub fn get(&self, bus: &str) -> Option<f64> {
        match self {
            Capacity::Scalar(v) => Some(*v),
            Capacity::PerCarrier(m) => m.get(bus).copied(),
        }
    }
}

/// Totals in the declared unit convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalResults {
    /// `opex + capex`.
    pub costs: f64,
    pub emissions: f64,
    pub capex: f64,
    pub opex: f64,
}

impl GlobalResults {
    pub const KEYS: [&'static str; 4] = ["costs", "emissions", "capex", "opex"];

    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "costs" => Some(self.costs),
            "emissions" => Some(self.emissions),
            "capex" => Some(self.capex),
            "opex" => Some(self.opex),
            _ => None,
        }
    }
}

/// Bus balance off by more than the tolerance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConservationViolation {
    pub bus: String,
    pub step: usize,
    pub imbalance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub framework: Framework,
    pub system: String,
    pub timeindex: Vec<NaiveDateTime>,
    /// Names of the balancing nodes in `node_load`.
    pub buses: Vec<String>,
    pub node_load: BTreeMap<String, LoadTable>,
    pub node_installed_capacity: BTreeMap<String, Capacity>,
    pub node_original_capacity: BTreeMap<String, Capacity>,
    pub node_expansion_costs: BTreeMap<String, f64>,
    /// State of charge (MWh).
    pub node_soc: BTreeMap<String, Vec<f64>>,
    /// MWh over the horizon.
    pub edge_net_energy_flow: BTreeMap<EdgeLabel, f64>,
    pub edge_specific_flow_costs: BTreeMap<EdgeLabel, f64>,
    pub edge_specific_emissions: BTreeMap<EdgeLabel, f64>,
    pub edge_weight: BTreeMap<EdgeLabel, f64>,
    pub global_results: GlobalResults,
    pub deviations: Vec<Deviation>,
    pub pruned: PrunedTopology,
    /// Bus rows found out of balance when the result was normalized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imbalances: Vec<ConservationViolation>,
}

impl NormalizedResult {
    /// Bus rows of `node_load` that do not sum to zero.
    pub fn conservation_violations(&self, tol: Tolerances) -> Vec<ConservationViolation> {
        let mut violations = Vec::new();
        for bus in &self.buses {
            let Some(table) = self.node_load.get(bus) else {
                continue;
            };
            for step in 0..table.len() {
                let imbalance = table.row_sum(step);
                if !nearly_equal(imbalance, 0.0, tol) {
                    violations.push(ConservationViolation {
                        bus: bus.clone(),
                        step,
                        imbalance,
                    });
                }
            }
        }
        violations
    }

    pub fn is_balanced(&self) -> bool {
        self.imbalances.is_empty()
    }

    pub fn load(&self, node: &str, counterpart: &str) -> Option<&[f64]> {
        self.node_load.get(node)?.column(counterpart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_table_nets_shared_columns() {
        let mut table = LoadTable::default();
        table.add("Battery", 1.0, &[2.0, 0.0]);
        table.add("Battery", -1.0, &[0.0, 3.0]);
        table.add("Generator", -1.0, &[2.0, -3.0]);
        assert_eq!(table.column("Battery"), Some(&[2.0, -3.0][..]));
        assert_eq!(table.row_sum(0), 0.0);
        assert_eq!(table.row_sum(1), 0.0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn capacity_serializes_untagged() {
        let scalar = serde_json::to_string(&Capacity::Scalar(15.0)).unwrap();
        assert_eq!(scalar, "15.0");
        let per: Capacity = serde_json::from_str(r#"{"Heatline":6.0,"Powerline":8.0}"#).unwrap();
        assert_eq!(per.total(), 14.0);
        assert_eq!(per.get("Heatline"), Some(6.0));
    }

    #[test]
    fn global_results_by_key() {
        let g = GlobalResults {
            costs: 3.0,
            emissions: 1.0,
            capex: 1.0,
            opex: 2.0,
        };
        for key in GlobalResults::KEYS {
            assert!(g.get(key).is_some());
        }
        assert_eq!(g.get("revenue"), None);
    }
}
