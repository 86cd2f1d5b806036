//! Cross-framework comparison of global results.

use esh_core::{ComparisonTolerance, relative_difference};
use esh_transform::{Deviation, Framework};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::normalized::NormalizedResult;

/// Global result keys two frameworks must agree on.
pub const COMPARED_KEYS: [&str; 2] = ["costs", "emissions"];

/// Two frameworks whose results differ beyond the tolerance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub key: String,
    pub left: Framework,
    pub right: Framework,
    pub left_value: f64,
    pub right_value: f64,
    pub relative_difference: f64,
    /// Deviations reported by either side.
    pub attribution: Vec<Deviation>,
}

impl Disagreement {
    /// True when neither side re-expressed anything, so the gap cannot be
    /// explained by a transformation.
    pub fn is_unattributed(&self) -> bool {
        self.attribution.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub frameworks: Vec<Framework>,
    pub tolerance: f64,
    pub disagreements: Vec<Disagreement>,
}

impl Comparison {
    pub fn agrees(&self) -> bool {
        self.disagreements.is_empty()
    }

    pub fn disagreements_on<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Disagreement> {
        self.disagreements.iter().filter(move |d| d.key == key)
    }
}

/// Pairwise check of `costs` and `emissions` within the relative tolerance.
pub fn compare(results: &[NormalizedResult], tolerance: &ComparisonTolerance) -> Comparison {
    let mut comparison = Comparison {
        frameworks: results.iter().map(|r| r.framework).collect(),
        tolerance: tolerance.relative,
        disagreements: Vec::new(),
    };

    for (i, left) in results.iter().enumerate() {
        for right in &results[i + 1..] {
            for key in COMPARED_KEYS {
                let (Some(a), Some(b)) = (left.global_results.get(key), right.global_results.get(key)) else {
                    continue;
                };
                let diff = relative_difference(a, b);
                debug!(key, left = %left.framework, right = %right.framework, diff, "compared");
                if diff > tolerance.relative {
                    comparison.disagreements.push(Disagreement {
                        key: key.to_string(),
                        left: left.framework,
                        right: right.framework,
                        left_value: a,
                        right_value: b,
                        relative_difference: diff,
                        attribution: left
                            .deviations
                            .iter()
                            .chain(&right.deviations)
                            .cloned()
                            .collect(),
                    });
                }
            }
        }
    }

    info!(
        frameworks = comparison.frameworks.len(),
        disagreements = comparison.disagreements.len(),
        "comparison finished"
    );
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::GlobalResults;
    use esh_transform::{DeviationCause, PrunedTopology};
    use std::collections::BTreeMap;

    fn result(framework: Framework, costs: f64, emissions: f64, deviations: Vec<Deviation>) -> NormalizedResult {
        NormalizedResult {
            framework,
            system: "test".into(),
            timeindex: Vec::new(),
            buses: Vec::new(),
            node_load: BTreeMap::new(),
            node_installed_capacity: BTreeMap::new(),
            node_original_capacity: BTreeMap::new(),
            node_expansion_costs: BTreeMap::new(),
            node_soc: BTreeMap::new(),
            edge_net_energy_flow: BTreeMap::new(),
            edge_specific_flow_costs: BTreeMap::new(),
            edge_specific_emissions: BTreeMap::new(),
            edge_weight: BTreeMap::new(),
            global_results: GlobalResults {
                costs,
                emissions,
                capex: 0.0,
                opex: costs,
            },
            deviations,
            pruned: PrunedTopology::default(),
            imbalances: Vec::new(),
        }
    }

    #[test]
    fn within_tolerance_agrees() {
        let results = [
            result(Framework::Oemof, 1000.0, 50.0, vec![]),
            result(Framework::Pypsa, 1005.0, 50.2, vec![]),
        ];
        let comparison = compare(&results, &ComparisonTolerance::default());
        assert!(comparison.agrees());
        assert_eq!(comparison.frameworks, vec![Framework::Oemof, Framework::Pypsa]);
    }

    #[test]
    fn disagreement_lists_deviations_of_both_sides() {
        let averaged = Deviation::new("Boiler->Heat", DeviationCause::EfficiencyAveraged { mean: 0.9 });
        let results = [
            result(Framework::Oemof, 1000.0, 50.0, vec![]),
            result(Framework::Fine, 1100.0, 50.0, vec![averaged.clone()]),
            result(Framework::Calliope, 1000.0, 50.0, vec![]),
        ];
        let comparison = compare(&results, &ComparisonTolerance::default());
        let costs: Vec<_> = comparison.disagreements_on("costs").collect();
        assert_eq!(costs.len(), 2);
        assert!(costs.iter().all(|d| d.attribution == vec![averaged.clone()]));
        assert_eq!(comparison.disagreements_on("emissions").count(), 0);
    }

    #[test]
    fn tolerance_is_configurable() {
        let results = [
            result(Framework::Oemof, 100.0, 0.0, vec![]),
            result(Framework::Pypsa, 104.0, 0.0, vec![]),
        ];
        assert!(!compare(&results, &ComparisonTolerance::default()).agrees());
        let loose = ComparisonTolerance { relative: 0.05 };
        assert!(compare(&results, &loose).agrees());
        let strict = compare(&results, &ComparisonTolerance::default());
        assert!(strict.disagreements[0].is_unattributed());
    }
}
