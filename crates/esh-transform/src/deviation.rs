//! Deviations: places where a transformation had to re-express a construct.
//!
//! Every deviation names the affected node or edge and its cause so that
//! disagreements between frameworks can be attributed.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviationCause {
    /// Specific emissions moved from one edge to an equivalent position.
    EmissionReallocated { from: String, to: String, factor: f64 },
    /// Specific costs moved from one edge to an equivalent position.
    CostReallocated { from: String, to: String, factor: f64 },
    /// Time-varying efficiency replaced by its mean.
    EfficiencyAveraged { mean: f64 },
    /// Separate charge/discharge efficiencies replaced by one value.
    EfficienciesConflated {
        charge: f64,
        discharge: f64,
        round_trip: f64,
    },
    /// Connector expressed as one-way conversions.
    ConnectorSynthesized { conversions: Vec<String> },
    /// Cyclic storage whose native form ignores the initial level.
    InitialSocReleased { initial_soc: f64 },
}

impl DeviationCause {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviationCause::EmissionReallocated { .. } => "emission_reallocated",
            DeviationCause::CostReallocated { .. } => "cost_reallocated",
            DeviationCause::EfficiencyAveraged { .. } => "efficiency_averaged",
            DeviationCause::EfficienciesConflated { .. } => "efficiencies_conflated",
            DeviationCause::ConnectorSynthesized { .. } => "connector_synthesized",
            DeviationCause::InitialSocReleased { .. } => "initial_soc_released",
        }
    }

    /// True when the native optimum is unaffected by the re-expression.
    pub fn is_lossless(&self) -> bool {
        match self {
            DeviationCause::EmissionReallocated { .. }
            | DeviationCause::CostReallocated { .. }
            | DeviationCause::ConnectorSynthesized { .. } => true,
            DeviationCause::EfficiencyAveraged { .. }
            | DeviationCause::InitialSocReleased { .. } => false,
            DeviationCause::EfficienciesConflated {
                charge, discharge, ..
            } => charge == discharge,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    /// Affected node name or edge label.
    pub uid: String,
    pub cause: DeviationCause,
}

impl Deviation {
    pub fn new(uid: impl Into<String>, cause: DeviationCause) -> Self {
        Self {
            uid: uid.into(),
            cause,
        }
    }
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at '{}'", self.cause.kind(), self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reallocations_are_lossless_averaging_is_not() {
        let moved = DeviationCause::CostReallocated {
            from: "CHP->Heatline".into(),
            to: "Gas->CHP".into(),
            factor: 0.6,
        };
        assert!(moved.is_lossless());
        assert!(!DeviationCause::EfficiencyAveraged { mean: 0.4 }.is_lossless());
    }

    #[test]
    fn deviation_serializes_with_tag() {
        let d = Deviation::new("Battery", DeviationCause::InitialSocReleased { initial_soc: 0.5 });
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains(r#""type":"initial_soc_released""#));
        assert_eq!(d.to_string(), "initial_soc_released at 'Battery'");
    }
}
