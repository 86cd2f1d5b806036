//! Flow bounds in nominal-value-plus-fraction form.

use esh_model::{EnergySystem, Flow};

use crate::error::{TransformError, TransformResult};

/// Flow limits as most frameworks state them: a nominal capacity and
/// per-step fractions of it.
#[derive(Clone, Debug, PartialEq)]
pub struct NominalBounds {
    /// `None` when the flow is unconstrained.
    pub nominal: Option<f64>,
    /// Per-step minimum as a fraction of `nominal` (empty when unconstrained).
    pub min: Vec<f64>,
    /// Per-step maximum as a fraction of `nominal` (empty when unconstrained).
    pub max: Vec<f64>,
}

impl NominalBounds {
    pub fn is_unconstrained(&self) -> bool {
        self.nominal.is_none()
    }

    /// True when minimum and maximum coincide at every step.
    pub fn is_fixed(&self) -> bool {
        self.nominal.is_some() && self.min == self.max
    }

    pub fn has_positive_minimum(&self) -> bool {
        self.min.iter().any(|v| *v > 0.0)
    }

    /// Absolute per-step maximum, `None` when unconstrained.
    pub fn absolute_max(&self) -> Option<Vec<f64>> {
        let nominal = self.nominal?;
        Some(self.max.iter().map(|f| f * nominal).collect())
    }

    pub fn absolute_min(&self) -> Option<Vec<f64>> {
        let nominal = self.nominal?;
        Some(self.min.iter().map(|f| f * nominal).collect())
    }
}

/// Translate the flow bounds (and any source/sink profile) into nominal
/// form.
///
/// A finite flow maximum becomes the nominal value. Without one, a profile
/// maximum supplies it; a flow with neither is unconstrained. A positive
/// minimum without any finite maximum cannot be written as a fraction and
/// fails with `SchemaMismatch`.
pub fn unpack_bounds(system: &EnergySystem, flow: &Flow) -> TransformResult<NominalBounds> {
    let steps = system.step_bounds(flow);
    let nominal = if flow.bounds.is_bounded() {
        Some(flow.bounds.max())
    } else {
        let peak = steps.iter().map(|(_, hi)| *hi).fold(f64::NEG_INFINITY, f64::max);
        peak.is_finite().then_some(peak)
    };

    match nominal {
        Some(nominal) => {
            let fraction = |v: f64| if nominal > 0.0 { v / nominal } else { 0.0 };
            Ok(NominalBounds {
                nominal: Some(nominal),
                min: steps.iter().map(|(lo, _)| fraction(*lo)).collect(),
                max: steps.iter().map(|(_, hi)| fraction(hi.min(nominal))).collect(),
            })
        }
        None => {
            if steps.iter().any(|(lo, _)| *lo > 0.0) {
                return Err(TransformError::mismatch(
                    system.label(flow).to_string(),
                    "a positive minimum without a finite maximum cannot be stated relative to a nominal value",
                ));
            }
            Ok(NominalBounds {
                nominal: None,
                min: Vec::new(),
                max: Vec::new(),
            })
        }
    }
}
