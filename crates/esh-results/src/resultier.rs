//! The resultier seam: native solver output back into the uniform schema.

use esh_core::HarmonyConfig;
use esh_model::EnergySystem;
use esh_transform::{Framework, Transformation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NormalizeError, NormalizeResult};
use crate::normalized::NormalizedResult;
use crate::readout::{Readout, compose};

/// Snapshot of one transformation together with the solver's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeResult<I, O> {
    pub transformation: Transformation<I>,
    pub output: O,
}

impl<I, O> NativeResult<I, O> {
    pub fn new(transformation: Transformation<I>, output: O) -> Self {
        Self {
            transformation,
            output,
        }
    }

    pub fn native(&self) -> &I {
        &self.transformation.native
    }
}

/// Normalization of one framework's native results.
///
/// Resultiers are stateless. Normalization either yields a complete result
/// or fails; nothing partial is ever returned.
pub trait Resultier: Send + Sync {
    type Input;
    type Output;

    fn framework(&self) -> Framework;

    fn normalize(
        &self,
        native: &NativeResult<Self::Input, Self::Output>,
        system: &EnergySystem,
        config: &HarmonyConfig,
    ) -> NormalizeResult<NormalizedResult>;
}

/// Fails unless the native status reports an optimal solution.
pub(crate) fn ensure_optimal(framework: Framework, status: &str) -> NormalizeResult<()> {
    match status.trim().to_lowercase().as_str() {
        "optimal" | "ok" => Ok(()),
        _ => Err(NormalizeError::Infeasible {
            framework,
            status: status.to_string(),
        }),
    }
}

/// Compose the readout and record imbalanced buses on the result.
pub(crate) fn finish<I>(
    system: &EnergySystem,
    transformation: &Transformation<I>,
    readout: Readout,
    config: &HarmonyConfig,
) -> NormalizeResult<NormalizedResult> {
    let mut result = compose(
        system,
        transformation.framework,
        &transformation.deviations,
        &transformation.pruned,
        readout,
    )?;
    let violations = result.conservation_violations(config.conservation);
    if let Some(first) = violations.first() {
        warn!(
            framework = %transformation.framework,
            count = violations.len(),
            bus = %first.bus,
            step = first.step,
            imbalance = first.imbalance,
            "normalized loads do not balance"
        );
    }
    result.imbalances = violations;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_optimal_statuses_pass() {
        assert!(ensure_optimal(Framework::Pypsa, "Optimal").is_ok());
        assert!(ensure_optimal(Framework::Fine, "ok").is_ok());
        let err = ensure_optimal(Framework::Calliope, "infeasible").unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Infeasible { framework: Framework::Calliope, ref status } if status == "infeasible"
        ));
    }
}
