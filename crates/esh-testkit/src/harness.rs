//! Transform, script and normalize a scenario in one call.

use esh_core::HarmonyConfig;
use esh_results::{
    CalliopeResultier, FineResultier, NormalizeError, NormalizedResult, OemofResultier, PypsaResultier,
    Resultier,
};
use esh_transform::{
    Adapter, AdapterOptions, CalliopeAdapter, FineAdapter, OemofAdapter, PypsaAdapter, TransformError,
};
use thiserror::Error;

use crate::scenario::Scenario;
use crate::script::{Script, scripted};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

pub fn evaluate<A, R>(
    adapter: &A,
    resultier: &R,
    scenario: &Scenario,
    options: &AdapterOptions,
    config: &HarmonyConfig,
) -> HarnessResult<NormalizedResult>
where
    A: Adapter,
    A::Input: Script<Output = R::Output>,
    R: Resultier<Input = A::Input>,
{
    let transformation = adapter.transform(&scenario.system, options, config)?;
    let native = scripted(&transformation, &scenario.system, &scenario.dispatch);
    Ok(resultier.normalize(&native, &scenario.system, config)?)
}

/// Normalized results of every framework, in `Framework::ALL` order.
pub fn evaluate_all(
    scenario: &Scenario,
    options: &AdapterOptions,
    config: &HarmonyConfig,
) -> HarnessResult<Vec<NormalizedResult>> {
    Ok(vec![
        evaluate(&OemofAdapter, &OemofResultier, scenario, options, config)?,
        evaluate(&PypsaAdapter, &PypsaResultier, scenario, options, config)?,
        evaluate(&FineAdapter, &FineResultier, scenario, options, config)?,
        evaluate(&CalliopeAdapter, &CalliopeResultier, scenario, options, config)?,
    ])
}
