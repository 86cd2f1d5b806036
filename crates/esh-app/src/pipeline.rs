//! Transform, solve, normalize and compare.

use std::time::Instant;

use esh_core::HarmonyConfig;
use esh_model::EnergySystem;
use esh_results::{
    CalliopeResultier, CalliopeResults, Comparison, FineResultier, FineResults, NativeResult,
    NormalizedResult, OemofResultier, OemofResults, PypsaResultier, PypsaSolution, Resultier, RunId,
    RunManifest, RunStore, compare, compute_run_id,
};
use esh_transform::{
    Adapter, AdapterOptions, CalliopeAdapter, CalliopeModel, FineAdapter, FineModel, Framework,
    OemofAdapter, OemofEnergySystem, PypsaAdapter, PypsaNetwork, Transformation,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::progress::{Reporter, RunProgressEvent, RunStage};
use crate::solver::{Directive, ExecutionLimits, SharedSolver, run_bounded};

/// Options for evaluating a system.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub adapter: AdapterOptions,
    pub limits: ExecutionLimits,
    /// Reuse a stored result with the same run id instead of solving.
    pub use_cache: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            adapter: AdapterOptions::default(),
            limits: ExecutionLimits::default(),
            use_cache: true,
        }
    }
}

/// Request to evaluate one system.
pub struct RunRequest<'a> {
    pub system: &'a EnergySystem,
    pub config: &'a HarmonyConfig,
    pub options: RunOptions,
    /// Results are persisted here when set.
    pub store: Option<&'a RunStore>,
    pub cancel: CancellationToken,
}

impl<'a> RunRequest<'a> {
    pub fn new(system: &'a EnergySystem, config: &'a HarmonyConfig) -> Self {
        Self {
            system,
            config,
            options: RunOptions::default(),
            store: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: RunId,
    pub result: NormalizedResult,
    pub loaded_from_cache: bool,
    pub solve_time_s: f64,
}

/// One solver per framework; absent frameworks are skipped.
#[derive(Clone, Default)]
pub struct SolverSet {
    pub oemof: Option<SharedSolver<OemofEnergySystem, OemofResults>>,
    pub pypsa: Option<SharedSolver<PypsaNetwork, PypsaSolution>>,
    pub fine: Option<SharedSolver<FineModel, FineResults>>,
    pub calliope: Option<SharedSolver<CalliopeModel, CalliopeResults>>,
}

impl SolverSet {
    /// Registered frameworks in `Framework::ALL` order.
    pub fn frameworks(&self) -> Vec<Framework> {
        let registered = [
            self.oemof.is_some(),
            self.pypsa.is_some(),
            self.fine.is_some(),
            self.calliope.is_some(),
        ];
        Framework::ALL
            .into_iter()
            .zip(registered)
            .filter_map(|(framework, present)| present.then_some(framework))
            .collect()
    }
}

/// Native models of one system for several frameworks.
#[derive(Debug, Clone, Default)]
pub struct TransformSet {
    pub oemof: Option<Transformation<OemofEnergySystem>>,
    pub pypsa: Option<Transformation<PypsaNetwork>>,
    pub fine: Option<Transformation<FineModel>>,
    pub calliope: Option<Transformation<CalliopeModel>>,
}

impl TransformSet {
    pub fn len(&self) -> usize {
        [
            self.oemof.is_some(),
            self.pypsa.is_some(),
            self.fine.is_some(),
            self.calliope.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transform `system` for each of `frameworks` in parallel.
///
/// Adapters only read the model, so the four transformations run on the
/// rayon pool without coordination. The first error in `Framework::ALL`
/// order is returned.
pub fn transform_all(
    system: &EnergySystem,
    frameworks: &[Framework],
    options: &AdapterOptions,
    config: &HarmonyConfig,
) -> AppResult<TransformSet> {
    fn maybe<A: Adapter>(
        adapter: A,
        frameworks: &[Framework],
        system: &EnergySystem,
        options: &AdapterOptions,
        config: &HarmonyConfig,
    ) -> esh_transform::TransformResult<Option<Transformation<A::Input>>> {
        if !frameworks.contains(&adapter.framework()) {
            return Ok(None);
        }
        adapter.transform(system, options, config).map(Some)
    }

    let ((oemof, pypsa), (fine, calliope)) = rayon::join(
        || {
            rayon::join(
                || maybe(OemofAdapter, frameworks, system, options, config),
                || maybe(PypsaAdapter, frameworks, system, options, config),
            )
        },
        || {
            rayon::join(
                || maybe(FineAdapter, frameworks, system, options, config),
                || maybe(CalliopeAdapter, frameworks, system, options, config),
            )
        },
    );

    let set = TransformSet {
        oemof: oemof?,
        pypsa: pypsa?,
        fine: fine?,
        calliope: calliope?,
    };
    debug!(system = system.uid(), count = set.len(), "transformed");
    Ok(set)
}

/// Transform, solve and normalize `request.system` for one framework.
pub async fn evaluate<A, R>(
    adapter: &A,
    resultier: &R,
    solver: SharedSolver<A::Input, R::Output>,
    request: &RunRequest<'_>,
    progress: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<RunResponse>
where
    A: Adapter,
    A::Input: 'static,
    R: Resultier<Input = A::Input>,
    R::Output: Send + 'static,
{
    let reporter = Reporter::new(progress);
    let framework = adapter.framework();
    reporter.emit(Some(framework), RunStage::Transforming, format!("Transforming for {framework}"));
    let transformation = adapter.transform(request.system, &request.options.adapter, request.config)?;

    let response = solve_and_normalize(transformation, resultier, solver, request, &reporter).await?;
    reporter.emit(Some(framework), RunStage::Completed, "Run completed");
    Ok(response)
}

/// Results of every registered framework and how they compare.
#[derive(Debug, Clone)]
pub struct Harmony {
    pub responses: Vec<RunResponse>,
    pub comparison: Comparison,
}

impl Harmony {
    pub fn results(&self) -> impl Iterator<Item = &NormalizedResult> {
        self.responses.iter().map(|r| &r.result)
    }

    pub fn result(&self, framework: Framework) -> Option<&NormalizedResult> {
        self.results().find(|r| r.framework == framework)
    }
}

/// Evaluate `request.system` with every solver in `solvers` and compare the
/// normalized results.
///
/// The solves run concurrently. The first failure aborts the run and the
/// remaining solvers are told to stop through their tokens.
pub async fn harmonize(
    solvers: &SolverSet,
    request: &RunRequest<'_>,
    progress: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<Harmony> {
    let reporter = Reporter::new(progress);
    let frameworks = solvers.frameworks();
    reporter.emit(
        None,
        RunStage::Transforming,
        format!("Transforming for {} frameworks", frameworks.len()),
    );
    let set = transform_all(request.system, &frameworks, &request.options.adapter, request.config)?;

    let (oemof, pypsa, fine, calliope) = tokio::try_join!(
        maybe_solve(solvers.oemof.as_ref(), set.oemof, &OemofResultier, request, &reporter),
        maybe_solve(solvers.pypsa.as_ref(), set.pypsa, &PypsaResultier, request, &reporter),
        maybe_solve(solvers.fine.as_ref(), set.fine, &FineResultier, request, &reporter),
        maybe_solve(solvers.calliope.as_ref(), set.calliope, &CalliopeResultier, request, &reporter),
    )?;
    let responses: Vec<RunResponse> = [oemof, pypsa, fine, calliope].into_iter().flatten().collect();

    reporter.emit(None, RunStage::Comparing, "Comparing global results");
    let results: Vec<NormalizedResult> = responses.iter().map(|r| r.result.clone()).collect();
    let comparison = compare(&results, &request.config.comparison);
    info!(
        system = request.system.uid(),
        frameworks = results.len(),
        disagreements = comparison.disagreements.len(),
        elapsed_s = reporter.elapsed_s(),
        "harmonized"
    );
    reporter.emit(None, RunStage::Completed, "Harmonization completed");

    Ok(Harmony {
        responses,
        comparison,
    })
}

async fn maybe_solve<I, R>(
    solver: Option<&SharedSolver<I, R::Output>>,
    transformation: Option<Transformation<I>>,
    resultier: &R,
    request: &RunRequest<'_>,
    reporter: &Reporter<'_>,
) -> AppResult<Option<RunResponse>>
where
    I: Clone + Serialize + Send + Sync + 'static,
    R: Resultier<Input = I>,
    R::Output: Send + 'static,
{
    match (solver, transformation) {
        (Some(solver), Some(transformation)) => {
            solve_and_normalize(transformation, resultier, solver.clone(), request, reporter)
                .await
                .map(Some)
        }
        _ => Ok(None),
    }
}

async fn solve_and_normalize<I, R>(
    transformation: Transformation<I>,
    resultier: &R,
    solver: SharedSolver<I, R::Output>,
    request: &RunRequest<'_>,
    reporter: &Reporter<'_>,
) -> AppResult<RunResponse>
where
    I: Clone + Serialize + Send + Sync + 'static,
    R: Resultier<Input = I>,
    R::Output: Send + 'static,
{
    let framework = transformation.framework;
    let solver_version = solver.version();
    let run_id = compute_run_id(&transformation.native, framework, &solver_version)?;

    if let Some(store) = request.store {
        reporter.emit(Some(framework), RunStage::CheckingCache, "Checking run cache");
        if request.options.use_cache && store.has_run(&run_id) {
            reporter.emit(Some(framework), RunStage::LoadingCachedResult, "Loading cached run");
            let result = store.load_result(&run_id)?;
            info!(%framework, %run_id, "loaded cached run");
            return Ok(RunResponse {
                run_id,
                result,
                loaded_from_cache: true,
                solve_time_s: 0.0,
            });
        }
    }

    for deviation in &transformation.deviations {
        debug!(%framework, uid = %deviation.uid, cause = ?deviation.cause, "deviation");
    }

    reporter.emit(
        Some(framework),
        RunStage::Solving,
        format!("Solving with {framework} solver {solver_version}"),
    );
    let solve_started = Instant::now();
    let output = run_bounded(
        solver,
        transformation.native.clone(),
        Directive::for_system(request.system),
        request.options.limits,
        &request.cancel,
    )
    .await?;
    let solve_time_s = solve_started.elapsed().as_secs_f64();

    reporter.emit(Some(framework), RunStage::Normalizing, "Normalizing native results");
    let native = NativeResult::new(transformation, output);
    let result = resultier.normalize(&native, request.system, request.config)?;

    if let Some(store) = request.store {
        reporter.emit(Some(framework), RunStage::SavingResults, "Saving results");
        let manifest = RunManifest::for_result(run_id.clone(), &result, &solver_version);
        store.save_run(&manifest, &result)?;
    }
    info!(%framework, %run_id, solve_time_s, costs = result.global_results.costs, "run finished");

    Ok(RunResponse {
        run_id,
        result,
        loaded_from_cache: false,
        solve_time_s,
    })
}
