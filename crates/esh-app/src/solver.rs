//! The solver boundary.
//!
//! Native solvers are blocking and may run for hours. [`run_bounded`] moves a
//! solve onto tokio's blocking pool and races it against an execution limit
//! and the caller's [`CancellationToken`]. A solve that loses the race, or
//! whose caller stops waiting, is told to stop through its own child token and
//! nothing it produces afterwards is observed.

use std::sync::Arc;
use std::time::Duration;

use esh_model::EnergySystem;
use esh_transform::Framework;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, CancelReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MinimizeCost,
}

/// What the solver is asked to optimize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub objective: Objective,
    /// Secondary limit on total emissions in the declared mass unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_limit: Option<f64>,
}

impl Directive {
    pub fn for_system(system: &EnergySystem) -> Self {
        Self {
            objective: Objective::MinimizeCost,
            emission_limit: system.global_constraints().emissions,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// `None` waits for the solver indefinitely.
    pub timeout: Option<Duration>,
}

impl ExecutionLimits {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Failure signalled by a native solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverFailure {
    #[error("infeasible (status '{status}')")]
    Infeasible { status: String },
    /// The solver observed its token and stopped early.
    #[error("stopped on cancellation")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// A native optimizer for one framework's schema.
///
/// `solve` blocks. Long-running implementations poll `cancel` between
/// iterations and return [`SolverFailure::Cancelled`] once it fires.
pub trait Solver: Send + Sync {
    type Input;
    type Output;

    fn framework(&self) -> Framework;

    /// Reported in run manifests and mixed into run ids.
    fn version(&self) -> String {
        "unknown".to_string()
    }

    fn solve(
        &self,
        input: &Self::Input,
        directive: &Directive,
        cancel: &CancellationToken,
    ) -> Result<Self::Output, SolverFailure>;
}

/// Solver for a framework's native schema, shareable across tasks.
pub type SharedSolver<I, O> = Arc<dyn Solver<Input = I, Output = O>>;

/// Run `solver` on a blocking worker, bounded by `limits` and `cancel`.
pub async fn run_bounded<S>(
    solver: Arc<S>,
    input: S::Input,
    directive: Directive,
    limits: ExecutionLimits,
    cancel: &CancellationToken,
) -> AppResult<S::Output>
where
    S: Solver + ?Sized + 'static,
    S::Input: Send + 'static,
    S::Output: Send + 'static,
{
    let framework = solver.framework();
    let worker = cancel.child_token();
    let token = worker.clone();
    // the worker is told to stop once this future finishes or is dropped
    let _stop_worker = worker.drop_guard();
    info!(%framework, timeout = ?limits.timeout, "solving");

    let handle = tokio::task::spawn_blocking(move || solver.solve(&input, &directive, &token));
    let deadline = async {
        match limits.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        joined = handle => joined.map_err(|e| AppError::Solver {
            framework,
            message: format!("solver worker panicked: {e}"),
        })?,
        () = cancel.cancelled() => {
            warn!(%framework, "solve cancelled");
            return Err(AppError::SolverCancelled { framework, reason: CancelReason::Requested });
        }
        () = deadline => {
            // select! only takes this branch when a limit is set
            let limit = limits.timeout.unwrap_or_default();
            warn!(%framework, limit_s = limit.as_secs_f64(), "solve timed out");
            return Err(AppError::SolverCancelled { framework, reason: CancelReason::Timeout(limit) });
        }
    };

    match outcome {
        Ok(output) => {
            debug!(%framework, "solver finished");
            Ok(output)
        }
        Err(SolverFailure::Infeasible { status }) => Err(AppError::Infeasible { framework, status }),
        Err(SolverFailure::Cancelled) => Err(AppError::SolverCancelled {
            framework,
            reason: CancelReason::Requested,
        }),
        Err(SolverFailure::Failed(message)) => Err(AppError::Solver { framework, message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    /// Spins until `steps` polls have passed or the token fires.
    struct Spin {
        steps: usize,
        observed_cancel: Arc<AtomicBool>,
    }

    impl Solver for Spin {
        type Input = f64;
        type Output = f64;

        fn framework(&self) -> Framework {
            Framework::Oemof
        }

        fn solve(&self, input: &f64, _: &Directive, cancel: &CancellationToken) -> Result<f64, SolverFailure> {
            for _ in 0..self.steps {
                if cancel.is_cancelled() {
                    self.observed_cancel.store(true, Ordering::SeqCst);
                    return Err(SolverFailure::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(input * 2.0)
        }
    }

    fn spin(steps: usize) -> (Arc<Spin>, Arc<AtomicBool>) {
        let observed = Arc::new(AtomicBool::new(false));
        let solver = Spin {
            steps,
            observed_cancel: observed.clone(),
        };
        (Arc::new(solver), observed)
    }

    #[tokio::test]
    async fn fast_solves_return_their_output() {
        let (solver, _) = spin(1);
        let limits = ExecutionLimits::with_timeout(Duration::from_secs(10));
        let out = run_bounded(solver, 21.0, Directive::default(), limits, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, 42.0);
    }

    #[tokio::test]
    async fn timeout_cancels_the_worker() {
        let (solver, observed) = spin(10_000);
        let limits = ExecutionLimits::with_timeout(Duration::from_millis(30));
        let started = Instant::now();
        let err = run_bounded(solver, 1.0, Directive::default(), limits, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::SolverCancelled { reason: CancelReason::Timeout(_), .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        for _ in 0..200 {
            if observed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn abandoned_solves_are_told_to_stop() {
        let (solver, observed) = spin(10_000);
        let cancel = CancellationToken::new();
        let solve = run_bounded(solver, 1.0, Directive::default(), ExecutionLimits::default(), &cancel);
        assert!(tokio::time::timeout(Duration::from_millis(20), solve).await.is_err());

        for _ in 0..200 {
            if observed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(observed.load(Ordering::SeqCst));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn caller_cancellation_wins_the_race() {
        let (solver, _) = spin(10_000);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = run_bounded(solver, 1.0, Directive::default(), ExecutionLimits::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::SolverCancelled { reason: CancelReason::Requested, .. }
        ));
    }

    #[tokio::test]
    async fn infeasibility_is_terminal() {
        struct Infeasible;
        impl Solver for Infeasible {
            type Input = ();
            type Output = ();
            fn framework(&self) -> Framework {
                Framework::Fine
            }
            fn solve(&self, _: &(), _: &Directive, _: &CancellationToken) -> Result<(), SolverFailure> {
                Err(SolverFailure::Infeasible {
                    status: "infeasible".to_string(),
                })
            }
        }

        let err = run_bounded(
            Arc::new(Infeasible),
            (),
            Directive::default(),
            ExecutionLimits::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Infeasible { framework: Framework::Fine, .. }));
    }

    #[test]
    fn directive_carries_the_emission_limit() {
        let system = esh_model::fixtures::chp_example().unwrap();
        assert_eq!(Directive::for_system(&system).emission_limit, Some(100.0));
        let minimal = esh_model::fixtures::minimal_example().unwrap();
        assert_eq!(Directive::for_system(&minimal).emission_limit, None);
    }
}
