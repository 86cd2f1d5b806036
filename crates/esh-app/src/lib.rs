//! Service layer for the energy-system harmonizer.
//!
//! Wraps the synchronous transform and normalize crates with the one
//! operation that blocks: solving. Solves run behind a cancellable,
//! timeout-bounded boundary; transformations for several frameworks run in
//! parallel on the rayon pool.

pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod solver;

pub use error::{AppError, AppResult, CancelReason};
pub use pipeline::{
    Harmony, RunOptions, RunRequest, RunResponse, SolverSet, TransformSet, evaluate, harmonize,
    transform_all,
};
pub use progress::{RunProgressEvent, RunStage};
pub use solver::{
    Directive, ExecutionLimits, Objective, SharedSolver, Solver, SolverFailure, run_bounded,
};
