//! Error types for the esh-app service layer.

use std::time::Duration;

use esh_results::{NormalizeError, ResultsError};
use esh_transform::{Framework, TransformError};

/// Why a solve was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Requested,
    /// The execution limit elapsed first.
    Timeout(Duration),
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancelled by caller"),
            CancelReason::Timeout(limit) => write!(f, "timed out after {:.3}s", limit.as_secs_f64()),
        }
    }
}

/// Application error type wrapping the transformation, normalization and
/// storage errors plus the failures of the solver boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Results error: {0}")]
    Results(#[from] ResultsError),

    #[error("{framework} solver {reason}")]
    SolverCancelled { framework: Framework, reason: CancelReason },

    #[error("{framework} solver reports the model infeasible (status '{status}')")]
    Infeasible { framework: Framework, status: String },

    #[error("{framework} solver failed: {message}")]
    Solver { framework: Framework, message: String },

    #[error("No solver registered for {0}")]
    NoSolver(Framework),
}

impl AppError {
    /// True for errors produced by the execution boundary rather than the
    /// model or its results.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::SolverCancelled { .. })
    }
}

/// Result type for esh-app operations.
pub type AppResult<T> = Result<T, AppError>;
