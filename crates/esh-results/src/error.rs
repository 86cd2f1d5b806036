//! Normalization and storage errors.

use esh_core::CoreError;
use esh_transform::Framework;
use thiserror::Error;

pub type NormalizeResult<T> = Result<T, NormalizeError>;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("{framework} reports the model infeasible (status '{status}')")]
    Infeasible { framework: Framework, status: String },

    #[error("Unit '{unit}' declared by {framework} cannot be mapped onto the unit convention: {source}")]
    UnitConsistency {
        framework: Framework,
        unit: String,
        #[source]
        source: CoreError,
    },

    #[error("Missing result series for '{uid}'")]
    MissingSeries { uid: String },

    #[error("Result series for '{uid}' has {actual} values, expected {expected}")]
    Shape {
        uid: String,
        expected: usize,
        actual: usize,
    },
}

impl NormalizeError {
    pub(crate) fn missing(uid: impl Into<String>) -> Self {
        NormalizeError::MissingSeries { uid: uid.into() }
    }

    pub(crate) fn unit(framework: Framework, unit: &str, source: CoreError) -> Self {
        NormalizeError::UnitConsistency {
            framework,
            unit: unit.to_string(),
            source,
        }
    }
}

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),
}
