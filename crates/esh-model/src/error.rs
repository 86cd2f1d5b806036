//! Model construction and validation errors.

use thiserror::Error;

use crate::params::ParamError;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// A referenced node is missing or the structure is not a valid energy system.
    #[error("Schema error at '{uid}': {what}")]
    Schema { uid: String, what: String },

    #[error("Duplicate identity: a node named '{uid}' already exists")]
    DuplicateUid { uid: String },

    #[error("Invalid parameter on '{uid}': {source}")]
    InvalidParameter {
        uid: String,
        #[source]
        source: ParamError,
    },

    #[error("Timeseries on '{uid}' has {actual} steps but the timeframe has {expected}")]
    TimeseriesLength {
        uid: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid timeframe: {what}")]
    Timeframe { what: String },

    #[error("Mapping could not be read: {0}")]
    Mapping(#[from] serde_json::Error),

    #[error("External parser failed: {what}")]
    External { what: String },
}

impl ModelError {
    pub(crate) fn schema(uid: impl Into<String>, what: impl Into<String>) -> Self {
        ModelError::Schema {
            uid: uid.into(),
            what: what.into(),
        }
    }

    pub(crate) fn param(uid: impl Into<String>, source: ParamError) -> Self {
        ModelError::InvalidParameter {
            uid: uid.into(),
            source,
        }
    }
}
