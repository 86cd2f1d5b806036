//! Transformation errors.

use esh_model::ModelError;
use thiserror::Error;

use crate::framework::Framework;

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Error, Debug)]
pub enum TransformError {
    /// The construct has no lossless representation in the target schema.
    #[error("Schema mismatch at '{uid}': {what}")]
    SchemaMismatch { uid: String, what: String },

    /// The target has no counterpart for this component or feature.
    #[error("{framework} does not support {component} at '{uid}'")]
    UnsupportedComponent {
        uid: String,
        component: String,
        framework: Framework,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl TransformError {
    pub(crate) fn mismatch(uid: impl Into<String>, what: impl Into<String>) -> Self {
        TransformError::SchemaMismatch {
            uid: uid.into(),
            what: what.into(),
        }
    }

    pub(crate) fn unsupported(
        uid: impl Into<String>,
        component: impl Into<String>,
        framework: Framework,
    ) -> Self {
        TransformError::UnsupportedComponent {
            uid: uid.into(),
            component: component.into(),
            framework,
        }
    }

    /// Name of the offending node or edge, if any.
    pub fn uid(&self) -> Option<&str> {
        match self {
            TransformError::SchemaMismatch { uid, .. }
            | TransformError::UnsupportedComponent { uid, .. } => Some(uid),
            TransformError::Model(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names_framework_and_uid() {
        let err = TransformError::unsupported("Tie", "connector", Framework::Fine);
        let msg = err.to_string();
        assert!(msg.contains("fine"));
        assert!(msg.contains("Tie"));
        assert_eq!(err.uid(), Some("Tie"));
    }
}
