//! Error kinds shared by every command of the editing core.
//!
//! Commands fail synchronously with one of these variants. Generation failures
//! are the exception: they happen on a worker and are delivered through the
//! terminal state of the task (see [`pipeline`](crate::pipeline)).

use crate::imaging::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A referenced entry, cluster, session or task id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// The operation would break a structural invariant (duplicate membership,
    /// empty cluster, duplicate in-flight generation, duplicate open session).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A parameter value is out of range or does not fit the cluster.
    #[error("Invalid value: {0}")]
    Validation(String),
    #[error("Generation failed: {0}")]
    Generation(#[from] BackendError),
    #[error("Worker pool could not be started: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl CoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = CoreError::not_found("Cluster", 7);
        assert_eq!(err.to_string(), "Cluster not found: 7");
    }

    #[test]
    fn backend_error_converts_to_generation() {
        let err: CoreError = BackendError::ProcessingFailed("bad pixels".into()).into();
        assert!(matches!(err, CoreError::Generation(_)));
        assert!(err.to_string().contains("bad pixels"));
    }
}
