use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),
    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl CoreError {
    /// Failures the write path may absorb by synthesizing a local-only record.
    /// Validation errors and concurrency rejections never qualify.
    pub fn allows_local_fallback(&self) -> bool {
        matches!(
            self,
            CoreError::RemoteUnavailable(_) | CoreError::ReconciliationConflict(_)
        )
    }
}
