use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Import not found: {id}")]
    NotFound { id: String },

    /// The run was marked FAILED before this error was returned.
    #[error("Import {run_id} failed: {cause}")]
    RunFailed { run_id: String, cause: anyhow::Error },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl IngestError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
