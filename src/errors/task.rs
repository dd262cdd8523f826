use thiserror::Error;

use super::{PushError, SourceError, StoreError};

/// The typed failure of one scheduled task run, recorded by the orchestrator.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

impl TaskError {
    /// Short, stable label for status reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Source(SourceError::Fetch(_)) => "fetch",
            TaskError::Source(SourceError::Decode(_)) => "decode",
            TaskError::Source(SourceError::Provider(_)) => "provider",
            TaskError::Source(SourceError::Bulletin(_)) => "parse",
            TaskError::Source(SourceError::Store(_)) | TaskError::Store(_) => "store",
            TaskError::Push(_) => "push",
            TaskError::Panicked(_) => "panic",
            TaskError::UnknownTask(_) => "unknown_task",
        }
    }
}
