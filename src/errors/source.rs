use thiserror::Error;

use super::StoreError;

/// Errors that abort a single source adapter run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Provider returned an error: {0}")]
    Provider(String),

    #[error("Bulletin parse error: {0}")]
    Bulletin(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<quick_xml::Error> for SourceError {
    fn from(e: quick_xml::Error) -> Self {
        SourceError::Bulletin(e.to_string())
    }
}
