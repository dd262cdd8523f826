use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Push gateway rejected batch with status {0}")]
    Rejected(u16),

    #[error("Push gateway accepted {accepted} messages before failing: {source}")]
    Partial {
        accepted: usize,
        source: Box<PushError>,
    },
}

impl PushError {
    /// Messages the gateway took before the failure.
    pub fn accepted(&self) -> usize {
        match self {
            PushError::Partial { accepted, .. } => *accepted,
            _ => 0,
        }
    }
}
