use async_trait::async_trait;
use tracing::debug;

use crate::errors::PushError;
use crate::models::PushMessage;

pub const DEFAULT_PUSH_BATCH_SIZE: usize = 100;

/// Delivers push messages to devices.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Sends every message, returning how many were accepted.
    async fn send(&self, messages: &[PushMessage]) -> Result<usize, PushError>;
}

/// Expo-style push API: a JSON array of messages per POST.
pub struct ExpoPushGateway {
    client: reqwest::Client,
    url: String,
    batch_size: usize,
}

impl ExpoPushGateway {
    pub fn new(client: reqwest::Client, url: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            url: url.into(),
            batch_size: if batch_size == 0 {
                DEFAULT_PUSH_BATCH_SIZE
            } else {
                batch_size
            },
        }
    }
}

/// One HTTP request's worth of messages.
#[async_trait]
trait BatchPoster: Send + Sync {
    async fn post_batch(&self, batch: &[PushMessage]) -> Result<(), PushError>;
}

#[async_trait]
impl BatchPoster for ExpoPushGateway {
    async fn post_batch(&self, batch: &[PushMessage]) -> Result<(), PushError> {
        let response = self.client.post(&self.url).json(batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Posts `messages` in chunks of `batch_size`, stopping at the first failed
/// chunk. A failure after earlier chunks went through is reported as
/// [`PushError::Partial`] so callers can still count what was delivered.
async fn send_in_batches(
    poster: &dyn BatchPoster,
    messages: &[PushMessage],
    batch_size: usize,
) -> Result<usize, PushError> {
    let mut sent = 0;
    for chunk in messages.chunks(batch_size.max(1)) {
        if let Err(e) = poster.post_batch(chunk).await {
            return Err(if sent == 0 {
                e
            } else {
                PushError::Partial {
                    accepted: sent,
                    source: Box::new(e),
                }
            });
        }
        debug!("Push gateway accepted {} messages", chunk.len());
        sent += chunk.len();
    }
    Ok(sent)
}

#[async_trait]
impl PushGateway for ExpoPushGateway {
    async fn send(&self, messages: &[PushMessage]) -> Result<usize, PushError> {
        send_in_batches(self, messages, self.batch_size).await
    }
}
