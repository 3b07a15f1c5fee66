use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier of a subscriber (a chat, group or channel) on the delivery side.
pub type SubscriberId = i64;

/// One organic result returned by a web search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber blocked delivery")]
    Blocked,
    #[error("subscriber not found")]
    NotFound,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Blocked and not-found mean the subscriber is gone for good.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Blocked | DeliveryError::NotFound)
    }
}

// Object style note:
// Implementations of these traits are shared by every concurrent subscriber task
// of a poll cycle, so they take &self and must be Send + Sync. Any state they
// keep (connections, quotas) lives behind their own synchronization.

/// Delivers one rendered HTML message to a subscriber.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subscriber_id: SubscriberId, text: &str) -> Result<(), DeliveryError>;
}

/// Resolves the locale (`"en"`, `"fa"`, ...) a subscriber reads in.
#[async_trait]
pub trait LocaleResolver: Send + Sync {
    async fn resolve(&self, subscriber_id: SubscriberId) -> String;
}

/// Web search used by the search-fallback render stage. Failures yield no hits.
#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn query(&self, text: &str, k: usize) -> Vec<SearchHit>;
}
