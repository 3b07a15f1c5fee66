use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use interfaces::defs::SubscriberId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub name: Option<String>,
    pub locale: String,
    /// Set when the subscriber is a group or channel managed by another subscriber.
    pub owner_id: Option<SubscriberId>,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One entry of a feed, or a synthesized entry for a watched page or provider item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl FeedEntry {
    /// Stable dedup identity: explicit id, else permalink, else a hash of title and
    /// publication time. Re-fetching unchanged content always yields the same id.
    pub fn item_id(&self) -> String {
        if let Some(guid) = non_blank(self.guid.as_deref()) {
            return guid.to_string();
        }
        if let Some(link) = non_blank(self.link.as_deref()) {
            return link.to_string();
        }
        let stamp = self.published_at.map(|t| t.timestamp()).unwrap_or(0);
        let key = format!("{}_{}", self.title.trim(), stamp);
        format!("h:{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).simple())
    }

    /// Best feed-provided body: full content when present, else the summary.
    pub fn body_html(&self) -> Option<&str> {
        non_blank(self.content.as_deref()).or_else(|| non_blank(self.summary.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEvent {
    pub subscriber_id: SubscriberId,
    pub keyword: String,
    pub source_url: String,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters reported at the end of a poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub sent: u64,
    pub skipped: u64,
    pub reasons: BTreeMap<String, u64>,
}

impl PollStats {
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        *self.reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: PollStats) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        for (reason, count) in other.reasons {
            *self.reasons.entry(reason).or_insert(0) += count;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedwatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Refusing non-public address: {url}")]
    Blocked { url: String },

    #[error("Response too large: {bytes} bytes")]
    TooLarge { bytes: u64 },

    #[error("Bot wall detected at {url}")]
    BotWall { url: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Summary error: {0}")]
    Summary(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, FeedwatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry() -> FeedEntry {
        FeedEntry {
            title: "Rates hold steady".into(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn item_id_prefers_guid_then_link() {
        let mut e = entry();
        e.guid = Some("urn:1".into());
        e.link = Some("https://example.com/a".into());
        assert_eq!(e.item_id(), "urn:1");

        e.guid = Some("   ".into());
        assert_eq!(e.item_id(), "https://example.com/a");
    }

    #[test]
    fn hashed_item_id_is_stable_and_sensitive_to_time() {
        let a = entry();
        let b = entry();
        assert_eq!(a.item_id(), b.item_id());
        assert!(a.item_id().starts_with("h:"));

        let mut later = entry();
        later.published_at = Some(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap());
        assert_ne!(a.item_id(), later.item_id());
    }

    #[test]
    fn stats_merge_sums_reasons() {
        let mut a = PollStats::default();
        a.record_sent();
        a.skip("send_failed");
        let mut b = PollStats::default();
        b.skip("send_failed");
        b.skip("provider_error");
        a.merge(b);
        assert_eq!(a.sent, 1);
        assert_eq!(a.skipped, 3);
        assert_eq!(a.reasons["send_failed"], 2);
        assert_eq!(a.reasons["provider_error"], 1);
    }
}
