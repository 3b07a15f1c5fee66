use crate::fetcher::{discover_feeds, ContentFetcher};
use crate::state::StateStore;
use crate::types::{FeedwatchError, Result, SubscriberId};
use crate::urls::{canonicalize_url, ensure_scheme, is_public_http_url};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Subscription and keyword operations exposed to the command layer.
pub struct SubscriptionManager {
    store: StateStore,
    fetcher: Arc<dyn ContentFetcher>,
    default_locale: String,
}

impl SubscriptionManager {
    pub fn new(store: StateStore, fetcher: Arc<dyn ContentFetcher>, default_locale: impl Into<String>) -> Self {
        Self {
            store,
            fetcher,
            default_locale: default_locale.into(),
        }
    }

    /// Canonical form of a user-supplied source url, or an error for unparseable
    /// or non-public targets.
    pub fn normalize_source(raw: &str) -> Result<String> {
        let with_scheme = ensure_scheme(raw);
        Url::parse(&with_scheme)?;
        let url = canonicalize_url(&with_scheme);
        if !is_public_http_url(&url) {
            return Err(FeedwatchError::Blocked { url });
        }
        Ok(url)
    }

    async fn ensure_subscriber(&self, subscriber_id: SubscriberId) -> Result<()> {
        self.store
            .register_subscriber(subscriber_id, None, &self.default_locale, None)
            .await?;
        Ok(())
    }

    /// False when the subscriber already had this source.
    pub async fn add_subscription(&self, subscriber_id: SubscriberId, raw_url: &str) -> Result<bool> {
        let url = Self::normalize_source(raw_url)?;
        self.ensure_subscriber(subscriber_id).await?;
        let added = self.store.add_subscription(subscriber_id, &url).await?;
        if added {
            info!("Subscriber {} added {}", subscriber_id, url);
        }
        Ok(added)
    }

    /// Removes the subscription and its seen records. Accepts the url as listed or
    /// any spelling that canonicalizes to it.
    pub async fn remove_subscription(&self, subscriber_id: SubscriberId, raw_url: &str) -> Result<bool> {
        let listed = raw_url.trim();
        if self.store.remove_subscription(subscriber_id, listed).await? {
            return Ok(true);
        }
        let canonical = canonicalize_url(listed);
        if canonical == listed {
            return Ok(false);
        }
        self.store.remove_subscription(subscriber_id, &canonical).await
    }

    pub async fn clear_subscriptions(&self, subscriber_id: SubscriberId) -> Result<u64> {
        let removed = self.store.clear_subscriptions(subscriber_id).await?;
        info!("Subscriber {} cleared {} subscriptions", subscriber_id, removed);
        Ok(removed)
    }

    /// Only sources the subscriber added itself; admin pool sources never show up here.
    pub async fn list_subscriptions(&self, subscriber_id: SubscriberId) -> Result<Vec<String>> {
        self.store.list_subscriptions(subscriber_id).await
    }

    /// False for blank or duplicate keywords.
    pub async fn add_keyword(&self, subscriber_id: SubscriberId, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(false);
        }
        self.ensure_subscriber(subscriber_id).await?;
        self.store.add_keyword(subscriber_id, keyword).await
    }

    /// Remove by 0-based position in [`list_keywords`](Self::list_keywords) order.
    pub async fn remove_keyword(&self, subscriber_id: SubscriberId, index: usize) -> Result<Option<String>> {
        self.store.remove_keyword(subscriber_id, index).await
    }

    pub async fn list_keywords(&self, subscriber_id: SubscriberId) -> Result<Vec<String>> {
        self.store.list_keywords(subscriber_id).await
    }

    /// Feed urls found on a page, for offering to the subscriber before adding.
    pub async fn discover_feeds(&self, raw_url: &str) -> Result<Vec<String>> {
        let url = Self::normalize_source(raw_url)?;
        let feeds = discover_feeds(self.fetcher.as_ref(), &url).await;
        debug!("Discovered {} feeds at {}", feeds.len(), url);
        Ok(feeds)
    }
}
