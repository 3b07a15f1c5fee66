//! One poll cycle: per subscriber, a cursor-rotated batch of owned sources is fetched
//! concurrently, delivered sequentially, then keyword digests over the admin pool are
//! flushed.

use crate::config::{PollConfig, RenderConfig};
use crate::fetcher::{BoundedFetcher, ContentFetcher};
use crate::html::{extract_article_anchors, page_title};
use crate::keywords::{KeywordAccumulator, KeywordHit, KeywordMatcher};
use crate::locale::StoreLocaleResolver;
use crate::providers::{ProviderContext, ProviderMessage, ProviderRegistry};
use crate::render::Renderer;
use crate::state::StateStore;
use crate::summarizer::SummarizationPipeline;
use crate::templates::{self, ChunkPosition, DigestItem};
use crate::types::{FeedEntry, ParsedFeed, PollStats, Result, SubscriberId};
use crate::urls::{canonicalize_url, site_host};
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use interfaces::defs::{DeliveryError, LocaleResolver, Notifier, SearchCapability};
use interfaces::empty::EmptySearch;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Scratch key holding the subscriber's round-robin offset into its subscriptions.
pub const POLL_CURSOR_KEY: &str = "poll_cursor";

const ADMIN_NAMESPACE_PREFIX: &str = "admin::";

/// Page titles shorter than this are replaced by the linked page's own title.
const MIN_ANCHOR_TITLE_CHARS: usize = 8;

enum Fetched {
    Provider(&'static str, Result<Option<ProviderMessage>>),
    Feed(ParsedFeed),
    Page(String),
    Nothing,
}

enum SendOutcome {
    Sent,
    Failed,
    Removed,
}

/// Whether the subscriber's cycle continues after a source.
enum Flow {
    Continue,
    Removed,
}

/// Admin-curated keyword pool of one cycle. Each feed is fetched at most once and
/// shared by every subscriber task.
struct AdminPool {
    urls: Vec<String>,
    feeds: HashMap<String, OnceCell<Option<ParsedFeed>>>,
}

impl AdminPool {
    fn new(urls: Vec<String>) -> Self {
        let feeds = urls.iter().map(|u| (u.clone(), OnceCell::new())).collect();
        Self { urls, feeds }
    }

    fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    async fn feed(&self, fetcher: &dyn ContentFetcher, url: &str) -> Option<&ParsedFeed> {
        self.feeds
            .get(url)?
            .get_or_init(|| async { fetcher.fetch_feed(url).await })
            .await
            .as_ref()
    }
}

pub struct PollOrchestrator {
    store: StateStore,
    fetcher: Arc<dyn ContentFetcher>,
    renderer: Renderer,
    locales: Arc<dyn LocaleResolver>,
    providers: ProviderRegistry,
    config: PollConfig,
}

impl PollOrchestrator {
    pub fn builder(
        store: StateStore,
        fetcher: Arc<dyn ContentFetcher>,
        pipeline: Arc<SummarizationPipeline>,
    ) -> PollOrchestratorBuilder {
        PollOrchestratorBuilder::new(store, fetcher, pipeline)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one full cycle over every subscriber.
    pub async fn poll_once(&self, notifier: &dyn Notifier) -> Result<PollStats> {
        let subscribers = self.store.list_subscriber_ids().await?;
        let pool = AdminPool::new(self.admin_pool_urls().await?);
        info!(
            "Poll cycle over {} subscribers, admin pool of {} sources",
            subscribers.len(),
            pool.urls.len()
        );

        let pool = &pool;
        let outcomes: Vec<(SubscriberId, Result<PollStats>)> = stream::iter(subscribers)
            .map(|id| async move { (id, self.poll_subscriber(id, notifier, pool).await) })
            .buffer_unordered(self.config.subscriber_concurrency.max(1))
            .collect()
            .await;

        let mut stats = PollStats::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(subscriber_stats) => stats.merge(subscriber_stats),
                Err(e) => {
                    error!("Cycle aborted for subscriber {}: {}", id, e);
                    stats.skip("store_error");
                }
            }
        }
        info!("Poll cycle done: {} sent, {} skipped {:?}", stats.sent, stats.skipped, stats.reasons);
        Ok(stats)
    }

    /// Canonical, deduplicated pool urls: the admin's subscriptions, then the
    /// configured extras.
    async fn admin_pool_urls(&self) -> Result<Vec<String>> {
        let mut configured = match self.config.admin_subscriber_id {
            Some(admin) => self.store.list_subscriptions(admin).await?,
            None => Vec::new(),
        };
        configured.extend(self.config.admin_sources.iter().cloned());

        let mut urls: Vec<String> = Vec::new();
        for url in configured.iter().map(|u| canonicalize_url(u)) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    async fn poll_subscriber(&self, id: SubscriberId, notifier: &dyn Notifier, pool: &AdminPool) -> Result<PollStats> {
        let mut stats = PollStats::default();
        let locale = self.locales.resolve(id).await;
        let owned = self.store.list_subscriptions(id).await?;
        let batch = self.next_batch(id, &owned).await?;
        debug!("Subscriber {} polls {} of {} sources", id, batch.len(), owned.len());

        let fetched = join_all(batch.iter().map(|url| self.fetch_source(id, url, &locale))).await;

        for (url, fetched) in batch.iter().zip(fetched) {
            let flow = match fetched {
                Fetched::Provider(_, Ok(Some(message))) => self.deliver_provider(id, url, message, notifier, &mut stats).await?,
                Fetched::Provider(_, Ok(None)) => Flow::Continue,
                Fetched::Provider(name, Err(e)) => {
                    warn!("Provider {} failed for {} at {}: {}", name, id, url, e);
                    stats.skip("provider_error");
                    Flow::Continue
                }
                Fetched::Feed(feed) => self.deliver_feed(id, url, &feed, &locale, notifier, &mut stats).await?,
                Fetched::Page(html) => self.deliver_page(id, url, &html, &locale, notifier, &mut stats).await?,
                Fetched::Nothing => {
                    debug!("Nothing fetched for {} at {}", id, url);
                    stats.skip("fetch_failed");
                    Flow::Continue
                }
            };
            if let Flow::Removed = flow {
                return Ok(stats);
            }
        }

        if let Flow::Removed = self.flush_keywords(id, &owned, &locale, pool, notifier, &mut stats).await? {
            return Ok(stats);
        }

        self.store.touch_subscriber(id).await?;
        Ok(stats)
    }

    /// Next `batch_size` owned sources, starting at the persisted cursor.
    async fn next_batch(&self, id: SubscriberId, owned: &[String]) -> Result<Vec<String>> {
        let size = self.config.batch_size.max(1);
        if owned.len() <= size {
            return Ok(owned.to_vec());
        }
        let cursor = self
            .store
            .scratch_get(id, POLL_CURSOR_KEY)
            .await?
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(0)
            % owned.len();
        let batch = (0..size).map(|i| owned[(cursor + i) % owned.len()].clone()).collect();
        let next = (cursor + size) % owned.len();
        self.store.scratch_set(id, POLL_CURSOR_KEY, &next.to_string()).await?;
        Ok(batch)
    }

    async fn fetch_source(&self, id: SubscriberId, url: &str, locale: &str) -> Fetched {
        if let Some(provider) = self.providers.find(url) {
            let ctx = ProviderContext {
                store: &self.store,
                fetcher: self.fetcher.as_ref(),
            };
            return Fetched::Provider(provider.name(), provider.render(ctx, id, url, locale).await);
        }
        if let Some(feed) = self.fetcher.fetch_feed(url).await {
            return Fetched::Feed(feed);
        }
        let html = self.fetcher.fetch_html(url).await;
        if html.is_empty() {
            Fetched::Nothing
        } else {
            Fetched::Page(html)
        }
    }

    async fn send(
        &self,
        id: SubscriberId,
        text: &str,
        notifier: &dyn Notifier,
        failure_reason: &str,
        stats: &mut PollStats,
    ) -> Result<SendOutcome> {
        match notifier.send(id, text).await {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) if e.is_permanent() => {
                info!("Subscriber {} is gone ({}), removing it", id, e);
                self.store.delete_subscriber(id).await?;
                stats.skip("subscriber_removed");
                Ok(SendOutcome::Removed)
            }
            Err(DeliveryError::RateLimited { retry_after_secs }) => {
                warn!("Rate limited delivering to {}, retry after {}s", id, retry_after_secs);
                stats.skip("rate_limited");
                Ok(SendOutcome::Failed)
            }
            Err(e) => {
                warn!("Delivery to {} failed: {}", id, e);
                stats.skip(failure_reason);
                Ok(SendOutcome::Failed)
            }
        }
    }

    async fn deliver_provider(
        &self,
        id: SubscriberId,
        url: &str,
        message: ProviderMessage,
        notifier: &dyn Notifier,
        stats: &mut PollStats,
    ) -> Result<Flow> {
        match self.send(id, &message.text, notifier, "send_failed", stats).await? {
            SendOutcome::Sent => {
                self.store.mark_seen(id, &message.seen_namespace, &message.item_ids).await?;
                stats.record_sent();
                debug!("Provider message for {} from {} covered {} items", id, url, message.item_ids.len());
                Ok(Flow::Continue)
            }
            SendOutcome::Failed => Ok(Flow::Continue),
            SendOutcome::Removed => Ok(Flow::Removed),
        }
    }

    async fn deliver_feed(
        &self,
        id: SubscriberId,
        url: &str,
        feed: &ParsedFeed,
        locale: &str,
        notifier: &dyn Notifier,
        stats: &mut PollStats,
    ) -> Result<Flow> {
        let seen = self.store.get_seen(id, url).await?;
        let fresh = oldest_first(
            feed.entries
                .iter()
                .take(self.config.feed_item_cap)
                .filter(|entry| !seen.contains(&entry.item_id()))
                .collect(),
        );
        if fresh.is_empty() {
            return Ok(Flow::Continue);
        }
        let label = source_label(feed.title.as_deref(), url);
        info!("{} new entries for {} at {}", fresh.len(), id, url);

        for entry in fresh {
            let rendered = self.renderer.render_entry(id, &label, entry, locale).await;
            match self.send(id, &rendered.text, notifier, "send_failed", stats).await? {
                SendOutcome::Sent => {
                    self.store.mark_seen(id, url, [entry.item_id()]).await?;
                    stats.record_sent();
                }
                // Later entries wait for the next cycle so they stay in order.
                SendOutcome::Failed => break,
                SendOutcome::Removed => return Ok(Flow::Removed),
            }
        }
        Ok(Flow::Continue)
    }

    /// Page-watch: the newest unseen article links of a listing page, delivered
    /// oldest first.
    async fn deliver_page(
        &self,
        id: SubscriberId,
        url: &str,
        html: &str,
        locale: &str,
        notifier: &dyn Notifier,
        stats: &mut PollStats,
    ) -> Result<Flow> {
        let seen = self.store.get_seen(id, url).await?;
        let fresh: Vec<(String, String)> = extract_article_anchors(html, url)
            .into_iter()
            .take(self.config.listing_link_limit)
            .filter(|(link, _)| !seen.contains(link))
            .take(self.config.pagewatch_links_per_cycle)
            .collect();
        if fresh.is_empty() {
            return Ok(Flow::Continue);
        }
        let label = source_label(page_title(html).as_deref(), url);
        info!("{} new page links for {} at {}", fresh.len(), id, url);

        for (link, anchor) in fresh.into_iter().rev() {
            let title = if anchor.chars().count() >= MIN_ANCHOR_TITLE_CHARS {
                anchor
            } else {
                page_title(&self.fetcher.fetch_html(&link).await)
                    .or_else(|| Some(anchor).filter(|a| !a.is_empty()))
                    .unwrap_or_else(|| link.clone())
            };
            let entry = FeedEntry {
                link: Some(link),
                title,
                ..Default::default()
            };
            let rendered = self.renderer.render_entry(id, &label, &entry, locale).await;
            match self.send(id, &rendered.text, notifier, "send_failed", stats).await? {
                SendOutcome::Sent => {
                    self.store.mark_seen(id, url, [entry.item_id()]).await?;
                    stats.record_sent();
                }
                SendOutcome::Failed => break,
                SendOutcome::Removed => return Ok(Flow::Removed),
            }
        }
        Ok(Flow::Continue)
    }

    /// Scan the admin pool for keyword matches and send chunked digests. Matches from
    /// a url the subscriber owns use that url's seen set, others an isolated one.
    async fn flush_keywords(
        &self,
        id: SubscriberId,
        owned: &[String],
        locale: &str,
        pool: &AdminPool,
        notifier: &dyn Notifier,
        stats: &mut PollStats,
    ) -> Result<Flow> {
        if pool.is_empty() {
            return Ok(Flow::Continue);
        }
        let keywords = self.store.list_keywords(id).await?;
        let matcher = KeywordMatcher::new(&keywords);
        if matcher.is_empty() {
            return Ok(Flow::Continue);
        }

        // Canonical form to the stored spelling, whose seen set the pool shares.
        let owned: HashMap<String, &str> = owned.iter().map(|u| (canonicalize_url(u), u.as_str())).collect();
        let feeds = join_all(pool.urls.iter().map(|url| pool.feed(self.fetcher.as_ref(), url))).await;

        let mut accumulator = KeywordAccumulator::new();
        for (url, feed) in pool.urls.iter().zip(feeds) {
            let Some(feed) = feed else {
                continue;
            };
            let namespace = match owned.get(url) {
                Some(stored) => stored.to_string(),
                None => format!("{}{}", ADMIN_NAMESPACE_PREFIX, url),
            };
            let seen = self.store.get_seen(id, &namespace).await?;
            let label = source_label(feed.title.as_deref(), url);
            for entry in &feed.entries {
                let Some(keyword) = matcher.first_match(entry) else {
                    continue;
                };
                let item_id = entry.item_id();
                if seen.contains(&item_id) {
                    continue;
                }
                accumulator.push(KeywordHit {
                    keyword: keyword.to_string(),
                    seen_namespace: namespace.clone(),
                    source_url: url.clone(),
                    source_label: label.clone(),
                    item_id,
                    title: entry.title.clone(),
                    link: entry.link.clone(),
                });
            }
        }
        if accumulator.is_empty() {
            return Ok(Flow::Continue);
        }
        info!("{} keyword matches for {}", accumulator.len(), id);

        let now = Utc::now();
        for (keyword, chunks) in accumulator.into_chunks(self.config.digest_chunk_size) {
            let parts = chunks.len();
            let mut first_index = 0;
            for (index, chunk) in chunks.into_iter().enumerate() {
                let items: Vec<DigestItem> = chunk
                    .iter()
                    .map(|hit| DigestItem {
                        title: hit.title.clone(),
                        link: hit.link.clone(),
                        source: hit.source_label.clone(),
                    })
                    .collect();
                let position = ChunkPosition {
                    part: index + 1,
                    parts,
                    first_index,
                };
                let text = templates::keyword_digest(&keyword, &items, position, now, locale);
                match self.send(id, &text, notifier, "digest_send_failed", stats).await? {
                    SendOutcome::Sent => {
                        for hit in &chunk {
                            self.store.mark_seen(id, &hit.seen_namespace, [&hit.item_id]).await?;
                            self.store
                                .append_keyword_event(id, &hit.keyword, &hit.source_url, &hit.item_id)
                                .await?;
                        }
                        stats.record_sent();
                    }
                    SendOutcome::Failed => break,
                    SendOutcome::Removed => return Ok(Flow::Removed),
                }
                first_index += chunk.len();
            }
        }
        Ok(Flow::Continue)
    }
}

/// Feed title, else the site host, else the url itself.
fn source_label(title: Option<&str>, url: &str) -> String {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| site_host(url))
        .unwrap_or_else(|| url.to_string())
}

/// Chronological order: by publication time when every entry has one, otherwise
/// the reverse of feed order (feeds list newest first).
fn oldest_first(mut entries: Vec<&FeedEntry>) -> Vec<&FeedEntry> {
    if entries.iter().all(|e| e.published_at.is_some()) {
        entries.sort_by_key(|e| e.published_at);
    } else {
        entries.reverse();
    }
    entries
}

pub struct PollOrchestratorBuilder {
    store: StateStore,
    fetcher: Arc<dyn ContentFetcher>,
    pipeline: Arc<SummarizationPipeline>,
    search: Arc<dyn SearchCapability>,
    locales: Option<Arc<dyn LocaleResolver>>,
    providers: Option<ProviderRegistry>,
    poll: PollConfig,
    render: RenderConfig,
}

impl PollOrchestratorBuilder {
    pub fn new(store: StateStore, fetcher: Arc<dyn ContentFetcher>, pipeline: Arc<SummarizationPipeline>) -> Self {
        Self {
            store,
            fetcher,
            pipeline,
            search: Arc::new(EmptySearch),
            locales: None,
            providers: None,
            poll: PollConfig::default(),
            render: RenderConfig::default(),
        }
    }

    pub fn search(mut self, search: Arc<dyn SearchCapability>) -> Self {
        self.search = search;
        self
    }

    pub fn locales(mut self, locales: Arc<dyn LocaleResolver>) -> Self {
        self.locales = Some(locales);
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn poll_config(mut self, config: PollConfig) -> Self {
        self.poll = config;
        self
    }

    pub fn render_config(mut self, config: RenderConfig) -> Self {
        self.render = config;
        self
    }

    /// Every fetch of the orchestrator, renderer and providers goes through one
    /// semaphore of `fetch_concurrency` permits.
    pub fn build(self) -> PollOrchestrator {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(BoundedFetcher::new(self.fetcher, self.poll.fetch_concurrency));
        let locales = self
            .locales
            .unwrap_or_else(|| Arc::new(StoreLocaleResolver::new(self.store.clone(), self.poll.default_locale.clone())));
        let renderer = Renderer::new(self.pipeline, self.search, fetcher.clone(), self.render);
        PollOrchestrator {
            store: self.store,
            fetcher,
            renderer,
            locales,
            providers: self.providers.unwrap_or_else(ProviderRegistry::with_defaults),
            config: self.poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, hour: Option<u32>) -> FeedEntry {
        FeedEntry {
            guid: Some(id.to_string()),
            title: id.to_string(),
            published_at: hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn orders_by_date_when_every_entry_has_one() {
        let (a, b, c) = (entry("a", Some(9)), entry("b", Some(7)), entry("c", Some(8)));
        let ordered: Vec<&str> = oldest_first(vec![&a, &b, &c]).iter().map(|e| e.title.as_str()).collect();
        assert_eq!(ordered, vec!["b", "c", "a"]);
    }

    #[test]
    fn reverses_feed_order_without_dates() {
        let (a, b, c) = (entry("a", Some(9)), entry("b", None), entry("c", Some(8)));
        let ordered: Vec<&str> = oldest_first(vec![&a, &b, &c]).iter().map(|e| e.title.as_str()).collect();
        assert_eq!(ordered, vec!["c", "b", "a"]);
    }

    #[test]
    fn labels_fall_back_to_host() {
        assert_eq!(source_label(Some(" Daily Wire "), "https://x.example/feed"), "Daily Wire");
        assert_eq!(source_label(None, "https://www.news.example/rss"), "news.example");
    }
}
