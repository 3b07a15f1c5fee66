use crate::config::FetchConfig;
use crate::html;
use crate::parser::FeedParser;
use crate::types::{FeedwatchError, ParsedFeed, Result};
use crate::urls::{is_public_http_url, is_public_ip, site_host};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{header, Client, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// Main text shorter than this triggers the AMP and mobile probes.
const SHORT_ARTICLE_CHARS: usize = 300;
/// Text shorter than this gets the meta description prepended.
const META_FALLBACK_CHARS: usize = 250;
/// Extraction results shorter than this are discarded.
const MIN_ARTICLE_CHARS: usize = 120;

const FEED_SHORTCUTS: &[&str] = &["/feed/", "/feed", "/?feed=rss", "/?feed=rss2", "/rss.xml", "/atom.xml", "/index.xml"];

/// Bounded network access. Failures surface as `None` or empty strings, never errors.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Parsed feed, or `None` for any non-2xx, oversized or non-feed response.
    async fn fetch_feed(&self, url: &str) -> Option<ParsedFeed>;

    /// HTML of a page, byte-capped; empty on non-HTML, bot walls or errors.
    async fn fetch_html(&self, url: &str) -> String;

    /// Raw body of any content type (JSON APIs, XML with extensions), byte-capped.
    async fn fetch_text(&self, url: &str) -> Option<String>;

    /// Readable article text of a page, probing AMP and mobile variants when the
    /// direct page is thin. Empty when nothing usable was found.
    async fn extract_article_text(&self, url: &str) -> String {
        let page = self.fetch_html(url).await;
        if page.is_empty() {
            return String::new();
        }

        let mut text = html::extract_main_text(&page);
        let mut meta_source = page;

        if text.chars().count() < SHORT_ARTICLE_CHARS {
            let mut candidates = Vec::new();
            if let Some(amp) = html::amp_link(&meta_source, url) {
                candidates.push(amp);
            }
            candidates.extend(variant_urls(url));

            for candidate in candidates {
                let alt = self.fetch_html(&candidate).await;
                if alt.is_empty() {
                    continue;
                }
                let alt_text = html::extract_main_text(&alt);
                debug!("Probed {} for {} ({} chars)", candidate, url, alt_text.len());
                if alt_text.chars().count() > text.chars().count() {
                    text = alt_text;
                    meta_source = alt;
                }
                break;
            }
        }

        if text.chars().count() < META_FALLBACK_CHARS {
            if let Some(description) = html::meta_description(&meta_source) {
                if !text.to_lowercase().contains(&description.to_lowercase()) {
                    text = format!("{}\n{}", description, text).trim().to_string();
                }
            }
        }

        if text.chars().count() < MIN_ARTICLE_CHARS {
            debug!("Article text too short after extraction: {} ({} chars)", url, text.len());
            return String::new();
        }
        text
    }
}

/// `/amp` and mobile-subdomain spellings of an article url, in probe order.
pub fn variant_urls(url: &str) -> Vec<String> {
    let mut variants = vec![format!("{}/amp", url.trim_end_matches('/'))];
    let Ok(parsed) = Url::parse(url) else {
        return variants;
    };
    let Some(host) = site_host(url) else {
        return variants;
    };
    const MOBILE_PREFIXES: [&str; 3] = ["m.", "mobile.", "touch."];
    if MOBILE_PREFIXES.iter().any(|prefix| host.starts_with(prefix)) {
        return variants;
    }
    for prefix in MOBILE_PREFIXES {
        let mut alt = parsed.clone();
        if alt.set_host(Some(&format!("{}{}", prefix, host))).is_ok() {
            variants.push(alt.to_string());
        }
    }
    variants
}

/// Feeds a page advertises, plus conventional feed paths that actually parse.
pub async fn discover_feeds(fetcher: &dyn ContentFetcher, page_url: &str) -> Vec<String> {
    let mut found = Vec::new();

    if fetcher.fetch_feed(page_url).await.is_some() {
        found.push(page_url.to_string());
        return found;
    }

    let page = fetcher.fetch_html(page_url).await;
    for link in html::alternate_feed_links(&page, page_url) {
        if !found.contains(&link) {
            found.push(link);
        }
    }
    if !found.is_empty() {
        return found;
    }

    let Some(origin) = crate::urls::origin(page_url) else {
        return found;
    };
    for shortcut in FEED_SHORTCUTS {
        let candidate = format!("{}{}", origin, shortcut);
        if fetcher.fetch_feed(&candidate).await.is_some() {
            found.push(candidate);
            break;
        }
    }
    found
}

/// HTTP implementation of `ContentFetcher` with SSRF, size and bot-wall guards.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let max_redirects = config.max_redirects;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error("too many redirects")
            } else if !is_public_http_url(attempt.url().as_str()) {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect)
            .dns_resolver(Arc::new(PublicResolver))
            .build()?;

        Ok(Self { client, config })
    }

    /// Reject non-public literal targets. Hostnames are checked by `PublicResolver`
    /// against the addresses the connection actually uses.
    fn guard(&self, url: &str) -> Result<()> {
        if !is_public_http_url(url) {
            return Err(FeedwatchError::Blocked { url: url.to_string() });
        }
        Ok(())
    }

    /// GET with retry on transient failures, reading at most `max_bytes`.
    /// Returns the body and its content type.
    async fn get_bounded(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
        truncate: bool,
    ) -> Result<(String, String)> {
        self.guard(url)?;

        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(timeout * (self.config.max_retries + 1)),
            ..Default::default()
        };

        let mut attempt = 0;
        let response = loop {
            let outcome = self.client.get(url).timeout(timeout).send().await;
            let retryable = match &outcome {
                Ok(resp) => resp.status().is_server_error() || resp.status() == StatusCode::TOO_MANY_REQUESTS,
                Err(e) => e.is_timeout() || e.is_connect(),
            };
            if retryable && attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    attempt += 1;
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break outcome?;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FeedwatchError::Status { status: status.as_u16(), url: url.to_string() });
        }

        if let Some(length) = response.content_length() {
            if !truncate && length as usize > max_bytes {
                return Err(FeedwatchError::TooLarge { bytes: length });
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut response = response;
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                if !truncate {
                    return Err(FeedwatchError::TooLarge { bytes: body.len() as u64 });
                }
                body.truncate(max_bytes);
                break;
            }
        }

        Ok((String::from_utf8_lossy(&body).into_owned(), content_type))
    }

    async fn get_html(&self, url: &str) -> Result<String> {
        let (body, content_type) = self.get_bounded(url, self.page_timeout(), self.config.max_html_bytes, true).await?;
        accept_html(url, body, &content_type)
    }

    fn feed_limit(&self) -> usize {
        self.config.max_feed_size_mb * 1024 * 1024
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }
}

#[async_trait]
impl ContentFetcher for Fetcher {
    async fn fetch_feed(&self, url: &str) -> Option<ParsedFeed> {
        let timeout = Duration::from_secs(self.config.feed_timeout_seconds);
        let body = match self.get_bounded(url, timeout, self.feed_limit(), false).await {
            Ok((body, _)) => body,
            Err(e) => {
                debug!("No feed at {}: {}", url, e);
                return None;
            }
        };
        if !FeedParser::is_valid_feed_content(&body) {
            debug!("Body of {} does not look like a feed", url);
            return None;
        }
        match FeedParser::parse(&body) {
            Ok(feed) => Some(feed),
            Err(e) => {
                debug!("Feed parse failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch_html(&self, url: &str) -> String {
        match self.get_html(url).await {
            Ok(body) => body,
            Err(e) => {
                debug!("HTML fetch failed for {}: {}", url, e);
                String::new()
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        match self.get_bounded(url, self.page_timeout(), self.feed_limit(), false).await {
            Ok((body, _)) if !body.trim().is_empty() => Some(body),
            Ok(_) => None,
            Err(e) => {
                debug!("Fetch failed for {}: {}", url, e);
                None
            }
        }
    }
}

/// Keep a page body only when it is HTML and not a bot-check interstitial.
fn accept_html(url: &str, body: String, content_type: &str) -> Result<String> {
    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(FeedwatchError::General(format!("{} is {}, not HTML", url, content_type)));
    }
    if html::looks_like_bot_wall(&body) {
        return Err(FeedwatchError::BotWall { url: url.to_string() });
    }
    Ok(body)
}

/// DNS resolution for the live client that keeps only public addresses, so a
/// hostname cannot be pointed at an internal service between check and connect.
struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> std::result::Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .filter(|addr| is_public_ip(addr.ip()))
        .collect();
    if addrs.is_empty() {
        return Err(Box::new(FeedwatchError::Blocked { url: host }));
    }
    Ok(Box::new(addrs.into_iter()))
}

/// Wraps a fetcher so every network call holds one permit of a shared semaphore.
pub struct BoundedFetcher {
    inner: Arc<dyn ContentFetcher>,
    slots: Arc<Semaphore>,
}

impl BoundedFetcher {
    pub fn new(inner: Arc<dyn ContentFetcher>, permits: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }
}

// extract_article_text keeps the default implementation so each probe it issues
// goes through fetch_html below and takes its own permit.
#[async_trait]
impl ContentFetcher for BoundedFetcher {
    async fn fetch_feed(&self, url: &str) -> Option<ParsedFeed> {
        let _permit = self.slots.acquire().await.ok()?;
        self.inner.fetch_feed(url).await
    }

    async fn fetch_html(&self, url: &str) -> String {
        let Ok(_permit) = self.slots.acquire().await else {
            return String::new();
        };
        self.inner.fetch_html(url).await
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        let _permit = self.slots.acquire().await.ok()?;
        self.inner.fetch_text(url).await
    }
}
