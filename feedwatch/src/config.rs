use crate::types::{FeedwatchError, Result, SubscriberId};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub feed_timeout_seconds: u64,
    pub max_html_bytes: usize,
    pub max_feed_size_mb: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; feedwatch/0.1; +https://github.com/feedwatch)".to_string(),
            timeout_seconds: 12,
            feed_timeout_seconds: 12,
            max_html_bytes: 500_000,
            max_feed_size_mb: 5,
            max_retries: 1,
            retry_delay_ms: 500,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub model: String,
    pub api_base: String,
    /// Round-robin pool of API keys; empty disables summarization.
    pub credentials: Vec<String>,
    pub max_input_chars: usize,
    pub min_input_chars: usize,
    pub max_points: usize,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
    /// Translate every field even when the detected language already matches.
    pub strict_language: bool,
    pub request_timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            credentials: Vec::new(),
            max_input_chars: 6000,
            min_input_chars: 120,
            max_points: 4,
            breaker_threshold: 5,
            breaker_cooldown_secs: 300,
            strict_language: true,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub search_top_k: usize,
    pub search_fetch_concurrency: usize,
    pub search_char_cap: usize,
    pub search_throttle_secs: u64,
    pub minimal_lead_chars: usize,
    /// Fetch the article page before falling back to feed-provided text.
    pub prefer_page_text: bool,
    /// Feed text at least this long is used without fetching the page.
    pub feed_text_min_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            search_top_k: 3,
            search_fetch_concurrency: 2,
            search_char_cap: 6000,
            search_throttle_secs: 6 * 3600,
            minimal_lead_chars: 300,
            prefer_page_text: true,
            feed_text_min_chars: 280,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub fetch_concurrency: usize,
    pub subscriber_concurrency: usize,
    pub feed_item_cap: usize,
    pub pagewatch_links_per_cycle: usize,
    pub listing_link_limit: usize,
    pub digest_chunk_size: usize,
    /// Subscriber whose own subscriptions form the admin-curated keyword pool.
    pub admin_subscriber_id: Option<SubscriberId>,
    /// Extra pool sources configured outside the store.
    pub admin_sources: Vec<String>,
    pub default_locale: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 180,
            batch_size: 8,
            fetch_concurrency: 6,
            subscriber_concurrency: 4,
            feed_item_cap: 10,
            pagewatch_links_per_cycle: 3,
            listing_link_limit: 30,
            digest_chunk_size: 10,
            admin_subscriber_id: None,
            admin_sources: Vec::new(),
            default_locale: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub serper_api_key: Option<String>,
    pub fetch: FetchConfig,
    pub summary: SummaryConfig,
    pub render: RenderConfig,
    pub poll: PollConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://feedwatch.db?mode=rwc".to_string(),
            serper_api_key: None,
            fetch: FetchConfig::default(),
            summary: SummaryConfig::default(),
            render: RenderConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `FEEDWATCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut config = AppConfig::default();

        if let Some(url) = env.string("FEEDWATCH_DATABASE_URL") {
            config.database_url = url;
        }
        config.serper_api_key = env.string("SERPER_API_KEY");

        let fetch = &mut config.fetch;
        env.set("FEEDWATCH_FETCH_TIMEOUT_SECS", &mut fetch.timeout_seconds)?;
        env.set("FEEDWATCH_FEED_TIMEOUT_SECS", &mut fetch.feed_timeout_seconds)?;
        env.set("FEEDWATCH_MAX_HTML_BYTES", &mut fetch.max_html_bytes)?;
        env.set("FEEDWATCH_MAX_RETRIES", &mut fetch.max_retries)?;
        if let Some(agent) = env.string("FEEDWATCH_USER_AGENT") {
            fetch.user_agent = agent;
        }

        let summary = &mut config.summary;
        summary.credentials = env.list("GEMINI_API_KEYS");
        if let Some(model) = env.string("FEEDWATCH_SUMMARY_MODEL") {
            summary.model = model;
        }
        env.set("FEEDWATCH_SUMMARY_MAX_INPUT_CHARS", &mut summary.max_input_chars)?;
        env.set("FEEDWATCH_SUMMARY_MAX_POINTS", &mut summary.max_points)?;
        env.set("FEEDWATCH_SUMMARY_BREAKER_THRESHOLD", &mut summary.breaker_threshold)?;
        env.set("FEEDWATCH_SUMMARY_COOLDOWN_SECS", &mut summary.breaker_cooldown_secs)?;
        env.set_bool("FEEDWATCH_SUMMARY_STRICT", &mut summary.strict_language)?;

        let render = &mut config.render;
        env.set("FEEDWATCH_SEARCH_TOP_K", &mut render.search_top_k)?;
        env.set("FEEDWATCH_SEARCH_THROTTLE_SECS", &mut render.search_throttle_secs)?;
        env.set_bool("FEEDWATCH_PREFER_PAGE_TEXT", &mut render.prefer_page_text)?;

        let poll = &mut config.poll;
        env.set("FEEDWATCH_POLL_SECS", &mut poll.interval_secs)?;
        env.set("FEEDWATCH_BATCH_SIZE", &mut poll.batch_size)?;
        env.set("FEEDWATCH_FETCH_CONCURRENCY", &mut poll.fetch_concurrency)?;
        env.set("FEEDWATCH_FEED_ITEM_CAP", &mut poll.feed_item_cap)?;
        env.set("FEEDWATCH_PAGEWATCH_LINKS", &mut poll.pagewatch_links_per_cycle)?;
        env.set("FEEDWATCH_DIGEST_CHUNK", &mut poll.digest_chunk_size)?;
        if let Some(raw) = env.string("FEEDWATCH_ADMIN_ID") {
            poll.admin_subscriber_id = Some(parse_value("FEEDWATCH_ADMIN_ID", &raw)?);
        }
        poll.admin_sources = env.list("FEEDWATCH_ADMIN_SOURCES");
        if let Some(locale) = env.string("FEEDWATCH_DEFAULT_LOCALE") {
            poll.default_locale = locale;
        }

        if config.poll.batch_size == 0 || config.poll.fetch_concurrency == 0 || config.poll.digest_chunk_size == 0 {
            return Err(FeedwatchError::Config(
                "batch size, fetch concurrency and digest chunk size must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|raw| {
                raw.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set<T: FromStr>(&self, key: &str, slot: &mut T) -> Result<()> {
        if let Some(raw) = self.string(key) {
            *slot = parse_value(key, &raw)?;
        }
        Ok(())
    }

    fn set_bool(&self, key: &str, slot: &mut bool) -> Result<()> {
        if let Some(raw) = self.string(key) {
            *slot = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(FeedwatchError::Config(format!("{} expects a boolean, got {:?}", key, raw))),
            };
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| FeedwatchError::Config(format!("invalid value {:?} for {}", raw, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.poll.interval_secs, 180);
        assert_eq!(config.poll.fetch_concurrency, 6);
        assert_eq!(config.poll.digest_chunk_size, 10);
        assert_eq!(config.summary.breaker_threshold, 5);
        assert!(config.summary.credentials.is_empty());
    }

    #[test]
    fn reads_lists_numbers_and_flags() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEYS", "k1, k2,,k3"),
            ("FEEDWATCH_POLL_SECS", "60"),
            ("FEEDWATCH_SUMMARY_STRICT", "off"),
            ("FEEDWATCH_ADMIN_ID", "42"),
            ("FEEDWATCH_ADMIN_SOURCES", "https://a.example/rss,https://b.example/feed"),
        ]))
        .unwrap();
        assert_eq!(config.summary.credentials, vec!["k1", "k2", "k3"]);
        assert_eq!(config.poll.interval_secs, 60);
        assert!(!config.summary.strict_language);
        assert_eq!(config.poll.admin_subscriber_id, Some(42));
        assert_eq!(config.poll.admin_sources.len(), 2);
    }

    #[test]
    fn rejects_garbage_values() {
        let err = AppConfig::from_lookup(lookup(&[("FEEDWATCH_BATCH_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, FeedwatchError::Config(_)));

        let err = AppConfig::from_lookup(lookup(&[("FEEDWATCH_DIGEST_CHUNK", "0")])).unwrap_err();
        assert!(matches!(err, FeedwatchError::Config(_)));
    }
}
