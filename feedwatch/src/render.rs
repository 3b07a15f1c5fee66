//! Rendering fallback chain around the summarization pipeline: rich card, then a
//! search-backed card, then a title-only card with an extractive lead.

use crate::config::RenderConfig;
use crate::fetcher::ContentFetcher;
use crate::html::strip_tags;
use crate::summarizer::normalize::split_sentences;
use crate::summarizer::{SummarizationPipeline, SummaryResult};
use crate::templates::{self, ItemHeader};
use crate::types::{FeedEntry, SubscriberId};
use futures::stream::{self, StreamExt};
use interfaces::defs::SearchCapability;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

static BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(the post .{0,200}? appeared first on .{0,120}?(\.|$)|read the full story[^.]*\.?|continue reading[^.]*\.?|read more[^.]*\.?|click here[^.]*\.?|\[(…|\.\.\.)\])",
    )
    .unwrap()
});

/// Sentences shorter than this are not used as an extractive lead.
const MIN_LEAD_SENTENCE_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Rich,
    SearchFallback,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    pub template: TemplateKind,
}

pub struct Renderer {
    pipeline: Arc<SummarizationPipeline>,
    search: Arc<dyn SearchCapability>,
    fetcher: Arc<dyn ContentFetcher>,
    config: RenderConfig,
    throttle: Mutex<HashMap<(SubscriberId, String), Instant>>,
}

impl Renderer {
    pub fn new(
        pipeline: Arc<SummarizationPipeline>,
        search: Arc<dyn SearchCapability>,
        fetcher: Arc<dyn ContentFetcher>,
        config: RenderConfig,
    ) -> Self {
        Self {
            pipeline,
            search,
            fetcher,
            config,
            throttle: Mutex::new(HashMap::new()),
        }
    }

    pub async fn render_entry(
        &self,
        subscriber_id: SubscriberId,
        source_label: &str,
        entry: &FeedEntry,
        locale: &str,
    ) -> RenderedMessage {
        let header = ItemHeader {
            title: &entry.title,
            source: source_label,
            link: entry.link.as_deref(),
            published_at: entry.published_at,
        };
        let text = self.source_text(entry).await;

        let summary = self.pipeline.summarize(&entry.title, &text, locale).await;
        if !summary.is_empty() {
            return RenderedMessage {
                text: templates::rich(&header, &summary, locale),
                template: TemplateKind::Rich,
            };
        }

        let summary = self.search_summary(subscriber_id, entry, locale).await;
        if !summary.is_empty() {
            info!("Rendered {:?} for {} from web search", entry.title, subscriber_id);
            return RenderedMessage {
                text: templates::search_fallback(&header, &summary, locale),
                template: TemplateKind::SearchFallback,
            };
        }

        let lead = extractive_lead(&text, &entry.title, self.config.minimal_lead_chars);
        RenderedMessage {
            text: templates::minimal(&header, &lead, locale),
            template: TemplateKind::Minimal,
        }
    }

    /// Feed-provided text unless page text is preferred or the feed text is thin.
    async fn source_text(&self, entry: &FeedEntry) -> String {
        let feed_text = entry.body_html().map(strip_tags).unwrap_or_default();
        if !self.config.prefer_page_text && feed_text.chars().count() >= self.config.feed_text_min_chars {
            return feed_text;
        }
        let Some(link) = entry.link.as_deref().filter(|l| !l.is_empty()) else {
            return feed_text;
        };
        let page_text = self.fetcher.extract_article_text(link).await;
        if page_text.is_empty() {
            feed_text
        } else {
            page_text
        }
    }

    async fn search_summary(&self, subscriber_id: SubscriberId, entry: &FeedEntry, locale: &str) -> SummaryResult {
        if entry.title.trim().is_empty() || self.pipeline.breaker().is_open().await {
            return SummaryResult::default();
        }
        if !self.claim_search_slot(subscriber_id, &entry.item_id()).await {
            debug!("Search fallback for {:?} throttled for {}", entry.title, subscriber_id);
            return SummaryResult::default();
        }

        let hits = self.search.query(&entry.title, self.config.search_top_k).await;
        if hits.is_empty() {
            return SummaryResult::default();
        }

        let fetcher = &self.fetcher;
        let texts: Vec<String> = stream::iter(hits)
            .map(|hit| async move {
                let text = fetcher.extract_article_text(&hit.link).await;
                if text.is_empty() {
                    hit.snippet
                } else {
                    text
                }
            })
            .buffered(self.config.search_fetch_concurrency.max(1))
            .collect()
            .await;

        let mut aggregate = String::new();
        for text in texts.iter().filter(|t| !t.trim().is_empty()) {
            if !aggregate.is_empty() {
                aggregate.push_str("\n\n");
            }
            aggregate.push_str(text.trim());
            if aggregate.chars().count() >= self.config.search_char_cap {
                break;
            }
        }
        let aggregate: String = aggregate.chars().take(self.config.search_char_cap).collect();
        debug!("Search fallback gathered {} chars for {:?}", aggregate.len(), entry.title);
        self.pipeline.summarize(&entry.title, &aggregate, locale).await
    }

    /// True when no search ran for this (subscriber, item) within the throttle window.
    async fn claim_search_slot(&self, subscriber_id: SubscriberId, item_id: &str) -> bool {
        let ttl = Duration::from_secs(self.config.search_throttle_secs);
        let now = Instant::now();
        let mut throttle = self.throttle.lock().await;
        throttle.retain(|_, at| now.duration_since(*at) < ttl);
        let key = (subscriber_id, item_id.to_string());
        if throttle.contains_key(&key) {
            return false;
        }
        throttle.insert(key, now);
        true
    }
}

/// Non-AI lead: the first one or two sufficiently long sentences that do not just
/// repeat the title, after boilerplate removal, capped at `max_chars`.
pub fn extractive_lead(text: &str, title: &str, max_chars: usize) -> String {
    let cleaned = BOILERPLATE.replace_all(text, " ");
    let title = title.trim().to_lowercase();

    let picked: Vec<String> = split_sentences(&cleaned)
        .into_iter()
        .filter(|s| s.chars().count() >= MIN_LEAD_SENTENCE_CHARS)
        .filter(|s| {
            let lower = s.to_lowercase();
            title.is_empty() || (lower != title && !title.contains(lower.trim_end_matches(['.', '!', '?'])))
        })
        .take(2)
        .collect();

    let lead = picked.join(" ");
    if lead.chars().count() <= max_chars {
        return lead;
    }
    let mut capped: String = lead.chars().take(max_chars.saturating_sub(1)).collect();
    capped = capped.trim_end().to_string();
    capped.push('…');
    capped
}
