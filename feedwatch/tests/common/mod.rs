#![allow(dead_code)]

use async_trait::async_trait;
use feedwatch::summarizer::{LlmBackend, Translator};
use feedwatch::{
    ContentFetcher, FeedParser, FeedwatchError, ParsedFeed, PollConfig, PollOrchestrator, ProviderRegistry,
    StateStore, SummarizationPipeline, SummaryConfig,
};
use interfaces::{DeliveryError, FixedLocale, Notifier, SearchCapability, SearchHit, SubscriberId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Canned network: feed XML, page HTML, raw text and extracted article text by url.
#[derive(Default)]
pub struct FixtureFetcher {
    feeds: Mutex<HashMap<String, String>>,
    pages: Mutex<HashMap<String, String>>,
    texts: Mutex<HashMap<String, String>>,
    articles: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_feed(&self, url: &str, xml: impl Into<String>) {
        self.feeds.lock().unwrap().insert(url.to_string(), xml.into());
    }

    pub fn set_page(&self, url: &str, html: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), html.into());
    }

    pub fn set_text(&self, url: &str, body: impl Into<String>) {
        self.texts.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn set_article(&self, url: &str, text: impl Into<String>) {
        self.articles.lock().unwrap().insert(url.to_string(), text.into());
    }

    /// Feed requests in arrival order.
    pub fn feed_requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl ContentFetcher for FixtureFetcher {
    async fn fetch_feed(&self, url: &str) -> Option<ParsedFeed> {
        self.requests.lock().unwrap().push(url.to_string());
        let xml = self.feeds.lock().unwrap().get(url).cloned()?;
        FeedParser::parse(&xml).ok()
    }

    async fn fetch_html(&self, url: &str) -> String {
        self.pages.lock().unwrap().get(url).cloned().unwrap_or_default()
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        self.texts.lock().unwrap().get(url).cloned()
    }

    async fn extract_article_text(&self, url: &str) -> String {
        self.articles.lock().unwrap().get(url).cloned().unwrap_or_default()
    }
}

/// Records every delivered message; subscribers listed in `failures` get that error.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(SubscriberId, String)>>,
    failures: Mutex<HashMap<SubscriberId, DeliveryError>>,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: SubscriberId, error: DeliveryError) {
        self.failures.lock().unwrap().insert(id, error);
    }

    pub fn recover(&self, id: SubscriberId) {
        self.failures.lock().unwrap().remove(&id);
    }

    pub fn messages_for(&self, id: SubscriberId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subscriber_id: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().get(&subscriber_id).cloned() {
            return Err(error);
        }
        self.sent.lock().unwrap().push((subscriber_id, text.to_string()));
        Ok(())
    }
}

/// Backend answering by prompt substring. Unmatched prompts get an empty reply.
#[derive(Default)]
pub struct ScriptedBackend {
    rules: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, needle: &str, reply: &str) {
        self.rules.lock().unwrap().push((needle.to_string(), reply.to_string()));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _credential: &str) -> feedwatch::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedwatchError::Summary("scripted outage".to_string()));
        }
        let rules = self.rules.lock().unwrap();
        Ok(rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_default())
    }
}

/// Tags every text with its target language, or fails every call when asked to.
#[derive(Default)]
pub struct RecordingTranslator {
    calls: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Translator for RecordingTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> feedwatch::Result<String> {
        self.calls.lock().unwrap().push((text.to_string(), target_lang.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedwatchError::General("translator offline".to_string()));
        }
        Ok(format!("[{}] {}", target_lang, text))
    }
}

pub struct CannedSearch {
    hits: Vec<SearchHit>,
    calls: AtomicUsize,
}

impl CannedSearch {
    pub fn new(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchCapability for CannedSearch {
    async fn query(&self, _text: &str, k: usize) -> Vec<SearchHit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hits.iter().take(k).cloned().collect()
    }
}

pub fn summary_config() -> SummaryConfig {
    SummaryConfig {
        credentials: vec!["key-a".to_string(), "key-b".to_string()],
        ..Default::default()
    }
}

pub fn pipeline(backend: Arc<ScriptedBackend>, config: SummaryConfig) -> Arc<SummarizationPipeline> {
    Arc::new(SummarizationPipeline::new(backend, None, config))
}

/// Orchestrator over fixtures with a fixed English locale and no site providers.
pub fn orchestrator(
    store: &StateStore,
    fetcher: &Arc<FixtureFetcher>,
    backend: Arc<ScriptedBackend>,
    poll: PollConfig,
) -> PollOrchestrator {
    let fetcher: Arc<dyn ContentFetcher> = fetcher.clone();
    PollOrchestrator::builder(store.clone(), fetcher, pipeline(backend, summary_config()))
        .locales(Arc::new(FixedLocale::new("en")))
        .providers(ProviderRegistry::new())
        .poll_config(poll)
        .build()
}

pub async fn subscriber(store: &StateStore, id: SubscriberId) -> feedwatch::Result<()> {
    store.register_subscriber(id, None, "en", None).await?;
    Ok(())
}

/// RSS item with a fixed guid; `hour` orders items on 2024-05-01.
pub fn rss_item(guid: &str, title: &str, description: &str, hour: u32) -> String {
    format!(
        "<item><guid isPermaLink=\"false\">{guid}</guid><title>{title}</title>\
         <link>https://news.example/articles/{guid}</link>\
         <description>{description}</description>\
         <pubDate>Wed, 01 May 2024 {hour:02}:00:00 GMT</pubDate></item>"
    )
}

pub fn rss(title: &str, items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel><title>{title}</title><link>https://news.example/</link>\
         <description>{title}</description>{}</channel></rss>",
        items.concat()
    )
}

/// Index of the first message containing `needle`.
pub fn position_of(messages: &[String], needle: &str) -> Option<usize> {
    messages.iter().position(|m| m.contains(needle))
}
