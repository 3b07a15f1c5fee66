//! Site-specific extractors that bypass generic feed parsing.

pub mod google_trends;
pub mod remoteok;
pub mod theresanaiforthat;

pub use google_trends::GoogleTrendsProvider;
pub use remoteok::RemoteOkProvider;
pub use theresanaiforthat::TheresAnAiForThatProvider;

use crate::fetcher::ContentFetcher;
use crate::state::StateStore;
use crate::types::{Result, SubscriberId};
use async_trait::async_trait;
use tracing::debug;

/// Items a provider renders per cycle, at most.
pub const PROVIDER_ITEM_CAP: usize = 10;

/// Collaborators handed to a provider for one invocation.
#[derive(Clone, Copy)]
pub struct ProviderContext<'a> {
    pub store: &'a StateStore,
    pub fetcher: &'a dyn ContentFetcher,
}

/// A rendered provider message and the item ids to mark seen once it was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub text: String,
    pub seen_namespace: String,
    pub item_ids: Vec<String>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prefix isolating this provider's seen records from generic feed ones.
    fn seen_prefix(&self) -> &'static str;

    fn matches(&self, url: &str) -> bool;

    /// `Ok(None)` when there is nothing new to deliver.
    async fn render(
        &self,
        ctx: ProviderContext<'_>,
        subscriber_id: SubscriberId,
        url: &str,
        locale: &str,
    ) -> Result<Option<ProviderMessage>>;

    fn seen_namespace(&self, url: &str) -> String {
        format!("{}{}", self.seen_prefix(), url)
    }
}

/// Ordered provider list; the first match wins.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GoogleTrendsProvider));
        registry.register(Box::new(TheresAnAiForThatProvider));
        registry.register(Box::new(RemoteOkProvider::default()));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn Provider>) {
        debug!("Registered provider {}", provider.name());
        self.providers.push(provider);
    }

    pub fn find(&self, url: &str) -> Option<&dyn Provider> {
        self.providers.iter().find(|p| p.matches(url)).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Keycap emoji for 1..=10, plain digits beyond.
pub(crate) fn number_emoji(n: usize) -> String {
    match n {
        1..=9 => format!("{}\u{FE0F}\u{20E3}", n),
        10 => "🔟".to_string(),
        _ => format!("{}.", n),
    }
}
