pub mod config;
pub mod fetcher;
pub mod html;
pub mod keywords;
pub mod locale;
pub mod parser;
pub mod poll;
pub mod providers;
pub mod render;
pub mod search;
pub mod state;
pub mod subscriptions;
pub mod summarizer;
pub mod templates;
pub mod types;
pub mod urls;

pub use config::{AppConfig, FetchConfig, PollConfig, RenderConfig, SummaryConfig};
pub use fetcher::{BoundedFetcher, ContentFetcher, Fetcher};
pub use locale::StoreLocaleResolver;
pub use parser::FeedParser;
pub use poll::{PollOrchestrator, PollOrchestratorBuilder};
pub use providers::{Provider, ProviderRegistry};
pub use render::{RenderedMessage, Renderer, TemplateKind};
pub use search::SerperSearch;
pub use state::StateStore;
pub use subscriptions::SubscriptionManager;
pub use summarizer::{SummarizationPipeline, SummaryResult};
pub use types::*;
