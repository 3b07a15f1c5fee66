use anyhow::Context;
use clap::Parser;
use feedwatch::summarizer::{GeminiBackend, GoogleTranslate, Translator};
use feedwatch::{
    AppConfig, Fetcher, PollOrchestrator, ProviderRegistry, SerperSearch, StateStore, StoreLocaleResolver,
    SummarizationPipeline,
};
use interfaces::{EmptySearch, LogNotifier, SearchCapability};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedwatch", about = "Poll subscribed feeds and deliver summarized updates")]
struct Args {
    /// SQLite database url, overrides FEEDWATCH_DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Seconds between poll cycles, overrides FEEDWATCH_POLL_SECS
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(secs) = args.interval_secs {
        config.poll.interval_secs = secs;
    }

    info!("Starting feedwatch");
    let store = StateStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening state store {}", config.database_url))?;

    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let backend = Arc::new(GeminiBackend::new(&config.summary)?);
    let translator: Arc<dyn Translator> = Arc::new(GoogleTranslate::new(&config.fetch)?);
    if config.summary.credentials.is_empty() {
        warn!("GEMINI_API_KEYS is empty, messages will use the title-only template");
    }
    let pipeline = Arc::new(SummarizationPipeline::new(backend, Some(translator), config.summary.clone()));

    let search: Arc<dyn SearchCapability> = match &config.serper_api_key {
        Some(key) => Arc::new(SerperSearch::new(key.clone())?),
        None => Arc::new(EmptySearch),
    };

    let orchestrator = PollOrchestrator::builder(store.clone(), fetcher, pipeline)
        .search(search)
        .locales(Arc::new(StoreLocaleResolver::new(store, config.poll.default_locale.clone())))
        .providers(ProviderRegistry::with_defaults())
        .poll_config(config.poll.clone())
        .render_config(config.render.clone())
        .build();

    let notifier = LogNotifier;
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll.interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.poll_once(&notifier).await {
                    Ok(stats) => info!("Cycle finished: {} sent, {} skipped", stats.sent, stats.skipped),
                    Err(e) => error!("Cycle failed: {}", e),
                }
                if args.once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    info!("feedwatch stopped");
    Ok(())
}
