mod common;

use common::*;
use feedwatch::{ContentFetcher, FeedwatchError, Result, StateStore, SubscriptionManager};
use std::sync::Arc;

async fn manager() -> Result<(SubscriptionManager, StateStore, Arc<FixtureFetcher>)> {
    init_tracing();
    let store = StateStore::in_memory().await?;
    let fetcher = FixtureFetcher::new();
    let dyn_fetcher: Arc<dyn ContentFetcher> = fetcher.clone();
    let manager = SubscriptionManager::new(store.clone(), dyn_fetcher, "fa");
    Ok((manager, store, fetcher))
}

#[tokio::test]
async fn adding_registers_the_subscriber_with_the_default_locale() -> Result<()> {
    let (manager, store, _) = manager().await?;
    assert!(manager.add_subscription(42, "news.example/rss").await?);
    assert_eq!(store.get_subscriber(42).await?.map(|s| s.locale), Some("fa".to_string()));
    assert_eq!(manager.list_subscriptions(42).await?, vec!["https://news.example/rss"]);
    Ok(())
}

#[tokio::test]
async fn equivalent_urls_are_one_subscription() -> Result<()> {
    let (manager, _, _) = manager().await?;
    assert!(manager.add_subscription(1, "https://www.news.example/rss/?utm_source=tg").await?);
    assert!(!manager.add_subscription(1, "https://www.news.example/rss").await?);
    assert_eq!(manager.list_subscriptions(1).await?.len(), 1);

    assert!(manager.remove_subscription(1, "https://www.news.example/rss/").await?);
    assert!(manager.list_subscriptions(1).await?.is_empty());
    assert!(!manager.remove_subscription(1, "https://www.news.example/rss").await?);
    Ok(())
}

#[tokio::test]
async fn private_and_malformed_sources_are_rejected() -> Result<()> {
    let (manager, store, _) = manager().await?;
    assert!(matches!(
        manager.add_subscription(1, "http://10.0.0.8/feed").await,
        Err(FeedwatchError::Blocked { .. })
    ));
    assert!(matches!(
        manager.add_subscription(1, "http://localhost:8080/rss").await,
        Err(FeedwatchError::Blocked { .. })
    ));
    assert!(manager.add_subscription(1, "http://[::1").await.is_err());
    assert!(store.get_subscriber(1).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn clearing_removes_every_subscription() -> Result<()> {
    let (manager, _, _) = manager().await?;
    manager.add_subscription(1, "https://a.example/feed").await?;
    manager.add_subscription(1, "https://b.example/feed").await?;
    manager.add_subscription(2, "https://a.example/feed").await?;
    assert_eq!(manager.clear_subscriptions(1).await?, 2);
    assert!(manager.list_subscriptions(1).await?.is_empty());
    assert_eq!(manager.list_subscriptions(2).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn keywords_round_trip_through_the_manager() -> Result<()> {
    let (manager, _, _) = manager().await?;
    assert!(!manager.add_keyword(1, "   ").await?);
    assert!(manager.add_keyword(1, "Bitcoin").await?);
    assert!(manager.add_keyword(1, "ETF").await?);
    assert!(!manager.add_keyword(1, "bitcoin").await?);
    assert_eq!(manager.list_keywords(1).await?, vec!["bitcoin", "etf"]);
    assert_eq!(manager.remove_keyword(1, 0).await?.as_deref(), Some("bitcoin"));
    assert_eq!(manager.list_keywords(1).await?, vec!["etf"]);
    Ok(())
}

#[tokio::test]
async fn discovers_advertised_feeds() -> Result<()> {
    let (manager, _, fetcher) = manager().await?;
    fetcher.set_page(
        "https://blog.example",
        r#"<html><head>
           <link rel="alternate" type="application/rss+xml" href="/feed.xml">
           <link rel="alternate" type="application/atom+xml" href="https://blog.example/atom">
           <link rel="stylesheet" href="/site.css">
           </head><body></body></html>"#,
    );
    let feeds = manager.discover_feeds("blog.example").await?;
    assert_eq!(feeds, vec!["https://blog.example/feed.xml", "https://blog.example/atom"]);
    Ok(())
}

#[tokio::test]
async fn discovery_probes_conventional_paths() -> Result<()> {
    let (manager, _, fetcher) = manager().await?;
    fetcher.set_page("https://quiet.example", "<html><body>No links here</body></html>");
    fetcher.set_feed("https://quiet.example/rss.xml", rss("Quiet", &[rss_item("q1", "Hello", "World.", 5)]));
    let feeds = manager.discover_feeds("https://quiet.example/").await?;
    assert_eq!(feeds, vec!["https://quiet.example/rss.xml"]);
    Ok(())
}
