mod common;

use common::*;
use feedwatch::{Result, StateStore};
use std::collections::HashSet;

#[tokio::test]
async fn deleting_a_subscriber_cascades() -> Result<()> {
    init_tracing();
    let store = StateStore::in_memory().await?;
    subscriber(&store, 7).await?;
    subscriber(&store, 8).await?;
    store.add_subscription(7, "https://a.example/feed").await?;
    store.add_subscription(8, "https://a.example/feed").await?;
    store.mark_seen(7, "https://a.example/feed", ["x", "y"]).await?;
    store.mark_seen(8, "https://a.example/feed", ["x"]).await?;
    store.add_keyword(7, "rust").await?;
    store.append_keyword_event(7, "rust", "https://a.example/feed", "x").await?;
    store.scratch_set(7, "poll_cursor", "3").await?;

    assert!(store.delete_subscriber(7).await?);

    assert!(store.get_subscriber(7).await?.is_none());
    assert!(store.list_subscriptions(7).await?.is_empty());
    assert!(store.get_seen(7, "https://a.example/feed").await?.is_empty());
    assert!(store.list_keywords(7).await?.is_empty());
    assert!(store.list_keyword_events(7).await?.is_empty());
    assert_eq!(store.scratch_get(7, "poll_cursor").await?, None);
    assert_eq!(store.get_seen(8, "https://a.example/feed").await?.len(), 1);
    assert!(!store.delete_subscriber(7).await?);
    Ok(())
}

#[tokio::test]
async fn registration_is_idempotent_and_keeps_the_locale() -> Result<()> {
    let store = StateStore::in_memory().await?;
    assert!(store.register_subscriber(1, Some("Ana"), "fa", None).await?);
    assert!(!store.register_subscriber(1, Some("Other"), "en", None).await?);
    let row = store.get_subscriber(1).await?.expect("registered");
    assert_eq!(row.locale, "fa");
    assert_eq!(row.name.as_deref(), Some("Ana"));

    assert!(store.update_subscriber(1, None, "en").await?);
    assert_eq!(store.get_subscriber(1).await?.map(|s| s.locale), Some("en".to_string()));
    assert!(!store.update_subscriber(99, None, "en").await?);
    Ok(())
}

#[tokio::test]
async fn subscriptions_keep_insertion_order_and_reject_duplicates() -> Result<()> {
    let store = StateStore::in_memory().await?;
    subscriber(&store, 1).await?;
    assert!(store.add_subscription(1, "https://b.example/feed").await?);
    assert!(store.add_subscription(1, "https://a.example/feed").await?);
    assert!(!store.add_subscription(1, "https://b.example/feed").await?);
    assert_eq!(
        store.list_subscriptions(1).await?,
        vec!["https://b.example/feed", "https://a.example/feed"]
    );
    Ok(())
}

#[tokio::test]
async fn removing_a_subscription_drops_its_seen_set() -> Result<()> {
    let store = StateStore::in_memory().await?;
    subscriber(&store, 1).await?;
    store.add_subscription(1, "https://a.example/feed").await?;
    store.add_subscription(1, "https://b.example/feed").await?;
    store.mark_seen(1, "https://a.example/feed", ["1", "2"]).await?;
    store.mark_seen(1, "https://b.example/feed", ["3"]).await?;
    store.mark_seen(1, "admin::https://c.example/feed", ["4"]).await?;

    assert!(store.remove_subscription(1, "https://a.example/feed").await?);
    assert!(!store.remove_subscription(1, "https://a.example/feed").await?);
    assert!(store.get_seen(1, "https://a.example/feed").await?.is_empty());
    assert_eq!(store.get_seen(1, "https://b.example/feed").await?.len(), 1);

    assert_eq!(store.clear_subscriptions(1).await?, 1);
    assert!(store.get_seen(1, "https://b.example/feed").await?.is_empty());
    // Keyword-scan ledgers are not tied to a subscription.
    assert_eq!(store.get_seen(1, "admin::https://c.example/feed").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn seen_sets_grow_and_can_be_replaced() -> Result<()> {
    let store = StateStore::in_memory().await?;
    subscriber(&store, 1).await?;
    let url = "https://a.example/feed";
    assert_eq!(store.mark_seen(1, url, ["a", "b"]).await?, 2);
    assert_eq!(store.mark_seen(1, url, ["b", "c"]).await?, 1);
    assert_eq!(store.get_seen(1, url).await?.len(), 3);

    let replacement: HashSet<String> = ["z".to_string()].into_iter().collect();
    store.set_seen(1, url, &replacement).await?;
    assert_eq!(store.get_seen(1, url).await?, replacement);
    Ok(())
}

#[tokio::test]
async fn keywords_are_lowercased_and_removed_by_index() -> Result<()> {
    let store = StateStore::in_memory().await?;
    subscriber(&store, 1).await?;
    assert!(store.add_keyword(1, "Rust").await?);
    assert!(!store.add_keyword(1, "  RUST ").await?);
    assert!(store.add_keyword(1, "Oil Price").await?);
    assert!(store.add_keyword(1, "wasm").await?);
    assert_eq!(store.list_keywords(1).await?, vec!["rust", "oil price", "wasm"]);

    assert_eq!(store.remove_keyword(1, 1).await?.as_deref(), Some("oil price"));
    assert_eq!(store.list_keywords(1).await?, vec!["rust", "wasm"]);
    assert_eq!(store.remove_keyword(1, 5).await?, None);
    Ok(())
}

#[tokio::test]
async fn scratch_values_upsert() -> Result<()> {
    let store = StateStore::in_memory().await?;
    subscriber(&store, 1).await?;
    assert_eq!(store.scratch_get(1, "k").await?, None);
    store.scratch_set(1, "k", "one").await?;
    store.scratch_set(1, "k", "two").await?;
    assert_eq!(store.scratch_get(1, "k").await?.as_deref(), Some("two"));
    assert!(store.scratch_delete(1, "k").await?);
    assert!(!store.scratch_delete(1, "k").await?);
    Ok(())
}

#[tokio::test]
async fn file_backed_store_survives_reconnect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("state.db").display());
    {
        let store = StateStore::connect(&url).await?;
        subscriber(&store, 1).await?;
        store.add_subscription(1, "https://a.example/feed").await?;
        store.mark_seen(1, "https://a.example/feed", ["x"]).await?;
    }
    let reopened = StateStore::connect(&url).await?;
    assert_eq!(reopened.list_subscriptions(1).await?, vec!["https://a.example/feed"]);
    assert!(reopened.get_seen(1, "https://a.example/feed").await?.contains("x"));
    Ok(())
}
