use crate::types::{KeywordEvent, Result, Subscriber, SubscriberId};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Durable state: subscribers, their subscriptions, seen ledgers, keywords and
/// scratch values. Every mutation is committed before the call returns.
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        info!("Connected to state store at {}", database_url);
        Self::from_pool(pool).await
    }

    /// Private in-memory database, one connection kept alive for the store's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    // Subscribers

    /// Insert the subscriber if unknown. Returns true when a new row was created.
    pub async fn register_subscriber(
        &self,
        id: SubscriberId,
        name: Option<&str>,
        locale: &str,
        owner_id: Option<SubscriberId>,
    ) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO subscribers (id, name, locale, owner_id, first_seen, last_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(locale)
        .bind(owner_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Registered subscriber {}", id);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>> {
        let row = sqlx::query(
            "SELECT id, name, locale, owner_id, first_seen, last_active FROM subscribers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Subscriber> {
            Ok(Subscriber {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                locale: row.try_get("locale")?,
                owner_id: row.try_get("owner_id")?,
                first_seen: row.try_get("first_seen")?,
                last_active: row.try_get("last_active")?,
            })
        })
        .transpose()
    }

    pub async fn update_subscriber(&self, id: SubscriberId, name: Option<&str>, locale: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE subscribers SET name = ?1, locale = ?2, last_active = ?3 WHERE id = ?4")
            .bind(name)
            .bind(locale)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_subscriber(&self, id: SubscriberId) -> Result<()> {
        sqlx::query("UPDATE subscribers SET last_active = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a subscriber together with everything it owns.
    pub async fn delete_subscriber(&self, id: SubscriberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!("Deleted subscriber {} ({} rows)", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_subscriber_ids(&self) -> Result<Vec<SubscriberId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM subscribers ORDER BY first_seen, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    // Subscriptions

    /// Returns false when the pair already exists.
    pub async fn add_subscription(&self, subscriber_id: SubscriberId, source_url: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (subscriber_id, source_url, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (subscriber_id, source_url) DO NOTHING
            "#,
        )
        .bind(subscriber_id)
        .bind(source_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected() > 0;
        if added {
            info!("Subscriber {} added {}", subscriber_id, source_url);
        }
        Ok(added)
    }

    /// Remove a subscription and its seen ledger in one transaction.
    pub async fn remove_subscription(&self, subscriber_id: SubscriberId, source_url: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ?1 AND source_url = ?2")
            .bind(subscriber_id)
            .bind(source_url)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM seen WHERE subscriber_id = ?1 AND source_url = ?2")
            .bind(subscriber_id)
            .bind(source_url)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!("Subscriber {} removed {}", subscriber_id, source_url);
        }
        Ok(removed)
    }

    /// Subscriptions in the order they were added.
    pub async fn list_subscriptions(&self, subscriber_id: SubscriberId) -> Result<Vec<String>> {
        let urls = sqlx::query_scalar::<_, String>(
            "SELECT source_url FROM subscriptions WHERE subscriber_id = ?1 ORDER BY rowid",
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(urls)
    }

    /// Drop every subscription of a subscriber with their seen ledgers. Returns how many
    /// subscriptions were removed.
    pub async fn clear_subscriptions(&self, subscriber_id: SubscriberId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM seen
            WHERE subscriber_id = ?1
              AND source_url IN (SELECT source_url FROM subscriptions WHERE subscriber_id = ?1)
            "#,
        )
        .bind(subscriber_id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ?1")
            .bind(subscriber_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Cleared {} subscriptions of subscriber {}", result.rows_affected(), subscriber_id);
        Ok(result.rows_affected())
    }

    // Seen ledger

    pub async fn get_seen(&self, subscriber_id: SubscriberId, source_url: &str) -> Result<HashSet<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM seen WHERE subscriber_id = ?1 AND source_url = ?2",
        )
        .bind(subscriber_id)
        .bind(source_url)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    /// Replace the seen set of one (subscriber, source) pair.
    pub async fn set_seen(&self, subscriber_id: SubscriberId, source_url: &str, item_ids: &HashSet<String>) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM seen WHERE subscriber_id = ?1 AND source_url = ?2")
            .bind(subscriber_id)
            .bind(source_url)
            .execute(&mut *tx)
            .await?;
        for item_id in item_ids {
            sqlx::query("INSERT INTO seen (subscriber_id, source_url, item_id, seen_at) VALUES (?1, ?2, ?3, ?4)")
                .bind(subscriber_id)
                .bind(source_url)
                .bind(item_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Seen set of {} for {} now holds {} ids", subscriber_id, source_url, item_ids.len());
        Ok(())
    }

    /// Add ids to a seen set. Returns how many were new.
    pub async fn mark_seen<I, S>(&self, subscriber_id: SubscriberId, source_url: &str, item_ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Utc::now();
        let mut added = 0;
        let mut tx = self.pool.begin().await?;
        for item_id in item_ids {
            let result = sqlx::query(
                r#"
                INSERT INTO seen (subscriber_id, source_url, item_id, seen_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (subscriber_id, source_url, item_id) DO NOTHING
                "#,
            )
            .bind(subscriber_id)
            .bind(source_url)
            .bind(item_id.as_ref())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }

    // Keywords

    /// Keywords are stored lowercased; returns false for duplicates.
    pub async fn add_keyword(&self, subscriber_id: SubscriberId, keyword: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO keywords (subscriber_id, keyword, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (subscriber_id, keyword) DO NOTHING
            "#,
        )
        .bind(subscriber_id)
        .bind(keyword.trim().to_lowercase())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_keywords(&self, subscriber_id: SubscriberId) -> Result<Vec<String>> {
        let keywords = sqlx::query_scalar::<_, String>(
            "SELECT keyword FROM keywords WHERE subscriber_id = ?1 ORDER BY rowid",
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keywords)
    }

    /// Remove the keyword at a zero-based position of `list_keywords`.
    pub async fn remove_keyword(&self, subscriber_id: SubscriberId, index: usize) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;
        let keyword = sqlx::query_scalar::<_, String>(
            "SELECT keyword FROM keywords WHERE subscriber_id = ?1 ORDER BY rowid LIMIT 1 OFFSET ?2",
        )
        .bind(subscriber_id)
        .bind(index as i64)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(keyword) = &keyword {
            sqlx::query("DELETE FROM keywords WHERE subscriber_id = ?1 AND keyword = ?2")
                .bind(subscriber_id)
                .bind(keyword)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(keyword)
    }

    pub async fn append_keyword_event(
        &self,
        subscriber_id: SubscriberId,
        keyword: &str,
        source_url: &str,
        item_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO keyword_events (subscriber_id, keyword, source_url, item_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(subscriber_id)
        .bind(keyword)
        .bind(source_url)
        .bind(item_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_keyword_events(&self, subscriber_id: SubscriberId) -> Result<Vec<KeywordEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT subscriber_id, keyword, source_url, item_id, created_at
            FROM keyword_events WHERE subscriber_id = ?1 ORDER BY rowid
            "#,
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(KeywordEvent {
                subscriber_id: row.try_get("subscriber_id")?,
                keyword: row.try_get("keyword")?,
                source_url: row.try_get("source_url")?,
                item_id: row.try_get("item_id")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(events)
    }

    // Scratch values

    pub async fn scratch_get(&self, subscriber_id: SubscriberId, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM scratch WHERE subscriber_id = ?1 AND key = ?2")
            .bind(subscriber_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn scratch_set(&self, subscriber_id: SubscriberId, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scratch (subscriber_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT (subscriber_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(subscriber_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn scratch_delete(&self, subscriber_id: SubscriberId, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scratch WHERE subscriber_id = ?1 AND key = ?2")
            .bind(subscriber_id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
