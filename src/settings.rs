// Business settings store
//
// Loads operator-tunable settings from the app_settings table behind a
// time-based cache. Settings are advisory: a load failure degrades to the
// default rather than failing the caller (a missing cooldown config must
// never block completing an order).

use sqlx::PgPool;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Time-to-live for cached settings (60 seconds)
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Settings key for the post-start cooldown, in minutes. 0 disables it.
pub const CLOSE_COOLDOWN_MINUTES: &str = "close_cooldown_minutes";

#[derive(Debug)]
struct CachedValue {
    value: String,
    loaded_at: Instant,
}

/// TTL-cached key/value settings over PostgreSQL.
pub struct SettingsStore {
    pool: PgPool,
    cache: RwLock<std::collections::HashMap<String, CachedValue>>,
    ttl: Duration,
}

impl SettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(std::collections::HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// Fetch a setting, serving from cache while fresh. Returns None on
    /// missing key or database failure.
    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(key) {
                if entry.loaded_at.elapsed() <= self.ttl {
                    return Some(entry.value.clone());
                }
            }
        }

        let loaded: Option<String> =
            match sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Failed to load setting {}: {}", key, e);
                    return None;
                }
            };

        if let Some(ref value) = loaded {
            let mut cache = self.cache.write().await;
            cache.insert(
                key.to_string(),
                CachedValue {
                    value: value.clone(),
                    loaded_at: Instant::now(),
                },
            );
        }

        loaded
    }

    /// The close/complete cooldown in minutes. Fail-soft: missing or
    /// unparseable configuration disables the cooldown (0) rather than
    /// blocking order flow.
    pub async fn cooldown_minutes(&self) -> i64 {
        match self.get(CLOSE_COOLDOWN_MINUTES).await {
            Some(raw) => raw.trim().parse::<i64>().unwrap_or(0).max(0),
            None => 0,
        }
    }

    /// Upsert a setting and refresh the cache entry.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET value = $2, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        let mut cache = self.cache.write().await;
        cache.insert(
            key.to_string(),
            CachedValue {
                value: value.to_string(),
                loaded_at: Instant::now(),
            },
        );
        Ok(())
    }
}
