use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::config::RedisSettings;
use crate::error::{AppError, Result};
use crate::metrics::get_metrics;
use crate::store::SharedStore;

/// Redis-backed shared store. Every command runs under the configured
/// operation timeout; latency and outcome are recorded per operation.
pub struct RedisStore {
    client: redis::Client,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(client: redis::Client, settings: &RedisSettings) -> Self {
        Self {
            client,
            key_prefix: settings.key_prefix.clone(),
            op_timeout: Duration::from_millis(settings.op_timeout_ms),
        }
    }

    /// Connects a store from settings and verifies the connection with a
    /// PING.
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url.as_str())?;
        let store = Self::new(client, settings);
        store.ping().await?;
        Ok(store)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        match tokio::time::timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(AppError::Redis(e)),
            Err(_) => Err(AppError::Timeout("redis connect".to_string())),
        }
    }

    /// Runs one command under the operation timeout, recording its latency.
    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let start = std::time::Instant::now();
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::Redis(e)),
            Err(_) => Err(AppError::Timeout(format!("redis {}", op))),
        };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        get_metrics().record_store_operation(op, duration_ms, result.is_ok());
        result
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        self.run("ping", async move {
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("get", async move { conn.get(&key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let key = self.full_key(key);
        let value = value.to_string();
        let mut conn = self.connection().await?;
        self.run("set_ex", async move {
            conn.set_ex(&key, value, ttl_secs).await
        })
        .await
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("incr_ex", async move {
            let (count,): (i64,) = redis::pipe()
                .atomic()
                .incr(&key, 1)
                .expire(&key, ttl_secs as i64)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(count)
        })
        .await
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        let key = self.full_key(key);
        let field = field.to_string();
        let mut conn = self.connection().await?;
        self.run("hash_incr", async move {
            conn.hincr(&key, &field, by).await
        })
        .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let key = self.full_key(key);
        let field = field.to_string();
        let value = value.to_string();
        let mut conn = self.connection().await?;
        self.run("hash_set", async move {
            conn.hset(&key, &field, value).await
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("hash_get_all", async move { conn.hgetall(&key).await })
            .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("expire", async move {
            conn.expire(&key, ttl_secs as i64).await
        })
        .await
    }

    async fn list_push_trim(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        let key = self.full_key(key);
        let value = value.to_string();
        let mut conn = self.connection().await?;
        self.run("list_push_trim", async move {
            redis::pipe()
                .atomic()
                .lpush(&key, value)
                .ignore()
                .ltrim(&key, 0, max_len as isize - 1)
                .ignore()
                .expire(&key, ttl_secs as i64)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("list_range", async move {
            conn.lrange(&key, start, stop).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = self.full_key(key);
        let mut conn = self.connection().await?;
        self.run("delete", async move {
            conn.del::<_, ()>(&key).await
        })
        .await
    }
}
