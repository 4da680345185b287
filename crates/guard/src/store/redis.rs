//! Redis 缓存实现
//!
//! 使用 Redis 作为多实例共享的指纹缓存
//!
//! 命令映射：
//! - get -> `GET key`
//! - set -> `SET key value PX ttl_ms`
//! - set_if_absent -> `SET key value NX PX ttl_ms`（原子）

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{GuardError, GuardResult};
use crate::store::cache::DistributedCache;
use crate::store::config::RedisConfig;

/// Redis 缓存
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    timeout: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisCache {
    /// 创建新的 Redis 缓存实例，并通过 PING 检查连接
    pub async fn new(config: &RedisConfig) -> GuardResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| GuardError::Config(format!("Failed to create Redis pool: {e}")))?;

        let cache = Self {
            pool,
            timeout: Duration::from_millis(config.timeout_ms),
        };

        let mut conn = cache.connection().await?;
        cache
            .with_timeout("PING", redis::cmd("PING").query_async::<_, String>(&mut *conn))
            .await?;

        info!(
            "Redis nonce cache initialized: url={}, pool_size={}",
            config.url, config.pool_size
        );

        Ok(cache)
    }

    async fn connection(&self) -> GuardResult<Connection> {
        match tokio::time::timeout(self.timeout, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(GuardError::Store(format!(
                "Failed to get Redis connection: {e}"
            ))),
            Err(_) => Err(GuardError::Store(format!(
                "Timed out after {:?} waiting for Redis connection",
                self.timeout
            ))),
        }
    }

    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> GuardResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(GuardError::Store(format!("Redis {op} failed: {e}"))),
            Err(_) => Err(GuardError::Store(format!(
                "Redis {op} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// PX 参数：不接受 0，也不能超过 i64 毫秒范围
fn ttl_millis(ttl: Duration) -> GuardResult<u64> {
    u64::try_from(ttl.as_millis())
        .ok()
        .filter(|ms| i64::try_from(*ms).is_ok())
        .map(|ms| ms.max(1))
        .ok_or_else(|| GuardError::Config(format!("nonce ttl {ttl:?} is out of range")))
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value = self
            .with_timeout("GET", conn.get::<_, Option<Vec<u8>>>(key))
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<()> {
        let px = ttl_millis(ttl)?;
        let mut conn = self.connection().await?;
        let _: () = self
            .with_timeout(
                "SET",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(px)
                    .query_async(&mut *conn),
            )
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<bool> {
        let px = ttl_millis(ttl)?;
        let mut conn = self.connection().await?;
        // 写入成功返回 "OK"，key 已存在返回 nil
        let reply: Option<String> = self
            .with_timeout(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(px)
                    .query_async(&mut *conn),
            )
            .await?;

        let inserted = reply.is_some();
        if !inserted {
            debug!("Fingerprint already present in Redis: {}", key);
        }
        Ok(inserted)
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
