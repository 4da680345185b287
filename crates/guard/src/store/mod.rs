//! Nonce 存储模块
//!
//! 记录已接受请求的指纹，在 TTL 内用于重放检测
//!
//! # 设计
//!
//! - `NonceStore` trait 定义统一的异步接口（exists / store / insert_if_absent）
//! - `MemoryNonceStore`：进程内存储，惰性清理过期条目
//! - `CacheNonceStore`：委托给远程缓存（`DistributedCache`），过期由缓存服务负责
//! - 通过 `StoreConfig` 在组装时选择实现，校验逻辑只依赖 `Arc<dyn NonceStore>`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

pub mod cache;
pub mod config;
pub mod memory;

#[cfg(feature = "backend-redis")]
pub mod redis;

use crate::error::{GuardError, GuardResult};

pub use cache::{CacheNonceStore, DistributedCache};
pub use config::{MemoryConfig, RedisConfig, StoreBackend, StoreConfig};
pub use memory::MemoryNonceStore;

#[cfg(feature = "backend-redis")]
pub use self::redis::RedisCache;

/// Nonce 存储抽象接口
///
/// 实现必须支持任意数量的并发调用。key 在 `[插入时刻, 插入时刻 + ttl)` 内可见，
/// 过期后对所有 `exists` 调用都表现为不存在，无论是否已被物理删除。
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// key 当前是否存在且未过期
    async fn exists(&self, key: &str) -> GuardResult<bool>;

    /// 写入 key，过期时间为 now + ttl；已存在时覆盖
    async fn store(&self, key: &str, ttl: Duration) -> GuardResult<()>;

    /// 原子地“不存在则写入”
    ///
    /// # Returns
    /// * `Ok(true)` - key 已存在（重放），未写入
    /// * `Ok(false)` - key 不存在，已写入
    ///
    /// 默认实现由 exists + store 组成，不是原子的；内置实现都覆盖了此方法。
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> GuardResult<bool> {
        if self.exists(key).await? {
            return Ok(true);
        }
        self.store(key, ttl).await?;
        Ok(false)
    }

    /// 后端类型名称
    fn backend_name(&self) -> &'static str;

    /// 停止后台任务（如果有）
    async fn shutdown(&self) {}
}

/// 从配置创建存储实例
///
/// # Errors
/// - 缺少对应后端的配置
/// - 后端初始化失败（如 Redis 无法连接）
/// - 后端功能未启用（feature flag）
pub async fn from_config(config: &StoreConfig) -> GuardResult<Arc<dyn NonceStore>> {
    let store: Arc<dyn NonceStore> = match config.backend {
        StoreBackend::Memory => {
            let cfg = config.memory.clone().unwrap_or_default();
            let store = MemoryNonceStore::new(Duration::from_secs(cfg.sweep_interval_seconds));
            if cfg.background_sweep {
                store.spawn_sweeper();
            }
            Arc::new(store)
        }

        #[cfg(feature = "backend-redis")]
        StoreBackend::Redis => {
            let cfg = config
                .redis
                .as_ref()
                .ok_or_else(|| GuardError::Config("Missing Redis config".into()))?;
            let cache = RedisCache::new(cfg).await?;
            Arc::new(CacheNonceStore::new(cache, cfg.key_prefix.clone()))
        }

        #[cfg(not(feature = "backend-redis"))]
        StoreBackend::Redis => {
            return Err(GuardError::Config(
                "Redis backend not enabled. Compile with --features backend-redis".into(),
            ));
        }
    };

    info!("Nonce store initialized: backend={}", store.backend_name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// 只实现 exists / store 的第三方存储，验证默认 insert_if_absent
    #[derive(Default)]
    struct SetStore {
        keys: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl NonceStore for SetStore {
        async fn exists(&self, key: &str) -> GuardResult<bool> {
            Ok(self.keys.lock().unwrap().contains(key))
        }

        async fn store(&self, key: &str, _ttl: Duration) -> GuardResult<()> {
            self.keys.lock().unwrap().insert(key.to_string());
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "Set"
        }
    }

    #[tokio::test]
    async fn test_default_insert_if_absent() {
        let store = SetStore::default();
        let ttl = Duration::from_secs(60);

        assert!(!store.insert_if_absent("k", ttl).await.unwrap());
        assert!(store.insert_if_absent("k", ttl).await.unwrap());
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let store = from_config(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "Memory");

        store.store("fp", Duration::from_secs(60)).await.unwrap();
        assert!(store.exists("fp").await.unwrap());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_from_config_memory_without_section() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            memory: None,
            redis: None,
        };
        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "Memory");
    }

    #[tokio::test]
    async fn test_missing_redis_config() {
        let config = StoreConfig {
            backend: StoreBackend::Redis,
            memory: None,
            redis: None,
        };

        let result = from_config(&config).await;
        let err = result.err().expect("redis without config must fail");
        assert!(matches!(err, GuardError::Config(_)));
    }
}
