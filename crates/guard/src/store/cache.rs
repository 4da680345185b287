//! 远程缓存 Nonce 存储
//!
//! 将存在性判断和 TTL 全部委托给外部键值缓存：
//! - key 下存在任何值（空值即可）即视为重放
//! - TTL 作为缓存的绝对过期时间（相对当前时刻）传入

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::GuardResult;
use crate::store::NonceStore;

/// 外部键值缓存服务接口
///
/// 实现负责过期：`set` 写入的值在 ttl 之后必须对 `get` 不可见
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// 读取 key，不存在或已过期返回 `None`
    async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>>;

    /// 写入 key，ttl 后过期
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<()>;

    /// 仅当 key 不存在时写入，返回是否写入成功
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<bool>;

    /// 缓存类型名称
    fn name(&self) -> &'static str;
}

/// 基于 `DistributedCache` 的 Nonce 存储
#[derive(Debug, Clone)]
pub struct CacheNonceStore<C> {
    cache: C,
    key_prefix: String,
}

impl<C: DistributedCache> CacheNonceStore<C> {
    pub fn new(cache: C, key_prefix: impl Into<String>) -> Self {
        Self {
            cache,
            key_prefix: key_prefix.into(),
        }
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl<C: DistributedCache> NonceStore for CacheNonceStore<C> {
    async fn exists(&self, key: &str) -> GuardResult<bool> {
        let value = self.cache.get(&self.cache_key(key)).await?;
        Ok(value.is_some())
    }

    async fn store(&self, key: &str, ttl: Duration) -> GuardResult<()> {
        let cache_key = self.cache_key(key);
        trace!("Storing fingerprint in {}: {}", self.cache.name(), cache_key);
        self.cache.set(&cache_key, &[], ttl).await
    }

    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> GuardResult<bool> {
        let inserted = self
            .cache
            .set_if_absent(&self.cache_key(key), &[], ttl)
            .await?;
        Ok(!inserted)
    }

    fn backend_name(&self) -> &'static str {
        self.cache.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 内存版缓存，模拟远程缓存的 TTL 语义
    #[derive(Default)]
    struct FakeCache {
        values: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    }

    impl FakeCache {
        fn live(&self, key: &str) -> Option<Vec<u8>> {
            let values = self.values.lock().unwrap();
            values
                .get(key)
                .filter(|(_, expires_at)| *expires_at > Instant::now())
                .map(|(value, _)| value.clone())
        }
    }

    #[async_trait]
    impl DistributedCache for FakeCache {
        async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>> {
            Ok(self.live(key))
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
            Ok(())
        }

        async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> GuardResult<bool> {
            if self.live(key).is_some() {
                return Ok(false);
            }
            self.set(key, value, ttl).await?;
            Ok(true)
        }

        fn name(&self) -> &'static str {
            "Fake"
        }
    }

    struct DownCache;

    #[async_trait]
    impl DistributedCache for DownCache {
        async fn get(&self, _key: &str) -> GuardResult<Option<Vec<u8>>> {
            Err(GuardError::Store("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> GuardResult<()> {
            Err(GuardError::Store("connection refused".into()))
        }

        async fn set_if_absent(&self, _: &str, _: &[u8], _: Duration) -> GuardResult<bool> {
            Err(GuardError::Store("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "Down"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_value_marks_presence() {
        let store = CacheNonceStore::new(FakeCache::default(), "replay:nonce:");
        let ttl = Duration::from_secs(600);

        assert!(!store.exists("fp").await.unwrap());
        store.store("fp", ttl).await.unwrap();
        assert!(store.exists("fp").await.unwrap());

        let raw = store.cache.live("replay:nonce:fp").unwrap();
        assert!(raw.is_empty());

        tokio::time::advance(ttl).await;
        assert!(!store.exists("fp").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_if_absent_reports_previous_presence() {
        let store = CacheNonceStore::new(FakeCache::default(), "p:");
        let ttl = Duration::from_secs(60);

        assert!(!store.insert_if_absent("fp", ttl).await.unwrap());
        assert!(store.insert_if_absent("fp", ttl).await.unwrap());
        assert_eq!(store.backend_name(), "Fake");
    }

    #[tokio::test]
    async fn test_cache_failure_is_not_treated_as_absent() {
        let store = CacheNonceStore::new(DownCache, "p:");

        assert!(matches!(
            store.exists("fp").await,
            Err(GuardError::Store(_))
        ));
        assert!(matches!(
            store.insert_if_absent("fp", Duration::from_secs(1)).await,
            Err(GuardError::Store(_))
        ));
    }
}
