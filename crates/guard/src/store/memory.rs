//! 进程内 Nonce 存储
//!
//! 适用于开发、测试和单实例部署；多实例部署请使用 `CacheNonceStore`。
//!
//! 过期条目的清理方式：
//! - 惰性清理：`exists` 调用时，距上次清理超过 `sweep_interval` 则清理一次
//! - 后台清理（可选）：`spawn_sweeper` 启动定时任务，`shutdown` 或 drop 时停止
//!
//! 无论条目是否已被物理删除，过期判断都以 `expires_at` 为准。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{GuardError, GuardResult};
use crate::store::NonceStore;

type Entries = Arc<RwLock<HashMap<String, Instant>>>;

/// 进程内 Nonce 存储
#[derive(Debug)]
pub struct MemoryNonceStore {
    /// fingerprint -> expires_at
    entries: Entries,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl MemoryNonceStore {
    /// 创建进程内存储
    ///
    /// # Arguments
    /// * `sweep_interval` - 两次惰性清理的最小间隔，`Duration::ZERO` 表示每次 exists 都清理
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            sweeper: Mutex::new(None),
        }
    }

    /// 启动后台清理任务，每 `sweep_interval` 执行一次
    ///
    /// 必须在 tokio 运行时内调用；重复调用只会保留一个任务
    pub fn spawn_sweeper(&self) {
        let Ok(mut slot) = self.sweeper.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let entries = self.entries.clone();
        let period = self.sweep_interval.max(Duration::from_secs(1));
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep(&entries).await;
            }
        }));

        info!("Nonce store background sweeper started: interval={:?}", period);
    }

    /// 当前条目数（包含已过期但尚未清理的条目）
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 距上次清理超过间隔时执行清理
    async fn maybe_sweep(&self) {
        let due = match self.last_sweep.lock() {
            Ok(mut last) => {
                let now = Instant::now();
                if now.duration_since(*last) >= self.sweep_interval {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        };

        if due {
            sweep(&self.entries).await;
        }
    }

    fn stop_sweeper(&self) {
        if let Ok(mut slot) = self.sweeper.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
            debug!("Nonce store background sweeper stopped");
        }
    }
}

async fn sweep(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut map = entries.write().await;
    let before = map.len();
    map.retain(|_, expires_at| *expires_at > now);
    let removed = before - map.len();

    if removed > 0 {
        debug!("Swept {} expired fingerprints ({} remaining)", removed, map.len());
    }
    removed
}

fn expiry(now: Instant, ttl: Duration) -> GuardResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| GuardError::Config(format!("nonce ttl {ttl:?} is out of range")))
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn exists(&self, key: &str) -> GuardResult<bool> {
        self.maybe_sweep().await;

        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|expires_at| *expires_at > now))
    }

    async fn store(&self, key: &str, ttl: Duration) -> GuardResult<()> {
        let expires_at = expiry(Instant::now(), ttl)?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), expires_at);
        Ok(())
    }

    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> GuardResult<bool> {
        self.maybe_sweep().await;

        let now = Instant::now();
        let expires_at = expiry(now, ttl)?;
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|expires_at| *expires_at > now) {
            return Ok(true);
        }
        entries.insert(key.to_string(), expires_at);
        Ok(false)
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }

    async fn shutdown(&self) {
        self.stop_sweeper();
    }
}

impl Drop for MemoryNonceStore {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}
