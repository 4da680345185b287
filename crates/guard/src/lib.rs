//! Replay Guard - HTTP 请求防重放保护
//!
//! 提供以下功能：
//! 1. 基于请求元数据和请求体摘要的确定性指纹（SHA-256）
//! 2. 带 TTL 的 Nonce 存储：进程内存储与远程缓存（Redis）存储
//! 3. 防重放校验状态机：安全方法放行、请求头提取、时钟偏差检查、指纹登记
//! 4. axum 中间件，将拒绝结果转换为 HTTP 响应

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod metrics;
pub mod middleware;
pub mod store;

// Re-export commonly used items
pub use config::{GuardConfig, StoreFailurePolicy};
pub use error::{GuardError, GuardResult, RejectCode, Rejection};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use guard::{ReplayGuard, Verdict};
pub use metrics::register_guard_metrics;
pub use middleware::replay_protection;
pub use store::{
    CacheNonceStore, DistributedCache, MemoryNonceStore, NonceStore, StoreBackend, StoreConfig,
};
