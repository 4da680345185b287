//! Replay Guard 配置
//!
//! 所有字段都有默认值，可以在 TOML 中按需覆盖：
//!
//! ```toml
//! [guard]
//! nonce_header = "X-Request-Id"
//! timestamp_header = "X-Timestamp"
//! allowed_clock_skew_seconds = 300
//! nonce_ttl_seconds = 600
//! reject_if_missing_headers = true
//! store_failure_policy = "fail_closed"
//! ```

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// nonce_ttl_seconds 上限（一年）
pub const MAX_NONCE_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Nonce 存储不可用时的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// 拒绝请求（503），默认
    #[default]
    FailClosed,
    /// 放行请求，仅记录告警和指标
    FailOpen,
}

/// Replay Guard 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// 携带 nonce 的请求头名称
    pub nonce_header: String,

    /// 携带 Unix 时间戳（秒, UTC）的请求头名称
    pub timestamp_header: String,

    /// 允许的客户端与服务端时钟偏差（秒）
    pub allowed_clock_skew_seconds: u64,

    /// 指纹保留时长（秒）
    ///
    /// 必须大于等于 allowed_clock_skew_seconds，否则在偏差窗口内、TTL 过期后
    /// 重放的请求会被当作新请求接受
    pub nonce_ttl_seconds: u64,

    /// 缺少 nonce / timestamp 请求头时是否拒绝
    ///
    /// 为 false 时，这类请求跳过防重放保护
    pub reject_if_missing_headers: bool,

    /// Nonce 存储失败时的策略
    pub store_failure_policy: StoreFailurePolicy,

    /// 计算指纹时读取请求体的最大字节数
    pub max_body_bytes: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            nonce_header: "X-Request-Id".to_string(),
            timestamp_header: "X-Timestamp".to_string(),
            allowed_clock_skew_seconds: 5 * 60,
            nonce_ttl_seconds: 10 * 60,
            reject_if_missing_headers: true,
            store_failure_policy: StoreFailurePolicy::FailClosed,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl GuardConfig {
    pub fn allowed_clock_skew(&self) -> Duration {
        Duration::from_secs(self.allowed_clock_skew_seconds)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_seconds)
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.allowed_clock_skew_seconds = skew.as_secs();
        self
    }

    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn with_reject_if_missing_headers(mut self, reject: bool) -> Self {
        self.reject_if_missing_headers = reject;
        self
    }

    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.store_failure_policy = policy;
        self
    }

    /// 验证配置，返回发现的所有问题
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("nonce_header", &self.nonce_header),
            ("timestamp_header", &self.timestamp_header),
        ] {
            if HeaderName::from_bytes(value.as_bytes()).is_err() {
                errors.push(format!("{field} is not a valid HTTP header name: {value:?}"));
            }
        }

        if self.nonce_header.eq_ignore_ascii_case(&self.timestamp_header) {
            errors.push("nonce_header and timestamp_header must differ".to_string());
        }

        if self.nonce_ttl_seconds == 0 {
            errors.push("nonce_ttl_seconds must be greater than 0".to_string());
        }

        if self.nonce_ttl_seconds > MAX_NONCE_TTL_SECONDS {
            errors.push(format!(
                "nonce_ttl_seconds ({}) must be <= {MAX_NONCE_TTL_SECONDS}",
                self.nonce_ttl_seconds
            ));
        }

        if self.nonce_ttl_seconds < self.allowed_clock_skew_seconds {
            errors.push(format!(
                "nonce_ttl_seconds ({}) must be >= allowed_clock_skew_seconds ({})",
                self.nonce_ttl_seconds, self.allowed_clock_skew_seconds
            ));
        }

        if self.max_body_bytes == 0 {
            errors.push("max_body_bytes must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
