//! 防重放校验状态机
//!
//! 每个请求按以下顺序校验，任一步骤可直接给出结果：
//!
//! 1. 安全方法（GET / HEAD / OPTIONS）直接放行
//! 2. 提取 nonce 和 timestamp 请求头，缺失时按配置拒绝（RP-001）或放行
//! 3. 解析 timestamp（Unix 秒），失败拒绝（RP-002）
//! 4. 检查时钟偏差，超出拒绝（RP-003）
//! 5. 计算请求指纹
//! 6. 指纹已存在则拒绝（RP-004），否则登记指纹并放行
//!
//! 第 6 步通过 `NonceStore::insert_if_absent` 一次完成检查和登记，
//! 同一指纹的并发请求最多只有一个被接受。

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, Method, Request};
use tracing::{debug, warn};

use crate::config::{GuardConfig, StoreFailurePolicy};
use crate::error::{GuardError, GuardResult, RejectCode, Rejection};
use crate::fingerprint::FingerprintBuilder;
use crate::metrics;
use crate::store::NonceStore;

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 放行，交给下一个处理阶段
    Accept,
    /// 拒绝，下一个处理阶段不得执行
    Reject(Rejection),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    /// 拒绝代码（放行时为 None）
    pub fn reject_code(&self) -> Option<RejectCode> {
        match self {
            Verdict::Accept => None,
            Verdict::Reject(rejection) => Some(rejection.code),
        }
    }
}

/// 无副作用的方法不做防重放保护
///
/// 方法名不区分大小写，扩展方法 `get` 与 `GET` 等同
pub fn is_safe_method(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS]
        .iter()
        .any(|safe| safe.as_str().eq_ignore_ascii_case(method.as_str()))
}

/// 防重放校验器
///
/// 可以 Clone，在所有请求间共享同一份配置和存储
#[derive(Clone)]
pub struct ReplayGuard {
    config: Arc<GuardConfig>,
    nonce_header: HeaderName,
    timestamp_header: HeaderName,
    store: Arc<dyn NonceStore>,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("config", &self.config)
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl ReplayGuard {
    /// 创建校验器
    ///
    /// # Errors
    /// 配置未通过 `GuardConfig::validate` 时返回 `GuardError::Config`
    pub fn new(config: GuardConfig, store: Arc<dyn NonceStore>) -> GuardResult<Self> {
        config
            .validate()
            .map_err(|errors| GuardError::Config(errors.join("; ")))?;

        let nonce_header = HeaderName::from_bytes(config.nonce_header.as_bytes())
            .map_err(|e| GuardError::Config(format!("Invalid nonce header: {e}")))?;
        let timestamp_header = HeaderName::from_bytes(config.timestamp_header.as_bytes())
            .map_err(|e| GuardError::Config(format!("Invalid timestamp header: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            nonce_header,
            timestamp_header,
            store,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn NonceStore> {
        &self.store
    }

    /// 以当前 UTC 时间校验请求
    ///
    /// 请求体可能被读取用于计算指纹，返回时已原样放回
    pub async fn check(&self, request: &mut Request<Body>) -> GuardResult<Verdict> {
        self.check_at(request, chrono::Utc::now().timestamp()).await
    }

    /// 以指定的当前时间（Unix 秒）校验请求
    pub async fn check_at(&self, request: &mut Request<Body>, now: i64) -> GuardResult<Verdict> {
        if is_safe_method(request.method()) {
            metrics::record_bypassed();
            return Ok(Verdict::Accept);
        }

        let headers = request.headers();
        let (nonce, timestamp) = match (
            headers.get(&self.nonce_header),
            headers.get(&self.timestamp_header),
        ) {
            (Some(nonce), Some(timestamp)) => (
                nonce.as_bytes().to_vec(),
                timestamp.to_str().ok().map(str::to_owned),
            ),
            _ => {
                if self.config.reject_if_missing_headers {
                    return Ok(self.reject(request, RejectCode::MissingHeaders));
                }
                debug!(
                    "Replay protection skipped for {} {}: headers absent",
                    request.method(),
                    request.uri().path()
                );
                metrics::record_bypassed();
                return Ok(Verdict::Accept);
            }
        };

        let Some((timestamp, epoch)) =
            timestamp.and_then(|raw| raw.trim().parse::<i64>().ok().map(|epoch| (raw, epoch)))
        else {
            return Ok(self.reject(request, RejectCode::InvalidTimestamp));
        };

        if now.abs_diff(epoch) > self.config.allowed_clock_skew_seconds {
            return Ok(self.reject(request, RejectCode::ClockSkew));
        }

        let fingerprint = FingerprintBuilder::from_request(
            request,
            &nonce,
            &timestamp,
            self.config.max_body_bytes,
        )
        .await?;

        match self
            .store
            .insert_if_absent(fingerprint.as_str(), self.config.nonce_ttl())
            .await
        {
            Ok(true) => Ok(self.reject(request, RejectCode::Replay)),
            Ok(false) => {
                debug!(
                    "Accepted {} {} (fingerprint {})",
                    request.method(),
                    request.uri().path(),
                    fingerprint
                );
                metrics::record_accepted();
                Ok(Verdict::Accept)
            }
            Err(e) => self.on_store_error(request, e),
        }
    }

    fn reject(&self, request: &Request<Body>, code: RejectCode) -> Verdict {
        warn!(
            "Rejected {} {}: {} {}",
            request.method(),
            request.uri().path(),
            code,
            code.default_message()
        );
        metrics::record_rejected(code.as_str());
        Verdict::Reject(Rejection::new(code))
    }

    fn on_store_error(&self, request: &Request<Body>, error: GuardError) -> GuardResult<Verdict> {
        match self.config.store_failure_policy {
            StoreFailurePolicy::FailClosed => {
                warn!(
                    "Nonce store unavailable, rejecting {} {}: {}",
                    request.method(),
                    request.uri().path(),
                    error
                );
                metrics::record_store_error("fail_closed");
                Err(error)
            }
            StoreFailurePolicy::FailOpen => {
                warn!(
                    "Nonce store unavailable, forwarding {} {} without replay protection: {}",
                    request.method(),
                    request.uri().path(),
                    error
                );
                metrics::record_store_error("fail_open");
                Ok(Verdict::Accept)
            }
        }
    }
}
