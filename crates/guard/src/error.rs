//! Replay Guard 错误定义
//!
//! 两类失败需要区分：
//! - `Rejection`：请求本身未通过校验（RP-001 ~ RP-004），属于正常的业务结果
//! - `GuardError`：基础设施失败（存储不可用、请求体读取失败、配置错误）

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// 拒绝原因代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectCode {
    /// RP-001: 缺少 nonce / timestamp 请求头
    MissingHeaders,
    /// RP-002: timestamp 无法解析
    InvalidTimestamp,
    /// RP-003: timestamp 超出允许的时钟偏差
    ClockSkew,
    /// RP-004: 指纹已登记（重放）
    Replay,
}

impl RejectCode {
    /// 对外暴露的错误代码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingHeaders => "RP-001",
            Self::InvalidTimestamp => "RP-002",
            Self::ClockSkew => "RP-003",
            Self::Replay => "RP-004",
        }
    }

    /// 默认 HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeaders | Self::InvalidTimestamp => StatusCode::BAD_REQUEST,
            Self::ClockSkew => StatusCode::UNAUTHORIZED,
            Self::Replay => StatusCode::CONFLICT,
        }
    }

    /// 默认错误描述
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::MissingHeaders => "Missing replay protection headers.",
            Self::InvalidTimestamp => "Invalid timestamp format.",
            Self::ClockSkew => "Request timestamp outside allowed clock skew.",
            Self::Replay => "Replay attack detected.",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次被拒绝的校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
    pub status: StatusCode,
}

impl Rejection {
    pub fn new(code: RejectCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            status: code.status(),
        }
    }
}

impl From<RejectCode> for Rejection {
    fn from(code: RejectCode) -> Self {
        Self::new(code)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code.as_str(),
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Replay Guard 基础设施错误
#[derive(Error, Debug)]
pub enum GuardError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// Nonce 存储不可用
    #[error("Nonce store error: {0}")]
    Store(String),

    /// 请求体读取失败
    #[error("Request body error: {0}")]
    Body(String),

    /// 请求体超出指纹计算允许的大小
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl GuardError {
    /// 错误代码，与 RP-001 ~ RP-004 区分开
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Config(_) | GuardError::Store(_) => "RP-500",
            GuardError::Body(_) => "RP-400",
            GuardError::BodyTooLarge { .. } => "RP-413",
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            GuardError::Store(_) => {
                tracing::error!("Replay protection unavailable: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Replay protection unavailable".to_string(),
                )
            }
            GuardError::Body(_) => (
                StatusCode::BAD_REQUEST,
                "Unreadable request body".to_string(),
            ),
            GuardError::BodyTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            GuardError::Config(_) => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Replay Guard 结果类型别名
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_code_mapping() {
        assert_eq!(RejectCode::MissingHeaders.as_str(), "RP-001");
        assert_eq!(RejectCode::InvalidTimestamp.as_str(), "RP-002");
        assert_eq!(RejectCode::ClockSkew.as_str(), "RP-003");
        assert_eq!(RejectCode::Replay.as_str(), "RP-004");

        assert_eq!(RejectCode::MissingHeaders.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectCode::InvalidTimestamp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectCode::ClockSkew.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RejectCode::Replay.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_rejection_response_status() {
        let response = Rejection::new(RejectCode::Replay).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = Rejection::new(RejectCode::ClockSkew).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_error_is_distinct_from_rejections() {
        let err = GuardError::Store("connection refused".into());
        assert_eq!(err.code(), "RP-500");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_body_too_large_response() {
        let err = GuardError::BodyTooLarge { limit: 16 };
        assert_eq!(err.to_string(), "Request body exceeds 16 bytes");
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
