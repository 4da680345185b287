//! 统一错误处理模型
//!
//! replay-shield 的顶层错误类型，聚合防重放组件和依赖 crate 的错误

use replay_guard::GuardError;
use thiserror::Error;

/// 主应用的统一错误枚举
#[derive(Debug, Error)]
pub enum Error {
    /// 配置文件相关错误
    #[error("Configuration error: {0}")]
    Config(#[from] Box<dyn std::error::Error>),

    /// 防重放组件错误（存储初始化、配置校验等）
    #[error("Replay guard error: {0}")]
    Guard(#[from] GuardError),

    /// I/O 操作错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 指标注册/编码错误
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// 服务启动失败
    #[error("Service startup failed: {message}")]
    ServiceStartup { message: String },

    /// 服务配置验证失败
    #[error("Service configuration validation failed: {message}")]
    ServiceValidation { message: String },

    /// 自定义错误消息
    #[error("Application error: {message}")]
    Custom { message: String },
}

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 创建自定义错误
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// 创建服务启动失败错误
    pub fn service_startup(message: impl Into<String>) -> Self {
        Self::ServiceStartup {
            message: message.into(),
        }
    }

    /// 创建服务配置验证失败错误
    pub fn service_validation(message: impl Into<String>) -> Self {
        Self::ServiceValidation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::custom("test error");
        assert!(matches!(err, Error::Custom { .. }));
    }

    #[test]
    fn test_config_load_error_conversion() {
        fn load() -> Result<crate::config::ShieldConfig> {
            Ok(crate::config::ShieldConfig::from_file("/nonexistent/replay-shield.toml")?)
        }

        let err = load().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_guard_error_conversion() {
        let err: Error = GuardError::Store("connection refused".into()).into();
        assert!(matches!(err, Error::Guard(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
