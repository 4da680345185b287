//! replay-shield 配置
//!
//! 配置文件示例：
//!
//! ```toml
//! name = "replay-shield-01"
//!
//! [bind]
//! ip = "0.0.0.0"
//! port = 8080
//!
//! [guard]
//! allowed_clock_skew_seconds = 300
//! nonce_ttl_seconds = 600
//!
//! [store]
//! backend = "redis"
//!
//! [store.redis]
//! url = "redis://localhost:6379/0"
//!
//! [observability.log]
//! output = "console"
//! ```

use replay_guard::{GuardConfig, StoreBackend, StoreConfig, StoreFailurePolicy};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// 主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// 实例名称
    #[serde(default = "default_name")]
    pub name: String,

    /// HTTP 监听地址
    #[serde(default)]
    pub bind: BindConfig,

    /// 防重放校验配置
    #[serde(default)]
    pub guard: GuardConfig,

    /// Nonce 存储配置
    #[serde(default)]
    pub store: StoreConfig,

    /// 可观测性配置
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    #[serde(default = "default_bind_ip")]
    pub ip: String,

    #[serde(default = "default_bind_port")]
    pub port: u16,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,hyper=warn"）。默认值 "info"。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 日志轮转开关（output = "file" 时有效，按天轮转）
    #[serde(default)]
    pub rotate: bool,

    /// 日志文件目录（output = "file" 时有效）
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            bind: BindConfig::default(),
            guard: GuardConfig::default(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            ip: default_bind_ip(),
            port: default_bind_port(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_name() -> String {
    "replay-shield".to_string()
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

impl ShieldConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(format!("Configuration file does not exist: {path_ref:?}").into());
        }

        if !path_ref.is_file() {
            return Err(format!("Path is not a valid file: {path_ref:?}").into());
        }

        let content = std::fs::read_to_string(path_ref)?;
        let config: ShieldConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 监听地址
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .bind
            .ip
            .parse()
            .map_err(|e| format!("Invalid bind ip '{}': {e}", self.bind.ip))?;
        Ok(SocketAddr::new(ip, self.bind.port))
    }

    /// 验证配置
    ///
    /// 返回的列表中以 "Warning:" 开头的是警告，其余为错误
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if let Err(e) = self.bind_addr() {
            errors.push(e);
        }

        if let Err(guard_errors) = self.guard.validate() {
            errors.extend(guard_errors.into_iter().map(|e| format!("guard.{e}")));
        }

        if self.guard.store_failure_policy == StoreFailurePolicy::FailOpen {
            errors.push(
                "Warning: guard.store_failure_policy = \"fail_open\" forwards requests without replay protection while the nonce store is unavailable"
                    .to_string(),
            );
        }

        match self.store.backend {
            StoreBackend::Redis => match &self.store.redis {
                None => errors.push("store.redis is required when store.backend = \"redis\"".to_string()),
                Some(redis) => {
                    if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                        errors.push(format!(
                            "store.redis.url must start with redis:// or rediss://, got '{}'",
                            redis.url
                        ));
                    }
                    if redis.pool_size == 0 {
                        errors.push("store.redis.pool_size must be greater than 0".to_string());
                    }
                }
            },
            StoreBackend::Memory => {
                if self.store.redis.is_some() {
                    errors.push(
                        "Warning: store.redis is configured but store.backend = \"memory\"; fingerprints are not shared between instances"
                            .to_string(),
                    );
                }
            }
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid observability.log.output '{}', must be one of: console, file",
                self.observability.log.output
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.observability.filter_level).is_err() {
            errors.push(format!(
                "Invalid observability.filter_level '{}'",
                self.observability.filter_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
