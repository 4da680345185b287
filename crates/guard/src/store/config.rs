//! Nonce 存储后端配置
//!
//! 定义各种存储后端的配置结构

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// 存储后端类型
    pub backend: StoreBackend,

    /// 进程内存储配置（缺省时使用默认值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,

    /// Redis 配置（当 backend = "redis" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            memory: Some(MemoryConfig::default()),
            redis: None,
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储，适用于单实例部署
    Memory,
    /// Redis 远程缓存，适用于多实例部署
    Redis,
}

/// 进程内存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryConfig {
    /// 两次过期清理之间的最小间隔（秒）
    ///
    /// 清理在 exists 调用时惰性触发；0 表示每次调用都清理
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// 是否额外启动后台定时清理任务
    #[serde(default)]
    pub background_sweep: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            background_sweep: false,
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis 连接 URL
    ///
    /// 格式：redis://[username:password@]host[:port][/database]
    /// 示例：redis://localhost:6379/0
    pub url: String,

    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// 单次操作超时时间（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 指纹 key 前缀
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_pool_size() -> usize {
    20
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_key_prefix() -> String {
    "replay:nonce:".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.memory.unwrap().sweep_interval_seconds, 60);
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_serialize_memory_config() {
        let toml = toml::to_string(&StoreConfig::default()).unwrap();
        assert!(toml.contains("backend = \"memory\""));
        assert!(toml.contains("sweep_interval_seconds = 60"));
        assert!(!toml.contains("[redis]"));
    }

    #[test]
    fn test_deserialize_redis_config() {
        let toml_str = r#"
            backend = "redis"

            [redis]
            url = "redis://cache:6379/2"
            pool_size = 8
        "#;

        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend, StoreBackend::Redis);
        assert!(config.memory.is_none());

        let redis = config.redis.unwrap();
        assert_eq!(redis.url, "redis://cache:6379/2");
        assert_eq!(redis.pool_size, 8);
        assert_eq!(redis.timeout_ms, 1000);
        assert_eq!(redis.key_prefix, "replay:nonce:");
    }
}
