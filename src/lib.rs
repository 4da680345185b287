//! # replay-shield
//!
//! 带防重放保护的 HTTP 服务：加载配置、构建 Nonce 存储，
//! 并把 `replay-guard` 中间件挂在业务路由上

pub mod config;
pub mod error;
pub mod server;

pub use config::ShieldConfig;
pub use error::{Error, Result};
pub use server::{AppState, build_app, serve};
