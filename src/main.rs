//! replay-shield 主程序
//!
//! 加载配置，初始化日志与 Nonce 存储，启动受防重放保护的 HTTP 服务

mod cli;
mod observability;

use clap::Parser;
use observability::init_observability;
use replay_shield::config::ShieldConfig;
use replay_shield::{Error, Result, build_app, serve};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use tracing::{error, info};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // An explicit path must exist; only the default name triggers the search
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = vec![
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/replay-shield/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: replay-shield --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        match ShieldConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);

                if let Err(errors) = config.validate() {
                    error!("❌ 配置验证发现问题:");
                    for (i, err) in errors.iter().enumerate() {
                        if err.starts_with("Warning:") {
                            info!("  {}. ⚠️  {}", i + 1, err);
                        } else {
                            error!("  {}. ❌ {}", i + 1, err);
                        }
                    }
                    let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
                    if has_errors {
                        return Err(Error::service_validation("配置验证失败"));
                    }
                }

                info!("✅ 配置验证通过");
                Ok(())
            }
            Err(e) => {
                error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = ShieldConfig::from_file(config_path).inspect_err(|e| {
            bootstrap_error!("❌ 配置加载失败: {}", e);
        })?;
        bootstrap_info!("✅ 配置加载成功");

        if let Err(errors) = config.validate() {
            bootstrap_error!("❌ 配置验证发现问题:");
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::custom("配置验证失败，请修复上述错误"));
            }
        }

        let _observability_guard = init_observability(&config)?;

        info!("🚀 启动 replay-shield: {}", config.name);
        info!(
            "防重放参数: skew={}s, ttl={}s, failure_policy={:?}",
            config.guard.allowed_clock_skew_seconds,
            config.guard.nonce_ttl_seconds,
            config.guard.store_failure_policy
        );

        let bind_addr = config.bind_addr().map_err(Error::service_startup)?;
        let (app, nonce_store) = build_app(&config).await?;

        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            Error::service_startup(format!("Failed to bind {bind_addr}: {e}"))
        })?;

        info!("📡 HTTP 服务器监听在: http://{}", bind_addr);
        info!("🔧 可用的API端点:");
        info!("  - http://{}/api/echo (POST/PUT/PATCH/DELETE 受保护)", bind_addr);
        info!("  - http://{}/health", bind_addr);
        info!("  - http://{}/metrics", bind_addr);

        let result = serve(listener, app, shutdown_signal()).await;

        info!("HTTP 服务器已停止，关闭 Nonce 存储...");
        nonce_store.shutdown().await;

        if let Err(ref e) = result {
            error!("服务异常退出: {}", e);
        } else {
            info!("👋 replay-shield 已退出");
        }

        result
    }
}

/// 等待 Ctrl-C 信号
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听Ctrl-C信号: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到Ctrl-C信号，开始优雅关闭...");
}
