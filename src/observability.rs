use replay_shield::config::{LogConfig, ObservabilityConfig, ShieldConfig};
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use replay_shield::Result;

/// Guard for observability resources (log writer)
#[derive(Default)]
pub struct ObservabilityGuard {
    _log_guard: Option<WorkerGuard>,
}

/// Initialize logging based on configuration
pub fn init_observability(config: &ShieldConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let observability_config = &config.observability;

    match observability_config.log.output.as_str() {
        "file" => {
            fs::create_dir_all(&observability_config.log.path)?;
            let (non_blocking, worker_guard) = build_file_writer(&observability_config.log)?;
            guard._log_guard = Some(worker_guard);

            init_subscriber_with_writer(non_blocking, false, observability_config);
        }
        _ => {
            init_subscriber_with_writer(std::io::stdout, true, observability_config);
        }
    }

    Ok(guard)
}

/// Create an EnvFilter from config, with RUST_LOG taking precedence
fn create_env_filter(config: &ObservabilityConfig) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            println!(
                "RUST_LOG not set, using default filter level: {}",
                config.filter_level
            );
            config.filter_level.clone()
        });

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        println!("Failed to parse filter directive: {directive}. Falling back to default: info");
        EnvFilter::new("info")
    })
}

fn init_subscriber_with_writer<W>(writer: W, use_ansi: bool, config: &ObservabilityConfig)
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(use_ansi)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(create_env_filter(config))
        .with(fmt_layer)
        .try_init()
        .ok();
}

fn build_file_writer(log_config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    println!("日志写入模式: 文件");
    println!("  - 路径: {}", log_config.path);
    println!(
        "  - 轮转: {}",
        if log_config.rotate {
            "开启（按天）"
        } else {
            "关闭"
        }
    );

    if log_config.rotate {
        let file_appender = tracing_appender::rolling::daily(&log_config.path, "replay-shield.log");
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_file_path = std::path::Path::new(&log_config.path).join("replay-shield.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)?;
        Ok(tracing_appender::non_blocking(file))
    }
}
