//! Replay Guard 监控指标

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts};

lazy_static! {
    /// 校验结果计数（outcome = accepted / rejected / bypassed, code = RP-xxx 或 none）
    pub static ref GUARD_DECISIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("decisions_total", "Total number of replay guard decisions")
            .namespace("replay_guard"),
        &["outcome", "code"]
    ).unwrap();

    /// Nonce 存储失败计数
    pub static ref STORE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("store_errors_total", "Total number of nonce store failures")
            .namespace("replay_guard"),
        &["policy"]
    ).unwrap();
}

/// 注册 Replay Guard metrics 到指定 registry
pub fn register_guard_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(GUARD_DECISIONS.clone()))?;
    registry.register(Box::new(STORE_ERRORS.clone()))?;
    Ok(())
}

pub(crate) fn record_accepted() {
    GUARD_DECISIONS
        .with_label_values(&["accepted", "none"])
        .inc();
}

pub(crate) fn record_bypassed() {
    GUARD_DECISIONS
        .with_label_values(&["bypassed", "none"])
        .inc();
}

pub(crate) fn record_rejected(code: &str) {
    GUARD_DECISIONS.with_label_values(&["rejected", code]).inc();
}

pub(crate) fn record_store_error(policy: &str) {
    STORE_ERRORS.with_label_values(&[policy]).inc();
}
