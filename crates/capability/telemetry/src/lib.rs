//! 日志初始化与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub auth_failures: u64,
    pub stream_drops: u64,
    pub records_received: u64,
    pub samples_decoded: u64,
    pub dropped_invalid: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    auth_failures: AtomicU64,
    stream_drops: AtomicU64,
    records_received: AtomicU64,
    samples_decoded: AtomicU64,
    dropped_invalid: AtomicU64,
    publish_success: AtomicU64,
    publish_failure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            stream_drops: AtomicU64::new(0),
            records_received: AtomicU64::new(0),
            samples_decoded: AtomicU64::new(0),
            dropped_invalid: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            stream_drops: self.stream_drops.load(Ordering::Relaxed),
            records_received: self.records_received.load(Ordering::Relaxed),
            samples_decoded: self.samples_decoded.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            publish_success: self.publish_success.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 默认日志级别：`RUST_LOG` 未设置时，调试模式为 debug，否则为 info。
pub fn default_filter(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// 初始化 tracing（`RUST_LOG` 优先）。
pub fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

/// 记录连接尝试次数。
pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接失败次数（不含认证失败）。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录认证被拒次数。
pub fn record_auth_failure() {
    metrics().auth_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录读流中断次数。
pub fn record_stream_drop() {
    metrics().stream_drops.fetch_add(1, Ordering::Relaxed);
}

/// 记录收到的原始记录数。
pub fn record_record_received() {
    metrics().records_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码成功的样本数。
pub fn record_sample_decoded() {
    metrics().samples_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录因解码失败而丢弃的记录数。
pub fn record_dropped_invalid() {
    metrics().dropped_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布成功的指标条数。
pub fn record_publish_success() {
    metrics().publish_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布失败的指标条数。
pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}
