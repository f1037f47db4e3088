//! 数据发布能力：把解码样本映射为指标并投递到消息总线。

mod adapter;
mod memory;
mod mqtt;

pub use adapter::{PublishReport, SamplePublisher, STATUS_METRIC};
pub use memory::MemoryPublisher;
pub use mqtt::{MqttPublisher, MqttPublisherConfig};

use async_trait::async_trait;
use domain::Metric;
use tracing::info;

/// 发布错误：仅记录，不中断采集。
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("publish timed out after {0}ms")]
    Timeout(u64),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 消息总线发布器抽象。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, metric: &Metric) -> Result<(), PublishError>;
}

/// 日志发布器（无 broker 时调试用）。
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, metric: &Metric) -> Result<(), PublishError> {
        info!(
            target: "sonic.publish",
            name = %metric.name,
            value = %metric.value,
            ts_ms = metric.ts_ms,
            meta = ?metric.meta,
            "metric_logged"
        );
        Ok(())
    }
}
