//! 样本 → 指标映射

use crate::{PublishError, Publisher};
use domain::{DecodedSample, Field, Metric, MetricValue, SensorMeta, now_epoch_ms};
use sonic_telemetry::{record_publish_failure, record_publish_success};
use std::sync::Arc;
use tracing::{debug, warn};

/// 状态指标名。
pub const STATUS_METRIC: &str = "status";

/// 一次样本发布的结果。
#[derive(Debug, Default)]
pub struct PublishReport {
    pub published: usize,
    pub errors: Vec<PublishError>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 发布适配器：每个样本拆成四条独立指标，逐条投递。
#[derive(Clone)]
pub struct SamplePublisher {
    publisher: Arc<dyn Publisher>,
    meta: SensorMeta,
}

impl SamplePublisher {
    pub fn new(publisher: Arc<dyn Publisher>, meta: SensorMeta) -> Self {
        Self { publisher, meta }
    }

    pub fn meta(&self) -> &SensorMeta {
        &self.meta
    }

    /// 构造样本对应的四条指标（按 U、V、W、T 顺序）。
    pub fn metrics_for(&self, sample: &DecodedSample) -> Vec<Metric> {
        sample
            .fields()
            .map(|(field, value)| self.field_metric(field, value, sample.ts_ms))
            .collect()
    }

    fn field_metric(&self, field: Field, value: f64, ts_ms: i64) -> Metric {
        Metric::new(field.metric_name(), MetricValue::F64(value), ts_ms)
            .with_meta("missing", self.meta.missing.clone())
            .with_meta("units", field.unit())
            .with_meta("description", field.description())
            .with_meta("name", field.metric_name())
            .with_meta("sensor", self.meta.sensor.clone())
    }

    /// 发布样本。某一字段失败不影响其余字段。无效样本不发布。
    pub async fn publish(&self, sample: &DecodedSample) -> PublishReport {
        let mut report = PublishReport::default();
        if !sample.valid {
            debug!(target: "sonic.publish", "invalid_sample_skipped");
            return report;
        }
        for metric in self.metrics_for(sample) {
            match self.publisher.publish(&metric).await {
                Ok(()) => {
                    record_publish_success();
                    report.published += 1;
                }
                Err(err) => {
                    record_publish_failure();
                    warn!(
                        target: "sonic.publish",
                        name = %metric.name,
                        error = %err,
                        "metric_publish_failed"
                    );
                    report.errors.push(err);
                }
            }
        }
        report
    }

    /// 发布状态文本（connected、连接错误、NoData 等）。
    pub async fn publish_status(&self, status: &str) -> Result<(), PublishError> {
        let metric = Metric::new(
            STATUS_METRIC,
            MetricValue::Text(status.to_string()),
            now_epoch_ms(),
        )
        .with_meta("sensor", self.meta.sensor.clone());
        let result = self.publisher.publish(&metric).await;
        match &result {
            Ok(()) => record_publish_success(),
            Err(err) => {
                record_publish_failure();
                warn!(target: "sonic.publish", status = %status, error = %err, "status_publish_failed");
            }
        }
        result
    }
}
