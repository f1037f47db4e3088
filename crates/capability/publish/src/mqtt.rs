//! MQTT 发布器
//!
//! topic：`{topic_prefix}/{指标名}`，消息体：
//!
//! ```json
//! {"value": 1.23, "timestamp_ms": 1700000000000, "meta": {"units": "m/s", "sensor": "METEK-sonic3D"}}
//! ```

use crate::{PublishError, Publisher};
use async_trait::async_trait;
use domain::{Metric, MetricValue};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// MQTT 发布器配置。
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    /// 单条发布等待超时（毫秒）
    pub publish_timeout_ms: u64,
}

/// MQTT 发布器实现。
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
    publish_timeout_ms: u64,
}

impl MqttPublisher {
    /// 创建客户端并在后台驱动事件循环（断线后由 rumqttc 自动重连）。
    pub fn connect(
        config: MqttPublisherConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), PublishError> {
        if config.host.trim().is_empty() {
            return Err(PublishError::Bus("mqtt host is empty".to_string()));
        }
        let client_id = format!("sonic-bridge-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "sonic.publish", "mqtt eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Ok((
            Self {
                client,
                topic_prefix: config.topic_prefix,
                qos: qos_from_u8(config.qos),
                publish_timeout_ms: config.publish_timeout_ms,
            },
            handle,
        ))
    }

    fn topic_for(&self, name: &str) -> String {
        topic_for(&self.topic_prefix, name)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, metric: &Metric) -> Result<(), PublishError> {
        let topic = self.topic_for(&metric.name);
        let payload = metric_payload(metric)?;
        debug!(
            target: "sonic.publish",
            topic = %topic,
            payload_size = payload.len(),
            "metric_publish"
        );
        tokio::time::timeout(
            Duration::from_millis(self.publish_timeout_ms),
            self.client.publish(topic, self.qos, false, payload),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.publish_timeout_ms))?
        .map_err(|err| PublishError::Bus(err.to_string()))
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum EnvelopeValue<'a> {
    Number(f64),
    Text(&'a str),
}

#[derive(Serialize)]
struct MetricEnvelope<'a> {
    value: EnvelopeValue<'a>,
    timestamp_ms: i64,
    meta: &'a BTreeMap<String, String>,
}

fn metric_payload(metric: &Metric) -> Result<Vec<u8>, PublishError> {
    let value = match &metric.value {
        MetricValue::F64(v) => EnvelopeValue::Number(*v),
        MetricValue::Text(v) => EnvelopeValue::Text(v),
    };
    let envelope = MetricEnvelope {
        value,
        timestamp_ms: metric.ts_ms,
        meta: &metric.meta,
    };
    serde_json::to_vec(&envelope).map_err(|err| PublishError::Payload(err.to_string()))
}

fn topic_for(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_joins_prefix_and_metric() {
        assert_eq!(topic_for("sonic/", "wind.u"), "sonic/wind.u");
        assert_eq!(topic_for("/site-a/sonic", "status"), "site-a/sonic/status");
        assert_eq!(topic_for("", "wind.w"), "wind.w");
    }

    #[test]
    fn payload_carries_value_timestamp_and_meta() {
        let metric = Metric::new("wind.u", MetricValue::F64(1.23), 1_700_000_000_000)
            .with_meta("units", "m/s");
        let payload = metric_payload(&metric).expect("payload");
        let json: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(json["value"], 1.23);
        assert_eq!(json["timestamp_ms"], 1_700_000_000_000i64);
        assert_eq!(json["meta"]["units"], "m/s");
    }

    #[test]
    fn status_payload_is_text() {
        let metric = Metric::new("status", MetricValue::Text("connected".to_string()), 1);
        let payload = metric_payload(&metric).expect("payload");
        let json: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(json["value"], "connected");
    }

    #[test]
    fn unknown_qos_falls_back_to_at_least_once() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(9), QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        let result = MqttPublisher::connect(MqttPublisherConfig {
            host: " ".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic_prefix: "sonic".to_string(),
            qos: 1,
            publish_timeout_ms: 100,
        });
        assert!(matches!(result, Err(PublishError::Bus(_))));
    }
}
