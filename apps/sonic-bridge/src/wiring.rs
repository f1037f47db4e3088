//! 由运行配置装配连接器、发布器与采集循环参数。

use domain::SensorMeta;
use sonic_acquisition::{AcquisitionConfig, ExponentialBackoff, FixedDelay, RetryPolicy};
use sonic_config::{AppConfig, ConfigError, ConnectionType, PublisherKind, RetryStrategy};
use sonic_protocol::{Connector, SerialConfig, SerialConnector, TcpConfig, TcpConnector};
use sonic_publish::{
    LogPublisher, MqttPublisher, MqttPublisherConfig, PublishError, Publisher, SamplePublisher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const BACKOFF_FACTOR: f64 = 2.0;

pub fn tcp_config(config: &AppConfig) -> Result<TcpConfig, ConfigError> {
    let host = config
        .ip
        .clone()
        .ok_or_else(|| ConfigError::Missing("ip".to_string()))?;
    Ok(TcpConfig {
        port: config.port,
        username: config.username.clone(),
        password: config.password.clone(),
        connect_timeout_ms: config.connect_timeout_ms,
        handshake_timeout_ms: config.handshake_timeout_ms,
        line_terminator: config.line_terminator.byte(),
        ..TcpConfig::new(host)
    })
}

pub fn serial_config(config: &AppConfig) -> Result<SerialConfig, ConfigError> {
    let device = config
        .device
        .clone()
        .ok_or_else(|| ConfigError::Missing("device".to_string()))?;
    Ok(SerialConfig {
        baud_rate: config.baud_rate,
        line_terminator: config.line_terminator.byte(),
        ..SerialConfig::new(device)
    })
}

/// 按连接方式构造连接器。
pub fn build_connector(config: &AppConfig) -> Result<Arc<dyn Connector>, ConfigError> {
    match config.connection_type {
        Some(ConnectionType::Tcp) => Ok(Arc::new(TcpConnector::new(tcp_config(config)?))),
        Some(ConnectionType::Usb) => Ok(Arc::new(SerialConnector::new(serial_config(config)?))),
        None => Err(ConfigError::Missing("connection_type".to_string())),
    }
}

/// 构造发布器；MQTT 模式同时返回事件循环任务句柄。
pub fn build_publisher(
    config: &AppConfig,
) -> Result<(SamplePublisher, Option<JoinHandle<()>>), PublishError> {
    let (publisher, handle): (Arc<dyn Publisher>, _) = match config.publisher {
        PublisherKind::Mqtt => {
            let (publisher, handle) = MqttPublisher::connect(MqttPublisherConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                topic_prefix: config.mqtt_topic_prefix.clone(),
                qos: config.mqtt_qos,
                publish_timeout_ms: config.publish_timeout_ms,
            })?;
            (Arc::new(publisher), Some(handle))
        }
        PublisherKind::Log => (Arc::new(LogPublisher), None),
    };
    let meta = SensorMeta::new(config.sensor.clone());
    Ok((SamplePublisher::new(publisher, meta), handle))
}

pub fn build_retry(config: &AppConfig) -> Box<dyn RetryPolicy> {
    let initial = Duration::from_millis(config.retry_delay_ms);
    match config.retry_policy {
        RetryStrategy::Fixed => Box::new(FixedDelay::new(initial)),
        RetryStrategy::Exponential => Box::new(ExponentialBackoff::new(
            initial,
            Duration::from_millis(config.retry_max_delay_ms),
            BACKOFF_FACTOR,
        )),
    }
}

pub fn acquisition_config(config: &AppConfig) -> AcquisitionConfig {
    AcquisitionConfig {
        reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        settle_delay: Duration::from_millis(config.settle_delay_ms),
        debug: config.debug,
    }
}
