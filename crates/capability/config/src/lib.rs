//! 采集进程运行配置加载。
//!
//! 配置来源按优先级从低到高：内置默认值 → `SONIC_*` 环境变量 → 命令行参数。
//! 命令行覆盖由二进制负责，最终统一经过 [`AppConfig::validate`] 校验。

use domain::RecordFormat;
use std::env;
use std::str::FromStr;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 设备连接方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Tcp,
    Usb,
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "usb" => Ok(Self::Usb),
            other => Err(format!("expected tcp or usb, got {}", other)),
        }
    }
}

/// 记录行结束符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    #[default]
    Lf,
    Cr,
}

impl LineTerminator {
    pub fn byte(self) -> u8 {
        match self {
            Self::Lf => b'\n',
            Self::Cr => b'\r',
        }
    }
}

impl FromStr for LineTerminator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lf" | "\\n" => Ok(Self::Lf),
            "cr" | "\\r" => Ok(Self::Cr),
            other => Err(format!("expected lf or cr, got {}", other)),
        }
    }
}

/// 连接失败后的重试延时策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    #[default]
    Fixed,
    Exponential,
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" | "backoff" => Ok(Self::Exponential),
            other => Err(format!("expected fixed or exponential, got {}", other)),
        }
    }
}

/// 发布目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherKind {
    #[default]
    Mqtt,
    /// 仅写日志（无 broker 时调试用）
    Log,
}

impl FromStr for PublisherKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "log" => Ok(Self::Log),
            other => Err(format!("expected mqtt or log, got {}", other)),
        }
    }
}

/// 采集进程运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connection_type: Option<ConnectionType>,
    pub ip: Option<String>,
    pub port: u16,
    pub device: Option<String>,
    pub baud_rate: u32,
    pub username: String,
    pub password: String,
    pub line_terminator: LineTerminator,
    pub record_format: RecordFormat,
    pub sensor: String,
    pub debug: bool,
    pub publisher: PublisherKind,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_qos: u8,
    pub publish_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub retry_policy: RetryStrategy,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection_type: None,
            ip: None,
            port: 5001,
            device: None,
            baud_rate: 9600,
            username: "data".to_string(),
            password: "METEKGMBH".to_string(),
            line_terminator: LineTerminator::Lf,
            record_format: RecordFormat::Auto,
            sensor: domain::DEFAULT_SENSOR.to_string(),
            debug: false,
            publisher: PublisherKind::Mqtt,
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_topic_prefix: "sonic".to_string(),
            mqtt_qos: 1,
            publish_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 5_000,
            retry_policy: RetryStrategy::Fixed,
            retry_delay_ms: 60_000,
            retry_max_delay_ms: 300_000,
            reconnect_delay_ms: 30_000,
            settle_delay_ms: 2_000,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置（未设置的项使用默认值）。
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            connection_type: read_optional_parsed("SONIC_CONNECTION_TYPE")?,
            ip: read_optional("SONIC_IP"),
            port: read_with_default("SONIC_PORT", defaults.port)?,
            device: read_optional("SONIC_DEVICE"),
            baud_rate: read_with_default("SONIC_BAUD_RATE", defaults.baud_rate)?,
            username: read_optional("SONIC_USERNAME").unwrap_or(defaults.username),
            password: read_optional("SONIC_PASSWORD").unwrap_or(defaults.password),
            line_terminator: read_with_default("SONIC_LINE_TERMINATOR", defaults.line_terminator)?,
            record_format: read_with_default("SONIC_RECORD_FORMAT", defaults.record_format)?,
            sensor: read_optional("SONIC_SENSOR").unwrap_or(defaults.sensor),
            debug: read_bool_with_default("SONIC_DEBUG", defaults.debug),
            publisher: read_with_default("SONIC_PUBLISHER", defaults.publisher)?,
            mqtt_host: read_optional("SONIC_MQTT_HOST").unwrap_or(defaults.mqtt_host),
            mqtt_port: read_with_default("SONIC_MQTT_PORT", defaults.mqtt_port)?,
            mqtt_username: read_optional("SONIC_MQTT_USERNAME"),
            mqtt_password: read_optional("SONIC_MQTT_PASSWORD"),
            mqtt_topic_prefix: read_optional("SONIC_MQTT_TOPIC_PREFIX")
                .unwrap_or(defaults.mqtt_topic_prefix),
            mqtt_qos: read_with_default("SONIC_MQTT_QOS", defaults.mqtt_qos)?,
            publish_timeout_ms: read_with_default(
                "SONIC_PUBLISH_TIMEOUT_MS",
                defaults.publish_timeout_ms,
            )?,
            connect_timeout_ms: read_with_default(
                "SONIC_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            handshake_timeout_ms: read_with_default(
                "SONIC_HANDSHAKE_TIMEOUT_MS",
                defaults.handshake_timeout_ms,
            )?,
            retry_policy: read_with_default("SONIC_RETRY_POLICY", defaults.retry_policy)?,
            retry_delay_ms: read_with_default("SONIC_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            retry_max_delay_ms: read_with_default(
                "SONIC_RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay_ms,
            )?,
            reconnect_delay_ms: read_with_default(
                "SONIC_RECONNECT_DELAY_MS",
                defaults.reconnect_delay_ms,
            )?,
            settle_delay_ms: read_with_default("SONIC_SETTLE_DELAY_MS", defaults.settle_delay_ms)?,
        })
    }

    /// 启动前校验：连接参数不完整时返回 `ConfigError`（进程随即以非零码退出）。
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.connection_type {
            None => return Err(ConfigError::Missing("connection_type".to_string())),
            Some(ConnectionType::Tcp) => {
                if self.ip.as_deref().is_none_or(|ip| ip.trim().is_empty()) {
                    return Err(ConfigError::Missing("ip".to_string()));
                }
                if self.port == 0 {
                    return Err(ConfigError::Invalid("port".to_string(), "0".to_string()));
                }
            }
            Some(ConnectionType::Usb) => {
                if self.device.as_deref().is_none_or(|device| device.trim().is_empty()) {
                    return Err(ConfigError::Missing("device".to_string()));
                }
                if self.baud_rate == 0 {
                    return Err(ConfigError::Invalid("baud_rate".to_string(), "0".to_string()));
                }
            }
        }
        if self.mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "mqtt_qos".to_string(),
                self.mqtt_qos.to_string(),
            ));
        }
        if self.sensor.trim().is_empty() {
            return Err(ConfigError::Missing("sensor".to_string()));
        }
        if self.retry_policy == RetryStrategy::Exponential
            && self.retry_max_delay_ms < self.retry_delay_ms
        {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms".to_string(),
                format!("{} < retry_delay_ms {}", self.retry_max_delay_ms, self.retry_delay_ms),
            ));
        }
        Ok(())
    }
}

/// 读取可解析类型的环境变量，未设置时使用默认值。
fn read_with_default<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match read_optional(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        None => Ok(None),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
