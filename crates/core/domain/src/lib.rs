pub mod data;

pub use data::{DecodedSample, Field, Metric, MetricValue, RawRecord, RecordFormat};

/// 默认传感器标识。
pub const DEFAULT_SENSOR: &str = "METEK-sonic3D";

/// 缺测值标记（随每条指标的 meta 一起发布）。
pub const MISSING_VALUE: &str = "-9999.0";

/// 数据来源描述：所有发布的指标都携带该身份信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMeta {
    pub sensor: String,
    pub missing: String,
}

impl SensorMeta {
    /// 以指定传感器标识构造来源描述。
    pub fn new(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            missing: MISSING_VALUE.to_string(),
        }
    }
}

impl Default for SensorMeta {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR)
    }
}

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
