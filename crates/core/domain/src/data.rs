use std::borrow::Cow;
use std::collections::BTreeMap;

/// 传输层读到的一条原始记录（已去掉行结束符）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub bytes: Vec<u8>,
    pub received_at_ms: i64,
}

impl RawRecord {
    pub fn new(bytes: impl Into<Vec<u8>>, received_at_ms: i64) -> Self {
        Self {
            bytes: bytes.into(),
            received_at_ms,
        }
    }

    /// 以有损 UTF-8 形式查看记录内容（用于解码与日志）。
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 设备记录的排布格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// 含 `;` 时按分隔符格式解析，否则按标签格式解析
    #[default]
    Auto,
    /// `U=+01.23 V=-00.45 W=+00.02 T=+21.34`
    Labeled,
    /// `状态字;U;V;W;T[;...]`
    Delimited,
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "labeled" | "labelled" => Ok(Self::Labeled),
            "delimited" => Ok(Self::Delimited),
            other => Err(format!("unknown record format: {}", other)),
        }
    }
}

/// 样本字段，顺序与设备输出顺序一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// 纬向风（东西向）
    U,
    /// 经向风（南北向）
    V,
    /// 垂直风
    W,
    /// 声学温度
    T,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::U, Field::V, Field::W, Field::T];

    /// 记录中的字段标签。
    pub fn label(self) -> &'static str {
        match self {
            Field::U => "U",
            Field::V => "V",
            Field::W => "W",
            Field::T => "T",
        }
    }

    /// 发布到总线上的指标名（保持稳定）。
    pub fn metric_name(self) -> &'static str {
        match self {
            Field::U => "wind.u",
            Field::V => "wind.v",
            Field::W => "wind.w",
            Field::T => "temperature.sonic",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Field::U | Field::V | Field::W => "m/s",
            Field::T => "degrees Celsius",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Field::U => "zonal wind",
            Field::V => "meridional wind",
            Field::W => "vertical wind",
            Field::T => "sonic temperature",
        }
    }
}

/// 解码后的样本。
///
/// 只有四个字段都解析为有限数值时才会构造出 `valid = true` 的样本。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub t: f64,
    pub valid: bool,
    /// 设备状态字（仅分隔符格式的记录携带）
    pub status: Option<String>,
    /// 记录接收时间戳（毫秒）
    pub ts_ms: i64,
}

impl DecodedSample {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::U => self.u,
            Field::V => self.v,
            Field::W => self.w,
            Field::T => self.t,
        }
    }

    /// 按设备顺序遍历 (字段, 数值)。
    pub fn fields(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        Field::ALL.into_iter().map(|field| (field, self.value(field)))
    }
}

/// 指标值的数据类型。
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    F64(f64),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::F64(v) => write!(f, "{}", v),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

/// 一次发布到总线的指标。
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub ts_ms: i64,
    pub meta: BTreeMap<String, String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: MetricValue, ts_ms: i64) -> Self {
        Self {
            name: name.into(),
            value,
            ts_ms,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            MetricValue::F64(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }
}
