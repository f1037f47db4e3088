//! 传输层配置类型定义

/// 设备数据端口默认值。
pub const DEFAULT_TCP_PORT: u16 = 5001;
/// 串口默认波特率。
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// 记录分帧参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// 行结束符
    pub terminator: u8,
    /// 单条记录最大长度，超出部分作为下一条记录读出
    pub max_record_len: usize,
}

impl Framing {
    pub fn new(terminator: u8) -> Self {
        Self {
            terminator,
            ..Self::default()
        }
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            terminator: b'\n',
            max_record_len: 512,
        }
    }
}

/// TCP 模式配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// 设备主机地址
    pub host: String,
    /// 设备端口
    pub port: u16,
    /// 登录用户名
    pub username: String,
    /// 登录密码
    pub password: String,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 登录每一步等待设备响应的超时（毫秒）
    pub handshake_timeout_ms: u64,
    /// 登录成功应答中包含的关键字（不区分大小写）
    pub ack_marker: String,
    /// 行结束符
    pub line_terminator: u8,
}

impl TcpConfig {
    /// 以出厂默认端口与凭据构造配置。
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_TCP_PORT,
            username: "data".to_string(),
            password: "METEKGMBH".to_string(),
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 5_000,
            ack_marker: "success".to_string(),
            line_terminator: b'\n',
        }
    }
}

/// USB 串口模式配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// 设备路径（如 /dev/ttyUSB0）
    pub device: String,
    /// 波特率
    pub baud_rate: u32,
    /// 行结束符
    pub line_terminator: u8,
}

impl SerialConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            line_terminator: b'\n',
        }
    }
}
