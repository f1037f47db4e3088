//! 协议错误类型定义

/// 传输层错误。
///
/// 全部可恢复：采集循环据此回到连接状态并重试。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误（端点不可达、设备无法打开）
    #[error("connection error: {0}")]
    Connection(String),

    /// 登录被拒（仅 TCP 模式）
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 对端关闭或会话已失效
    #[error("connection closed")]
    Closed,
}

impl ProtocolError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// 记录解码错误：记录被丢弃，采集继续。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty record")]
    Empty,

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("expected label {expected}, found {found:?}")]
    Label { expected: &'static str, found: String },

    #[error("field {field} is not a number: {raw:?}")]
    InvalidNumber { field: &'static str, raw: String },

    #[error("field {field} is not finite")]
    NonFinite { field: &'static str },
}
