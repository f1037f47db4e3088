//! # 设备通信能力模块
//!
//! 负责与超声风速仪建立连接并把字节流切分、解码为样本：
//! - **TCP**：连接设备数据端口，完成用户名/密码登录握手后读取记录
//! - **USB 串口**：按配置波特率打开设备，无登录步骤
//! - **解码**：把一条记录解析为 U、V、W、T 四个有限数值
//!
//! ## 架构设计
//!
//! ```text
//! Connector (TcpConnector / SerialConnector)
//!       │ connect()
//!       ▼
//! Session ── next_record() ──▶ RawRecord
//!                                  │
//!                                  ▼
//!                          RecordDecoder::decode
//!                                  │
//!                                  ▼
//!                            DecodedSample
//! ```

mod decoder;
mod error;
mod serial;
mod session;
mod tcp_client;
mod types;

pub use decoder::{RecordDecoder, decode};
pub use error::{DecodeError, ProtocolError};
pub use serial::SerialConnector;
pub use session::{BoxedReader, BoxedWriter, Session};
pub use tcp_client::TcpConnector;
pub use types::*;

use async_trait::async_trait;

/// 传输连接器抽象。
///
/// 每次调用 `connect` 都建立一个全新的会话；会话失效后由调用方重新连接。
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session, ProtocolError>;

    /// 用于日志的端点描述。
    fn endpoint(&self) -> String;
}
