//! TCP 客户端实现
//!
//! 连接设备数据端口，完成行式登录握手后进入数据流。
//!
//! ## 登录流程
//!
//! ```text
//! 设备 → 用户名提示      客户端 → "{username}\r\n"
//! 设备 → 密码提示        客户端 → "{password}\r\n"
//! 设备 → 登录应答（含 success 视为成功，否则拒绝）
//! 设备 → 数据记录 ...
//! ```
//!
//! 提示可能分多次到达：读到以 `:`/`>`/`?` 结尾的文本，或输入静默 [`QUIET_WINDOW`] 后视为完整。
//! 应答只读到行尾为止，同一分片中紧随其后的记录留给会话读取。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let connector = TcpConnector::new(TcpConfig::new("10.31.81.20"));
//! let mut session = connector.connect().await?;
//! let record = session.next_record().await?;
//! ```

use crate::Connector;
use crate::error::ProtocolError;
use crate::session::{BoxedReader, BoxedWriter, Session};
use crate::types::{Framing, TcpConfig};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// 提示或应答开始到达后，超过该时长没有新字节即认为消息结束。
pub const QUIET_WINDOW: Duration = Duration::from_millis(200);

/// TCP 连接器
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: TcpConfig,
}

impl TcpConnector {
    /// 创建新的 TCP 连接器
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Session, ProtocolError> {
        let addr = self.addr();
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| ProtocolError::Connection(format!("{}: {}", addr, e)))?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(target: "sonic.protocol", error = %err, "set_nodelay_failed");
        }

        let (read_half, write_half) = stream.into_split();
        let reader: BoxedReader = Box::new(read_half);
        let mut reader = BufReader::new(reader);
        let mut writer: BoxedWriter = Box::new(write_half);

        let credentials = Credentials {
            username: &self.config.username,
            password: &self.config.password,
            ack_marker: &self.config.ack_marker,
        };
        login(
            &mut reader,
            &mut writer,
            &credentials,
            Duration::from_millis(self.config.handshake_timeout_ms),
        )
        .await?;
        info!(target: "sonic.protocol", addr = %addr, username = %self.config.username, "tcp_login_ok");

        Ok(Session::from_parts(
            addr,
            reader,
            Some(writer),
            Framing::new(self.config.line_terminator),
        ))
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr())
    }
}

/// 登录凭据
pub(crate) struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub ack_marker: &'a str,
}

/// 执行行式登录握手。
///
/// 每一步的首个字节须在 `step_timeout` 内到达，否则返回 [`ProtocolError::Timeout`]；
/// 应答不含成功标记或设备在应答前断开返回 [`ProtocolError::Auth`]。
/// 返回时 `reader` 中只剩应答之后的数据。
pub(crate) async fn login<R, W>(
    reader: &mut R,
    writer: &mut W,
    credentials: &Credentials<'_>,
    step_timeout: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prompt = read_message(reader, step_timeout, MessageEnd::Prompt, "username prompt").await?;
    debug!(target: "sonic.protocol", prompt = %prompt.trim(), "login_username_prompt");
    send_line(writer, credentials.username).await?;

    let prompt = read_message(reader, step_timeout, MessageEnd::Prompt, "password prompt").await?;
    debug!(target: "sonic.protocol", prompt = %prompt.trim(), "login_password_prompt");
    send_line(writer, credentials.password).await?;

    let ack = match read_message(reader, step_timeout, MessageEnd::Line, "login acknowledgment")
        .await
    {
        Ok(ack) => ack,
        Err(ProtocolError::Closed) => {
            return Err(ProtocolError::Auth(
                "device closed connection after credentials".to_string(),
            ));
        }
        Err(err) => return Err(err),
    };
    let marker = credentials.ack_marker.to_ascii_lowercase();
    if ack.to_ascii_lowercase().contains(&marker) {
        Ok(())
    } else {
        Err(ProtocolError::Auth(ack.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageEnd {
    /// 以提示符结尾，读走已到达的全部字节
    Prompt,
    /// 到第一个行结束符为止，其后的字节留在缓冲区
    Line,
}

/// 读取设备的一条提示或应答。
///
/// 首个字节等待 `step_timeout`，之后每次等待 [`QUIET_WINDOW`]；静默或对端关闭时
/// 以已读到的内容作为整条消息。
async fn read_message<R>(
    reader: &mut R,
    step_timeout: Duration,
    end: MessageEnd,
    step: &str,
) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let quiet = QUIET_WINDOW.min(step_timeout);
    let mut message: Vec<u8> = Vec::new();
    loop {
        let wait = if message.is_empty() { step_timeout } else { quiet };
        let complete = {
            let chunk = match tokio::time::timeout(wait, reader.fill_buf()).await {
                Err(_) if message.is_empty() => {
                    return Err(ProtocolError::Timeout(format!("waiting for {}", step)));
                }
                Err(_) => break,
                Ok(chunk) => chunk?,
            };
            if chunk.is_empty() {
                if message.is_empty() {
                    return Err(ProtocolError::Closed);
                }
                break;
            }

            let (taken, line_done) = match end {
                MessageEnd::Prompt => (chunk.len(), false),
                MessageEnd::Line => match line_end(chunk) {
                    Some(taken) => (taken, true),
                    None => (chunk.len(), false),
                },
            };
            message.extend_from_slice(&chunk[..taken]);
            reader.consume(taken);
            line_done || (end == MessageEnd::Prompt && ends_with_prompt(&message))
        };
        if complete {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&message).into_owned())
}

/// 第一个行结束符（含紧随的 `\n`）之后的偏移。
fn line_end(chunk: &[u8]) -> Option<usize> {
    let pos = chunk.iter().position(|b| matches!(b, b'\r' | b'\n'))?;
    if chunk[pos] == b'\r' && chunk.get(pos + 1) == Some(&b'\n') {
        Some(pos + 2)
    } else {
        Some(pos + 1)
    }
}

fn ends_with_prompt(message: &[u8]) -> bool {
    String::from_utf8_lossy(message)
        .trim_end()
        .ends_with([':', '>', '?'])
}

async fn send_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}
