//! 传输会话：独占底层连接，按行惰性读出原始记录。

use crate::error::ProtocolError;
use crate::types::Framing;
use domain::{RawRecord, now_epoch_ms};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// 会话读取端。
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// 会话写入端（用于关闭连接）。
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 一次连接对应的传输会话。
///
/// 生命周期：一次连接、多次读取、一次关闭。读取出错后会话失效，
/// 必须重新连接建立新会话。
pub struct Session {
    peer: String,
    reader: BufReader<BoxedReader>,
    writer: Option<BoxedWriter>,
    framing: Framing,
    buf: Vec<u8>,
    failed: bool,
}

impl Session {
    /// 由已完成握手的读写端构造会话。
    pub fn from_parts(
        peer: impl Into<String>,
        reader: BufReader<BoxedReader>,
        writer: Option<BoxedWriter>,
        framing: Framing,
    ) -> Self {
        Self {
            peer: peer.into(),
            reader,
            writer,
            framing,
            buf: Vec::with_capacity(framing.max_record_len),
            failed: false,
        }
    }

    /// 由任意只读字节流构造会话（模拟设备、回放文件）。
    pub fn from_reader<R>(peer: impl Into<String>, reader: R, framing: Framing) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self::from_parts(peer, BufReader::new(reader), None, framing)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// 读取下一条记录，阻塞直到记录到达或连接出错。
    ///
    /// 空行被跳过；EOF 返回 [`ProtocolError::Closed`]，此后会话不可再用。
    pub async fn next_record(&mut self) -> Result<RawRecord, ProtocolError> {
        if self.failed {
            return Err(ProtocolError::Closed);
        }
        loop {
            self.buf.clear();
            let limit = self.framing.max_record_len as u64;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(self.framing.terminator, &mut self.buf)
                .await;
            let n = match read {
                Ok(n) => n,
                Err(err) => {
                    self.failed = true;
                    return Err(ProtocolError::Io(err));
                }
            };
            if n == 0 {
                self.failed = true;
                return Err(ProtocolError::Closed);
            }

            let end = self
                .buf
                .iter()
                .rposition(|b| !matches!(b, b'\r' | b'\n'))
                .map_or(0, |pos| pos + 1);
            if end == 0 {
                continue;
            }
            return Ok(RawRecord::new(&self.buf[..end], now_epoch_ms()));
        }
    }

    /// 关闭会话并释放底层句柄。
    pub async fn close(mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.shutdown().await {
                debug!(target: "sonic.protocol", peer = %self.peer, error = %err, "session_shutdown_failed");
            }
        }
        debug!(target: "sonic.protocol", peer = %self.peer, "session_closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("framing", &self.framing)
            .field("failed", &self.failed)
            .finish()
    }
}
