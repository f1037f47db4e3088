//! # 采集循环
//!
//! 把 传输 → 解码 → 发布 串成一个无限运行的单任务循环：
//!
//! ```text
//! Disconnected ──▶ Connecting ──成功──▶ Streaming ──读失败──▶ Error
//!                    ▲    │                 │                  │
//!                    │    └─失败, 按策略等待─┘(自环)             │
//!                    └──────────────── reconnect_delay ◀───────┘
//!
//! 任意状态收到停机信号 ──▶ Shutdown（关闭当前会话后退出）
//! ```
//!
//! 链路问题没有终止状态：连接失败、认证失败、读流中断都只会回到 Connecting。

mod retry;

pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy};

use domain::RawRecord;
use sonic_protocol::{Connector, DecodeError, ProtocolError, RecordDecoder, Session};
use sonic_publish::SamplePublisher;
use sonic_telemetry::{
    record_auth_failure, record_connect_attempt, record_connect_failure, record_dropped_invalid,
    record_record_received, record_sample_decoded, record_stream_drop,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 循环状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Connecting,
    Streaming,
    Error,
    Shutdown,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Disconnected => "disconnected",
            LoopState::Connecting => "connecting",
            LoopState::Streaming => "streaming",
            LoopState::Error => "error",
            LoopState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// 循环运行统计（`run` 结束时返回）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub connect_attempts: u64,
    /// Connecting → Connecting 的次数
    pub retries: u64,
    pub sessions: u64,
    /// Streaming → Connecting 的次数
    pub stream_drops: u64,
    pub records: u64,
    pub samples: u64,
    pub decode_errors: u64,
    pub metrics_published: u64,
    pub publish_errors: u64,
}

/// 循环参数。
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// 读流中断后重新连接前的等待
    pub reconnect_delay: Duration,
    /// 连接建立后开始读取前的等待（设备上电输出稳定）
    pub settle_delay: Duration,
    /// 输出每条原始记录和样本
    pub debug: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            debug: false,
        }
    }
}

enum StreamEnd {
    Shutdown,
    Dropped(ProtocolError),
}

/// 采集循环。
pub struct AcquisitionLoop {
    connector: Arc<dyn Connector>,
    decoder: RecordDecoder,
    publisher: SamplePublisher,
    retry: Box<dyn RetryPolicy>,
    config: AcquisitionConfig,
    state: watch::Sender<LoopState>,
    stats: LoopStats,
}

impl AcquisitionLoop {
    pub fn new(
        connector: Arc<dyn Connector>,
        decoder: RecordDecoder,
        publisher: SamplePublisher,
        retry: Box<dyn RetryPolicy>,
        config: AcquisitionConfig,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Disconnected);
        Self {
            connector,
            decoder,
            publisher,
            retry,
            config,
            state,
            stats: LoopStats::default(),
        }
    }

    /// 订阅状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// 运行直到收到停机信号（`shutdown` 变为 true 或发送端被丢弃）。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        let endpoint = self.connector.endpoint();
        info!(target: "sonic.acquisition", endpoint = %endpoint, "acquisition_started");
        let mut failures: u32 = 0;

        while !is_shutdown(&shutdown) {
            self.transition(LoopState::Connecting);
            self.stats.connect_attempts += 1;
            record_connect_attempt();

            let connected = tokio::select! {
                biased;
                _ = wait_shutdown(&mut shutdown) => None,
                result = self.connector.connect() => Some(result),
            };
            let Some(connected) = connected else {
                break;
            };

            let session = match connected {
                Ok(session) => session,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    self.stats.retries += 1;
                    if err.is_auth() {
                        record_auth_failure();
                    } else {
                        record_connect_failure();
                    }
                    let delay = self.retry.delay(failures);
                    warn!(
                        target: "sonic.acquisition",
                        endpoint = %endpoint,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "connect_failed"
                    );
                    let _ = self.publisher.publish_status(&err.to_string()).await;
                    if !sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            failures = 0;
            self.stats.sessions += 1;
            info!(target: "sonic.acquisition", endpoint = %endpoint, peer = %session.peer(), "connected");
            let _ = self.publisher.publish_status("connected").await;
            self.transition(LoopState::Streaming);

            match self.stream(session, &mut shutdown).await {
                StreamEnd::Shutdown => break,
                StreamEnd::Dropped(err) => {
                    self.transition(LoopState::Error);
                    self.stats.stream_drops += 1;
                    record_stream_drop();
                    warn!(
                        target: "sonic.acquisition",
                        endpoint = %endpoint,
                        reconnect_in_ms = self.config.reconnect_delay.as_millis() as u64,
                        error = %err,
                        "stream_dropped"
                    );
                    let _ = self.publisher.publish_status(&err.to_string()).await;
                    if !sleep_or_shutdown(self.config.reconnect_delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.transition(LoopState::Shutdown);
        info!(target: "sonic.acquisition", stats = ?self.stats, "acquisition_stopped");
        self.stats
    }

    /// 读取会话直到停机或读失败；两种情况都会先关闭会话。
    async fn stream(
        &mut self,
        mut session: Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        if !sleep_or_shutdown(self.config.settle_delay, shutdown).await {
            session.close().await;
            return StreamEnd::Shutdown;
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = wait_shutdown(shutdown) => None,
                record = session.next_record() => Some(record),
            };
            match next {
                None => {
                    session.close().await;
                    return StreamEnd::Shutdown;
                }
                Some(Ok(record)) => self.handle_record(record).await,
                Some(Err(err)) => {
                    session.close().await;
                    return StreamEnd::Dropped(err);
                }
            }
        }
    }

    async fn handle_record(&mut self, record: RawRecord) {
        self.stats.records += 1;
        record_record_received();
        if self.config.debug {
            info!(target: "sonic.acquisition", raw = %record.as_text(), "raw_record");
        }

        let sample = match self.decoder.decode(&record) {
            Ok(sample) => sample,
            Err(err) => {
                self.stats.decode_errors += 1;
                record_dropped_invalid();
                warn!(
                    target: "sonic.acquisition",
                    error = %err,
                    raw = %record.as_text(),
                    "record_dropped"
                );
                if err == DecodeError::Empty {
                    let _ = self.publisher.publish_status("NoData").await;
                }
                return;
            }
        };

        self.stats.samples += 1;
        record_sample_decoded();
        if self.config.debug {
            info!(
                target: "sonic.acquisition",
                u = sample.u,
                v = sample.v,
                w = sample.w,
                t = sample.t,
                status = ?sample.status,
                "sample_decoded"
            );
        }

        let report = self.publisher.publish(&sample).await;
        self.stats.metrics_published += report.published as u64;
        self.stats.publish_errors += report.errors.len() as u64;
    }

    fn transition(&self, next: LoopState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(target: "sonic.acquisition", from = %previous, to = %next, "state_transition");
        }
    }
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// 等待停机信号；发送端被丢弃同样视为停机。
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// 等待 `delay`；期间收到停机信号返回 false。
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = wait_shutdown(shutdown) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
