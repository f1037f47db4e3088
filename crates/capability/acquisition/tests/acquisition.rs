use async_trait::async_trait;
use domain::{MetricValue, SensorMeta};
use sonic_acquisition::{AcquisitionConfig, AcquisitionLoop, FixedDelay, LoopState, LoopStats};
use sonic_protocol::{
    Connector, Framing, ProtocolError, RecordDecoder, Session, TcpConfig, TcpConnector,
};
use sonic_publish::{MemoryPublisher, SamplePublisher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

enum Step {
    Fail(&'static str),
    Auth(&'static str),
    /// 输出这些行后断开
    Lines(Vec<&'static str>),
}

/// 按脚本返回连接结果；脚本用完后返回一个永远不出数据的会话。
struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    idle: Mutex<Vec<DuplexStream>>,
}

impl ScriptedConnector {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            idle: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Session, ProtocolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let (client, mut device) = tokio::io::duplex(4096);
        match step {
            Some(Step::Fail(reason)) => Err(ProtocolError::Connection(reason.to_string())),
            Some(Step::Auth(reason)) => Err(ProtocolError::Auth(reason.to_string())),
            Some(Step::Lines(lines)) => {
                for line in lines {
                    device.write_all(line.as_bytes()).await?;
                    device.write_all(b"\r\n").await?;
                }
                drop(device);
                Ok(Session::from_reader("scripted", client, Framing::default()))
            }
            None => {
                self.idle.lock().unwrap().push(device);
                Ok(Session::from_reader("scripted-idle", client, Framing::default()))
            }
        }
    }

    fn endpoint(&self) -> String {
        "scripted://device".to_string()
    }
}

struct Harness {
    memory: Arc<MemoryPublisher>,
    state: watch::Receiver<LoopState>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<LoopStats>,
}

impl Harness {
    async fn stop(self) -> LoopStats {
        self.shutdown.send(true).expect("shutdown");
        tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("loop stops promptly")
            .expect("join")
    }
}

fn config() -> AcquisitionConfig {
    AcquisitionConfig {
        reconnect_delay: Duration::from_millis(10),
        settle_delay: Duration::ZERO,
        debug: true,
    }
}

fn start(connector: Arc<dyn Connector>, retry_delay: Duration, memory: Arc<MemoryPublisher>) -> Harness {
    let publisher = SamplePublisher::new(memory.clone(), SensorMeta::default());
    let acquisition = AcquisitionLoop::new(
        connector,
        RecordDecoder::default(),
        publisher,
        Box::new(FixedDelay::new(retry_delay)),
        config(),
    );
    let state = acquisition.subscribe_state();
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(acquisition.run(rx));
    Harness {
        memory,
        state,
        shutdown,
        handle,
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn statuses(memory: &MemoryPublisher) -> Vec<String> {
    memory
        .published()
        .into_iter()
        .filter(|metric| metric.name == "status")
        .map(|metric| metric.value.to_string())
        .collect()
}

#[tokio::test]
async fn transient_failures_retry_without_losing_samples() {
    let connector = ScriptedConnector::new(vec![
        Step::Fail("refused"),
        Step::Fail("refused"),
        Step::Auth("access denied"),
        Step::Lines(vec![
            "U=+01.23 V=-00.45 W=+00.02 T=+21.34",
            "U=+01.30 V=-00.40 W=+00.01 T=+21.35",
        ]),
    ]);
    let harness = start(
        connector.clone(),
        Duration::from_millis(5),
        Arc::new(MemoryPublisher::new()),
    );

    // 第 5 次连接拿到空闲会话，说明断流后已经重新连上
    wait_until("idle session", || connector.calls() == 5).await;
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.retries, 3);
    assert_eq!(stats.connect_attempts, 5);
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.stream_drops, 1);
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.metrics_published, 8);
    for name in ["wind.u", "wind.v", "wind.w", "temperature.sonic"] {
        assert_eq!(memory.count(name), 2, "{}", name);
    }

    let statuses = statuses(&memory);
    assert_eq!(statuses[0], "connection error: refused");
    assert_eq!(statuses[2], "authentication rejected: access denied");
    assert_eq!(statuses[3], "connected");
}

#[tokio::test]
async fn malformed_record_is_dropped_and_stream_continues() {
    let connector = ScriptedConnector::new(vec![Step::Lines(vec![
        "U=+01.00 V=+02.00 W=+03.00 T=+20.00",
        "U=ERR V=+02.00 W=+03.00 T=+20.00",
        "U=+01.00 V=+02.00 W=+03.00",
        "U=+05.00 V=+06.00 W=+07.00 T=+21.00",
    ])]);
    let harness = start(
        connector.clone(),
        Duration::from_millis(5),
        Arc::new(MemoryPublisher::new()),
    );

    wait_until("reconnect", || connector.calls() == 2).await;
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.records, 4);
    assert_eq!(stats.decode_errors, 2);
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.metrics_published, 8);
    let temperatures: Vec<MetricValue> = memory
        .published()
        .into_iter()
        .filter(|metric| metric.name == "temperature.sonic")
        .map(|metric| metric.value)
        .collect();
    assert_eq!(
        temperatures,
        vec![MetricValue::F64(20.0), MetricValue::F64(21.0)]
    );
}

#[tokio::test]
async fn blank_record_reports_no_data() {
    let connector = ScriptedConnector::new(vec![Step::Lines(vec![
        "   ",
        "0100;-0.001;-0.036;0.012;23.602;0.036",
    ])]);
    let harness = start(
        connector.clone(),
        Duration::from_millis(5),
        Arc::new(MemoryPublisher::new()),
    );

    wait_until("reconnect", || connector.calls() == 2).await;
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.decode_errors, 1);
    assert_eq!(stats.samples, 1);
    assert!(statuses(&memory).contains(&"NoData".to_string()));
    assert_eq!(memory.count("wind.w"), 1);
}

#[tokio::test]
async fn publish_failures_do_not_stop_the_loop() {
    let memory = Arc::new(MemoryPublisher::new());
    memory.fail_metric("wind.v");
    let connector = ScriptedConnector::new(vec![Step::Lines(vec![
        "U=1 V=2 W=3 T=4",
        "U=5 V=6 W=7 T=8",
    ])]);
    let harness = start(connector.clone(), Duration::from_millis(5), memory);

    wait_until("reconnect", || {
        connector.calls() == 2 && *harness.state.borrow() == LoopState::Streaming
    })
    .await;
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.samples, 2);
    assert_eq!(stats.metrics_published, 6);
    assert_eq!(stats.publish_errors, 2);
    assert_eq!(memory.count("wind.v"), 0);
    assert_eq!(memory.count("temperature.sonic"), 2);
}

/// 设备总是拒绝凭据，统计被接受的连接数。
async fn spawn_rejecting_device() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                let _ = write_half.write_all(b"username:").await;
                let _ = lines.next_line().await;
                let _ = write_half.write_all(b"password:").await;
                let _ = lines.next_line().await;
                let _ = write_half.write_all(b"access denied").await;
                let _ = lines.next_line().await;
            });
        }
    });
    (port, accepted)
}

#[tokio::test]
async fn rejected_credentials_keep_retrying() {
    let (port, accepted) = spawn_rejecting_device().await;
    let connector = Arc::new(TcpConnector::new(TcpConfig {
        host: "127.0.0.1".to_string(),
        port,
        username: "data".to_string(),
        password: "wrong".to_string(),
        connect_timeout_ms: 1_000,
        handshake_timeout_ms: 1_000,
        ack_marker: "success".to_string(),
        line_terminator: b'\n',
    }));
    let harness = start(
        connector,
        Duration::from_millis(10),
        Arc::new(MemoryPublisher::new()),
    );

    wait_until("three login attempts", || accepted.load(Ordering::SeqCst) >= 3).await;
    assert!(!harness.handle.is_finished());
    assert_eq!(*harness.state.borrow(), LoopState::Connecting);
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.sessions, 0);
    assert!(stats.retries >= 2);
    assert_eq!(memory.count("wind.u"), 0);
    assert!(
        statuses(&memory)
            .iter()
            .all(|status| status == "authentication rejected: access denied")
    );
}

#[tokio::test]
async fn shutdown_interrupts_long_retry_delay() {
    let connector = ScriptedConnector::new(vec![Step::Fail("unreachable")]);
    let harness = start(
        connector.clone(),
        Duration::from_secs(3600),
        Arc::new(MemoryPublisher::new()),
    );

    wait_until("first attempt", || connector.calls() == 1).await;
    let mut state = harness.state.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.connect_attempts, 1);
    assert_eq!(stats.retries, 1);
    assert_eq!(*state.borrow_and_update(), LoopState::Shutdown);
}

#[tokio::test]
async fn shutdown_while_streaming_closes_session() {
    let connector = ScriptedConnector::new(Vec::new());
    let harness = start(
        connector.clone(),
        Duration::from_millis(5),
        Arc::new(MemoryPublisher::new()),
    );

    let mut state = harness.state.clone();
    state
        .wait_for(|state| *state == LoopState::Streaming)
        .await
        .expect("streaming");
    let memory = harness.memory.clone();
    let stats = harness.stop().await;

    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.stream_drops, 0);
    assert_eq!(statuses(&memory), vec!["connected".to_string()]);
}
