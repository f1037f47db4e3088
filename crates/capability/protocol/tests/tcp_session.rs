use sonic_protocol::{Connector, ProtocolError, RecordDecoder, TcpConfig, TcpConnector};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

const RECORD: &[u8] =
    b"010000320000000000000000000000;-0.001;-0.036;0.012;23.602;0.036;1.525;0.036;1.525\r\n";

fn config(port: u16, password: &str) -> TcpConfig {
    TcpConfig {
        host: "127.0.0.1".to_string(),
        port,
        username: "data".to_string(),
        password: password.to_string(),
        connect_timeout_ms: 2_000,
        handshake_timeout_ms: 2_000,
        ack_marker: "success".to_string(),
        line_terminator: b'\n',
    }
}

/// 模拟设备：校验凭据后持续输出记录。
async fn spawn_device(records: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"username:").await.expect("prompt");
        let username = lines.next_line().await.expect("read").unwrap_or_default();
        write_half.write_all(b"password:").await.expect("prompt");
        let password = lines.next_line().await.expect("read").unwrap_or_default();

        if username.trim() != "data" || password.trim() != "METEKGMBH" {
            write_half.write_all(b"authentication failed").await.expect("nack");
            return;
        }
        // 应答与记录放在同一次写入里
        let mut burst = b"authentication successful\r\n".to_vec();
        for _ in 0..records {
            burst.extend_from_slice(RECORD);
        }
        write_half.write_all(&burst).await.expect("ack and records");
    });
    port
}

#[tokio::test]
async fn tcp_login_then_stream_records() {
    let port = spawn_device(3).await;
    let connector = TcpConnector::new(config(port, "METEKGMBH"));
    let mut session = connector.connect().await.expect("connect");
    let decoder = RecordDecoder::default();

    for _ in 0..3 {
        let record = session.next_record().await.expect("record");
        let sample = decoder.decode(&record).expect("decode");
        assert_eq!((sample.u, sample.v, sample.w, sample.t), (-0.001, -0.036, 0.012, 23.602));
    }
    assert!(matches!(
        session.next_record().await,
        Err(ProtocolError::Closed)
    ));
    session.close().await;
}

#[tokio::test]
async fn tcp_wrong_credentials_is_auth_error() {
    let port = spawn_device(1).await;
    let connector = TcpConnector::new(config(port, "wrong"));
    let err = connector.connect().await.expect_err("rejected");
    assert!(err.is_auth(), "unexpected error: {}", err);
}

#[tokio::test]
async fn tcp_unreachable_endpoint_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let connector = TcpConnector::new(config(port, "METEKGMBH"));
    let err = connector.connect().await.expect_err("refused");
    assert!(matches!(err, ProtocolError::Connection(_)), "unexpected error: {}", err);
}
