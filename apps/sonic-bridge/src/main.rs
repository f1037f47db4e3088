//! 超声风速仪采集桥接进程：连接设备、解码 U/V/W/T、发布到消息总线。

mod cli;
mod wiring;

use clap::Parser;
use cli::Cli;
use sonic_acquisition::AcquisitionLoop;
use sonic_config::AppConfig;
use sonic_protocol::RecordDecoder;
use sonic_telemetry::{init_tracing, metrics};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    // 环境变量打底，命令行覆盖
    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;
    init_tracing(config.debug);

    let connector = wiring::build_connector(&config)?;
    let (publisher, bus_task) = wiring::build_publisher(&config)?;
    info!(
        target: "sonic.bridge",
        endpoint = %connector.endpoint(),
        publisher = ?config.publisher,
        sensor = %config.sensor,
        record_format = ?config.record_format,
        "bridge_starting"
    );

    let acquisition = AcquisitionLoop::new(
        connector,
        RecordDecoder::new(config.record_format),
        publisher,
        wiring::build_retry(&config),
        wiring::acquisition_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!(target: "sonic.bridge", "shutdown_requested");
        let _ = shutdown_tx.send(true);
    });

    let stats = acquisition.run(shutdown_rx).await;
    if let Some(task) = bus_task {
        task.abort();
    }
    info!(
        target: "sonic.bridge",
        stats = ?stats,
        telemetry = ?metrics().snapshot(),
        "bridge_stopped"
    );
    Ok(())
}

/// 等待 SIGINT 或 SIGTERM。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "sonic.bridge", error = %err, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(target: "sonic.bridge", error = %err, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
