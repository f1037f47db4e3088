//! USB 串口实现
//!
//! 以 8N1、无流控打开设备，按配置的行结束符分帧。串口模式无登录步骤。

use crate::Connector;
use crate::error::ProtocolError;
use crate::session::{BoxedReader, BoxedWriter, Session};
use crate::types::{Framing, SerialConfig};
use async_trait::async_trait;
use tokio::io::BufReader;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::info;

/// 串口连接器
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Session, ProtocolError> {
        let port = tokio_serial::new(&self.config.device, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| ProtocolError::Connection(format!("{}: {}", self.config.device, e)))?;
        info!(
            target: "sonic.protocol",
            device = %self.config.device,
            baud_rate = self.config.baud_rate,
            "serial_port_opened"
        );

        let (read_half, write_half) = tokio::io::split(port);
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);
        Ok(Session::from_parts(
            self.config.device.clone(),
            BufReader::new(reader),
            Some(writer),
            Framing::new(self.config.line_terminator),
        ))
    }

    fn endpoint(&self) -> String {
        format!("serial://{}@{}", self.config.device, self.config.baud_rate)
    }
}
