//! 命令行参数：覆盖环境变量中的同名配置。

use clap::Parser;
use domain::RecordFormat;
use sonic_config::{AppConfig, ConnectionType, LineTerminator, PublisherKind};

/// 超声风速仪采集桥接：读取 U/V/W/T 并发布到消息总线。
#[derive(Debug, Parser)]
#[command(name = "sonic-bridge", version, about)]
pub struct Cli {
    /// 连接方式：tcp 或 usb
    #[arg(long = "connection_type")]
    pub connection_type: Option<ConnectionType>,

    /// 设备 IP（tcp 模式必填）
    #[arg(long)]
    pub ip: Option<String>,

    /// 设备数据端口
    #[arg(long)]
    pub port: Option<u16>,

    /// 串口设备路径（usb 模式必填）
    #[arg(long)]
    pub device: Option<String>,

    /// 串口波特率
    #[arg(long = "baud_rate")]
    pub baud_rate: Option<u32>,

    /// 登录用户名
    #[arg(long)]
    pub username: Option<String>,

    /// 登录密码
    #[arg(long)]
    pub password: Option<String>,

    /// 输出每条原始记录与解码样本
    #[arg(long)]
    pub debug: bool,

    /// 行结束符：lf 或 cr
    #[arg(long = "line_terminator")]
    pub line_terminator: Option<LineTerminator>,

    /// 记录格式：auto、labeled 或 delimited
    #[arg(long = "record_format")]
    pub record_format: Option<RecordFormat>,

    /// 发布目标：mqtt 或 log
    #[arg(long)]
    pub publisher: Option<PublisherKind>,

    /// 传感器名称（写入指标元数据）
    #[arg(long)]
    pub sensor: Option<String>,
}

impl Cli {
    /// 把显式给出的参数覆盖到配置上。
    pub fn apply(self, config: &mut AppConfig) {
        if let Some(connection_type) = self.connection_type {
            config.connection_type = Some(connection_type);
        }
        if let Some(ip) = self.ip {
            config.ip = Some(ip);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(device) = self.device {
            config.device = Some(device);
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        config.debug |= self.debug;
        if let Some(line_terminator) = self.line_terminator {
            config.line_terminator = line_terminator;
        }
        if let Some(record_format) = self.record_format {
            config.record_format = record_format;
        }
        if let Some(publisher) = self.publisher {
            config.publisher = publisher;
        }
        if let Some(sensor) = self.sensor {
            config.sensor = sensor;
        }
    }
}
