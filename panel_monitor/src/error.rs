use realtime_ws_utils::WsError;
use thiserror::Error;

/// 监视器的主要错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("配置文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("实时通道错误: {0}")]
    WebSocket(#[from] WsError),
}
