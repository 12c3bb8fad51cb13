// realtime_ws_utils/src/error.rs

//! 定义实时连接库相关的错误类型。

use thiserror::Error; // 引入 thiserror 来简化错误类型的定义

/// 实时连接库的统一错误类型。
///
/// 注意：连接生命周期中的错误（握手失败、连接中断等）不会从 `connect` / `disconnect` /
/// `send_message` 中返回，而是通过 `on_error` 回调交给使用方；
/// 只有生命周期之外的操作（构建 URL、解析配置、校验消息）才以 `Result` 形式返回此类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当 serde 反序列化失败时返回。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置等。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 当尝试向已关闭的发送通道写入时发生（套接字的后台任务已结束）。
    #[error("发送错误: 通道已关闭")]
    SendErrorClosed,

    /// 无效的 URL 格式或不受支持的协议。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 收到的消息不符合约定的格式（非对象、缺少判别字段或类型未知）。
    #[error("无效的消息: {0}")]
    InvalidMessage(String),

    /// 连接或握手超时。
    #[error("连接超时")]
    ConnectionTimeout,

    /// 未连接错误，当尝试在未建立连接时进行操作。
    #[error("未连接")]
    NotConnected,

    /// 通用消息错误，用于其他未明确分类的错误。
    #[error("消息错误: {0}")]
    Message(String),
}
