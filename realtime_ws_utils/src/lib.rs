//! `realtime_ws_utils` 为队列叫号等实时页面提供可复用的 WebSocket 连接管理。
//!
//! 主要模块包括：
//! - `client`: 连接核心、防护封装、渐进激活封装及传输层。
//! - `config`: 重连、激活与防护策略。
//! - `debounce`: 防抖器。
//! - `endpoint`: 实时通道地址的构造。
//! - `message`: 入站帧、出站负载与关闭事件，以及带判别字段消息的解码。
//! - `error`: 库中使用的错误类型 `WsError`。

pub mod client;
pub mod config;
pub mod debounce;
pub mod endpoint;
pub mod error;
mod lock;
pub mod message;

pub use client::core::{ConnectionCallbacks, ConnectionConfig, ConnectionCore};
pub use client::gradual::GradualSocket;
pub use client::protected::{ProtectedCallbacks, ProtectedConfig, ProtectedSocket};
pub use client::transport::{Connector, SocketEvent, SocketHandle, TungsteniteConnector};
pub use client::ManagedConnection;
pub use config::{ActivationPolicy, ProtectionPolicy, ReconnectPolicy};
pub use endpoint::{build_socket_url, EndpointParams};
pub use error::WsError;
pub use message::{CloseEvent, InboundFrame, OutboundPayload};
pub use queue_models::ConnectionStatus;
