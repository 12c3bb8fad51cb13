// realtime_ws_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 本模块及其子模块共同构成了实时通道的连接管理：
//! - `transport`: 套接字抽象 (`Connector` / `SocketHandle`) 与基于 `tokio-tungstenite` 的默认实现；
//! - `core`: 连接核心，持有唯一的套接字及重连状态机；
//! - `protected`: 防护封装，校验入站消息并隔离使用方回调中的 panic；
//! - `gradual`: 渐进激活封装，满足延迟 / 数据就绪条件后才真正建立连接。

pub mod core;
pub mod gradual;
pub mod protected;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

use queue_models::ConnectionStatus;

use crate::message::OutboundPayload;

/// 可被上层封装（如渐进激活）驱动的连接。
///
/// 连接核心与防护封装都实现了此 trait。
pub trait ManagedConnection: Send + Sync + 'static {
    fn connect(&self);
    fn disconnect(&self);
    fn send_message(&self, payload: OutboundPayload) -> bool;
    fn status(&self) -> ConnectionStatus;
    fn set_url(&self, url: Option<String>);
}
