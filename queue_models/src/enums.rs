//! 通用枚举模块。
//!
//! 本模块定义了在实时连接库与其使用方之间共享的通用枚举类型。
//! 所有枚举都派生 `Serialize`, `Deserialize`, `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`，
//! 以支持数据交换、调试和比较。

use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket 逻辑通道的连接状态。
///
/// 状态只由底层套接字的生命周期事件以及连接核心自身的重连逻辑驱动，
/// 使用方无法直接设置。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// 未连接。初始状态，或调用 `disconnect()` 之后的终止状态。
    #[default]
    Disconnected,
    /// 正在建立连接（套接字已创建，尚未收到 open 事件）。
    Connecting,
    /// 连接已建立，可以发送消息。
    Connected,
    /// 连接意外断开，已安排下一次重连。
    Reconnecting,
    /// 重连次数已耗尽，不再自动重连。
    Error,
}

impl ConnectionStatus {
    /// 套接字是否处于打开或正在打开的状态（此时再次 `connect()` 为空操作）。
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        };
        f.write_str(text)
    }
}

/// 票号（排队号）在服务流程中的状态。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// 等待叫号
    Waiting,
    /// 已叫号，等待到达服务台
    Called,
    /// 正在服务
    InService,
    /// 服务完成
    Completed,
    /// 已取消 / 过号
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_default_is_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    /// 测试 `ConnectionStatus` 序列化为 snake_case 字符串，且与 `Display` 输出一致。
    fn test_connection_status_serialization_matches_display() {
        let all = [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Error,
        ];
        for status in all {
            let json = serde_json::to_string(&status).expect("ConnectionStatus 序列化失败");
            assert_eq!(json, format!("\"{}\"", status), "{:?} 的 JSON 与 Display 输出不一致", status);
            let back: ConnectionStatus = serde_json::from_str(&json).expect("ConnectionStatus 反序列化失败");
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_connection_status_is_active() {
        assert!(ConnectionStatus::Connecting.is_active());
        assert!(ConnectionStatus::Connected.is_active());
        assert!(!ConnectionStatus::Reconnecting.is_active());
        assert!(!ConnectionStatus::Disconnected.is_active());
        assert!(!ConnectionStatus::Error.is_active());
    }

    #[test]
    fn test_ticket_status_snake_case() {
        assert_eq!(serde_json::to_string(&TicketStatus::InService).unwrap(), "\"in_service\"");
        let parsed: TicketStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, TicketStatus::Cancelled);
    }
}
