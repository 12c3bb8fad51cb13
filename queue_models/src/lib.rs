//! `queue_models` 队列实时通道公共模型库 crate。
//!
//! 本 crate 集中定义了排队叫号系统各个 Rust 组件（`realtime_ws_utils` 实时连接库、
//! `panel_monitor` 面板监视程序）之间共享的数据结构和枚举类型。
//!
//! 主要包含：
//! - **WebSocket 消息负载 (`ws_payloads`)**: 服务端推送的队列事件 (`QueueEvent`)，
//!   以判别字段 `type` 区分，业务数据位于 `payload` 字段。
//! - **通用枚举 (`enums`)**: 连接状态 (`ConnectionStatus`)、票号状态 (`TicketStatus`) 等。
//!
//! 所有模型都派生 `serde::Serialize` / `serde::Deserialize`，以便与前端（TypeScript 类型）
//! 及后端保持一致的 JSON 表示。

pub mod enums; // 通用枚举类型定义
pub mod ws_payloads; // WebSocket 通信中使用的消息负载

pub use enums::{ConnectionStatus, TicketStatus};
pub use ws_payloads::QueueEvent;
