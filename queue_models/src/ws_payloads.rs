// queue_models/src/ws_payloads.rs

//! 包含队列实时通道中使用的各种消息负载结构体定义。
//!
//! 服务端推送的每条消息都是一个 JSON 对象，判别字段 `type` 指明消息类型，
//! 业务数据放在 `payload` 字段中，例如：
//!
//! ```json
//! {"type":"ticket_called","payload":{"ticket_id":"...","code":"A012","counter":"3","called_at":"..."}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::TicketStatus;

/// 消息判别字段的名称。
pub const MESSAGE_TYPE_FIELD: &str = "type";
/// 消息业务数据字段的名称。
pub const MESSAGE_PAYLOAD_FIELD: &str = "payload";

pub const TICKET_CREATED_MESSAGE_TYPE: &str = "ticket_created";
pub const TICKET_CALLED_MESSAGE_TYPE: &str = "ticket_called";
pub const TICKET_UPDATED_MESSAGE_TYPE: &str = "ticket_updated";
pub const QUEUE_SNAPSHOT_MESSAGE_TYPE: &str = "queue_snapshot";
pub const PING_MESSAGE_TYPE: &str = "ping";
pub const PONG_MESSAGE_TYPE: &str = "pong";

/// 单张票号的数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TicketPayload {
    /// 票号的唯一标识符。
    pub ticket_id: Uuid,
    /// 展示给用户的号码，例如 "A012"。
    pub code: String,
    /// 所属服务类别（例如 "fisioterapia"）。
    pub service: String,
    /// 当前状态。
    pub status: TicketStatus,
    /// 取号时间 (UTC)。
    pub issued_at: DateTime<Utc>,
}

/// 叫号事件的数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TicketCalledPayload {
    pub ticket_id: Uuid,
    pub code: String,
    /// 被叫往的服务台 / 诊室。
    pub counter: String,
    pub called_at: DateTime<Utc>,
}

/// 队列全量快照，通常在连接建立后由服务端推送一次。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshotPayload {
    pub tickets: Vec<TicketPayload>,
}

/// 队列实时通道中服务端推送的全部已知消息。
///
/// 以 `type` 为判别字段、`payload` 为内容字段的带标签枚举。
/// 任何 `type` 不在此列出的消息都会在防护封装层被拒绝，不会继续向内传递。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum QueueEvent {
    TicketCreated(TicketPayload),
    TicketCalled(TicketCalledPayload),
    TicketUpdated(TicketPayload),
    QueueSnapshot(QueueSnapshotPayload),
    Ping,
    Pong,
}

impl QueueEvent {
    /// 返回此消息对应的判别字段取值。
    pub fn message_type(&self) -> &'static str {
        match self {
            QueueEvent::TicketCreated(_) => TICKET_CREATED_MESSAGE_TYPE,
            QueueEvent::TicketCalled(_) => TICKET_CALLED_MESSAGE_TYPE,
            QueueEvent::TicketUpdated(_) => TICKET_UPDATED_MESSAGE_TYPE,
            QueueEvent::QueueSnapshot(_) => QUEUE_SNAPSHOT_MESSAGE_TYPE,
            QueueEvent::Ping => PING_MESSAGE_TYPE,
            QueueEvent::Pong => PONG_MESSAGE_TYPE,
        }
    }
}
