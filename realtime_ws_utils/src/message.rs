// realtime_ws_utils/src/message.rs

//! 定义实时通道中流动的帧与消息结构。
//!
//! - `InboundFrame`: 连接核心从套接字收到的原始帧，按原样交给使用方，核心层不做 JSON 解码。
//! - `OutboundPayload`: 待发送的数据。字符串原样发送，JSON 值序列化为其规范文本形式。
//! - `CloseEvent`: 连接关闭事件的描述。
//! - `decode_message`: 防护封装层使用的入站校验，把文本帧一次性解码为带标签的消息枚举。

use chrono::{DateTime, Utc};
use queue_models::ws_payloads::MESSAGE_TYPE_FIELD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::WsError;

/// 从套接字收到的一帧数据（控制帧已由传输层过滤）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// 文本帧，通常承载 JSON 对象。
    Text(String),
    /// 二进制帧。队列协议不使用二进制帧，但核心层仍按原样转交。
    Binary(Vec<u8>),
}

impl InboundFrame {
    /// 若为文本帧，返回其内容。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InboundFrame::Text(text) => Some(text),
            InboundFrame::Binary(_) => None,
        }
    }
}

/// 最近一次收到的帧及其接收时间，供使用方查看。
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub frame: InboundFrame,
    pub received_at: DateTime<Utc>,
}

/// 待发送的数据。
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    /// 原样发送的文本。
    Text(String),
    /// 以 `serde_json` 序列化后发送的 JSON 值。
    Json(Value),
}

impl OutboundPayload {
    /// 将任意可序列化的数据直接序列化为 JSON 文本，字段保持声明顺序。
    pub fn json<T: Serialize>(data: &T) -> Result<Self, WsError> {
        serde_json::to_string(data)
            .map(OutboundPayload::Text)
            .map_err(|e| WsError::SerializationError(format!("载荷序列化为JSON失败: {}", e)))
    }

    /// 编码为要写入套接字的文本。
    pub fn encode(&self) -> Result<String, WsError> {
        match self {
            OutboundPayload::Text(text) => Ok(text.clone()),
            OutboundPayload::Json(value) => serde_json::to_string(value)
                .map_err(|e| WsError::SerializationError(format!("载荷序列化为JSON失败: {}", e))),
        }
    }
}

impl From<&str> for OutboundPayload {
    fn from(text: &str) -> Self {
        OutboundPayload::Text(text.to_string())
    }
}

impl From<String> for OutboundPayload {
    fn from(text: String) -> Self {
        OutboundPayload::Text(text)
    }
}

impl From<Value> for OutboundPayload {
    fn from(value: Value) -> Self {
        OutboundPayload::Json(value)
    }
}

/// 正常关闭 (RFC 6455 1000)。
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// 连接关闭事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// 关闭码。连接在握手阶段失败或底层流异常结束时没有关闭码。
    pub code: Option<u16>,
    /// 关闭原因。
    pub reason: String,
    /// 是否由本端 `disconnect()` 主动关闭。主动关闭不会触发重连。
    pub initiated_locally: bool,
}

impl CloseEvent {
    /// 本端主动断开时产生的关闭事件。
    pub fn local() -> Self {
        Self {
            code: Some(CLOSE_CODE_NORMAL),
            reason: "客户端主动断开".to_string(),
            initiated_locally: true,
        }
    }

    /// 对端关闭或网络中断时产生的关闭事件。
    pub fn remote(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            initiated_locally: false,
        }
    }
}

/// 将入站帧解码为带标签的消息类型 `M`。
///
/// 校验顺序：
/// 1. 必须是文本帧；
/// 2. 文本必须是合法 JSON；
/// 3. JSON 必须是对象，且包含字符串类型的判别字段 `type`；
/// 4. 对象必须能反序列化为 `M`（即 `type` 是 `M` 认识的标签，且内容结构匹配）。
pub fn decode_message<M: DeserializeOwned>(frame: &InboundFrame) -> Result<M, WsError> {
    let text = frame
        .as_text()
        .ok_or_else(|| WsError::InvalidMessage("收到了非预期的二进制帧".to_string()))?;

    let value: Value = serde_json::from_str(text).map_err(|e| {
        WsError::DeserializationError(format!("文本帧不是合法的 JSON: {}, 原始文本: '{}'", e, text))
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| WsError::InvalidMessage(format!("消息不是 JSON 对象: '{}'", text)))?;

    let message_type = object
        .get(MESSAGE_TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            WsError::InvalidMessage(format!("消息缺少字符串类型的判别字段 '{}': '{}'", MESSAGE_TYPE_FIELD, text))
        })?
        .to_string();

    serde_json::from_value::<M>(value).map_err(|e| {
        WsError::InvalidMessage(format!("未知或格式错误的消息类型 '{}': {}", message_type, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_models::QueueEvent;
    use serde_json::json;

    #[test]
    fn test_text_payload_passes_through_unchanged() {
        let payload = OutboundPayload::from("  not json {  ");
        assert_eq!(payload.encode().unwrap(), "  not json {  ");
    }

    #[test]
    fn test_json_payload_is_compact() {
        let payload = OutboundPayload::from(json!({"type": "ping"}));
        assert_eq!(payload.encode().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_json_from_serializable_struct() {
        #[derive(Serialize)]
        struct Subscribe<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
            room: u32,
        }
        let payload = OutboundPayload::json(&Subscribe { kind: "subscribe", room: 4 }).unwrap();
        assert_eq!(payload.encode().unwrap(), r#"{"type":"subscribe","room":4}"#);
    }

    #[test]
    /// 出站对象按字段的书写顺序写出，判别字段保持在最前。
    fn test_outbound_keys_keep_insertion_order() {
        let value = OutboundPayload::from(json!({"type": "ticket_called", "payload": {"code": "A012", "counter": "3"}, "ack": true}));
        assert_eq!(
            value.encode().unwrap(),
            r#"{"type":"ticket_called","payload":{"code":"A012","counter":"3"},"ack":true}"#
        );

        let event = OutboundPayload::json(&QueueEvent::TicketCalled(queue_models::ws_payloads::TicketCalledPayload {
            ticket_id: uuid::Uuid::nil(),
            code: "A012".to_string(),
            counter: "3".to_string(),
            called_at: chrono::DateTime::UNIX_EPOCH,
        }))
        .unwrap();
        let text = event.encode().unwrap();
        assert!(text.starts_with(r#"{"type":"ticket_called","payload":{"ticket_id":"#), "实际输出: {}", text);
    }

    #[test]
    fn test_decode_rejects_missing_discriminator() {
        let frame = InboundFrame::Text(r#"{"payload":{"code":"A1"}}"#.to_string());
        let err = decode_message::<QueueEvent>(&frame).unwrap_err();
        assert!(matches!(err, WsError::InvalidMessage(_)), "实际错误: {:?}", err);
    }

    #[test]
    fn test_decode_rejects_non_objects_and_binary() {
        let array = InboundFrame::Text("[1,2,3]".to_string());
        assert!(matches!(decode_message::<QueueEvent>(&array), Err(WsError::InvalidMessage(_))));

        let garbage = InboundFrame::Text("{oops".to_string());
        assert!(matches!(decode_message::<QueueEvent>(&garbage), Err(WsError::DeserializationError(_))));

        let binary = InboundFrame::Binary(vec![0, 1, 2]);
        assert!(matches!(decode_message::<QueueEvent>(&binary), Err(WsError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let frame = InboundFrame::Text(r#"{"type":"teleport"}"#.to_string());
        match decode_message::<QueueEvent>(&frame) {
            Err(WsError::InvalidMessage(details)) => assert!(details.contains("teleport")),
            other => panic!("预期 InvalidMessage，实际为 {:?}", other),
        }
    }

    #[test]
    fn test_decode_accepts_known_tag() {
        let frame = InboundFrame::Text(r#"{"type":"pong"}"#.to_string());
        assert_eq!(decode_message::<QueueEvent>(&frame).unwrap(), QueueEvent::Pong);
    }
}
