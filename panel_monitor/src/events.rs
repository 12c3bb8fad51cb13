//! 入站队列事件的处理。

use log::{debug, info};
use queue_models::QueueEvent;
use realtime_ws_utils::OutboundPayload;

use crate::error::AppError;

/// 记录一条队列事件，并返回需要回复给服务端的消息（如对 `ping` 回复 `pong`）。
pub fn handle_event(event: &QueueEvent) -> Result<Option<OutboundPayload>, AppError> {
    match event {
        QueueEvent::TicketCreated(ticket) => {
            info!(
                "[队列事件] 新票号 {} (服务: {}, 状态: {:?}, 取号时间: {})",
                ticket.code, ticket.service, ticket.status, ticket.issued_at
            );
        }
        QueueEvent::TicketCalled(called) => {
            info!(
                "[队列事件] 叫号 {} -> {} ({})",
                called.code, called.counter, called.called_at
            );
        }
        QueueEvent::TicketUpdated(ticket) => {
            info!("[队列事件] 票号 {} 状态更新为 {:?}", ticket.code, ticket.status);
        }
        QueueEvent::QueueSnapshot(snapshot) => {
            info!("[队列事件] 收到队列快照，共 {} 张票号。", snapshot.tickets.len());
        }
        QueueEvent::Ping => {
            debug!("[队列事件] 收到 ping，回复 pong。");
            return Ok(Some(OutboundPayload::json(&QueueEvent::Pong)?));
        }
        QueueEvent::Pong => {
            debug!("[队列事件] 收到 pong。");
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_models::ws_payloads::QueueSnapshotPayload;

    #[test]
    fn test_ping_is_answered_with_pong() {
        let reply = handle_event(&QueueEvent::Ping).unwrap().expect("ping 应当得到回复");
        assert_eq!(reply.encode().unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_other_events_need_no_reply() {
        assert!(handle_event(&QueueEvent::Pong).unwrap().is_none());
        let snapshot = QueueEvent::QueueSnapshot(QueueSnapshotPayload::default());
        assert!(handle_event(&snapshot).unwrap().is_none());
    }
}
