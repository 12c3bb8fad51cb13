//! 单元测试用的内存套接字工厂。
//!
//! 测试通过 `MockSocket` 手动注入 open / message / error / close 事件，
//! 并检查连接核心写出的内容。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::client::core::EventSink;
use crate::client::transport::{Connector, SocketEvent, SocketHandle};
use crate::error::WsError;
use crate::message::{CloseEvent, InboundFrame};

/// 推进暂停的时钟，并让已唤醒的任务有机会运行。
pub(crate) async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub(crate) struct MockSocket {
    pub url: String,
    pub opened_at: Instant,
    events: EventSink,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl MockSocket {
    pub fn open(&self) {
        self.events.emit(SocketEvent::Open);
    }

    pub fn message(&self, text: &str) {
        self.events.emit(SocketEvent::Message(InboundFrame::Text(text.to_string())));
    }

    pub fn binary(&self, data: Vec<u8>) {
        self.events.emit(SocketEvent::Message(InboundFrame::Binary(data)));
    }

    pub fn error(&self, message: &str) {
        self.events.emit(SocketEvent::Error(WsError::Message(message.to_string())));
    }

    pub fn close_remote(&self, code: Option<u16>) {
        self.events.emit(SocketEvent::Close(CloseEvent::remote(code, "mock close")));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 之后的写入全部失败。
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

struct MockHandle(Arc<MockSocket>);

impl SocketHandle for MockHandle {
    fn send_text(&self, text: String) -> Result<(), WsError> {
        if self.0.failing.load(Ordering::SeqCst) {
            return Err(WsError::SendErrorClosed);
        }
        self.0.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    sockets: Arc<Mutex<Vec<Arc<MockSocket>>>>,
}

impl MockConnector {
    pub fn open_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    /// 第 `index` 个被打开的套接字（从 0 开始）。
    pub fn socket(&self, index: usize) -> Arc<MockSocket> {
        self.sockets.lock().unwrap()[index].clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, events: EventSink) -> Box<dyn SocketHandle> {
        let socket = Arc::new(MockSocket {
            url: url.to_string(),
            opened_at: Instant::now(),
            events,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            failing: AtomicBool::new(false),
        });
        self.sockets.lock().unwrap().push(socket.clone());
        Box::new(MockHandle(socket))
    }
}
