// realtime_ws_utils/src/client/protected.rs

//! 防护封装：在连接核心之外加一层入站校验和回调隔离。
//!
//! - 入站消息必须是含字符串判别字段 `type` 的 JSON 对象，并能解码为使用方的消息类型 `M`，
//!   否则记录日志后丢弃，不会交给 `on_message`；
//! - 每个使用方回调都在 `catch_unwind` 边界内执行，回调 panic 只会被记录，不影响连接状态；
//! - 重连尝试通知经过防抖器，连接反复抖动时不会连续轰炸使用方。

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use queue_models::ConnectionStatus;
use serde::de::DeserializeOwned;

use crate::client::core::{ConnectionCallbacks, ConnectionConfig, ConnectionCore};
use crate::client::transport::{Connector, TungsteniteConnector};
use crate::client::ManagedConnection;
use crate::config::{ProtectionPolicy, ReconnectPolicy};
use crate::debounce::Debouncer;
use crate::error::WsError;
use crate::message::{decode_message, CloseEvent, OutboundPayload, ReceivedFrame};

/// 防护封装的使用方回调。与核心回调相同，只是 `on_message` 收到的是已校验的消息。
pub struct ProtectedCallbacks<M> {
    pub on_open: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_message: Option<Arc<dyn Fn(M) + Send + Sync>>,
    pub on_close: Option<Arc<dyn Fn(&CloseEvent) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&WsError) + Send + Sync>>,
    pub on_reconnect: Option<Arc<dyn Fn(u32) + Send + Sync>>,
}

impl<M> Default for ProtectedCallbacks<M> {
    fn default() -> Self {
        Self {
            on_open: None,
            on_message: None,
            on_close: None,
            on_error: None,
            on_reconnect: None,
        }
    }
}

impl<M> Clone for ProtectedCallbacks<M> {
    fn clone(&self) -> Self {
        Self {
            on_open: self.on_open.clone(),
            on_message: self.on_message.clone(),
            on_close: self.on_close.clone(),
            on_error: self.on_error.clone(),
            on_reconnect: self.on_reconnect.clone(),
        }
    }
}

impl<M> ProtectedCallbacks<M> {
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(M) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&WsError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_reconnect(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(f));
        self
    }
}

/// 防护封装的配置。
pub struct ProtectedConfig<M> {
    pub url: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub protection: ProtectionPolicy,
    pub callbacks: ProtectedCallbacks<M>,
}

impl<M> ProtectedConfig<M> {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            reconnect: ReconnectPolicy::default(),
            protection: ProtectionPolicy::default(),
            callbacks: ProtectedCallbacks::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_protection(mut self, protection: ProtectionPolicy) -> Self {
        self.protection = protection;
        self
    }

    pub fn with_callbacks(mut self, callbacks: ProtectedCallbacks<M>) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// 从 panic 负载中取出可读信息。
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<非字符串 panic 负载>".to_string()
    }
}

/// 在隔离边界内执行使用方回调。返回回调是否正常结束。
fn run_guarded(label: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                "[防护封装] 使用方回调 {} 发生 panic，已隔离: {}",
                label,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

/// 防护封装。
///
/// 状态机与连接核心完全一致，只提高健壮性。实例被释放时底层核心随之断开。
pub struct ProtectedSocket<M> {
    core: ConnectionCore,
    reconnect_notices: Arc<Debouncer<u32>>,
    dropped_messages: Arc<AtomicU64>,
    _message: PhantomData<fn() -> M>,
}

impl<M> ProtectedSocket<M>
where
    M: DeserializeOwned + Send + 'static,
{
    /// 使用默认的 `tokio-tungstenite` 传输层创建。
    pub fn new(config: ProtectedConfig<M>) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector::default()))
    }

    pub fn with_connector(config: ProtectedConfig<M>, connector: Arc<dyn Connector>) -> Self {
        let ProtectedConfig {
            url,
            reconnect,
            protection,
            callbacks,
        } = config;

        let consumer_on_reconnect = callbacks.on_reconnect.clone();
        let reconnect_notices = Arc::new(Debouncer::new(
            protection.reconnect_notice_debounce(),
            move |attempt: u32| {
                if let Some(cb) = &consumer_on_reconnect {
                    run_guarded("on_reconnect", || cb(attempt));
                }
            },
        ));
        let dropped_messages = Arc::new(AtomicU64::new(0));

        let mut core_callbacks = ConnectionCallbacks::default();
        if let Some(cb) = callbacks.on_open {
            core_callbacks = core_callbacks.on_open(move || {
                run_guarded("on_open", || cb());
            });
        }
        if let Some(cb) = callbacks.on_close {
            core_callbacks = core_callbacks.on_close(move |event| {
                run_guarded("on_close", || cb(event));
            });
        }
        if let Some(cb) = callbacks.on_error {
            core_callbacks = core_callbacks.on_error(move |err| {
                run_guarded("on_error", || cb(err));
            });
        }
        // 即使使用方没有提供 on_message，也照常校验并记录无效消息
        let consumer_on_message = callbacks.on_message;
        let dropped = dropped_messages.clone();
        core_callbacks = core_callbacks.on_message(move |frame| match decode_message::<M>(frame) {
            Ok(message) => {
                if let Some(cb) = &consumer_on_message {
                    run_guarded("on_message", || cb(message));
                }
            }
            Err(e) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[防护封装] 丢弃无效的入站消息: {}", e);
            }
        });
        let notices = reconnect_notices.clone();
        core_callbacks = core_callbacks.on_reconnect(move |attempt| {
            debug!("[防护封装] 第 {} 次重连尝试，通知已进入防抖窗口。", attempt);
            notices.call(attempt);
        });

        let core = ConnectionCore::with_connector(
            ConnectionConfig::new(url)
                .with_policy(reconnect)
                .with_callbacks(core_callbacks),
            connector,
        );

        Self {
            core,
            reconnect_notices,
            dropped_messages,
            _message: PhantomData,
        }
    }
}

impl<M> ProtectedSocket<M> {
    pub fn connect(&self) {
        self.core.connect();
    }

    /// 断开连接，并丢弃尚在防抖窗口内的重连通知。
    pub fn disconnect(&self) {
        self.core.disconnect();
        self.reconnect_notices.cancel();
    }

    pub fn send_message(&self, payload: impl Into<OutboundPayload>) -> bool {
        self.core.send_message(payload)
    }

    pub fn set_url(&self, url: Option<String>) {
        self.core.set_url(url);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.core.is_reconnecting()
    }

    pub fn is_error(&self) -> bool {
        self.core.is_error()
    }

    pub fn attempt_count(&self) -> u32 {
        self.core.attempt_count()
    }

    pub fn last_message(&self) -> Option<ReceivedFrame> {
        self.core.last_message()
    }

    pub fn last_error(&self) -> Option<Arc<WsError>> {
        self.core.last_error()
    }

    /// 因校验失败而被丢弃的入站消息数量。
    pub fn dropped_message_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn core(&self) -> &ConnectionCore {
        &self.core
    }
}

impl<M> fmt::Debug for ProtectedSocket<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedSocket")
            .field("core", &self.core)
            .field("dropped_messages", &self.dropped_message_count())
            .finish()
    }
}

impl<M> ManagedConnection for ProtectedSocket<M>
where
    M: Send + 'static,
{
    fn connect(&self) {
        ProtectedSocket::connect(self);
    }

    fn disconnect(&self) {
        ProtectedSocket::disconnect(self);
    }

    fn send_message(&self, payload: OutboundPayload) -> bool {
        ProtectedSocket::send_message(self, payload)
    }

    fn status(&self) -> ConnectionStatus {
        ProtectedSocket::status(self)
    }

    fn set_url(&self, url: Option<String>) {
        ProtectedSocket::set_url(self, url);
    }
}
