// realtime_ws_utils/src/client/core.rs

//! 连接核心：持有唯一的底层套接字及其重连状态机。
//!
//! 状态迁移：
//!
//! ```text
//! disconnected --connect()--> connecting --open--> connected (重连计数清零)
//! connecting / connected --close--> reconnecting (仍有重连次数) | error (次数耗尽)
//! reconnecting --等待 base × growth^n--> connecting (等待前计数 +1)
//! 任意状态 --disconnect()--> disconnected (直到下一次 connect() 前不再自动重连)
//! ```
//!
//! 所有可变状态都在一把互斥锁内；使用方回调总是在释放锁之后才调用，
//! 因此回调内部可以安全地再次调用 `connect` / `disconnect` / `send_message`。

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use log::{debug, error, info, warn};
use queue_models::ConnectionStatus;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::transport::{Connector, SocketEvent, SocketHandle, TungsteniteConnector};
use crate::client::ManagedConnection;
use crate::config::ReconnectPolicy;
use crate::error::WsError;
use crate::lock::lock;
use crate::message::{CloseEvent, InboundFrame, OutboundPayload, ReceivedFrame};

pub type OpenCallback = Arc<dyn Fn() + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&InboundFrame) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(&CloseEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&WsError) + Send + Sync>;
pub type ReconnectCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// 连接生命周期回调。全部可选，未设置的回调视为空操作。
#[derive(Clone, Default)]
pub struct ConnectionCallbacks {
    pub on_open: Option<OpenCallback>,
    pub on_message: Option<MessageCallback>,
    pub on_close: Option<CloseCallback>,
    pub on_error: Option<ErrorCallback>,
    /// 每次重连尝试开始时调用，参数为本次尝试的序号（从 1 开始）。
    pub on_reconnect: Option<ReconnectCallback>,
}

impl ConnectionCallbacks {
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&InboundFrame) + Send + Sync + 'static) -> Self {
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

impl fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .finish()
    }
}

/// 连接配置，每个连接核心实例创建时给定。
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// 目标地址。`None` 或空字符串表示保持断开。
    pub url: Option<String>,
    pub policy: ReconnectPolicy,
    pub callbacks: ConnectionCallbacks,
}

impl ConnectionConfig {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_callbacks(mut self, callbacks: ConnectionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// 套接字事件接收端，由连接核心在打开套接字时交给 `Connector`。
///
/// 每个接收端绑定一个套接字代次；代次过期（套接字已被断开或替换）后发出的事件会被忽略。
/// 接收端只持有对核心的弱引用，核心被释放后 `emit` 为空操作。
#[derive(Clone)]
pub struct EventSink {
    core: Weak<CoreShared>,
    generation: u64,
}

impl EventSink {
    pub fn emit(&self, event: SocketEvent) {
        if let Some(core) = self.core.upgrade() {
            core.handle_socket_event(self.generation, event);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("generation", &self.generation).finish()
    }
}

/// 释放锁之后要发出的回调通知。
enum Notice {
    Open,
    Message(InboundFrame),
    Close(CloseEvent),
    Error(Arc<WsError>),
    Reconnect(u32),
}

struct CoreState {
    url: Option<String>,
    status: ConnectionStatus,
    attempts: u32,
    /// 当前套接字（或当前重连计时器）的代次。每次打开、关闭、断开都会递增。
    generation: u64,
    socket: Option<Arc<dyn SocketHandle>>,
    retry_timer: Option<JoinHandle<()>>,
    last_message: Option<ReceivedFrame>,
    last_error: Option<Arc<WsError>>,
}

struct CoreShared {
    id: Uuid,
    policy: ReconnectPolicy,
    callbacks: ConnectionCallbacks,
    connector: Arc<dyn Connector>,
    state: Mutex<CoreState>,
}

/// 连接核心。
///
/// 一个实例对应一条逻辑实时通道，至多持有一个活动套接字。
/// 实例被释放时会执行 `disconnect()`：关闭套接字并取消尚未触发的重连计时器。
///
/// 需要在 Tokio 运行时内使用（重连计时器和默认传输层都依赖 `tokio::spawn`）。
pub struct ConnectionCore {
    shared: Arc<CoreShared>,
}

fn usable_url(url: &Option<String>) -> Option<String> {
    url.as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

impl ConnectionCore {
    /// 使用默认的 `tokio-tungstenite` 传输层创建连接核心。创建后不会自动连接。
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector::default()))
    }

    /// 使用指定的套接字工厂创建连接核心。
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let id = Uuid::new_v4();
        info!(
            "[连接核心 {}] 创建实例，目标地址: {:?}，重连策略: {:?}",
            id, config.url, config.policy
        );
        let shared = Arc::new(CoreShared {
            id,
            policy: config.policy,
            callbacks: config.callbacks,
            connector,
            state: Mutex::new(CoreState {
                url: config.url,
                status: ConnectionStatus::Disconnected,
                attempts: 0,
                generation: 0,
                socket: None,
                retry_timer: None,
                last_message: None,
                last_error: None,
            }),
        });
        Self { shared }
    }

    /// 实例标识，用于日志关联。
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// 打开连接。已处于 `connecting` / `connected` 或未配置地址时为空操作。
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// 主动断开：关闭套接字、取消待触发的重连，状态变为 `disconnected`。幂等。
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// 仅当状态为 `connected` 时写出消息，返回是否已写出。从不 panic，也不返回错误。
    pub fn send_message(&self, payload: impl Into<OutboundPayload>) -> bool {
        match self.shared.try_send(payload.into()) {
            Ok(()) => true,
            Err(WsError::NotConnected) => {
                debug!("[连接核心 {}] 当前未连接，消息未发送。", self.shared.id);
                false
            }
            Err(e) => {
                warn!("[连接核心 {}] 消息发送失败: {}", self.shared.id, e);
                false
            }
        }
    }

    /// 与 `send_message` 相同，但以 `Result` 说明未发送的原因。
    pub fn try_send(&self, payload: impl Into<OutboundPayload>) -> Result<(), WsError> {
        self.shared.try_send(payload.into())
    }

    /// 替换目标地址。
    ///
    /// 新地址为 `None` / 空时断开连接；连接处于活动或重连中时，改用新地址重新连接；
    /// 其余情况只记录新地址，等待下一次 `connect()`。
    pub fn set_url(&self, url: Option<String>) {
        self.shared.set_url(url);
    }

    pub fn url(&self) -> Option<String> {
        lock(&self.shared.state).url.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.shared.state).status
    }

    pub fn attempt_count(&self) -> u32 {
        lock(&self.shared.state).attempts
    }

    pub fn last_message(&self) -> Option<ReceivedFrame> {
        lock(&self.shared.state).last_message.clone()
    }

    pub fn last_error(&self) -> Option<Arc<WsError>> {
        lock(&self.shared.state).last_error.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.status() == ConnectionStatus::Reconnecting
    }

    /// 重连次数已耗尽。与主动断开的 `disconnected` 状态区分。
    pub fn is_error(&self) -> bool {
        self.status() == ConnectionStatus::Error
    }

    /// 是否有尚未触发的重连计时器。
    pub fn has_pending_retry(&self) -> bool {
        lock(&self.shared.state)
            .retry_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }
}

impl Drop for ConnectionCore {
    fn drop(&mut self) {
        debug!("[连接核心 {}] 实例被释放，执行断开清理。", self.shared.id);
        self.shared.disconnect();
    }
}

impl fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("ConnectionCore")
            .field("id", &self.shared.id)
            .field("url", &state.url)
            .field("status", &state.status)
            .field("attempts", &state.attempts)
            .finish()
    }
}

impl ManagedConnection for ConnectionCore {
    fn connect(&self) {
        ConnectionCore::connect(self);
    }

    fn disconnect(&self) {
        ConnectionCore::disconnect(self);
    }

    fn send_message(&self, payload: OutboundPayload) -> bool {
        ConnectionCore::send_message(self, payload)
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionCore::status(self)
    }

    fn set_url(&self, url: Option<String>) {
        ConnectionCore::set_url(self, url);
    }
}

impl CoreShared {
    fn connect(self: &Arc<Self>) {
        let (url, generation) = {
            let mut state = lock(&self.state);
            if state.status.is_active() {
                debug!("[连接核心 {}] 已处于 {} 状态，忽略 connect()。", self.id, state.status);
                return;
            }
            let Some(url) = usable_url(&state.url) else {
                debug!("[连接核心 {}] 未配置目标地址，保持断开。", self.id);
                return;
            };
            if let Some(timer) = state.retry_timer.take() {
                timer.abort();
            }
            if matches!(state.status, ConnectionStatus::Disconnected | ConnectionStatus::Error) {
                state.attempts = 0;
            }
            state.generation += 1;
            state.status = ConnectionStatus::Connecting;
            (url, state.generation)
        };
        self.open_socket(url, generation);
    }

    /// 为给定代次打开套接字。调用前状态已被置为 `connecting`。
    fn open_socket(self: &Arc<Self>, url: String, generation: u64) {
        info!("[连接核心 {}] 正在连接 {} (代次 {})", self.id, url, generation);
        let sink = EventSink {
            core: Arc::downgrade(self),
            generation,
        };
        let handle: Arc<dyn SocketHandle> = Arc::from(self.connector.open(&url, sink));

        let mut state = lock(&self.state);
        if state.generation == generation && state.status.is_active() {
            state.socket = Some(handle);
        } else {
            // 打开期间已被断开或替换
            drop(state);
            debug!("[连接核心 {}] 代次 {} 已过期，立即关闭刚打开的套接字。", self.id, generation);
            handle.close();
        }
    }

    fn disconnect(&self) {
        let (socket, was_active) = {
            let mut state = lock(&self.state);
            if let Some(timer) = state.retry_timer.take() {
                timer.abort();
            }
            state.generation += 1;
            let was_active = state.status.is_active();
            let socket = state.socket.take();
            if state.status != ConnectionStatus::Disconnected {
                info!("[连接核心 {}] 主动断开 (原状态: {})", self.id, state.status);
            }
            state.status = ConnectionStatus::Disconnected;
            (socket, was_active)
        };
        if let Some(socket) = socket {
            socket.close();
        }
        if was_active {
            self.dispatch(vec![Notice::Close(CloseEvent::local())]);
        }
    }

    /// 写出时不持有状态锁：套接字可能在 `send_text` 内部同步上报事件。
    fn try_send(&self, payload: OutboundPayload) -> Result<(), WsError> {
        let socket = {
            let state = lock(&self.state);
            if state.status != ConnectionStatus::Connected {
                return Err(WsError::NotConnected);
            }
            state.socket.clone().ok_or(WsError::NotConnected)?
        };
        let text = payload.encode()?;
        debug!("[连接核心 {}] 发送消息: {}", self.id, text);
        socket.send_text(text)
    }

    fn set_url(self: &Arc<Self>, url: Option<String>) {
        let (changed, status) = {
            let mut state = lock(&self.state);
            let changed = state.url != url;
            state.url = url.clone();
            (changed, state.status)
        };
        if usable_url(&url).is_none() {
            info!("[连接核心 {}] 目标地址被清空，断开连接。", self.id);
            self.disconnect();
        } else if changed && (status.is_active() || status == ConnectionStatus::Reconnecting) {
            info!("[连接核心 {}] 目标地址变更为 {:?}，重新连接。", self.id, url);
            self.disconnect();
            self.connect();
        }
    }

    fn handle_socket_event(self: &Arc<Self>, generation: u64, event: SocketEvent) {
        let notices = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                debug!(
                    "[连接核心 {}] 忽略过期套接字 (代次 {}，当前 {}) 的事件: {:?}",
                    self.id, generation, state.generation, event
                );
                return;
            }
            match event {
                SocketEvent::Open => {
                    info!("[连接核心 {}] 连接已建立。", self.id);
                    state.status = ConnectionStatus::Connected;
                    state.attempts = 0;
                    vec![Notice::Open]
                }
                SocketEvent::Message(frame) => {
                    state.last_message = Some(ReceivedFrame {
                        frame: frame.clone(),
                        received_at: Utc::now(),
                    });
                    vec![Notice::Message(frame)]
                }
                SocketEvent::Error(err) => {
                    warn!("[连接核心 {}] 套接字错误: {}", self.id, err);
                    let err = Arc::new(err);
                    state.last_error = Some(err.clone());
                    vec![Notice::Error(err)]
                }
                SocketEvent::Close(close) => {
                    state.socket = None;
                    state.generation += 1;
                    if state.attempts < self.policy.max_attempts {
                        let delay = self.policy.delay_for_attempt(state.attempts);
                        state.attempts += 1;
                        state.status = ConnectionStatus::Reconnecting;
                        warn!(
                            "[连接核心 {}] 连接已关闭 ({:?})，{:?} 后进行第 {}/{} 次重连。",
                            self.id, close, delay, state.attempts, self.policy.max_attempts
                        );
                        let token = state.generation;
                        let timer = self.schedule_retry(delay, token);
                        state.retry_timer = Some(timer);
                    } else {
                        error!(
                            "[连接核心 {}] 连接已关闭 ({:?})，重连次数已耗尽 ({})，停止重连。",
                            self.id, close, self.policy.max_attempts
                        );
                        state.status = ConnectionStatus::Error;
                    }
                    vec![Notice::Close(close)]
                }
            }
        };
        self.dispatch(notices);
    }

    fn schedule_retry(self: &Arc<Self>, delay: std::time::Duration, token: u64) -> JoinHandle<()> {
        let core = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = core.upgrade() {
                core.fire_retry(token);
            }
        })
    }

    fn fire_retry(self: &Arc<Self>, token: u64) {
        let (url, generation, attempt) = {
            let mut state = lock(&self.state);
            if state.generation != token || state.status != ConnectionStatus::Reconnecting {
                debug!("[连接核心 {}] 重连计时器已失效，跳过。", self.id);
                return;
            }
            state.retry_timer = None;
            let Some(url) = usable_url(&state.url) else {
                state.status = ConnectionStatus::Disconnected;
                return;
            };
            state.generation += 1;
            state.status = ConnectionStatus::Connecting;
            (url, state.generation, state.attempts)
        };
        info!(
            "[连接核心 {}] 开始第 {}/{} 次重连尝试。",
            self.id, attempt, self.policy.max_attempts
        );
        // 先打开套接字再通知：回调 panic 时计时器任务随之终止，状态不能停留在没有套接字的 connecting
        self.open_socket(url, generation);
        self.dispatch(vec![Notice::Reconnect(attempt)]);
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        let callbacks = &self.callbacks;
        for notice in notices {
            match notice {
                Notice::Open => {
                    if let Some(cb) = &callbacks.on_open {
                        cb();
                    }
                }
                Notice::Message(frame) => {
                    if let Some(cb) = &callbacks.on_message {
                        cb(&frame);
                    }
                }
                Notice::Close(close) => {
                    if let Some(cb) = &callbacks.on_close {
                        cb(&close);
                    }
                }
                Notice::Error(err) => {
                    if let Some(cb) = &callbacks.on_error {
                        cb(&err);
                    }
                }
                Notice::Reconnect(attempt) => {
                    if let Some(cb) = &callbacks.on_reconnect {
                        cb(attempt);
                    }
                }
            }
        }
    }
}
