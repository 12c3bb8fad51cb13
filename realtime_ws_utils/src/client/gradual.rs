// realtime_ws_utils/src/client/gradual.rs

//! 渐进激活封装：把连接推迟到 “延迟已过” 与 “数据已就绪” 两个条件都满足之后。
//!
//! 典型用法是页面先完成首屏数据加载，再建立实时通道，避免启动时的连接风暴。
//! 使用方也可以通过 `enable_websocket()` / `disable_websocket()` 手动覆盖闸门。

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info};
use queue_models::ConnectionStatus;
use tokio::task::JoinHandle;

use crate::client::ManagedConnection;
use crate::config::ActivationPolicy;
use crate::lock::lock;
use crate::message::OutboundPayload;

#[derive(Debug, Default)]
struct Gate {
    delay_elapsed: bool,
    data_ready: bool,
    /// 使用方的手动开关；`None` 表示交由闸门条件决定。
    manual_override: Option<bool>,
    /// 是否已对内层连接调用过 `connect()`。
    activated: bool,
}

impl Gate {
    fn should_activate(&self, policy: &ActivationPolicy) -> bool {
        if self.activated {
            return false;
        }
        match self.manual_override {
            Some(enabled) => enabled,
            None => self.delay_elapsed && (self.data_ready || !policy.require_data_ready),
        }
    }
}

struct GradualShared<C> {
    inner: C,
    policy: ActivationPolicy,
    gate: Mutex<Gate>,
    delay_timer: Mutex<Option<JoinHandle<()>>>,
}

impl<C: ManagedConnection> GradualShared<C> {
    /// 条件满足时激活内层连接。`connect()` 在释放闸门锁之后调用。
    fn evaluate(&self) {
        {
            let mut gate = lock(&self.gate);
            if !gate.should_activate(&self.policy) {
                return;
            }
            gate.activated = true;
        }
        info!("[渐进激活] 激活条件已满足，建立连接。");
        self.inner.connect();
    }

    fn on_delay_elapsed(&self) {
        debug!("[渐进激活] 启动延迟已结束。");
        lock(&self.gate).delay_elapsed = true;
        self.evaluate();
    }
}

/// 渐进激活封装。
///
/// 实例被释放时取消尚未触发的延迟计时器并断开内层连接。
pub struct GradualSocket<C: ManagedConnection> {
    shared: Arc<GradualShared<C>>,
}

impl<C: ManagedConnection> GradualSocket<C> {
    /// 包装一条尚未连接的连接。配置了延迟时需要在 Tokio 运行时内调用。
    pub fn new(inner: C, policy: ActivationPolicy) -> Self {
        let delay = policy.enable_after_delay();
        info!("[渐进激活] 创建实例，激活策略: {:?}", policy);
        let shared = Arc::new(GradualShared {
            inner,
            policy,
            gate: Mutex::new(Gate {
                delay_elapsed: delay.is_none(),
                ..Gate::default()
            }),
            delay_timer: Mutex::new(None),
        });

        match delay {
            Some(delay) => {
                let weak: Weak<GradualShared<C>> = Arc::downgrade(&shared);
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(shared) = weak.upgrade() {
                        shared.on_delay_elapsed();
                    }
                });
                *lock(&shared.delay_timer) = Some(timer);
            }
            None => shared.evaluate(),
        }

        Self { shared }
    }

    /// 标记首屏数据已就绪。一经标记不会撤销。
    pub fn mark_data_ready(&self) {
        {
            let mut gate = lock(&self.shared.gate);
            if gate.data_ready {
                return;
            }
            gate.data_ready = true;
        }
        debug!("[渐进激活] 数据已就绪。");
        self.shared.evaluate();
    }

    /// 无视闸门条件，立即启用连接。
    pub fn enable_websocket(&self) {
        {
            let mut gate = lock(&self.shared.gate);
            gate.manual_override = Some(true);
            gate.activated = false;
        }
        info!("[渐进激活] 使用方手动启用连接。");
        self.shared.evaluate();
    }

    /// 断开连接，并在再次 `enable_websocket()` 之前阻止自动激活。
    pub fn disable_websocket(&self) {
        {
            let mut gate = lock(&self.shared.gate);
            gate.manual_override = Some(false);
            gate.activated = false;
        }
        info!("[渐进激活] 使用方手动停用连接。");
        self.shared.inner.disconnect();
    }

    /// 与 `enable_websocket()` 相同。
    pub fn connect(&self) {
        self.enable_websocket();
    }

    /// 与 `disable_websocket()` 相同。
    pub fn disconnect(&self) {
        self.disable_websocket();
    }

    /// 替换内层连接的目标地址。
    ///
    /// 地址被清空时内层连接断开，闸门回到未激活；再次设置地址后按闸门条件重新激活。
    pub fn set_url(&self, url: Option<String>) {
        let cleared = url.as_deref().map_or(true, |u| u.trim().is_empty());
        self.shared.inner.set_url(url);
        if cleared {
            lock(&self.shared.gate).activated = false;
        } else {
            self.shared.evaluate();
        }
    }

    pub fn is_activated(&self) -> bool {
        lock(&self.shared.gate).activated
    }

    pub fn is_delay_elapsed(&self) -> bool {
        lock(&self.shared.gate).delay_elapsed
    }

    pub fn is_data_ready(&self) -> bool {
        lock(&self.shared.gate).data_ready
    }

    /// 使用方没有手动停用连接。
    pub fn is_enabled(&self) -> bool {
        lock(&self.shared.gate).manual_override != Some(false)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.inner.status()
    }

    pub fn send_message(&self, payload: impl Into<OutboundPayload>) -> bool {
        self.shared.inner.send_message(payload.into())
    }

    pub fn inner(&self) -> &C {
        &self.shared.inner
    }
}

impl<C: ManagedConnection> Drop for GradualSocket<C> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.shared.delay_timer).take() {
            timer.abort();
        }
        debug!("[渐进激活] 实例被释放，断开内层连接。");
        self.shared.inner.disconnect();
    }
}

impl<C: ManagedConnection + fmt::Debug> fmt::Debug for GradualSocket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = lock(&self.shared.gate);
        f.debug_struct("GradualSocket")
            .field("gate", &*gate)
            .field("policy", &self.shared.policy)
            .field("inner", &self.shared.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::core::{ConnectionConfig, ConnectionCore};
    use crate::client::mock::{settle, MockConnector};
    use std::time::Duration;

    fn gradual(connector: &MockConnector, policy: ActivationPolicy) -> GradualSocket<ConnectionCore> {
        let core = ConnectionCore::with_connector(
            ConnectionConfig::new(Some("ws://queue.local/ws".to_string())),
            Arc::new(connector.clone()),
        );
        GradualSocket::new(core, policy)
    }

    fn delayed_and_data_gated() -> ActivationPolicy {
        ActivationPolicy {
            enable_after_delay_ms: Some(1_000),
            require_data_ready: true,
        }
    }

    #[tokio::test(start_paused = true)]
    /// 先等到延迟结束，再标记数据就绪。
    async fn test_waits_for_delay_then_data() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, delayed_and_data_gated());
        assert_eq!(connector.open_count(), 0);

        settle(Duration::from_millis(1_001)).await;
        assert!(socket.is_delay_elapsed());
        assert_eq!(connector.open_count(), 0, "数据未就绪时不应连接");

        socket.mark_data_ready();
        assert_eq!(connector.open_count(), 1);
        assert!(socket.is_activated());
        assert_eq!(socket.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    /// 先标记数据就绪，再等到延迟结束。
    async fn test_waits_for_data_then_delay() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, delayed_and_data_gated());

        socket.mark_data_ready();
        assert!(socket.is_data_ready());
        assert_eq!(connector.open_count(), 0, "延迟未结束时不应连接");

        settle(Duration::from_millis(999)).await;
        assert_eq!(connector.open_count(), 0);

        settle(Duration::from_millis(2)).await;
        assert_eq!(connector.open_count(), 1);
        assert!(socket.is_activated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_requirements_connects_immediately() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, ActivationPolicy::default());
        assert_eq!(connector.open_count(), 1);
        assert!(socket.is_delay_elapsed());

        connector.socket(0).open();
        assert!(socket.send_message(serde_json::json!({"type": "ping"})));
        assert_eq!(connector.socket(0).sent(), vec![r#"{"type":"ping"}"#.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_enable_and_disable() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, delayed_and_data_gated());

        socket.enable_websocket();
        assert_eq!(connector.open_count(), 1, "手动启用应无视闸门条件");
        connector.socket(0).open();

        socket.disable_websocket();
        assert!(!socket.is_enabled());
        assert!(!socket.is_activated());
        assert_eq!(socket.status(), ConnectionStatus::Disconnected);
        assert!(connector.socket(0).is_closed());

        // 停用后闸门条件满足也不再自动激活
        socket.mark_data_ready();
        settle(Duration::from_millis(1_500)).await;
        assert_eq!(connector.open_count(), 1);

        socket.enable_websocket();
        assert!(socket.is_enabled());
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_disconnect_keep_gate_in_sync() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, delayed_and_data_gated());

        socket.connect();
        assert!(socket.is_activated());
        assert_eq!(connector.open_count(), 1);

        socket.disconnect();
        assert!(!socket.is_activated());
        assert!(!socket.is_enabled());
        assert_eq!(socket.status(), ConnectionStatus::Disconnected);

        socket.mark_data_ready();
        settle(Duration::from_millis(1_500)).await;
        assert_eq!(connector.open_count(), 1, "disconnect() 之后不应自动激活");
    }

    #[tokio::test(start_paused = true)]
    /// 清空地址后闸门回到未激活，重新设置地址即按闸门条件恢复连接。
    async fn test_set_url_clears_and_restores_activation() {
        let connector = MockConnector::default();
        let socket = gradual(&connector, ActivationPolicy::default());
        assert_eq!(connector.open_count(), 1);
        connector.socket(0).open();

        socket.set_url(None);
        assert!(!socket.is_activated());
        assert_eq!(socket.status(), ConnectionStatus::Disconnected);
        assert!(connector.socket(0).is_closed());

        socket.set_url(Some("ws://other.local/ws".to_string()));
        assert!(socket.is_activated());
        assert_eq!(connector.open_count(), 2);
        assert_eq!(connector.socket(1).url, "ws://other.local/ws");

        // 激活状态下更换地址由内层连接负责重连
        connector.socket(1).open();
        socket.set_url(Some("ws://third.local/ws".to_string()));
        assert_eq!(connector.open_count(), 3);
        assert_eq!(connector.socket(2).url, "ws://third.local/ws");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer_and_disconnects() {
        let connector = MockConnector::default();
        let socket = gradual(
            &connector,
            ActivationPolicy {
                enable_after_delay_ms: Some(500),
                require_data_ready: false,
            },
        );
        drop(socket);
        settle(Duration::from_secs(1)).await;
        assert_eq!(connector.open_count(), 0, "释放后延迟计时器不应再激活连接");

        let socket = gradual(&connector, ActivationPolicy::default());
        connector.socket(0).open();
        drop(socket);
        assert!(connector.socket(0).is_closed());
    }
}
