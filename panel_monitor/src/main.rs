use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn, LevelFilter};
use panel_monitor::config;
use panel_monitor::events::handle_event;
use queue_models::{ConnectionStatus, QueueEvent};
use realtime_ws_utils::{
    GradualSocket, ProtectedCallbacks, ProtectedConfig, ProtectedSocket, TungsteniteConnector,
};
use tokio::sync::mpsc;

/// 状态巡检的间隔
const STATUS_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志记录器，RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp_millis()
        .parse_default_env()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    let config_path = config::config_file_path();
    let app_config = config::load_or_create_config(&config_path)
        .with_context(|| format!("加载配置文件 {:?} 失败", config_path))?;
    let ws_config = app_config.websocket;
    let socket_url = ws_config.socket_url().context("构造实时通道地址失败")?;
    info!("[主程序] 应用配置已加载。实时通道地址: {}", socket_url);

    // 回调只负责把事件转交给主循环，回复等操作在主循环中完成
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<QueueEvent>();
    let callbacks = ProtectedCallbacks::<QueueEvent>::default()
        .on_open(|| info!("[主程序] 实时通道已连接。"))
        .on_close(|event| warn!("[主程序] 实时通道已关闭: {:?}", event))
        .on_error(|e| error!("[主程序] 实时通道错误: {}", e))
        .on_reconnect(|attempt| warn!("[主程序] 正在进行第 {} 次重连...", attempt))
        .on_message(move |event| {
            if event_tx.send(event).is_err() {
                warn!("[主程序] 主循环已退出，丢弃队列事件。");
            }
        });

    let protected = ProtectedSocket::with_connector(
        ProtectedConfig::new(Some(socket_url.to_string()))
            .with_reconnect(ws_config.reconnect.clone())
            .with_protection(ws_config.protection.clone())
            .with_callbacks(callbacks),
        Arc::new(TungsteniteConnector::new(ws_config.connect_timeout())),
    );
    let monitor = GradualSocket::new(protected, ws_config.activation.clone());

    // 监视器没有需要预先加载的首屏数据，启动完成即视为就绪
    monitor.mark_data_ready();
    info!("[主程序] 监视器已启动，按 Ctrl-C 退出。");

    let mut status_ticker = tokio::time::interval(STATUS_CHECK_INTERVAL);
    let mut last_status = ConnectionStatus::Disconnected;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("监听 Ctrl-C 信号失败")?;
                info!("[主程序] 收到退出信号，正在断开实时通道...");
                break;
            }
            Some(event) = event_rx.recv() => {
                match handle_event(&event) {
                    Ok(Some(reply)) => {
                        if !monitor.send_message(reply) {
                            warn!("[主程序] 回复 {} 失败，实时通道当前未连接。", event.message_type());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("[主程序] 处理队列事件 {} 失败: {}", event.message_type(), e),
                }
            }
            _ = status_ticker.tick() => {
                let status = monitor.status();
                if status != last_status {
                    info!("[主程序] 连接状态: {} -> {}", last_status, status);
                    last_status = status;
                }
                if status == ConnectionStatus::Error {
                    error!(
                        "[主程序] 重连次数已耗尽 (已丢弃无效消息 {} 条)，重新启用实时通道。",
                        monitor.inner().dropped_message_count()
                    );
                    monitor.enable_websocket();
                }
            }
        }
    }

    drop(monitor);
    info!("[主程序] 监视器已退出。");
    Ok(())
}
