// realtime_ws_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层。
//!
//! 连接核心不直接依赖任何具体的套接字库，而是通过本模块定义的两个 trait 与套接字交互：
//! - `Connector`: 打开一个新的套接字，并把该套接字的生命周期事件写入给定的 `EventSink`；
//! - `SocketHandle`: 已打开套接字的句柄，用于发送文本和主动关闭。
//!
//! 默认实现 `TungsteniteConnector` 基于 `tokio-tungstenite`：每个套接字由一个后台 Tokio 任务驱动，
//! 该任务负责握手、按顺序转交入站帧、写出出站消息，并在连接结束时发出关闭事件。

use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream}, // 用于将 WebSocket 流拆分为发送端和接收端
    SinkExt,   // 为 SplitSink 提供 send() / close()
    StreamExt, // 为 SplitStream 提供 next()
};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::frame::coding::CloseCode,
    tungstenite::protocol::{CloseFrame, Message},
    tungstenite::Error as TungsteniteError,
    WebSocketStream,
};
use url::Url;

use crate::client::core::EventSink;
use crate::error::WsError;
use crate::message::{CloseEvent, InboundFrame};

/// 握手的默认超时时间。
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `ClientWsStream` 类型别名，代表一个可能经过 TLS 加密的 TCP WebSocket 流。
pub type ClientWsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// 套接字向连接核心报告的生命周期事件。
#[derive(Debug)]
pub enum SocketEvent {
    /// 握手完成，连接已打开。
    Open,
    /// 收到一帧业务数据（文本或二进制）。
    Message(InboundFrame),
    /// 发生错误。错误本身不代表连接已关闭，关闭总是由随后的 `Close` 事件表示。
    Error(WsError),
    /// 连接已关闭（包括握手失败）。
    Close(CloseEvent),
}

/// 已打开套接字的句柄。
pub trait SocketHandle: Send + Sync {
    /// 写出一条文本消息。
    fn send_text(&self, text: String) -> Result<(), WsError>;

    /// 主动关闭套接字。调用后该套接字不应再产生需要处理的事件（连接核心会忽略它们）。
    fn close(&self);
}

/// 套接字工厂。
pub trait Connector: Send + Sync + 'static {
    /// 打开一个指向 `url` 的套接字。
    ///
    /// 此方法不得阻塞：握手应在后台进行，结果通过 `events` 异步报告
    /// （成功为 `SocketEvent::Open`，失败为 `SocketEvent::Error` 紧跟 `SocketEvent::Close`）。
    fn open(&self, url: &str, events: EventSink) -> Box<dyn SocketHandle>;
}

/// `ClientConnection` 结构体代表一个活动的客户端 WebSocket 连接。
pub struct ClientConnection {
    /// 用于向 WebSocket 服务器异步发送消息的发送端。
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    /// 用于从 WebSocket 服务器异步接收消息的接收端。
    pub ws_receiver: SplitStream<ClientWsStream>,
}

/// 异步连接到指定的 WebSocket 服务器。
///
/// 解析 URL 后使用 `connect_async` 完成握手，并将返回的流分割为发送端和接收端。
pub async fn connect_client(url_str: &str) -> Result<ClientConnection, WsError> {
    info!("[传输层] 开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("[传输层] 已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            debug!("[传输层] WebSocket 连接响应头: {:?}", response.headers());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Err(e) => {
            error!("[传输层] 连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 单次读取的结果。
#[derive(Debug)]
pub enum FrameOutcome {
    /// 一帧业务数据。
    Frame(InboundFrame),
    /// 连接已结束。
    Closed(CloseEvent),
    /// 读取时发生底层错误，连接随之不可用。
    Failed(WsError),
}

/// 从接收流中读取下一帧业务数据。
///
/// Ping / Pong 等控制帧由 `tokio-tungstenite` 自动处理，这里直接跳过。
/// 此函数只在 `ws_receiver.next()` 处等待，可以安全地放在 `tokio::select!` 分支中。
pub async fn receive_frame(ws_receiver: &mut SplitStream<ClientWsStream>) -> FrameOutcome {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("[传输层] 收到文本帧，长度: {} 字节", text.len());
                break FrameOutcome::Frame(InboundFrame::Text(text));
            }
            Some(Ok(Message::Binary(bin))) => {
                debug!("[传输层] 收到二进制帧，长度: {} 字节", bin.len());
                break FrameOutcome::Frame(InboundFrame::Binary(bin));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                // 控制帧 / 原始帧，继续等待下一条业务消息
            }
            Some(Ok(Message::Close(close_frame))) => {
                debug!("[传输层] 收到 Close 控制帧: {:?}", close_frame);
                let event = match close_frame {
                    Some(frame) => CloseEvent::remote(Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => CloseEvent::remote(None, "服务端关闭了连接"),
                };
                break FrameOutcome::Closed(event);
            }
            Some(Err(TungsteniteError::ConnectionClosed)) | Some(Err(TungsteniteError::AlreadyClosed)) => {
                debug!("[传输层] 连接已关闭 (ConnectionClosed / AlreadyClosed)。");
                break FrameOutcome::Closed(CloseEvent::remote(None, "连接已关闭"));
            }
            Some(Err(e)) => {
                error!("[传输层] 从 WebSocket 流接收消息时发生底层错误: {}", e);
                break FrameOutcome::Failed(WsError::WebSocketProtocolError(e));
            }
            None => {
                debug!("[传输层] WebSocket 接收流已结束。");
                break FrameOutcome::Closed(CloseEvent::remote(None, "接收流已结束"));
            }
        }
    }
}

/// 发往后台套接字任务的指令。
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// 基于 `tokio-tungstenite` 的默认套接字工厂。
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, events: EventSink) -> Box<dyn SocketHandle> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let socket_task = tokio::spawn(run_socket(
            url.to_string(),
            self.connect_timeout,
            outbound_rx,
            events.clone(),
        ));
        // 事件回调 panic 会使套接字任务提前终止，此时补发关闭事件，让连接核心进入重连流程
        let url = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = socket_task.await {
                if e.is_panic() {
                    error!("[传输层] 与 {} 的套接字任务因 panic 终止，按连接中断处理。", url);
                    events.emit(SocketEvent::Close(CloseEvent::remote(None, "套接字任务异常终止")));
                }
            }
        });
        Box::new(TungsteniteSocket { outbound: outbound_tx })
    }
}

/// `TungsteniteConnector` 打开的套接字句柄。
///
/// 句柄被丢弃时发送通道随之关闭，后台任务会据此发送 Close 帧并结束。
struct TungsteniteSocket {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle for TungsteniteSocket {
    fn send_text(&self, text: String) -> Result<(), WsError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| WsError::SendErrorClosed)
    }

    fn close(&self) {
        // 后台任务已结束时发送会失败，此时无需处理
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// 驱动单个套接字的后台任务。
async fn run_socket(
    url: String,
    connect_timeout: Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let connection = match tokio::time::timeout(connect_timeout, connect_client(&url)).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            events.emit(SocketEvent::Error(e));
            events.emit(SocketEvent::Close(CloseEvent::remote(None, "握手失败")));
            return;
        }
        Err(_) => {
            warn!("[传输层] 连接 {} 超时 ({:?})", url, connect_timeout);
            events.emit(SocketEvent::Error(WsError::ConnectionTimeout));
            events.emit(SocketEvent::Close(CloseEvent::remote(None, "握手超时")));
            return;
        }
    };
    events.emit(SocketEvent::Open);

    let ClientConnection {
        mut ws_sender,
        mut ws_receiver,
    } = connection;

    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        // 写失败后读端会随之报告连接结束，这里只上报错误
                        warn!("[传输层] 写出消息失败: {}", e);
                        events.emit(SocketEvent::Error(WsError::WebSocketProtocolError(e)));
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("[传输层] 收到关闭指令，正在向 {} 发送 Close 帧。", url);
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    let _ = ws_sender.close().await;
                    return;
                }
            },
            outcome = receive_frame(&mut ws_receiver) => match outcome {
                FrameOutcome::Frame(frame) => events.emit(SocketEvent::Message(frame)),
                FrameOutcome::Closed(close) => {
                    info!("[传输层] 与 {} 的连接已结束: {:?}", url, close);
                    events.emit(SocketEvent::Close(close));
                    return;
                }
                FrameOutcome::Failed(e) => {
                    events.emit(SocketEvent::Error(e));
                    events.emit(SocketEvent::Close(CloseEvent::remote(None, "连接异常中断")));
                    return;
                }
            },
        }
    }
}
