use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::{RelayHandle, RelayStats};
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};
use crate::config::RelayConfig;

pub const DEFAULT_SIGNALING_PORT: u16 = 3479;

/// Keepalive timing for one WebSocket connection
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeepaliveTick {
    PingDue,
    Expired,
}

/// Ping/pong bookkeeping for one connection.
///
/// At most one ping is outstanding; it expires after `pong_timeout` or when
/// the next ping falls due, whichever comes first.
struct Liveness {
    interval: Interval,
    pong_timeout: Duration,
    pong_deadline: Option<Instant>,
}

impl Liveness {
    async fn start(keepalive: Keepalive) -> Self {
        let mut interval = tokio::time::interval(keepalive.ping_interval);
        // first tick is immediate
        interval.tick().await;
        Self {
            interval,
            pong_timeout: keepalive.pong_timeout,
            pong_deadline: None,
        }
    }

    /// Resolves when a ping should be sent or the outstanding one went unanswered.
    async fn next(&mut self) -> KeepaliveTick {
        let deadline = self.pong_deadline;
        let ping_due = tokio::select! {
            _ = self.interval.tick() => true,
            _ = expiry(deadline) => false,
        };

        if !ping_due || self.pong_deadline.is_some() {
            return KeepaliveTick::Expired;
        }
        self.pong_deadline = Some(Instant::now() + self.pong_timeout);
        KeepaliveTick::PingDue
    }

    fn pong_received(&mut self) {
        self.pong_deadline = None;
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub struct SignalingServer {
    config: RelayConfig,
    handle: RelayHandle,
}

impl Default for SignalingServer {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl SignalingServer {
    pub fn new(config: RelayConfig) -> Self {
        let handle = RelayHandle::spawn(config.command_queue);
        Self { config, handle }
    }

    pub fn handle(&self) -> &RelayHandle {
        &self.handle
    }

    pub async fn stats(&self) -> Result<RelayStats, SignalingError> {
        self.handle.stats().await
    }

    /// Bind to the configured address
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_address()).await
    }

    /// Bind to the configured address and serve until the listener fails
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Signaling server listening on {}", listener.local_addr()?);

        let keepalive = Keepalive {
            ping_interval: self.config.ping_interval(),
            pong_timeout: self.config.pong_timeout(),
        };

        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RelayHandle,
    keepalive: Keepalive,
) -> Result<(), SignalingError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let conn = ConnectionId::generate();
    info!("WebSocket connection from {} as {}", addr, conn);

    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let hello = ServerMessage::Connected {
        socket_id: conn.clone(),
    };
    let _ = tx.send(hello.to_outbound()?);
    handle.connect(conn.clone(), tx).await?;

    let mut liveness = Liveness::start(keepalive).await;
    let writer = spawn_writer(ws_tx, rx, ctrl_rx);

    loop {
        tokio::select! {
            tick = liveness.next() => match tick {
                KeepaliveTick::PingDue => {
                    if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                        break;
                    }
                    debug!("Ping sent to {}", conn);
                }
                KeepaliveTick::Expired => {
                    warn!("Pong overdue, disconnecting {}", conn);
                    break;
                }
            },

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", conn, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_text_message(&text, &conn, &handle).await {
                            warn!("Message handling error: {}", e);
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        liveness.pong_received();
                        debug!("Pong received from {}", conn);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", conn);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let result = handle.disconnect(conn.clone()).await;

    writer.abort();
    info!("WebSocket disconnected: {}", conn);

    result
}

/// Drain outbound relay messages and control frames into the socket
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut ctrl_rx: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(msg) = rx.recv() => Message::Text(msg.into_inner()),
                Some(ctrl) = ctrl_rx.recv() => ctrl,
                else => break,
            };
            if ws_tx.send(frame).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_text_message(
    text: &str,
    conn: &ConnectionId,
    handle: &RelayHandle,
) -> Result<(), SignalingError> {
    let client_msg = match ClientMessage::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Dropping undecodable message from {}: {}", conn, e);
            return Ok(());
        }
    };

    match client_msg {
        ClientMessage::Join { room_id } => handle.join(conn.clone(), room_id).await,
        ClientMessage::Signal(envelope) => handle.signal(conn.clone(), envelope).await,
        ClientMessage::Leave { room_id } => handle.leave(conn.clone(), room_id).await,
    }
}
