//! Server network layer: WebSocket connections and the main event loop

use crate::broadcast::Outbox;
use crate::config::{BroadcastCadence, ServerConfig};
use crate::error::SyncResult;
use crate::session::{Session, SessionStats};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEvent, ConnectionId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        outbox: Outbox,
        reply: oneshot::Sender<SyncResult<ConnectionId>>,
    },
    Event {
        id: ConnectionId,
        event: ClientEvent,
    },
    Heartbeat {
        id: ConnectionId,
    },
    Disconnected {
        id: ConnectionId,
    },
}

/// Main server: owns the session and serializes every mutation through
/// one loop
pub struct Server {
    listener: TcpListener,
    session: Session,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            session: Session::new(config),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the task that accepts TCP connections and hands each one to
    /// its own connection task
    fn spawn_acceptor(
        listener: TcpListener,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        settings: ConnectionSettings,
    ) {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let server_tx = server_tx.clone();
                        tokio::spawn(handle_connection(stream, addr, server_tx, settings));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main server loop coordinating all operations
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server {
            listener,
            mut session,
            server_tx,
            mut server_rx,
        } = self;

        let config = session.config().clone();
        Self::spawn_acceptor(listener, server_tx, ConnectionSettings::from(&config));

        let (ticking, period) = match config.cadence {
            BroadcastCadence::OnChange => (false, Duration::from_secs(3600)),
            BroadcastCadence::Interval(period) => (true, period),
        };
        let mut broadcast_tick = interval(period);
        broadcast_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut timeout_check = interval(Duration::from_secs(1));
        timeout_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_stats = SessionStats::default();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(message) => dispatch(&mut session, message),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = broadcast_tick.tick(), if ticking => {
                    session.tick();
                },

                _ = timeout_check.tick() => {
                    session.expire_idle(config.client_timeout);

                    let stats = session.stats();
                    if stats != last_stats {
                        info!(
                            "{} connections: {} players, {} viewers, {} unassigned",
                            stats.connections, stats.players, stats.viewers, stats.unassigned
                        );
                        last_stats = stats;
                    }
                },
            }
        }

        Ok(())
    }
}

/// Per-connection transport settings taken from the server config
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    heartbeat: Duration,
    /// A single frame write may stall this long before the peer is dropped
    send_timeout: Duration,
    outbox_capacity: usize,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            heartbeat: config.heartbeat_interval,
            send_timeout: config.client_timeout,
            outbox_capacity: config.outbox_capacity,
        }
    }
}

/// Applies one message from a connection task to the session
pub fn dispatch(session: &mut Session, message: ServerMessage) {
    match message {
        ServerMessage::Connected {
            addr,
            outbox,
            reply,
        } => {
            let result = session.connect(addr, outbox);
            if let Ok(id) = &result {
                debug!("Connection {} attached", id);
            }
            if let Err(Ok(id)) = reply.send(result) {
                // The connection task is gone before it learned its id.
                session.disconnect(id);
            }
        }
        ServerMessage::Event { id, event } => session.handle_event(id, event),
        ServerMessage::Heartbeat { id } => {
            session.heartbeat(id);
        }
        ServerMessage::Disconnected { id } => {
            session.disconnect(id);
        }
    }
}

/// Runs one WebSocket connection from handshake to close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    settings: ConnectionSettings,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };
    let (mut ws_sink, mut ws_receiver) = ws_stream.split();

    let (outbox, mut outbox_rx) = mpsc::channel::<String>(settings.outbox_capacity);
    let (reply_tx, reply_rx) = oneshot::channel();
    if server_tx
        .send(ServerMessage::Connected {
            addr,
            outbox,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }

    let id = match reply_rx.await {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            warn!("Refusing connection from {}: {}", addr, e);
            let frame = CloseFrame {
                code: CloseCode::Again,
                reason: e.to_string().into(),
            };
            let _ = ws_sink.send(Message::Close(Some(frame))).await;
            return;
        }
        Err(_) => return,
    };

    // Writer: drains the outbox onto the socket and keeps the peer pinging
    // back. Ends when the session drops the outbox, the socket fails, or a
    // write stalls past the send timeout.
    let (closed_tx, mut closed_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let mut ping = interval(settings.heartbeat);
        ping.tick().await;

        loop {
            let message = tokio::select! {
                frame = outbox_rx.recv() => match frame {
                    Some(text) => Message::Text(text),
                    None => {
                        let close = ws_sink.send(Message::Close(None));
                        let _ = timeout(settings.send_timeout, close).await;
                        break;
                    }
                },
                _ = ping.tick() => Message::Ping(Vec::new()),
            };

            match timeout(settings.send_timeout, ws_sink.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Send to connection {} failed: {}", id, e);
                    break;
                }
                Err(_) => {
                    warn!("Connection {} stopped reading, closing", id);
                    break;
                }
            }
        }

        let _ = closed_tx.send(());
    });

    loop {
        tokio::select! {
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Text(text))) => match ClientEvent::decode(&text) {
                    Ok(event) => {
                        if server_tx.send(ServerMessage::Event { id, event }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Malformed frame from connection {}: {}", id, e);
                        let _ = server_tx.send(ServerMessage::Heartbeat { id });
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    let _ = server_tx.send(ServerMessage::Heartbeat { id });
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Connection {} closed by peer", id);
                    break;
                }
                Some(Ok(_)) => {
                    warn!("Unsupported frame type from connection {}", id);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error on connection {}: {}", id, e);
                    break;
                }
            },
            _ = &mut closed_rx => break,
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { id });
}
