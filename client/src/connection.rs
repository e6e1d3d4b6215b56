//! WebSocket connection to the sync server.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{ClientEvent, DeclaredRole, Direction, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outgoing half: role declaration and movement commands
pub struct EventSender {
    sink: SplitSink<WsStream, Message>,
}

/// Incoming half: `playerData` and `players` events
pub struct EventReceiver {
    stream: SplitStream<WsStream>,
}

/// A connected client. Split it when sending and receiving have to run
/// concurrently.
pub struct SyncClient {
    sender: EventSender,
    receiver: EventReceiver,
}

impl SyncClient {
    /// Connects to a server URL such as `ws://127.0.0.1:3001`.
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let (ws, _response) = connect_async(url).await?;
        info!("Connected to {}", url);

        let (sink, stream) = ws.split();
        Ok(Self {
            sender: EventSender { sink },
            receiver: EventReceiver { stream },
        })
    }

    pub async fn set_role(&mut self, role: DeclaredRole) -> ClientResult<()> {
        self.sender.set_role(role).await
    }

    pub async fn send_move(&mut self, direction: Direction) -> ClientResult<()> {
        self.sender.send_move(direction).await
    }

    pub async fn send_raw(&mut self, text: &str) -> ClientResult<()> {
        self.sender.send_raw(text).await
    }

    pub async fn next_event(&mut self) -> ClientResult<Option<ServerEvent>> {
        self.receiver.next_event().await
    }

    pub async fn close(self) -> ClientResult<()> {
        self.sender.close().await
    }

    pub fn into_split(self) -> (EventSender, EventReceiver) {
        (self.sender, self.receiver)
    }
}

impl EventSender {
    pub async fn send(&mut self, event: &ClientEvent) -> ClientResult<()> {
        let text = event.encode()?;
        self.send_raw(&text).await
    }

    pub async fn set_role(&mut self, role: DeclaredRole) -> ClientResult<()> {
        self.send(&ClientEvent::SetRole(role)).await
    }

    pub async fn send_move(&mut self, direction: Direction) -> ClientResult<()> {
        self.send(&ClientEvent::Move(direction.into())).await
    }

    /// Sends a text frame as-is. Lets tools and tests exercise the server's
    /// handling of malformed input.
    pub async fn send_raw(&mut self, text: &str) -> ClientResult<()> {
        self.sink.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn close(mut self) -> ClientResult<()> {
        // Closing the sink sends the close frame.
        self.sink.close().await?;
        Ok(())
    }
}

impl EventReceiver {
    /// Waits for the next server event. Returns `None` once the server
    /// closes the connection. Control frames are skipped; pings are
    /// answered by the WebSocket layer while reading.
    pub async fn next_event(&mut self) -> ClientResult<Option<ServerEvent>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(ServerEvent::decode(&text)?)),
                Message::Close(frame) => {
                    debug!("Server closed connection: {:?}", frame);
                    return Ok(None);
                }
                _ => continue,
            }
        }
        Ok(None)
    }
}
