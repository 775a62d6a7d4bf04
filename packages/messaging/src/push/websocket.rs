//! WebSocket push channel.
//!
//! Connects to `{endpoint}?userId={id}` and reads text frames. Two framings are
//! understood:
//!
//! - plain JSON: `{"event":"newMessage","data":{...}}`
//! - Socket.IO over Engine.IO v4: `42["newMessage",{...}]`, with the open
//!   packet answered by a namespace connect (`40`) and pings (`2`) by pongs (`3`)
//!
//! Every other event is ignored. The `data` object uses the same shape as a
//! REST message, plus the room id.

use async_trait::async_trait;
use chat_client::ChatMessage;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{NewMessageEvent, PushChannel, PushConnection, PushSubscription, Subscriber};
use crate::error::{MessagingError, Result};

/// Default timeout for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const NEW_MESSAGE_EVENTS: &[&str] = &["newMessage", "new_message", "message:new"];

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Reader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`PushChannel`] over a WebSocket.
pub struct WebSocketPushChannel {
    endpoint: String,
    connect_timeout: Duration,
    subscriber: Arc<Subscriber>,
    connected: Arc<AtomicBool>,
    connection: Mutex<Option<PushConnection>>,
    reader: Mutex<Option<Reader>>,
}

impl WebSocketPushChannel {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            subscriber: Arc::new(Subscriber::default()),
            connected: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Set a custom handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect_url(&self, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| MessagingError::Config(format!("invalid socket URL {}: {}", self.endpoint, e)))?;
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }

    fn stop_reader(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reader) = reader {
            reader.cancel.cancel();
            // The reader sends a close frame on cancellation; abort only if it
            // is stuck past that.
            tokio::spawn(async move {
                if tokio::time::timeout(Duration::from_secs(2), reader.handle)
                    .await
                    .is_err()
                {
                    debug!("push reader did not stop in time");
                }
            });
        }
    }
}

#[async_trait]
impl PushChannel for WebSocketPushChannel {
    async fn connect(&self, user_id: &str) -> Result<Option<PushConnection>> {
        if self.is_connected() {
            let existing = self
                .connection
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            if existing.as_ref().is_some_and(|c| c.user_id == user_id) {
                return Ok(existing);
            }
            self.disconnect().await;
        }

        let url = self.connect_url(user_id)?;
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| MessagingError::Push("WebSocket connect timeout".to_string()))?;

        let socket = match handshake {
            Ok((socket, _response)) => socket,
            Err(WsError::Http(response))
                if matches!(response.status().as_u16(), 401 | 403 | 404) =>
            {
                warn!(status = %response.status(), "Push channel declined connection");
                return Ok(None);
            }
            Err(e) => return Err(MessagingError::Push(format!("WebSocket connect failed: {}", e))),
        };

        let connection = PushConnection {
            user_id: user_id.to_string(),
            endpoint: self.endpoint.clone(),
        };
        self.connected.store(true, Ordering::SeqCst);
        *self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(connection.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_reader(
            socket,
            self.subscriber.clone(),
            self.connected.clone(),
            cancel.clone(),
        ));
        *self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Reader { cancel, handle });

        info!(user_id, endpoint = %self.endpoint, "Push channel connected");
        Ok(Some(connection))
    }

    fn on_new_message(&self) -> PushSubscription {
        self.subscriber.subscribe()
    }

    fn off_new_message(&self) {
        self.subscriber.unsubscribe();
    }

    async fn disconnect(&self) {
        self.stop_reader();
        self.connected.store(false, Ordering::SeqCst);
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn run_reader(
    mut socket: Socket,
    subscriber: Arc<Subscriber>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket.close(None).await;
                break;
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = match decode_frame(&text) {
                        Frame::NewMessage(event) => {
                            debug!(room_id = %event.room_id, "Push message received");
                            if !subscriber.deliver(event) {
                                debug!("No push subscriber, event dropped");
                            }
                            None
                        }
                        Frame::Open => Some("40"),
                        Frame::Ping => Some("3"),
                        Frame::Ignored => None,
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = socket.send(Message::Text(reply.to_string())).await {
                            warn!(error = %e, "Push channel write failed");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Push channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel read failed");
                    break;
                }
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

/// A decoded text frame.
#[derive(Debug, PartialEq)]
enum Frame {
    NewMessage(NewMessageEvent),
    /// Engine.IO open packet.
    Open,
    /// Engine.IO ping.
    Ping,
    Ignored,
}

#[derive(Deserialize)]
struct JsonFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn decode_frame(text: &str) -> Frame {
    let text = text.trim();
    if text == "2" {
        return Frame::Ping;
    }
    if text.starts_with("0{") {
        return Frame::Open;
    }

    let (event, data) = if let Some(packet) = text.strip_prefix("42") {
        // Optional namespace: 42/chat,["event",{...}]
        let packet = match packet.strip_prefix('/') {
            Some(rest) => rest.split_once(',').map(|(_, p)| p).unwrap_or(""),
            None => packet,
        };
        match serde_json::from_str::<(String, serde_json::Value)>(packet) {
            Ok(pair) => pair,
            Err(_) => return Frame::Ignored,
        }
    } else {
        match serde_json::from_str::<JsonFrame>(text) {
            Ok(frame) => (frame.event, frame.data),
            Err(_) => return Frame::Ignored,
        }
    };

    if !NEW_MESSAGE_EVENTS.contains(&event.as_str()) {
        return Frame::Ignored;
    }
    match event_from_payload(data) {
        Some(event) => Frame::NewMessage(event),
        None => {
            warn!("Malformed push message payload");
            Frame::Ignored
        }
    }
}

fn event_from_payload(data: serde_json::Value) -> Option<NewMessageEvent> {
    let message: ChatMessage = serde_json::from_value(data).ok()?;
    let room_id = message.room_id.clone().filter(|id| !id.is_empty())?;
    let sender_id = message.sender_id()?.to_string();

    Some(NewMessageEvent {
        room_id,
        sender_name: message.sender_display_name(),
        message_id: message.id.filter(|id| !id.is_empty()),
        sender_id,
        content: message.content,
        created_at: message.created_at.unwrap_or_else(Utc::now),
    })
}
