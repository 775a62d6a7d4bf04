//! Push channel abstraction.
//!
//! The push channel is a second, low-latency producer of new messages next to
//! polling. It only delivers; nothing is ever sent on it by this crate. When it
//! is unavailable the session keeps polling and nothing else changes.

pub mod websocket;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;

pub use websocket::WebSocketPushChannel;

/// A "new message" event from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessageEvent {
    pub room_id: String,
    /// Server message id, when the channel includes it.
    pub message_id: Option<String>,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Details of an established push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConnection {
    pub user_id: String,
    pub endpoint: String,
}

/// Stream of new-message events for one subscriber.
///
/// Ends when the channel detaches the subscriber (`off_new_message`) or is
/// dropped.
pub struct PushSubscription {
    rx: mpsc::UnboundedReceiver<NewMessageEvent>,
}

impl PushSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<NewMessageEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<NewMessageEvent> {
        self.rx.recv().await
    }
}

/// Bidirectional push transport, used receive-only.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Connect as `user_id`. `Ok(None)` means the server declined the
    /// connection; callers fall back to polling.
    async fn connect(&self, user_id: &str) -> Result<Option<PushConnection>>;

    /// Subscribe to new-message events. Replaces any previous subscriber.
    fn on_new_message(&self) -> PushSubscription;

    /// Detach the current subscriber.
    fn off_new_message(&self);

    /// Close the connection.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Single-subscriber fan-in shared by channel implementations.
#[derive(Default)]
pub struct Subscriber {
    sender: Mutex<Option<mpsc::UnboundedSender<NewMessageEvent>>>,
}

impl Subscriber {
    pub fn subscribe(&self) -> PushSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.slot() = Some(tx);
        PushSubscription::new(rx)
    }

    pub fn unsubscribe(&self) {
        self.slot().take();
    }

    /// Deliver an event. Returns false if nobody is listening.
    pub fn deliver(&self, event: NewMessageEvent) -> bool {
        match self.slot().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<NewMessageEvent>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
