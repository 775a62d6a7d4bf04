//! Hub event broadcasting.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: slow receivers may miss events
//! - **In-memory only**: nothing is persisted or replayed
//!
//! Receivers that lag should re-read the thread list from the hub rather than
//! rely on the event stream for state.

use serde::Serialize;
use tokio::sync::broadcast;

/// Severity of a user-facing notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient user-facing notification (toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// The thread list changed; re-read it.
    ThreadsChanged,
    /// A message arrived over the push channel.
    MessageReceived { thread_id: String },
    Notice(Notice),
}

/// Broadcast channel for [`HubEvent`]s.
#[derive(Clone)]
pub struct HubEvents {
    sender: broadcast::Sender<HubEvent>,
}

impl HubEvents {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that got the event.
    pub fn emit(&self, event: HubEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn notify(&self, notice: Notice) -> usize {
        self.emit(HubEvent::Notice(notice))
    }

    /// Events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for HubEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubEvents")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
