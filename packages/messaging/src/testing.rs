//! Testing utilities for push-driven flows.
//!
//! [`MockPushChannel`] stands in for the WebSocket channel: tests choose how
//! `connect` behaves and inject events with [`MockPushChannel::emit`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{MessagingError, Result};
use crate::push::{NewMessageEvent, PushChannel, PushConnection, PushSubscription, Subscriber};

/// How [`MockPushChannel::connect`] responds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    /// Server declined (`Ok(None)`).
    Decline,
    Fail(String),
}

/// Record of a call made to the mock channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPushCall {
    Connect { user_id: String },
    OnNewMessage,
    OffNewMessage,
    Disconnect,
}

/// In-memory [`PushChannel`].
#[derive(Clone)]
pub struct MockPushChannel {
    behavior: ConnectBehavior,
    subscriber: Arc<Subscriber>,
    connected: Arc<AtomicBool>,
    calls: Arc<RwLock<Vec<MockPushCall>>>,
}

impl Default for MockPushChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPushChannel {
    /// A channel that accepts connections.
    pub fn new() -> Self {
        Self {
            behavior: ConnectBehavior::Accept,
            subscriber: Arc::new(Subscriber::default()),
            connected: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_behavior(mut self, behavior: ConnectBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Deliver an event to the current subscriber. Returns false if nobody
    /// is listening or the channel is not connected.
    pub fn emit(&self, event: NewMessageEvent) -> bool {
        self.connected.load(Ordering::SeqCst) && self.subscriber.deliver(event)
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.subscriber.unsubscribe();
    }

    pub fn calls(&self) -> Vec<MockPushCall> {
        self.calls.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, call: MockPushCall) {
        self.calls
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }
}

#[async_trait]
impl PushChannel for MockPushChannel {
    async fn connect(&self, user_id: &str) -> Result<Option<PushConnection>> {
        self.record(MockPushCall::Connect {
            user_id: user_id.to_string(),
        });
        match &self.behavior {
            ConnectBehavior::Accept => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(Some(PushConnection {
                    user_id: user_id.to_string(),
                    endpoint: "mock://push".to_string(),
                }))
            }
            ConnectBehavior::Decline => Ok(None),
            ConnectBehavior::Fail(reason) => Err(MessagingError::Push(reason.clone())),
        }
    }

    fn on_new_message(&self) -> PushSubscription {
        self.record(MockPushCall::OnNewMessage);
        self.subscriber.subscribe()
    }

    fn off_new_message(&self) {
        self.record(MockPushCall::OffNewMessage);
        self.subscriber.unsubscribe();
    }

    async fn disconnect(&self) {
        self.record(MockPushCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
