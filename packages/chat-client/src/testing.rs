//! Testing utilities including an in-memory chat backend.
//!
//! [`MockChatApi`] behaves like a small chat server for one signed-in user:
//! rooms, messages, read flags and the user directory live in memory, every
//! call is recorded, and any operation can be made to fail.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

use crate::api::ChatApi;
use crate::error::{ChatApiError, Result};
use crate::types::{ChatMessage, Room, RoomParticipant, UserProfile};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockChatOp {
    GetUserRooms,
    GetRoomMessages,
    SendMessage,
    MarkRoomRead,
    MarkMessageRead,
    GetAllUsers,
    StartChat,
}

/// Record of a call made to the mock API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockChatCall {
    GetUserRooms,
    GetRoomMessages { room_id: String },
    SendMessage { room_id: String, content: String },
    MarkRoomRead { room_id: String },
    MarkMessageRead { message_id: String },
    GetAllUsers,
    StartChat { other_user_id: String },
}

#[derive(Default)]
struct MockState {
    rooms: Vec<Room>,
    messages: HashMap<String, Vec<ChatMessage>>,
    users: Vec<UserProfile>,
    failing: HashSet<MockChatOp>,
    next_id: u64,
}

/// Pauses `get_user_rooms` after it has read the room list.
///
/// Lets a test hold a refresh in flight while other events happen.
#[derive(Clone, Default)]
pub struct ListingGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl ListingGate {
    /// Wait until a listing call is parked on the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked listing call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory [`ChatApi`] for tests.
#[derive(Clone)]
pub struct MockChatApi {
    self_id: String,
    assign_sent_ids: bool,
    state: Arc<RwLock<MockState>>,
    calls: Arc<RwLock<Vec<MockChatCall>>>,
    gate: Arc<RwLock<Option<ListingGate>>>,
}

impl MockChatApi {
    /// Create an empty backend as seen by `self_id`.
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            assign_sent_ids: true,
            state: Arc::new(RwLock::new(MockState::default())),
            calls: Arc::new(RwLock::new(Vec::new())),
            gate: Arc::new(RwLock::new(None)),
        }
    }

    /// Add a room with its messages.
    pub fn with_room(self, room: Room, messages: Vec<ChatMessage>) -> Self {
        {
            let mut state = self.state.write().unwrap();
            state.messages.insert(room.api_id().to_string(), messages);
            state.rooms.push(room);
        }
        self
    }

    /// Add a user to the directory.
    pub fn with_user(self, user: UserProfile) -> Self {
        self.state.write().unwrap().users.push(user);
        self
    }

    /// Make `send_message` return messages without an id.
    pub fn without_sent_ids(mut self) -> Self {
        self.assign_sent_ids = false;
        self
    }

    /// Append a message to a room as if another client had posted it.
    pub fn push_message(&self, room_id: &str, message: ChatMessage) {
        self.state
            .write()
            .unwrap()
            .messages
            .entry(room_id.to_string())
            .or_default()
            .push(message);
    }

    /// Make an operation fail with a 500 until [`recover`](Self::recover) is called.
    pub fn fail(&self, op: MockChatOp) {
        self.state.write().unwrap().failing.insert(op);
    }

    /// Stop failing an operation.
    pub fn recover(&self, op: MockChatOp) {
        self.state.write().unwrap().failing.remove(&op);
    }

    /// Park the next `get_user_rooms` call until the returned gate is released.
    pub fn hold_room_listing(&self) -> ListingGate {
        let gate = ListingGate::default();
        *self.gate.write().unwrap() = Some(gate.clone());
        gate
    }

    /// Messages currently stored for a room.
    pub fn stored_messages(&self, room_id: &str) -> Vec<ChatMessage> {
        self.state
            .read()
            .unwrap()
            .messages
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockChatCall> {
        self.calls.read().unwrap().clone()
    }

    /// Count calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&MockChatCall) -> bool) -> usize {
        self.calls.read().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn record(&self, call: MockChatCall) {
        self.calls.write().unwrap().push(call);
    }

    fn check(&self, op: MockChatOp) -> Result<()> {
        if self.state.read().unwrap().failing.contains(&op) {
            return Err(ChatApiError::Api {
                status: 500,
                message: format!("{:?} failed", op),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn get_user_rooms(&self) -> Result<Vec<Room>> {
        self.record(MockChatCall::GetUserRooms);
        self.check(MockChatOp::GetUserRooms)?;
        let rooms = self.state.read().unwrap().rooms.clone();

        let gate = self.gate.write().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(rooms)
    }

    async fn get_room_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>> {
        self.record(MockChatCall::GetRoomMessages {
            room_id: room_id.to_string(),
        });
        self.check(MockChatOp::GetRoomMessages)?;
        Ok(self.stored_messages(room_id))
    }

    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage> {
        self.record(MockChatCall::SendMessage {
            room_id: room_id.to_string(),
            content: content.to_string(),
        });
        self.check(MockChatOp::SendMessage)?;

        let id = self.next_id("m-sent");
        let stored = ChatMessage {
            id: Some(id),
            room_id: Some(room_id.to_string()),
            sender_id: Some(self.self_id.clone()),
            content: content.to_string(),
            created_at: Some(Utc::now()),
            read: true,
            ..Default::default()
        };
        self.push_message(room_id, stored.clone());

        if self.assign_sent_ids {
            Ok(stored)
        } else {
            Ok(ChatMessage { id: None, ..stored })
        }
    }

    async fn mark_room_messages_as_read(&self, room_id: &str) -> Result<()> {
        self.record(MockChatCall::MarkRoomRead {
            room_id: room_id.to_string(),
        });
        self.check(MockChatOp::MarkRoomRead)?;

        let mut state = self.state.write().unwrap();
        if let Some(messages) = state.messages.get_mut(room_id) {
            for message in messages.iter_mut() {
                if message.sender_id() != Some(self.self_id.as_str()) {
                    message.read = true;
                }
            }
        }
        Ok(())
    }

    async fn mark_message_as_read(&self, message_id: &str) -> Result<()> {
        self.record(MockChatCall::MarkMessageRead {
            message_id: message_id.to_string(),
        });
        self.check(MockChatOp::MarkMessageRead)?;

        let mut state = self.state.write().unwrap();
        for messages in state.messages.values_mut() {
            for message in messages.iter_mut() {
                if message.id.as_deref() == Some(message_id) {
                    message.read = true;
                }
            }
        }
        Ok(())
    }

    async fn get_all_users(&self) -> Result<Vec<UserProfile>> {
        self.record(MockChatCall::GetAllUsers);
        self.check(MockChatOp::GetAllUsers)?;
        Ok(self.state.read().unwrap().users.clone())
    }

    async fn start_chat(&self, other_user_id: &str) -> Result<Room> {
        self.record(MockChatCall::StartChat {
            other_user_id: other_user_id.to_string(),
        });
        self.check(MockChatOp::StartChat)?;

        let existing = self
            .state
            .read()
            .unwrap()
            .rooms
            .iter()
            .find(|room| {
                let ids: Vec<String> = room
                    .participant_profiles()
                    .into_iter()
                    .map(|p| p.id)
                    .collect();
                ids.iter().any(|id| id == other_user_id) && ids.iter().any(|id| id == &self.self_id)
            })
            .cloned();
        if let Some(room) = existing {
            return Ok(room);
        }

        let id = self.next_id("room");
        let mut state = self.state.write().unwrap();
        let other = state
            .users
            .iter()
            .find(|u| u.id == other_user_id)
            .cloned()
            .unwrap_or_else(|| UserProfile {
                id: other_user_id.to_string(),
                ..Default::default()
            });
        let me = state
            .users
            .iter()
            .find(|u| u.id == self.self_id)
            .cloned()
            .unwrap_or_else(|| UserProfile {
                id: self.self_id.clone(),
                ..Default::default()
            });

        let room = Room {
            id: id.clone(),
            participants: vec![participant(&me), participant(&other)],
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        state.messages.insert(id, Vec::new());
        state.rooms.push(room.clone());
        Ok(room)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A directory user.
pub fn user(id: &str, first_name: &str, last_name: &str, role: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        email: Some(format!("{}@example.com", first_name.to_lowercase())),
        role: Some(role.to_string()),
        ..Default::default()
    }
}

/// A room participant entry wrapping a full profile.
pub fn participant(profile: &UserProfile) -> RoomParticipant {
    RoomParticipant {
        user_id: Some(profile.id.clone()),
        user: Some(profile.clone()),
        ..Default::default()
    }
}

/// A two-person room with structured participant data.
pub fn direct_room(id: &str, a: &UserProfile, b: &UserProfile) -> Room {
    Room {
        id: id.to_string(),
        participants: vec![participant(a), participant(b)],
        ..Default::default()
    }
}

/// Fixed timestamp `minute` minutes after a reference instant.
pub fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
}

/// A stored message.
pub fn message(id: &str, sender_id: &str, content: &str, minute: i64, read: bool) -> ChatMessage {
    ChatMessage {
        id: Some(id.to_string()),
        sender_id: Some(sender_id.to_string()),
        content: content.to_string(),
        created_at: Some(at_minute(minute)),
        read,
        message_type: Some("text".to_string()),
        ..Default::default()
    }
}
