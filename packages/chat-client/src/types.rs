//! Payload types for the chat REST API.
//!
//! The backend is not consistent about field names: rooms may carry their
//! participants as nested user objects or as flat fields, and message senders
//! may be an id or a full profile. These types accept every shape we have seen
//! and expose accessors that hide the difference.
//!
//! Deserialization goes through private `*Wire` structs that give every key
//! variant its own field, so a payload carrying two variants at once (say a
//! participant row with both `id` and `userId`) still parses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Users
// ============================================================================

/// A user from the directory (`GET /users`) or embedded in a room/message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "UserProfileWire")]
pub struct UserProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    /// admin, support, vendor, host, client
    pub role: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProfileWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    profile_image: Option<String>,
}

impl TryFrom<UserProfileWire> for UserProfile {
    type Error = String;

    fn try_from(wire: UserProfileWire) -> Result<Self, Self::Error> {
        let id = first_present([wire.id, wire.object_id, wire.user_id])
            .ok_or_else(|| "missing field `id`".to_string())?;
        Ok(Self {
            id,
            first_name: wire.first_name,
            last_name: wire.last_name,
            email: wire.email,
            username: wire.username,
            role: wire.role.or(wire.user_type),
            image_url: first_present([wire.image_url, wire.avatar_url, wire.profile_image]),
        })
    }
}

/// First value that is set and non-empty.
fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().flatten().find(|v| !v.is_empty())
}

impl UserProfile {
    /// "First Last", trimmed. Empty when neither name is set.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{} {}", first, last).trim().to_string()
    }

    /// Best human-readable label: full name, then email, then username.
    pub fn display_name(&self) -> Option<String> {
        let name = self.full_name();
        if !name.is_empty() {
            return Some(name);
        }
        self.email
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

// ============================================================================
// Rooms
// ============================================================================

/// One participant entry of a room.
///
/// Either `user` is populated, or the flat fields are, or both. `id` is the
/// row's own id, which some responses use for the user and others for the
/// membership record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RoomParticipantWire")]
pub struct RoomParticipant {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub user: Option<UserProfile>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomParticipantWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    profile_image: Option<String>,
}

impl From<RoomParticipantWire> for RoomParticipant {
    fn from(wire: RoomParticipantWire) -> Self {
        Self {
            id: wire.id,
            user_id: wire.user_id,
            user: wire.user,
            first_name: wire.first_name,
            last_name: wire.last_name,
            email: wire.email,
            role: wire.role.or(wire.user_type),
            image_url: first_present([wire.image_url, wire.avatar_url, wire.profile_image]),
        }
    }
}

impl RoomParticipant {
    /// Flatten the nested and flat shapes into one profile.
    ///
    /// The user id is taken from `userId`, then the nested user, then the
    /// row's own `id`. Returns `None` when none of them is set.
    pub fn profile(&self) -> Option<UserProfile> {
        let nested = self.user.clone().unwrap_or_default();
        let id = first_present([self.user_id.clone(), Some(nested.id.clone()), self.id.clone()])?;

        Some(UserProfile {
            id,
            first_name: nested.first_name.or_else(|| self.first_name.clone()),
            last_name: nested.last_name.or_else(|| self.last_name.clone()),
            email: nested.email.or_else(|| self.email.clone()),
            username: nested.username,
            role: nested.role.or_else(|| self.role.clone()),
            image_url: nested.image_url.or_else(|| self.image_url.clone()),
        })
    }
}

/// A chat room as returned by `GET /chat/rooms`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RoomWire")]
pub struct Room {
    pub id: String,
    /// Nested room identifier; some responses wrap the room in a membership
    /// record whose own `id` differs from the room's.
    pub room_id: Option<String>,
    /// Composite display name, e.g. "Alice Smith & Sam Lee".
    pub name: Option<String>,
    pub participants: Vec<RoomParticipant>,
    pub last_message: Option<ChatMessage>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    chat_room_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    participants: Vec<RoomParticipant>,
    #[serde(default)]
    last_message: Option<ChatMessage>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<RoomWire> for Room {
    type Error = String;

    fn try_from(wire: RoomWire) -> Result<Self, Self::Error> {
        let id = first_present([wire.id, wire.object_id])
            .ok_or_else(|| "missing field `id`".to_string())?;
        Ok(Self {
            id,
            room_id: first_present([wire.room_id, wire.chat_room_id]),
            name: wire.name,
            participants: wire.participants,
            last_message: wire.last_message,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        })
    }
}

impl Room {
    /// The id to use for room-scoped API calls.
    pub fn api_id(&self) -> &str {
        self.room_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }

    /// Participant profiles, skipping entries with no resolvable id.
    pub fn participant_profiles(&self) -> Vec<UserProfile> {
        self.participants
            .iter()
            .filter_map(RoomParticipant::profile)
            .collect()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Sender as embedded in a message: either a bare id or a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageSender {
    Id(String),
    Profile(UserProfile),
}

/// A chat message as returned by the messages endpoints.
///
/// `sender_id` and `user_id` are both sender keys seen in the wild;
/// [`ChatMessage::sender_id`] prefers the former.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ChatMessageWire")]
pub struct ChatMessage {
    pub id: Option<String>,
    pub room_id: Option<String>,
    pub sender_id: Option<String>,
    pub user_id: Option<String>,
    pub sender: Option<MessageSender>,
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub message_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessageWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    chat_room_id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sender: Option<MessageSender>,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl From<ChatMessageWire> for ChatMessage {
    fn from(wire: ChatMessageWire) -> Self {
        Self {
            id: first_present([wire.id, wire.object_id]),
            room_id: first_present([wire.room_id, wire.chat_room_id]),
            sender_id: wire.sender_id,
            user_id: wire.user_id,
            sender: wire.sender,
            sender_name: wire.sender_name,
            content: wire.content.unwrap_or_default(),
            created_at: wire.created_at,
            read: wire.read.or(wire.is_read).unwrap_or(false),
            message_type: wire.message_type.or(wire.kind),
        }
    }
}

impl ChatMessage {
    /// Sender id from whichever field carries it.
    pub fn sender_id(&self) -> Option<&str> {
        let flat = [self.sender_id.as_deref(), self.user_id.as_deref()];
        if let Some(id) = flat.into_iter().flatten().find(|id| !id.is_empty()) {
            return Some(id);
        }
        match &self.sender {
            Some(MessageSender::Id(id)) => Some(id.as_str()),
            Some(MessageSender::Profile(profile)) => Some(profile.id.as_str()),
            None => None,
        }
    }

    /// Sender display name, if the payload carries one.
    pub fn sender_display_name(&self) -> Option<String> {
        if let Some(name) = self.sender_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        match &self.sender {
            Some(MessageSender::Profile(profile)) => profile.display_name(),
            _ => None,
        }
    }
}

// ============================================================================
// Requests and envelopes
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageBody<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartChatBody<'a> {
    pub other_user_id: &'a str,
}

/// Responses come either bare or wrapped in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}
