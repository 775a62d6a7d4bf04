//! Thread and message types held by the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user, as supplied by the auth context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Who the other side of a thread is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    #[default]
    Client,
    Support,
    Vendor,
    Host,
}

impl ParticipantType {
    /// Map a backend role string. Unknown roles are clients.
    pub fn from_role(role: Option<&str>) -> Self {
        match role.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") | Some("support") | Some("superadmin") => ParticipantType::Support,
            Some("vendor") => ParticipantType::Vendor,
            Some("host") | Some("event_host") | Some("eventhost") => ParticipantType::Host,
            _ => ParticipantType::Client,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParticipantType::Client => "client",
            ParticipantType::Support => "support",
            ParticipantType::Vendor => "vendor",
            ParticipantType::Host => "host",
        }
    }
}

/// A message inside a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub message_type: String,
}

impl Message {
    /// True if this message counts towards `user_id`'s unread total.
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        !self.read && self.sender_id != user_id
    }
}

/// One conversation between the current user and another participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Backend room id.
    pub id: String,
    /// Nested room id; equal to `id` unless the backend wraps rooms.
    pub room_id: String,
    pub participant_name: String,
    pub participant_email: String,
    pub participant_type: ParticipantType,
    pub participant_image_url: Option<String>,
    pub last_message: String,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: usize,
    /// Oldest first.
    pub messages: Vec<Message>,
}

impl Thread {
    /// Whether `key` names this thread, by id or nested room id.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.room_id == key
    }

    /// Recompute `unread_count` and the last-message preview from `messages`.
    ///
    /// A thread with no messages keeps whatever preview the room carried.
    pub fn recount(&mut self, self_id: &str) {
        self.unread_count = self
            .messages
            .iter()
            .filter(|m| m.is_unread_for(self_id))
            .count();
        if let Some(last) = self.messages.last() {
            self.last_message = last.content.clone();
            self.last_message_time = Some(last.created_at);
        }
    }
}

/// How current the thread list is relative to the cache window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Never loaded.
    Unknown,
    /// Loaded within the cache window.
    Fresh,
    /// Loaded, but longer ago than the cache window.
    Stale,
}

impl Freshness {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Freshness::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, sender: &str, read: bool) -> Message {
        Message {
            id: id.into(),
            sender_id: sender.into(),
            sender_name: sender.into(),
            content: format!("content {}", id),
            created_at: Utc::now(),
            read,
            message_type: "text".into(),
        }
    }

    #[test]
    fn test_recount_ignores_own_and_read_messages() {
        let mut thread = Thread {
            id: "r-1".into(),
            room_id: "r-1".into(),
            participant_name: "Sam Lee".into(),
            participant_email: String::new(),
            participant_type: ParticipantType::Vendor,
            participant_image_url: None,
            last_message: String::new(),
            last_message_time: None,
            unread_count: 99,
            messages: vec![msg("1", "u-2", false), msg("2", "u-1", false), msg("3", "u-2", true)],
        };

        thread.recount("u-1");

        assert_eq!(thread.unread_count, 1);
        assert_eq!(thread.last_message, "content 3");
    }

    #[test]
    fn test_participant_type_from_role() {
        assert_eq!(ParticipantType::from_role(Some("Admin")), ParticipantType::Support);
        assert_eq!(ParticipantType::from_role(Some("vendor")), ParticipantType::Vendor);
        assert_eq!(ParticipantType::from_role(Some("host")), ParticipantType::Host);
        assert_eq!(ParticipantType::from_role(None), ParticipantType::Client);
    }

    #[test]
    fn test_current_user_full_name() {
        assert_eq!(CurrentUser::new("u-1", " Ada ", "").full_name(), "Ada");
    }
}
