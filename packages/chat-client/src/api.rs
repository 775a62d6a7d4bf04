//! The chat API contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatMessage, Room, UserProfile};

/// Operations the messaging layer needs from the chat backend.
///
/// Implemented over HTTP by [`RestChatClient`](crate::RestChatClient) and in
/// memory by `testing::MockChatApi`.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Rooms the authenticated user belongs to.
    async fn get_user_rooms(&self) -> Result<Vec<Room>>;

    /// Messages of one room, oldest first.
    async fn get_room_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>>;

    /// Post a message. Returns the stored message.
    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage>;

    /// Mark every message in the room as read for the authenticated user.
    async fn mark_room_messages_as_read(&self, room_id: &str) -> Result<()>;

    /// Mark a single message as read.
    async fn mark_message_as_read(&self, message_id: &str) -> Result<()>;

    /// The user directory.
    async fn get_all_users(&self) -> Result<Vec<UserProfile>>;

    /// Open (or reopen) a direct room with another user.
    async fn start_chat(&self, other_user_id: &str) -> Result<Room>;
}
