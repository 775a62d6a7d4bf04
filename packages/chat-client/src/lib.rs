//! REST client for the marketplace chat API.
//!
//! A thin, typed client with no reconciliation logic. The messaging layer
//! talks to it through the [`ChatApi`] trait so it can be swapped for
//! `testing::MockChatApi` in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_client::{ChatApi, RestChatClient};
//!
//! let client = RestChatClient::from_env()?;
//!
//! for room in client.get_user_rooms().await? {
//!     let messages = client.get_room_messages(room.api_id()).await?;
//!     println!("{}: {} messages", room.id, messages.len());
//! }
//! ```

pub mod api;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use api::ChatApi;
pub use error::{ChatApiError, Result};
pub use types::{ChatMessage, MessageSender, Room, RoomParticipant, UserProfile};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use types::{Envelope, SendMessageBody, StartChatBody};

/// HTTP implementation of [`ChatApi`].
#[derive(Clone)]
pub struct RestChatClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestChatClient {
    /// Create a client for the API rooted at `base_url` (e.g. `https://api.example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Create from `CHAT_API_URL` and optional `CHAT_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("CHAT_API_URL")
            .map_err(|_| ChatApiError::Config("CHAT_API_URL not set".into()))?;
        let client = Self::new(base_url);
        Ok(match std::env::var("CHAT_API_TOKEN") {
            Ok(token) if !token.is_empty() => client.with_token(token),
            _ => client,
        })
    }

    /// Authenticate requests with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and decode a (possibly `data`-wrapped) JSON body.
    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let start = std::time::Instant::now();
        let response = req.send().await.map_err(|e| {
            warn!(error = %e, call = what, "Chat API request failed");
            ChatApiError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, call = what, error = %body, "Chat API error");
            return Err(ChatApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            ChatApiError::Parse(format!("Failed to decode {} response: {}", what, e))
        })?;

        debug!(
            call = what,
            duration_ms = start.elapsed().as_millis(),
            "Chat API call"
        );
        Ok(envelope.into_inner())
    }

    /// Send a request whose response body is ignored.
    async fn execute(&self, req: RequestBuilder, what: &str) -> Result<()> {
        let response = req.send().await.map_err(|e| {
            warn!(error = %e, call = what, "Chat API request failed");
            ChatApiError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, call = what, error = %body, "Chat API error");
            return Err(ChatApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for RestChatClient {
    async fn get_user_rooms(&self) -> Result<Vec<Room>> {
        self.fetch(self.request(Method::GET, "/chat/rooms"), "get_user_rooms")
            .await
    }

    async fn get_room_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>> {
        let path = format!("/chat/rooms/{}/messages", room_id);
        self.fetch(self.request(Method::GET, &path), "get_room_messages")
            .await
    }

    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage> {
        let path = format!("/chat/rooms/{}/messages", room_id);
        let req = self
            .request(Method::POST, &path)
            .json(&SendMessageBody { content });
        self.fetch(req, "send_message").await
    }

    async fn mark_room_messages_as_read(&self, room_id: &str) -> Result<()> {
        let path = format!("/chat/rooms/{}/read", room_id);
        self.execute(self.request(Method::PUT, &path), "mark_room_messages_as_read")
            .await
    }

    async fn mark_message_as_read(&self, message_id: &str) -> Result<()> {
        let path = format!("/chat/messages/{}/read", message_id);
        self.execute(self.request(Method::PUT, &path), "mark_message_as_read")
            .await
    }

    async fn get_all_users(&self) -> Result<Vec<UserProfile>> {
        self.fetch(self.request(Method::GET, "/users"), "get_all_users")
            .await
    }

    async fn start_chat(&self, other_user_id: &str) -> Result<Room> {
        let req = self
            .request(Method::POST, "/chat/rooms")
            .json(&StartChatBody { other_user_id });
        self.fetch(req, "start_chat").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_builder() {
        let client = RestChatClient::new("https://api.example.com/api/").with_token("t-1");

        assert_eq!(client.base_url(), "https://api.example.com/api");
        assert_eq!(client.token.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_get_user_rooms_unwraps_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/rooms"))
            .and(header("authorization", "Bearer t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "r-1", "name": "Ada Admin & Sam Lee" },
                    { "id": "r-2", "participants": [{ "userId": "u-2" }] }
                ]
            })))
            .mount(&server)
            .await;

        let client = RestChatClient::new(server.uri()).with_token("t-1");
        let rooms = client.get_user_rooms().await.unwrap();

        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].name.as_deref(), Some("Ada Admin & Sam Lee"));
        assert_eq!(rooms[1].participant_profiles()[0].id, "u-2");
    }

    #[tokio::test]
    async fn test_send_message_posts_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/rooms/r-1/messages"))
            .and(body_json(serde_json::json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "m-9",
                "senderId": "u-1",
                "content": "hello",
                "createdAt": "2026-10-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestChatClient::new(server.uri());
        let message = client.send_message("r-1", "hello").await.unwrap();

        assert_eq!(message.id.as_deref(), Some("m-9"));
        assert_eq!(message.sender_id(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_mark_room_read_ignores_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/chat/rooms/r-1/read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestChatClient::new(server.uri());
        client.mark_room_messages_as_read("r-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/rooms/r-1/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = RestChatClient::new(server.uri());
        let err = client.get_room_messages("r-1").await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = RestChatClient::new(server.uri());
        let err = client.get_all_users().await.unwrap_err();

        assert!(matches!(err, ChatApiError::Parse(_)));
    }
}
