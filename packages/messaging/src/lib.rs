//! Thread reconciliation for marketplace messaging.
//!
//! Admins, vendors and event hosts each see a list of conversation threads.
//! That list is kept current from two producers: periodic REST snapshots
//! (`chat_client::ChatApi`) and a push channel delivering new messages as
//! they happen. The hub merges both into one consistent view.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chat_client::RestChatClient;
//! use messaging::{CurrentUser, HubConfig, MessagingHub, MessagingSession, WebSocketPushChannel};
//!
//! let config = HubConfig::from_env()?;
//! let api = Arc::new(RestChatClient::from_env()?);
//! let hub = MessagingHub::new(api, CurrentUser::new("u-1", "Ada", "Admin"), config.clone());
//!
//! let push = config
//!     .socket_url
//!     .as_ref()
//!     .map(|url| Arc::new(WebSocketPushChannel::new(url)) as Arc<dyn messaging::PushChannel>);
//! let mut session = MessagingSession::start(hub, push).await;
//!
//! for thread in session.hub().threads().await {
//!     println!("{} ({} unread)", thread.participant_name, thread.unread_count);
//! }
//! session.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - [`hub`] - The reconciler and its operations
//! - [`store`] - Thread state and snapshot/push merging
//! - [`normalize`] - REST rooms and messages to threads
//! - [`push`] - Push channel trait and WebSocket implementation
//! - [`session`] - Background polling and push listening
//! - [`drafts`] - Debounced draft autosave
//! - `testing` - Mock push channel for tests (`testing` feature)

pub mod config;
pub mod drafts;
pub mod error;
pub mod events;
pub mod hub;
pub mod normalize;
pub mod push;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use config::{HubConfig, Role};
pub use drafts::{DraftAutosaver, DraftConfig, DraftStatus, DraftStore};
pub use error::{BoxError, MessagingError, Result};
pub use events::{HubEvent, HubEvents, Notice, NoticeLevel};
pub use hub::MessagingHub;
pub use push::{NewMessageEvent, PushChannel, PushConnection, PushSubscription, WebSocketPushChannel};
pub use session::MessagingSession;
pub use store::{PushOutcome, SnapshotOutcome, ThreadStore};
pub use types::{CurrentUser, Freshness, Message, ParticipantType, Thread};
