//! The messaging hub: one user's reconciled view of their conversations.
//!
//! The hub owns the [`ThreadStore`] and is the only writer to it. Four sources
//! drive it concurrently: the polling task, focus/visibility triggers
//! ([`MessagingHub::on_focus`]), the push listener and user actions. Store
//! mutations are single write-lock sections; network calls never run under
//! the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_client::{ChatApi, UserProfile};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::{MessagingError, Result};
use crate::events::{HubEvent, HubEvents, Notice};
use crate::normalize::{needs_directory, thread_from_room};
use crate::push::NewMessageEvent;
use crate::store::{PushOutcome, SnapshotOutcome, ThreadStore};
use crate::types::{CurrentUser, Freshness, Message, Thread};

/// Clears the fetch-in-progress flag when a refresh ends, however it ends.
struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct HubInner {
    api: Arc<dyn ChatApi>,
    user: CurrentUser,
    config: HubConfig,
    store: RwLock<ThreadStore>,
    directory: Mutex<Option<Vec<UserProfile>>>,
    last_fetch: Mutex<Option<Instant>>,
    fetching: AtomicBool,
    /// A forced refresh arrived while one was running.
    rerun: AtomicBool,
    closed: AtomicBool,
    events: HubEvents,
}

/// Reconciles REST snapshots and push events into a thread list.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MessagingHub {
    inner: Arc<HubInner>,
}

impl MessagingHub {
    pub fn new(api: Arc<dyn ChatApi>, user: CurrentUser, config: HubConfig) -> Self {
        let events = HubEvents::with_capacity(config.event_capacity);
        Self {
            inner: Arc::new(HubInner {
                api,
                store: RwLock::new(ThreadStore::new(user.clone())),
                user,
                config,
                directory: Mutex::new(None),
                last_fetch: Mutex::new(None),
                fetching: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn user(&self) -> &CurrentUser {
        &self.inner.user
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Subscribe to thread changes and notices.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn events(&self) -> &HubEvents {
        &self.inner.events
    }

    pub async fn threads(&self) -> Vec<Thread> {
        self.inner.store.read().await.threads()
    }

    /// Look up a thread by id or nested room id.
    pub async fn thread(&self, key: &str) -> Option<Thread> {
        self.inner.store.read().await.thread(key).cloned()
    }

    pub async fn total_unread(&self) -> usize {
        self.inner.store.read().await.total_unread()
    }

    pub async fn freshness(&self) -> Freshness {
        self.inner
            .store
            .read()
            .await
            .freshness(Instant::now(), self.inner.config.cache_window)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.fetching.load(Ordering::SeqCst)
    }

    /// Stop accepting updates. Results of in-flight calls are discarded.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The user directory, loaded once and cached. A failed load is not
    /// cached.
    pub async fn load_users(&self) -> Result<Vec<UserProfile>> {
        let mut cached = self.inner.directory.lock().await;
        if let Some(users) = cached.as_ref() {
            return Ok(users.clone());
        }
        let users = self.inner.api.get_all_users().await?;
        debug!(count = users.len(), "User directory loaded");
        *cached = Some(users.clone());
        Ok(users)
    }

    /// Like [`load_users`](Self::load_users), but a failure is logged and
    /// yields an empty directory; participant resolution then falls back to
    /// "Unknown User".
    pub async fn users(&self) -> Vec<UserProfile> {
        match self.load_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Failed to load user directory");
                Vec::new()
            }
        }
    }

    async fn room_id_of(&self, thread_id: &str) -> Result<String> {
        self.inner
            .store
            .read()
            .await
            .thread(thread_id)
            .map(|t| t.room_id.clone())
            .ok_or_else(|| MessagingError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Reload every room and merge the result.
    ///
    /// Without `force`, does nothing if a refresh started within the cache
    /// window. If a refresh is already running, a plain call does nothing and
    /// a forced call is queued: the running refresh does one more cycle once
    /// its current one ends. Returns whether a network cycle ran in this call.
    pub async fn fetch_chat_rooms(&self, force: bool) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }

        let guard = {
            let mut last_fetch = self.inner.last_fetch.lock().await;
            let now = Instant::now();
            if !force {
                if let Some(at) = *last_fetch {
                    if now.saturating_duration_since(at) < self.inner.config.cache_window {
                        debug!("Chat rooms refreshed recently, skipping");
                        return Ok(false);
                    }
                }
            }
            if self.inner.fetching.swap(true, Ordering::SeqCst) {
                if force {
                    debug!("Chat room refresh in flight, queueing another cycle");
                    self.inner.rerun.store(true, Ordering::SeqCst);
                } else {
                    debug!("Chat room refresh already in flight, skipping");
                }
                return Ok(false);
            }
            *last_fetch = Some(now);
            FetchGuard(&self.inner.fetching)
        };

        loop {
            let result = self.refresh_cycle().await;

            // `rerun` is only set under this lock; release the guard under it too.
            let mut last_fetch = self.inner.last_fetch.lock().await;
            if !self.inner.rerun.swap(false, Ordering::SeqCst) || self.is_closed() {
                drop(guard);
                return result;
            }
            debug!("Running queued chat room refresh");
            *last_fetch = Some(Instant::now());
        }
    }

    async fn refresh_cycle(&self) -> Result<bool> {
        let start = Instant::now();
        let ticket = self.inner.store.write().await.begin_snapshot();

        let threads = match self.load_snapshot().await {
            Ok(threads) => threads,
            Err(e) => {
                warn!(error = %e, "Failed to refresh chat rooms");
                self.inner
                    .events
                    .notify(Notice::error("Failed to load conversations"));
                return Err(e);
            }
        };

        if self.is_closed() {
            debug!("Hub closed during refresh, discarding snapshot");
            return Ok(false);
        }

        let thread_count = threads.len();
        let outcome = self
            .inner
            .store
            .write()
            .await
            .apply_snapshot(ticket, threads, Instant::now());
        if outcome == SnapshotOutcome::Applied {
            self.inner.events.emit(HubEvent::ThreadsChanged);
        }

        debug!(
            thread_count,
            ?outcome,
            duration_ms = start.elapsed().as_millis(),
            "Chat rooms refreshed"
        );
        Ok(true)
    }

    async fn load_snapshot(&self) -> Result<Vec<Thread>> {
        let api = &self.inner.api;
        let user = &self.inner.user;

        let rooms = api.get_user_rooms().await?;
        let directory = if rooms.iter().any(|room| needs_directory(room, user)) {
            self.users().await
        } else {
            Vec::new()
        };

        // One call per room; room counts are small.
        let results = join_all(rooms.iter().map(|room| api.get_room_messages(room.api_id()))).await;

        let mut threads = Vec::with_capacity(rooms.len());
        for (room, result) in rooms.iter().zip(results) {
            match result {
                Ok(messages) => threads.push(thread_from_room(room, messages, user, &directory)),
                Err(e) => {
                    warn!(room_id = %room.api_id(), error = %e, "Failed to load room messages, keeping previous");
                    let mut thread = thread_from_room(room, Vec::new(), user, &directory);
                    if let Some(existing) = self.inner.store.read().await.thread(&room.id) {
                        thread.messages = existing.messages.clone();
                    }
                    thread.recount(&user.id);
                    threads.push(thread);
                }
            }
        }
        Ok(threads)
    }

    /// Focus/visibility regained: refresh regardless of the cache window.
    pub async fn on_focus(&self) -> bool {
        self.fetch_chat_rooms(true).await.unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Send a message and append it locally once the API accepts it.
    ///
    /// Blank content is rejected before any network call.
    pub async fn send_message(&self, thread_id: &str, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }
        if self.is_closed() {
            return Err(MessagingError::Closed);
        }

        let room_id = self.room_id_of(thread_id).await?;
        let sent = match self.inner.api.send_message(&room_id, content).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Failed to send message");
                self.inner
                    .events
                    .notify(Notice::error("Failed to send message"));
                return Err(e.into());
            }
        };

        let user = &self.inner.user;
        let message = Message {
            id: sent
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("local-{}", Uuid::new_v4())),
            sender_id: user.id.clone(),
            sender_name: user.full_name(),
            content: if sent.content.trim().is_empty() {
                content.to_string()
            } else {
                sent.content
            },
            created_at: sent.created_at.unwrap_or_else(Utc::now),
            read: true,
            message_type: sent.message_type.unwrap_or_else(|| "text".to_string()),
        };

        let appended = self
            .inner
            .store
            .write()
            .await
            .append_optimistic(thread_id, message.clone());
        if appended {
            self.inner.events.emit(HubEvent::ThreadsChanged);
        }
        Ok(message)
    }

    /// Mark a whole thread read, locally once the API confirms.
    pub async fn mark_as_read(&self, thread_id: &str) -> Result<()> {
        let room_id = self.room_id_of(thread_id).await?;
        self.inner
            .api
            .mark_room_messages_as_read(&room_id)
            .await
            .map_err(|e| {
                warn!(room_id = %room_id, error = %e, "Failed to mark room read");
                e
            })?;

        if self.inner.store.write().await.mark_thread_read(thread_id) {
            self.inner.events.emit(HubEvent::ThreadsChanged);
        }
        Ok(())
    }

    /// Mark one message read.
    pub async fn mark_message_as_read(&self, thread_id: &str, message_id: &str) -> Result<()> {
        self.room_id_of(thread_id).await?;
        self.inner
            .api
            .mark_message_as_read(message_id)
            .await
            .map_err(|e| {
                warn!(message_id, error = %e, "Failed to mark message read");
                e
            })?;

        if self
            .inner
            .store
            .write()
            .await
            .mark_message_read(thread_id, message_id)
        {
            self.inner.events.emit(HubEvent::ThreadsChanged);
        }
        Ok(())
    }

    /// Open a conversation with another user. Returns the thread id.
    pub async fn start_chat(&self, other_user_id: &str) -> Result<String> {
        let api = &self.inner.api;
        let user = &self.inner.user;

        let room = api.start_chat(other_user_id).await.map_err(|e| {
            warn!(other_user_id, error = %e, "Failed to start chat");
            self.inner
                .events
                .notify(Notice::error("Failed to start conversation"));
            e
        })?;

        let messages = match api.get_room_messages(room.api_id()).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room_id = %room.api_id(), error = %e, "Failed to load new room messages");
                Vec::new()
            }
        };
        let directory = if needs_directory(&room, user) {
            self.users().await
        } else {
            Vec::new()
        };

        let thread = thread_from_room(&room, messages, user, &directory);
        let thread_id = self.inner.store.write().await.upsert_local(thread);
        self.inner.events.emit(HubEvent::ThreadsChanged);

        info!(thread_id = %thread_id, other_user_id, "Conversation started");
        Ok(thread_id)
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Apply a push-delivered message.
    ///
    /// A message for a room we do not know about means a conversation was
    /// opened elsewhere; that triggers a forced refresh.
    pub async fn handle_push(&self, event: NewMessageEvent) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Duplicate;
        }

        let outcome = self.inner.store.write().await.apply_push(&event);
        match &outcome {
            PushOutcome::Appended { thread_id, .. } => {
                self.inner.events.emit(HubEvent::ThreadsChanged);
                self.inner.events.emit(HubEvent::MessageReceived {
                    thread_id: thread_id.clone(),
                });
            }
            PushOutcome::Duplicate => {
                debug!(room_id = %event.room_id, "Duplicate push message ignored");
            }
            PushOutcome::UnknownThread => {
                info!(room_id = %event.room_id, "Push message for unknown room, refreshing");
                if let Err(e) = self.fetch_chat_rooms(true).await {
                    debug!(error = %e, "Refresh after unknown-room push failed");
                }
            }
        }
        outcome
    }
}

impl std::fmt::Debug for MessagingHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingHub")
            .field("user_id", &self.inner.user.id)
            .field("role", &self.inner.config.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}
