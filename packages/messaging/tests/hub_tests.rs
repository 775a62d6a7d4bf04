//! Integration tests for the messaging hub and session.
//!
//! The hub runs against `MockChatApi`, an in-memory chat backend, and
//! `MockPushChannel` for push delivery.

use std::sync::Arc;
use std::time::Duration;

use chat_client::testing::{at_minute, direct_room, message, user, MockChatApi, MockChatCall, MockChatOp};
use chat_client::{ChatApi, Room};
use messaging::testing::{ConnectBehavior, MockPushCall, MockPushChannel};
use messaging::{
    CurrentUser, HubConfig, HubEvent, MessagingError, MessagingHub, MessagingSession,
    NewMessageEvent, Notice, ParticipantType, PushChannel, PushOutcome, Role,
};

fn current_user() -> CurrentUser {
    CurrentUser::new("u-1", "Ada", "Admin").with_email("ada@example.com")
}

/// Thread A: three unread messages from Sam. Thread B: one read message from Kim.
fn backend() -> MockChatApi {
    let me = user("u-1", "Ada", "Admin", "admin");
    let sam = user("u-2", "Sam", "Lee", "vendor");
    let kim = user("u-3", "Kim", "Park", "host");

    MockChatApi::new("u-1")
        .with_user(me.clone())
        .with_user(sam.clone())
        .with_user(kim.clone())
        .with_room(
            direct_room("A", &me, &sam),
            vec![
                message("a1", "u-2", "Is the venue confirmed?", 1, false),
                message("a2", "u-2", "We need the load-in time", 2, false),
                message("a3", "u-2", "Any update?", 3, false),
            ],
        )
        .with_room(
            direct_room("B", &me, &kim),
            vec![message("b1", "u-3", "Thanks!", 4, true)],
        )
}

fn hub_for(api: &MockChatApi) -> MessagingHub {
    MessagingHub::new(
        Arc::new(api.clone()),
        current_user(),
        HubConfig::for_role(Role::Admin),
    )
}

async fn loaded_hub(api: &MockChatApi) -> MessagingHub {
    let hub = hub_for(api);
    assert!(hub.fetch_chat_rooms(true).await.unwrap());
    hub
}

fn push_event(room_id: &str, message_id: Option<&str>, sender_id: &str, content: &str) -> NewMessageEvent {
    NewMessageEvent {
        room_id: room_id.to_string(),
        message_id: message_id.map(String::from),
        sender_id: sender_id.to_string(),
        sender_name: None,
        content: content.to_string(),
        created_at: at_minute(30),
    }
}

fn room_listings(api: &MockChatApi) -> usize {
    api.count_calls(|c| matches!(c, MockChatCall::GetUserRooms))
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_fetch_builds_threads_from_rooms() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    let threads = hub.threads().await;
    assert_eq!(threads.len(), 2);

    let a = hub.thread("A").await.unwrap();
    assert_eq!(a.participant_name, "Sam Lee");
    assert_eq!(a.participant_type, ParticipantType::Vendor);
    assert_eq!(a.unread_count, 3);
    assert_eq!(a.last_message, "Any update?");

    let b = hub.thread("B").await.unwrap();
    assert_eq!(b.participant_type, ParticipantType::Host);
    assert_eq!(b.unread_count, 0);
    assert_eq!(hub.total_unread().await, 3);
}

#[tokio::test]
async fn test_repeated_forced_fetches_are_identical() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let first = hub.threads().await;

    assert!(hub.fetch_chat_rooms(true).await.unwrap());
    assert_eq!(hub.threads().await, first);
}

#[tokio::test(start_paused = true)]
async fn test_cache_window_allows_one_cycle() {
    let api = backend();
    let hub = hub_for(&api);

    assert!(hub.fetch_chat_rooms(false).await.unwrap());
    assert!(!hub.fetch_chat_rooms(false).await.unwrap());
    assert_eq!(room_listings(&api), 1);

    // Forced refreshes ignore the window.
    assert!(hub.fetch_chat_rooms(true).await.unwrap());
    assert_eq!(room_listings(&api), 2);

    tokio::time::advance(Duration::from_millis(2001)).await;
    assert!(hub.fetch_chat_rooms(false).await.unwrap());
    assert_eq!(room_listings(&api), 3);
}

#[tokio::test]
async fn test_refresh_failure_keeps_threads_and_notifies() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let before = hub.threads().await;
    let mut events = hub.subscribe();

    api.fail(MockChatOp::GetUserRooms);
    let err = hub.fetch_chat_rooms(true).await.unwrap_err();

    assert!(matches!(err, MessagingError::Api(_)));
    assert_eq!(hub.threads().await, before);
    assert_eq!(
        events.try_recv().unwrap(),
        HubEvent::Notice(Notice::error("Failed to load conversations"))
    );
    assert!(!hub.is_refreshing());

    api.recover(MockChatOp::GetUserRooms);
    assert!(hub.fetch_chat_rooms(true).await.unwrap());
    assert_eq!(hub.threads().await, before);
}

#[tokio::test]
async fn test_refresh_picks_up_backend_messages() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    api.push_message("B", message("b2", "u-3", "See you Friday", 5, false));
    assert!(hub.fetch_chat_rooms(true).await.unwrap());

    let b = hub.thread("B").await.unwrap();
    assert_eq!(b.last_message, "See you Friday");
    assert_eq!(b.unread_count, 1);
    assert_eq!(hub.total_unread().await, 4);
}

#[tokio::test]
async fn test_failed_room_messages_keep_previous_messages() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    api.fail(MockChatOp::GetRoomMessages);
    assert!(hub.fetch_chat_rooms(true).await.unwrap());

    let a = hub.thread("A").await.unwrap();
    assert_eq!(a.messages.len(), 3);
    assert_eq!(a.unread_count, 3);
}

#[tokio::test]
async fn test_directory_loaded_once_for_legacy_rooms() {
    let sam = user("u-2", "Sam", "Lee", "vendor");
    let legacy = Room {
        id: "L".to_string(),
        name: Some("Ada Admin & Sam Lee".to_string()),
        ..Default::default()
    };
    let api = MockChatApi::new("u-1").with_user(sam).with_room(legacy, vec![]);
    let hub = loaded_hub(&api).await;
    hub.fetch_chat_rooms(true).await.unwrap();

    let thread = hub.thread("L").await.unwrap();
    assert_eq!(thread.participant_name, "Sam Lee");
    assert_eq!(thread.participant_type, ParticipantType::Vendor);
    assert_eq!(api.count_calls(|c| matches!(c, MockChatCall::GetAllUsers)), 1);
}

#[tokio::test]
async fn test_directory_failure_yields_unknown_user() {
    let legacy = Room {
        id: "L".to_string(),
        ..Default::default()
    };
    let api = MockChatApi::new("u-1").with_room(legacy, vec![]);
    api.fail(MockChatOp::GetAllUsers);
    let hub = loaded_hub(&api).await;

    assert_eq!(hub.thread("L").await.unwrap().participant_name, "Unknown User");
}

#[tokio::test]
async fn test_load_users_reports_failure_and_caches_success() {
    let api = backend();
    let hub = hub_for(&api);

    api.fail(MockChatOp::GetAllUsers);
    assert!(matches!(hub.load_users().await, Err(MessagingError::Api(_))));
    assert!(hub.users().await.is_empty());

    api.recover(MockChatOp::GetAllUsers);
    assert_eq!(hub.load_users().await.unwrap().len(), 3);
    assert_eq!(hub.users().await.len(), 3);
    assert_eq!(api.count_calls(|c| matches!(c, MockChatCall::GetAllUsers)), 3);
}

// ============================================================================
// Read state
// ============================================================================

#[tokio::test]
async fn test_mark_as_read_only_touches_that_thread() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let b_before = hub.thread("B").await.unwrap();

    hub.mark_as_read("A").await.unwrap();

    let a = hub.thread("A").await.unwrap();
    assert_eq!(a.unread_count, 0);
    assert!(a.messages.iter().all(|m| m.read));
    assert_eq!(hub.thread("B").await.unwrap(), b_before);
    assert_eq!(
        api.count_calls(|c| matches!(c, MockChatCall::MarkRoomRead { room_id } if room_id == "A")),
        1
    );
}

#[tokio::test]
async fn test_mark_as_read_is_idempotent() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    hub.mark_as_read("A").await.unwrap();
    let once = hub.threads().await;
    hub.mark_as_read("A").await.unwrap();

    assert_eq!(hub.threads().await, once);
}

#[tokio::test]
async fn test_mark_as_read_failure_leaves_state() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    api.fail(MockChatOp::MarkRoomRead);
    assert!(hub.mark_as_read("A").await.is_err());
    assert_eq!(hub.thread("A").await.unwrap().unread_count, 3);
}

#[tokio::test]
async fn test_mark_single_message_read() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    hub.mark_message_as_read("A", "a2").await.unwrap();

    assert_eq!(hub.thread("A").await.unwrap().unread_count, 2);
    assert!(api.stored_messages("A").iter().any(|m| m.id.as_deref() == Some("a2") && m.read));
}

// ============================================================================
// Sending
// ============================================================================

#[tokio::test]
async fn test_blank_message_is_rejected_without_calling_api() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let before = hub.thread("A").await.unwrap();
    api.clear_calls();

    let err = hub.send_message("A", "   ").await.unwrap_err();

    assert!(matches!(err, MessagingError::EmptyMessage));
    assert!(api.calls().is_empty());
    assert_eq!(hub.thread("A").await.unwrap(), before);
}

#[tokio::test]
async fn test_send_appends_once() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    let sent = hub.send_message("A", "  Load-in is at 3pm ").await.unwrap();
    assert_eq!(sent.content, "Load-in is at 3pm");
    assert_eq!(sent.sender_name, "Ada Admin");

    let a = hub.thread("A").await.unwrap();
    assert_eq!(a.messages.len(), 4);
    assert_eq!(a.messages.last().unwrap().id, sent.id);
    assert_eq!(a.unread_count, 3);
    assert_eq!(a.last_message, "Load-in is at 3pm");

    // The push echo and the next snapshot both carry the same id.
    let echo = push_event("A", Some(&sent.id), "u-1", "Load-in is at 3pm");
    assert_eq!(hub.handle_push(echo).await, PushOutcome::Duplicate);
    hub.fetch_chat_rooms(true).await.unwrap();

    let a = hub.thread("A").await.unwrap();
    assert_eq!(a.messages.len(), 4);
    assert_eq!(a.messages.iter().filter(|m| m.id == sent.id).count(), 1);
}

#[tokio::test]
async fn test_send_without_server_id_is_replaced_by_snapshot() {
    let api = backend().without_sent_ids();
    let hub = loaded_hub(&api).await;

    let sent = hub.send_message("A", "hello").await.unwrap();
    assert!(sent.id.starts_with("local-"));

    hub.fetch_chat_rooms(true).await.unwrap();

    let a = hub.thread("A").await.unwrap();
    let hellos: Vec<_> = a.messages.iter().filter(|m| m.content == "hello").collect();
    assert_eq!(hellos.len(), 1);
    assert!(!hellos[0].id.starts_with("local-"));
}

#[tokio::test]
async fn test_send_failure_notifies_and_appends_nothing() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let before = hub.thread("A").await.unwrap();
    let mut events = hub.subscribe();

    api.fail(MockChatOp::SendMessage);
    let err = hub.send_message("A", "hello").await.unwrap_err();

    assert!(matches!(err, MessagingError::Api(_)));
    assert_eq!(hub.thread("A").await.unwrap(), before);
    assert_eq!(
        events.try_recv().unwrap(),
        HubEvent::Notice(Notice::error("Failed to send message"))
    );
}

#[tokio::test]
async fn test_send_to_unknown_thread() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    let err = hub.send_message("Z", "hello").await.unwrap_err();
    assert!(matches!(err, MessagingError::ThreadNotFound { thread_id } if thread_id == "Z"));
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_push_from_other_counts_unread() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let mut events = hub.subscribe();

    let outcome = hub.handle_push(push_event("B", Some("p-1"), "u-3", "See you there")).await;

    assert!(matches!(outcome, PushOutcome::Appended { counted_unread: true, .. }));
    let b = hub.thread("B").await.unwrap();
    assert_eq!(b.unread_count, 1);
    assert_eq!(b.last_message, "See you there");
    assert_eq!(events.try_recv().unwrap(), HubEvent::ThreadsChanged);
    assert_eq!(
        events.try_recv().unwrap(),
        HubEvent::MessageReceived { thread_id: "B".to_string() }
    );
}

#[tokio::test]
async fn test_self_push_never_counts_unread() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    hub.handle_push(push_event("B", Some("p-1"), "u-1", "from my phone")).await;

    assert_eq!(hub.thread("B").await.unwrap().unread_count, 0);
}

#[tokio::test]
async fn test_push_during_refresh_survives() {
    let api = backend();
    let hub = loaded_hub(&api).await;

    let gate = api.hold_room_listing();
    let refreshing = hub.clone();
    let refresh = tokio::spawn(async move { refreshing.fetch_chat_rooms(true).await });
    gate.wait_entered().await;

    assert!(hub.is_refreshing());
    assert!(!hub.fetch_chat_rooms(false).await.unwrap());

    let outcome = hub.handle_push(push_event("A", Some("p-1"), "u-2", "Hello?")).await;
    assert!(matches!(outcome, PushOutcome::Appended { .. }));

    gate.release();
    assert!(refresh.await.unwrap().unwrap());

    let a = hub.thread("A").await.unwrap();
    assert!(a.messages.iter().any(|m| m.id == "p-1"));
    assert_eq!(a.unread_count, 4);
}

#[tokio::test]
async fn test_push_for_unknown_room_refreshes() {
    let dana = user("u-4", "Dana", "Cole", "vendor");
    let api = backend().with_user(dana);
    let hub = loaded_hub(&api).await;

    // Conversation opened from another client.
    let room = api.start_chat("u-4").await.unwrap();
    let outcome = hub.handle_push(push_event(&room.id, Some("p-1"), "u-4", "Hi!")).await;

    assert_eq!(outcome, PushOutcome::UnknownThread);
    assert_eq!(hub.thread(&room.id).await.unwrap().participant_name, "Dana Cole");
    assert_eq!(room_listings(&api), 2);
}

#[tokio::test]
async fn test_unknown_room_push_during_refresh_is_not_lost() {
    let dana = user("u-4", "Dana", "Cole", "vendor");
    let api = backend().with_user(dana);
    let hub = loaded_hub(&api).await;

    let gate = api.hold_room_listing();
    let refreshing = hub.clone();
    let refresh = tokio::spawn(async move { refreshing.fetch_chat_rooms(true).await });
    gate.wait_entered().await;

    // The parked listing was taken before this room existed.
    let room = api.start_chat("u-4").await.unwrap();
    let outcome = hub.handle_push(push_event(&room.id, Some("p-1"), "u-4", "Hi!")).await;
    assert_eq!(outcome, PushOutcome::UnknownThread);
    assert!(hub.thread(&room.id).await.is_none());

    gate.release();
    assert!(refresh.await.unwrap().unwrap());

    assert_eq!(hub.thread(&room.id).await.unwrap().participant_name, "Dana Cole");
    assert_eq!(room_listings(&api), 3);
    assert!(!hub.is_refreshing());
}

#[tokio::test]
async fn test_plain_fetch_during_refresh_is_not_queued() {
    let api = backend();
    let hub = hub_for(&api);

    let gate = api.hold_room_listing();
    let refreshing = hub.clone();
    let refresh = tokio::spawn(async move { refreshing.fetch_chat_rooms(true).await });
    gate.wait_entered().await;

    assert!(!hub.fetch_chat_rooms(false).await.unwrap());
    gate.release();
    assert!(refresh.await.unwrap().unwrap());
    assert_eq!(room_listings(&api), 1);
}

// ============================================================================
// Starting conversations
// ============================================================================

#[tokio::test]
async fn test_start_chat_adds_thread_once() {
    let dana = user("u-4", "Dana", "Cole", "vendor");
    let api = backend().with_user(dana);
    let hub = loaded_hub(&api).await;

    let thread_id = hub.start_chat("u-4").await.unwrap();

    let thread = hub.thread(&thread_id).await.unwrap();
    assert_eq!(thread.participant_name, "Dana Cole");
    assert_eq!(hub.threads().await.len(), 3);

    assert_eq!(hub.start_chat("u-4").await.unwrap(), thread_id);
    assert_eq!(hub.threads().await.len(), 3);
}

#[tokio::test]
async fn test_start_chat_failure_notifies() {
    let api = backend();
    let hub = loaded_hub(&api).await;
    let mut events = hub.subscribe();

    api.fail(MockChatOp::StartChat);
    assert!(hub.start_chat("u-9").await.is_err());
    assert_eq!(
        events.try_recv().unwrap(),
        HubEvent::Notice(Notice::error("Failed to start conversation"))
    );
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_polls_without_push() {
    let api = backend();
    let mut session = MessagingSession::start(hub_for(&api), None).await;

    assert_eq!(session.hub().threads().await.len(), 2);
    assert_eq!(room_listings(&api), 1);
    assert!(!session.is_push_connected());

    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(room_listings(&api), 2);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_falls_back_when_push_declined() {
    let api = backend();
    let push = MockPushChannel::new().with_behavior(ConnectBehavior::Decline);
    let channel: Arc<dyn PushChannel> = Arc::new(push.clone());

    let mut session = MessagingSession::start(hub_for(&api), Some(channel)).await;

    assert!(!session.is_push_connected());
    assert!(push.calls().contains(&MockPushCall::OffNewMessage));

    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(room_listings(&api), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn test_session_falls_back_when_push_fails() {
    let api = backend();
    let push = MockPushChannel::new().with_behavior(ConnectBehavior::Fail("refused".into()));

    let mut session = MessagingSession::start(hub_for(&api), Some(Arc::new(push))).await;

    assert!(!session.is_push_connected());
    assert_eq!(session.hub().threads().await.len(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn test_session_delivers_push_events() {
    let api = backend();
    let push = MockPushChannel::new();
    let mut session = MessagingSession::start(hub_for(&api), Some(Arc::new(push.clone()))).await;
    assert!(session.is_push_connected());
    assert!(push.calls().contains(&MockPushCall::Connect { user_id: "u-1".into() }));

    let mut events = session.hub().subscribe();
    assert!(push.emit(push_event("A", Some("p-1"), "u-2", "Still there?")));

    let received = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(HubEvent::MessageReceived { thread_id }) = events.recv().await {
                return thread_id;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(received, "A");
    assert_eq!(session.hub().thread("A").await.unwrap().unread_count, 4);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_keeps_polling_after_push_drops() {
    let api = backend();
    let push = MockPushChannel::new();
    let mut session = MessagingSession::start(hub_for(&api), Some(Arc::new(push.clone()))).await;
    assert!(session.is_push_connected());

    push.drop_connection();
    assert!(!session.is_push_connected());
    assert!(!push.emit(push_event("A", Some("p-1"), "u-2", "lost")));

    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(room_listings(&api), 2);
    assert_eq!(session.hub().thread("A").await.unwrap().messages.len(), 3);

    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_updates() {
    let api = backend();
    let push = MockPushChannel::new();
    let mut session = MessagingSession::start(hub_for(&api), Some(Arc::new(push.clone()))).await;
    let hub = session.hub().clone();

    session.shutdown().await;

    assert!(hub.is_closed());
    assert!(push.calls().contains(&MockPushCall::Disconnect));
    assert!(!push.emit(push_event("A", Some("p-1"), "u-2", "late")));

    hub.handle_push(push_event("A", Some("p-2"), "u-2", "late")).await;
    assert!(!hub.fetch_chat_rooms(true).await.unwrap());
    assert_eq!(hub.thread("A").await.unwrap().messages.len(), 3);
}
