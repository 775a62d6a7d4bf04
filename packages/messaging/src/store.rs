//! In-memory thread store: the reconciler's state.
//!
//! Two producers write here: full REST snapshots and incremental updates
//! (push events, optimistic sends, read flips). Every mutation takes one
//! `&mut self` call, so a caller holding the write lock applies it atomically.
//!
//! # Merging
//!
//! The store keeps a monotonic sequence number. A refresh takes a
//! [`SnapshotTicket`] before it starts fetching, and every incremental update
//! is stamped with the sequence at which it happened. When the snapshot is
//! applied:
//!
//! - a snapshot that started before the last applied one is discarded
//! - messages are merged by id: the snapshot's messages in snapshot order,
//!   followed by local messages it could not have seen (stamped after it
//!   started), in arrival order
//! - local read flips made after it started are kept
//! - threads missing from the snapshot are dropped unless they were created
//!   locally after it started
//!
//! Unread counts are always recomputed from the messages, never adjusted.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::push::NewMessageEvent;
use crate::types::{CurrentUser, Freshness, Message, Thread};

/// Issued when a refresh starts; required to apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    /// A newer snapshot was already applied.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Appended { thread_id: String, counted_unread: bool },
    /// Already present, or the echo of our own optimistic send.
    Duplicate,
    UnknownThread,
}

#[derive(Debug, Default, Clone, Copy)]
struct LocalMark {
    appended: Option<u64>,
    read: Option<u64>,
}

impl LocalMark {
    fn newer_than(&self, seq: u64) -> bool {
        self.appended.is_some_and(|s| s > seq) || self.read.is_some_and(|s| s > seq)
    }
}

#[derive(Debug)]
struct Entry {
    thread: Thread,
    /// Set for threads created locally (e.g. `start_chat`) until a snapshot
    /// includes them.
    created: Option<u64>,
    marks: HashMap<String, LocalMark>,
}

/// The reconciled thread list for one user.
#[derive(Debug)]
pub struct ThreadStore {
    user: CurrentUser,
    entries: Vec<Entry>,
    seq: u64,
    applied: Option<u64>,
    refreshed_at: Option<Instant>,
}

impl ThreadStore {
    pub fn new(user: CurrentUser) -> Self {
        Self {
            user,
            entries: Vec::new(),
            seq: 0,
            applied: None,
            refreshed_at: None,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.thread.matches(key))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn threads(&self) -> Vec<Thread> {
        self.entries.iter().map(|e| e.thread.clone()).collect()
    }

    /// Look up a thread by id or nested room id.
    pub fn thread(&self, key: &str) -> Option<&Thread> {
        self.position(key).map(|i| &self.entries[i].thread)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_unread(&self) -> usize {
        self.entries.iter().map(|e| e.thread.unread_count).sum()
    }

    pub fn freshness(&self, now: Instant, window: Duration) -> Freshness {
        match self.refreshed_at {
            None => Freshness::Unknown,
            Some(at) if now.saturating_duration_since(at) < window => Freshness::Fresh,
            Some(_) => Freshness::Stale,
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Stamp the start of a refresh.
    pub fn begin_snapshot(&mut self) -> SnapshotTicket {
        SnapshotTicket(self.next_seq())
    }

    /// Merge a full refresh into the store.
    pub fn apply_snapshot(
        &mut self,
        ticket: SnapshotTicket,
        incoming: Vec<Thread>,
        now: Instant,
    ) -> SnapshotOutcome {
        let started = ticket.0;
        if self.applied.is_some_and(|applied| applied >= started) {
            debug!(ticket = started, "Discarding stale snapshot");
            return SnapshotOutcome::Stale;
        }

        let mut previous: Vec<Option<Entry>> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(Some)
            .collect();
        let mut next = Vec::with_capacity(incoming.len());

        for mut thread in incoming {
            let prev = previous
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|e| e.thread.id == thread.id))
                .and_then(Option::take);

            let marks = match prev {
                Some(prev) => merge_thread(&mut thread, prev, started),
                None => HashMap::new(),
            };
            thread.recount(&self.user.id);
            next.push(Entry {
                thread,
                created: None,
                marks,
            });
        }

        for entry in previous.into_iter().flatten() {
            if entry.created.is_some_and(|created| created > started) {
                next.push(entry);
            } else {
                debug!(thread_id = %entry.thread.id, "Thread absent from snapshot, dropping");
            }
        }

        self.entries = next;
        self.applied = Some(started);
        self.refreshed_at = Some(now);
        SnapshotOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------

    /// Apply a push-delivered message.
    pub fn apply_push(&mut self, event: &NewMessageEvent) -> PushOutcome {
        let Some(index) = self.position(&event.room_id) else {
            return PushOutcome::UnknownThread;
        };
        let seq = self.next_seq();
        let user = &self.user;
        let entry = &mut self.entries[index];
        let from_self = event.sender_id == user.id;

        match &event.message_id {
            Some(id) if entry.thread.messages.iter().any(|m| &m.id == id) => {
                return PushOutcome::Duplicate;
            }
            None if from_self => {
                let echo = entry
                    .thread
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.sender_id == user.id)
                    .is_some_and(|m| m.content == event.content);
                if echo {
                    return PushOutcome::Duplicate;
                }
            }
            _ => {}
        }

        let sender_name = event
            .sender_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                if from_self {
                    user.full_name()
                } else {
                    entry.thread.participant_name.clone()
                }
            });
        let message = Message {
            id: event
                .message_id
                .clone()
                .unwrap_or_else(|| format!("push-{}", Uuid::new_v4())),
            sender_id: event.sender_id.clone(),
            sender_name,
            content: event.content.clone(),
            created_at: event.created_at,
            read: from_self,
            message_type: "text".to_string(),
        };

        entry.marks.entry(message.id.clone()).or_default().appended = Some(seq);
        entry.thread.messages.push(message);
        entry.thread.recount(&user.id);

        PushOutcome::Appended {
            thread_id: entry.thread.id.clone(),
            counted_unread: !from_self,
        }
    }

    /// Append a message we just sent. Returns false if the thread is unknown.
    pub fn append_optimistic(&mut self, key: &str, message: Message) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        let seq = self.next_seq();
        let entry = &mut self.entries[index];

        if !entry.thread.messages.iter().any(|m| m.id == message.id) {
            entry.marks.entry(message.id.clone()).or_default().appended = Some(seq);
            entry.thread.messages.push(message);
        }
        entry.thread.recount(&self.user.id);
        true
    }

    /// Flip every message of one thread to read and zero its counter.
    pub fn mark_thread_read(&mut self, key: &str) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        let seq = self.next_seq();
        let entry = &mut self.entries[index];

        for message in entry.thread.messages.iter_mut().filter(|m| !m.read) {
            message.read = true;
            entry.marks.entry(message.id.clone()).or_default().read = Some(seq);
        }
        entry.thread.recount(&self.user.id);
        true
    }

    /// Flip one message to read.
    pub fn mark_message_read(&mut self, key: &str, message_id: &str) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        let seq = self.next_seq();
        let entry = &mut self.entries[index];

        let Some(message) = entry.thread.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if !message.read {
            message.read = true;
            entry.marks.entry(message.id.clone()).or_default().read = Some(seq);
        }
        entry.thread.recount(&self.user.id);
        true
    }

    /// Insert a thread created locally, or return the id of the existing one.
    pub fn upsert_local(&mut self, mut thread: Thread) -> String {
        if let Some(index) = self.position(&thread.id) {
            return self.entries[index].thread.id.clone();
        }
        let seq = self.next_seq();
        thread.recount(&self.user.id);
        let id = thread.id.clone();
        self.entries.push(Entry {
            thread,
            created: Some(seq),
            marks: HashMap::new(),
        });
        id
    }
}

/// Merge the previous state of a thread into its snapshot version.
///
/// Returns the local marks that are still newer than the snapshot.
fn merge_thread(thread: &mut Thread, prev: Entry, started: u64) -> HashMap<String, LocalMark> {
    let snapshot_ids: HashSet<String> = thread.messages.iter().map(|m| m.id.clone()).collect();

    for message in thread.messages.iter_mut() {
        let read_later = prev
            .marks
            .get(&message.id)
            .and_then(|mark| mark.read)
            .is_some_and(|seq| seq > started);
        if read_later {
            message.read = true;
        }
    }

    for message in prev.thread.messages {
        if snapshot_ids.contains(&message.id) {
            continue;
        }
        let appended_later = prev
            .marks
            .get(&message.id)
            .and_then(|mark| mark.appended)
            .is_some_and(|seq| seq > started);
        if appended_later {
            thread.messages.push(message);
        }
    }

    prev.marks
        .into_iter()
        .filter(|(_, mark)| mark.newer_than(started))
        .collect()
}
