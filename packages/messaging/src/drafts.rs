//! Debounced autosave for order drafts.
//!
//! Edits arrive faster than they should be persisted. [`DraftAutosaver`]
//! keeps only the latest draft, saves it once the edits pause, and retries
//! failed saves with exponential backoff. A draft whose save failed stays
//! dirty until the next update or [`DraftAutosaver::flush`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{BoxError, MessagingError, Result};
use crate::events::{HubEvents, Notice};

/// Where drafts are persisted.
#[async_trait]
pub trait DraftStore<T>: Send + Sync {
    async fn save(&self, draft: &T) -> std::result::Result<(), BoxError>;
}

#[derive(Debug, Clone)]
pub struct DraftConfig {
    /// Quiet period after the last update before saving.
    pub debounce: Duration,
    /// Delay before the first retry; doubles each retry.
    pub retry_base: Duration,
    /// Total save attempts, including the first.
    pub max_attempts: u32,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            retry_base: Duration::from_millis(500),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftStatus {
    Idle,
    /// Updated, waiting for the debounce to expire.
    Pending,
    Saving,
    Saved,
    Failed(String),
}

enum Command<T> {
    Update(T),
    Flush(oneshot::Sender<Result<()>>),
}

/// Handle to a background autosave task.
pub struct DraftAutosaver<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    status: watch::Receiver<DraftStatus>,
    task: JoinHandle<()>,
}

impl<T> DraftAutosaver<T>
where
    T: Send + Sync + 'static,
{
    pub fn spawn(store: Arc<dyn DraftStore<T>>, config: DraftConfig) -> Self {
        Self::start(store, config, None)
    }

    /// Like [`spawn`](Self::spawn), also emitting an error notice when a save
    /// gives up.
    pub fn with_notices(store: Arc<dyn DraftStore<T>>, config: DraftConfig, events: HubEvents) -> Self {
        Self::start(store, config, Some(events))
    }

    fn start(store: Arc<dyn DraftStore<T>>, config: DraftConfig, events: Option<HubEvents>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(DraftStatus::Idle);
        let worker = Worker {
            store,
            config,
            status: status_tx,
            events,
        };
        let task = tokio::spawn(worker.run(rx));
        Self { tx, status, task }
    }

    /// Record the latest draft and restart the debounce.
    pub fn update(&self, draft: T) -> Result<()> {
        self.tx
            .send(Command::Update(draft))
            .map_err(|_| MessagingError::Closed)
    }

    /// Save the pending draft now. Returns `Ok` if nothing was pending.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| MessagingError::Closed)?;
        rx.await.map_err(|_| MessagingError::Closed)?
    }

    pub fn status(&self) -> DraftStatus {
        self.status.borrow().clone()
    }

    /// Status changes as they happen.
    pub fn watch(&self) -> watch::Receiver<DraftStatus> {
        self.status.clone()
    }

    /// Save anything pending and stop the task.
    pub async fn close(self) {
        let Self { tx, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(error = %e, "Draft autosave task ended abnormally");
        }
    }
}

struct Worker<T> {
    store: Arc<dyn DraftStore<T>>,
    config: DraftConfig,
    status: watch::Sender<DraftStatus>,
    events: Option<HubEvents>,
}

impl<T> Worker<T>
where
    T: Send + Sync + 'static,
{
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command<T>>) {
        let mut pending: Option<T> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            let command = match deadline {
                Some(at) => tokio::select! {
                    command = rx.recv() => command,
                    _ = sleep_until(at) => {
                        deadline = None;
                        if let Some(draft) = pending.take() {
                            pending = self.save(draft).await.err().map(|(draft, _)| draft);
                        }
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            match command {
                Some(Command::Update(draft)) => {
                    pending = Some(draft);
                    deadline = Some(Instant::now() + self.config.debounce);
                    self.status.send_replace(DraftStatus::Pending);
                }
                Some(Command::Flush(reply)) => {
                    deadline = None;
                    let result = match pending.take() {
                        Some(draft) => match self.save(draft).await {
                            Ok(()) => Ok(()),
                            Err((draft, e)) => {
                                pending = Some(draft);
                                Err(e)
                            }
                        },
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                None => {
                    if let Some(draft) = pending.take() {
                        let _ = self.save(draft).await;
                    }
                    break;
                }
            }
        }
        debug!("Draft autosave stopped");
    }

    /// Save with retries. On final failure hands the draft back.
    async fn save(&self, draft: T) -> std::result::Result<(), (T, MessagingError)> {
        self.status.send_replace(DraftStatus::Saving);
        let mut delay = self.config.retry_base;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.save(&draft).await {
                Ok(()) => {
                    debug!(attempt, "Draft saved");
                    self.status.send_replace(DraftStatus::Saved);
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_attempts => {
                    warn!(attempt, retry_in_ms = delay.as_millis(), error = %e, "Draft save failed, retrying");
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Draft save failed, giving up");
                    self.status.send_replace(DraftStatus::Failed(e.to_string()));
                    if let Some(events) = &self.events {
                        events.notify(Notice::error("Failed to save draft"));
                    }
                    return Err((
                        draft,
                        MessagingError::Draft {
                            attempts: attempt,
                            source: e,
                        },
                    ));
                }
            }
        }
    }
}
