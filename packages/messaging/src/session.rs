//! Owned lifetime of one user's messaging connection.
//!
//! A session wraps a [`MessagingHub`] with its background work: the polling
//! task and, when available, the push listener. Polling runs regardless of
//! push state. Dropping the session cancels its tasks; [`MessagingSession::shutdown`]
//! also disconnects the push channel and waits for the tasks to finish.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::MessagingHub;
use crate::push::PushChannel;

pub struct MessagingSession {
    hub: MessagingHub,
    push: Option<Arc<dyn PushChannel>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MessagingSession {
    /// Load the initial thread list and start background work.
    ///
    /// A failed initial load is logged and noticed by the hub; the poller
    /// retries on its schedule. A push channel that cannot connect leaves the
    /// session polling only.
    pub async fn start(hub: MessagingHub, push: Option<Arc<dyn PushChannel>>) -> Self {
        let cancel = CancellationToken::new();

        if let Err(e) = hub.fetch_chat_rooms(true).await {
            warn!(error = %e, "Initial chat room load failed");
        }

        let mut tasks = vec![spawn_poller(hub.clone(), cancel.clone())];

        let push = match push {
            Some(channel) => match connect_push(&hub, channel.as_ref(), cancel.clone()).await {
                Some(listener) => {
                    tasks.push(listener);
                    Some(channel)
                }
                None => None,
            },
            None => {
                debug!("No push channel configured, polling only");
                None
            }
        };

        info!(
            user_id = %hub.user().id,
            role = hub.config().role.as_str(),
            push = push.is_some(),
            "Messaging session started"
        );

        Self {
            hub,
            push,
            cancel,
            tasks,
        }
    }

    pub fn hub(&self) -> &MessagingHub {
        &self.hub
    }

    pub fn is_push_connected(&self) -> bool {
        self.push.as_ref().is_some_and(|p| p.is_connected())
    }

    /// Stop all background work. No hub updates happen after this returns.
    pub async fn shutdown(&mut self) {
        self.hub.close();
        self.cancel.cancel();

        if let Some(push) = self.push.take() {
            push.off_new_message();
            push.disconnect().await;
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Messaging task ended abnormally");
            }
        }
        info!(user_id = %self.hub.user().id, "Messaging session stopped");
    }
}

impl Drop for MessagingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_poller(hub: MessagingHub, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = hub.config().poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = hub.fetch_chat_rooms(false) => {
                            if let Err(e) = result {
                                debug!(error = %e, "Scheduled refresh failed");
                            }
                        }
                    }
                }
            }
        }
        debug!("Poller stopped");
    })
}

/// Subscribe, then connect. Returns the listener task on success.
async fn connect_push(
    hub: &MessagingHub,
    channel: &dyn PushChannel,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let mut subscription = channel.on_new_message();

    match channel.connect(&hub.user().id).await {
        Ok(Some(connection)) => {
            info!(endpoint = %connection.endpoint, "Push channel connected");
        }
        Ok(None) => {
            warn!("Push channel declined connection, polling only");
            channel.off_new_message();
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Push channel connection failed, polling only");
            channel.off_new_message();
            return None;
        }
    }

    let hub = hub.clone();
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => {
                        hub.handle_push(event).await;
                    }
                    None => {
                        info!("Push channel closed, continuing with polling");
                        break;
                    }
                }
            }
        }
        debug!("Push listener stopped");
    }))
}
