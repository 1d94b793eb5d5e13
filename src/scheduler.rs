//! Deferred match retries
//!
//! A waiting user with no compatible partner is re-matched after a delay.
//! The `Scheduler` trait is the seam; `TokioScheduler` turns each retry into
//! a `ServerCommand::RetryMatch` sent back to the server actor.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::server::ServerCommand;
use crate::types::{Ticket, UserId};

/// Schedules and cancels deferred match retries
pub trait Scheduler: Send + Sync {
    /// Retry matching `user`'s entry `ticket` after `delay`
    ///
    /// Replaces any retry already pending for the user.
    fn after(&self, delay: Duration, user: UserId, ticket: Ticket);

    /// Drop the pending retry for `user`, if any
    fn cancel(&self, user: UserId);
}

/// Timer-task scheduler feeding the server actor
///
/// Holds only a weak sender so pending timers never keep the actor alive.
#[derive(Debug)]
pub struct TokioScheduler {
    commands: mpsc::WeakSender<ServerCommand>,
    pending: Mutex<HashMap<UserId, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(commands: &mpsc::Sender<ServerCommand>) -> Self {
        Self {
            commands: commands.downgrade(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of retries not yet fired or cancelled
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .map(|pending| pending.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, user: UserId, ticket: Ticket) {
        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(commands) = commands.upgrade() else {
                return;
            };
            if commands
                .send(ServerCommand::RetryMatch { user, ticket })
                .await
                .is_err()
            {
                debug!("Server closed, dropping retry for {}", user);
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.insert(user, handle) {
                previous.abort();
            }
        }
    }

    fn cancel(&self, user: UserId) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.remove(&user) {
                handle.abort();
                debug!("Cancelled retry for {}", user);
            }
        }
    }
}
