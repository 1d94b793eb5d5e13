//! Engine
//!
//! Glues the synchronous `SessionController` to its collaborators: runs a
//! transition, then carries out its effects through the `Transport` and
//! `Scheduler`. The message relay lives here because it interleaves
//! transport calls with correspondence bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::{EditPlan, Effect, RelayPlan, SessionController, Transition};
use crate::error::ChatError;
use crate::message::{InboundMessage, MessageContent, Notice};
use crate::profile::{Gender, ProfileSource, UserProfile};
use crate::scheduler::Scheduler;
use crate::transport::Transport;
use crate::types::{MessageId, Ticket, UserId};

/// Default delay between match retries for a waiting user
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Matchmaking and relay engine
pub struct Engine {
    controller: SessionController,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    profiles: Arc<dyn ProfileSource>,
    retry_interval: Duration,
}

impl Engine {
    pub fn new(
        controller: SessionController,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        profiles: Arc<dyn ProfileSource>,
    ) -> Self {
        Self {
            controller,
            transport,
            scheduler,
            profiles,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Store a profile and persist it
    pub async fn register(&mut self, user: UserId, profile: UserProfile) -> Result<(), ChatError> {
        self.surface_warning(user).await;
        let transition = self.controller.register(user, profile)?;

        if let Err(e) = self.profiles.save(user, profile).await {
            warn!("Failed to persist profile of {}: {}", user, e);
        }
        self.apply(transition).await;
        Ok(())
    }

    /// Show the user their stored profile
    pub async fn show_profile(&mut self, user: UserId) -> Result<(), ChatError> {
        self.surface_warning(user).await;
        self.load_profile(user).await;
        let profile = *self.controller.profile(user).ok_or(ChatError::NotRegistered)?;

        let notice = Notice::Profile { profile };
        if let Err(e) = self.transport.notify(user, notice).await {
            warn!("Failed to show profile to {}: {}", user, e);
        }
        Ok(())
    }

    pub async fn start(&mut self, user: UserId, filter: Option<Gender>) -> Result<(), ChatError> {
        self.surface_warning(user).await;
        self.load_profile(user).await;
        let transition = self.controller.start(user, filter)?;
        self.apply(transition).await;
        Ok(())
    }

    pub async fn stop(&mut self, user: UserId) -> Result<(), ChatError> {
        self.surface_warning(user).await;
        let transition = self.controller.stop(user)?;
        self.apply(transition).await;
        Ok(())
    }

    pub async fn next(&mut self, user: UserId) -> Result<(), ChatError> {
        self.surface_warning(user).await;
        self.load_profile(user).await;
        let transition = self.controller.next(user)?;
        self.apply(transition).await;
        Ok(())
    }

    pub async fn toggle_debug(&mut self, user: UserId) {
        self.surface_warning(user).await;
        let transition = self.controller.toggle_debug(user);
        self.apply(transition).await;
    }

    /// Deferred retry callback
    pub async fn retry_match(&mut self, user: UserId, ticket: Ticket) {
        let transition = self.controller.retry_match(user, ticket);
        self.apply(transition).await;
    }

    /// The user's connection is gone
    pub async fn disconnect(&mut self, user: UserId) {
        let transition = self.controller.disconnect(user);
        self.apply(transition).await;
    }

    /// Placeholder command surface
    pub async fn under_construction(&mut self, user: UserId) {
        self.surface_warning(user).await;
        if let Err(e) = self.transport.notify(user, Notice::UnderConstruction).await {
            warn!("Failed to notify {}: {}", user, e);
        }
    }

    /// Forward a message to the user's partner
    ///
    /// `Ok(false)` means the transport failed; nothing was recorded.
    pub async fn relay(&mut self, user: UserId, message: InboundMessage) -> Result<bool, ChatError> {
        self.surface_warning(user).await;
        let plan = self.controller.plan_relay(user, &message)?;
        Ok(self.send_planned(&plan, &message.content).await)
    }

    /// Propagate an edit of an earlier message
    ///
    /// Edits the relayed copy in place, falls back to delete-and-resend
    /// for kinds the transport cannot edit, and relays a fresh copy when
    /// no relayed copy is known.
    pub async fn relay_edit(&mut self, user: UserId, message: InboundMessage) -> Result<bool, ChatError> {
        self.surface_warning(user).await;

        match self.controller.plan_edit(user, &message)? {
            EditPlan::Fresh(plan) => {
                debug!("Edit of unknown {} by {}, relaying fresh", message.id, user);
                Ok(self.send_planned(&plan, &message.content).await)
            }
            EditPlan::InPlace {
                from,
                to,
                local_id,
                target,
                reply_to,
            } => match self.transport.edit(to, target, &message.content).await {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self
                    .resend(from, to, local_id, target, &message.content, reply_to)
                    .await),
                Err(e) => {
                    warn!("Edit of {} for {} failed: {}", target, to, e);
                    Ok(false)
                }
            },
        }
    }

    async fn send_planned(&mut self, plan: &RelayPlan, content: &MessageContent) -> bool {
        if let Some(media) = plan.marker {
            if let Err(e) = self.transport.notify(plan.to, Notice::DebugMarker { media }).await {
                warn!("Debug marker for {} failed: {}", plan.to, e);
                return false;
            }
        }

        match self.transport.deliver(plan.to, content, plan.reply_to).await {
            Ok(relayed) => {
                self.controller.record_relay(plan, relayed);
                true
            }
            Err(e) => {
                warn!("Relay from {} to {} failed: {}", plan.from, plan.to, e);
                false
            }
        }
    }

    /// Replace a non-editable relayed copy with a new one
    async fn resend(
        &mut self,
        from: UserId,
        to: UserId,
        local_id: MessageId,
        target: MessageId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> bool {
        if let Err(e) = self.transport.delete(to, target).await {
            warn!("Delete of {} for {} failed: {}", target, to, e);
            return false;
        }

        match self.transport.deliver(to, content, reply_to).await {
            Ok(new) => {
                debug!("Resent {} as {} for {}", target, new, to);
                self.controller.relink(from, to, local_id, target, new);
                true
            }
            Err(e) => {
                warn!("Resend of {} for {} failed: {}", target, to, e);
                self.controller.unlink(from, to, local_id, target);
                false
            }
        }
    }

    /// Pull a profile registered outside the core into the store
    async fn load_profile(&mut self, user: UserId) {
        if self.controller.profile(user).is_some() {
            return;
        }
        match self.profiles.get(user).await {
            Ok(Some(profile)) => {
                info!("Loaded profile of {} from source", user);
                self.controller.adopt_profile(user, profile);
            }
            Ok(None) => {}
            Err(e) => warn!("Profile lookup for {} failed: {}", user, e),
        }
    }

    /// Tell a user about a state-change notice they missed
    async fn surface_warning(&mut self, user: UserId) {
        if !self.controller.take_warning(user) {
            return;
        }
        if let Err(e) = self.transport.notify(user, Notice::DeliveryWarning).await {
            debug!("Delivery warning for {} failed again: {}", user, e);
            self.controller.flag_warning(user);
        }
    }

    async fn apply(&mut self, transition: Transition) {
        for effect in transition.effects {
            match effect {
                Effect::Notify { user, notice } => {
                    let state_change = notice.is_state_change();
                    if let Err(e) = self.transport.notify(user, notice).await {
                        warn!("Notice for {} not delivered: {}", user, e);
                        if state_change {
                            self.controller.flag_warning(user);
                        }
                    }
                }
                Effect::ScheduleRetry { user, ticket } => {
                    self.scheduler.after(self.retry_interval, user, ticket);
                }
                Effect::CancelRetry { user } => {
                    self.scheduler.cancel(user);
                }
            }
        }
    }
}
