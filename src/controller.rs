//! Session Controller
//!
//! Owns every store (profiles, search registry, session table with its
//! correspondence) and drives each user through Idle, Searching and Paired.
//!
//! Transitions are synchronous: a method either applies all of its
//! mutations and returns the outward effects as a `Transition`, or fails
//! with a `ChatError` and changes nothing. Effects are carried out by the
//! caller after the state is already consistent.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::ChatError;
use crate::matcher::find_partner;
use crate::message::{InboundMessage, MessageKind, Notice};
use crate::profile::{Gender, UserProfile};
use crate::registry::SearchRegistry;
use crate::session::SessionTable;
use crate::types::{MessageId, Ticket, UserId};

/// Where a user currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Idle,
    Searching(Option<Gender>),
    Paired(UserId),
    /// Loop-back session with themselves
    Debug,
}

/// An outward consequence of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify { user: UserId, notice: Notice },
    /// Re-run matching for this entry later
    ScheduleRetry { user: UserId, ticket: Ticket },
    /// Drop any pending retry for the user
    CancelRetry { user: UserId },
}

/// Effects produced by one transition, in order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transition {
    pub effects: Vec<Effect>,
}

impl Transition {
    fn notify(&mut self, user: UserId, notice: Notice) {
        self.effects.push(Effect::Notify { user, notice });
    }

    fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Notices addressed to `user`
    pub fn notices_for(&self, user: UserId) -> Vec<&Notice> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify { user: to, notice } if *to == user => Some(notice),
                _ => None,
            })
            .collect()
    }
}

/// How to deliver one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPlan {
    pub from: UserId,
    pub to: UserId,
    /// Id of the message in the sender's chat
    pub local_id: MessageId,
    /// Reply anchor in the recipient's chat
    pub reply_to: Option<MessageId>,
    /// Announce the media kind first (debug mode, voice/sticker class)
    pub marker: Option<MessageKind>,
}

/// How to propagate one edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPlan {
    /// The relayed copy exists: edit it, or delete and resend
    InPlace {
        from: UserId,
        to: UserId,
        local_id: MessageId,
        /// Id of the relayed copy in the recipient's chat
        target: MessageId,
        reply_to: Option<MessageId>,
    },
    /// No relayed copy is known: send the edited content as a new message
    Fresh(RelayPlan),
}

/// All mutable matchmaking state
#[derive(Debug, Default)]
pub struct State {
    profiles: HashMap<UserId, UserProfile>,
    searches: SearchRegistry,
    sessions: SessionTable,
    /// Users who missed a state-change notice
    warnings: HashSet<UserId>,
}

impl State {
    pub fn profiles(&self) -> &HashMap<UserId, UserProfile> {
        &self.profiles
    }

    pub fn searches(&self) -> &SearchRegistry {
        &self.searches
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// No user both searching and paired; every session symmetric
    pub fn is_consistent(&self) -> bool {
        self.searches.iter().all(|entry| !self.sessions.contains(entry.user))
            && self.sessions_symmetric()
    }

    fn sessions_symmetric(&self) -> bool {
        self.sessions.users().all(|user| {
            self.sessions
                .partner_of(user)
                .and_then(|partner| self.sessions.partner_of(partner))
                == Some(user)
                && self.sessions.links(user).is_some()
        })
    }
}

/// The matchmaking state machine
#[derive(Debug, Default)]
pub struct SessionController {
    state: State,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller with a pre-loaded profile store
    pub fn with_profiles(profiles: HashMap<UserId, UserProfile>) -> Self {
        Self {
            state: State {
                profiles,
                ..State::default()
            },
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn presence(&self, user: UserId) -> Presence {
        if let Some(partner) = self.state.sessions.partner_of(user) {
            if partner == user {
                Presence::Debug
            } else {
                Presence::Paired(partner)
            }
        } else if let Some(entry) = self.state.searches.get(user) {
            Presence::Searching(entry.filter)
        } else {
            Presence::Idle
        }
    }

    pub fn profile(&self, user: UserId) -> Option<&UserProfile> {
        self.state.profiles.get(&user)
    }

    /// Store a completed registration
    ///
    /// Allowed only while Idle so matching attributes never change
    /// under a live search or session.
    pub fn register(&mut self, user: UserId, profile: UserProfile) -> Result<Transition, ChatError> {
        if self.presence(user) != Presence::Idle {
            return Err(ChatError::Busy);
        }

        self.state.profiles.insert(user, profile);
        info!("User {} registered as {:?}", user, profile.gender);

        let mut t = Transition::default();
        t.notify(user, Notice::Registered);
        Ok(t)
    }

    /// Add a profile found in the profile source, without notification
    pub fn adopt_profile(&mut self, user: UserId, profile: UserProfile) {
        self.state.profiles.entry(user).or_insert(profile);
    }

    /// `Idle --start(filter)--> Searching(filter)`, then try to match
    pub fn start(&mut self, user: UserId, filter: Option<Gender>) -> Result<Transition, ChatError> {
        match self.presence(user) {
            Presence::Idle => {}
            Presence::Searching(_) => return Err(ChatError::AlreadySearching),
            Presence::Paired(_) => return Err(ChatError::AlreadyPaired),
            Presence::Debug => return Err(ChatError::DebugActive),
        }
        if !self.state.profiles.contains_key(&user) {
            return Err(ChatError::NotRegistered);
        }

        let mut t = Transition::default();
        self.begin_search(user, filter, &mut t);
        Ok(t)
    }

    /// Cancel a search, end a session, or leave debug mode
    pub fn stop(&mut self, user: UserId) -> Result<Transition, ChatError> {
        let mut t = Transition::default();

        match self.presence(user) {
            Presence::Idle => return Err(ChatError::NothingToStop),
            Presence::Searching(_) => {
                self.state.searches.remove(user);
                info!("User {} stopped searching", user);
                t.push(Effect::CancelRetry { user });
                t.notify(user, Notice::SearchStopped);
            }
            Presence::Paired(_) => {
                self.end_session(user, &mut t);
                t.notify(user, Notice::SessionEnded);
            }
            Presence::Debug => {
                self.end_session(user, &mut t);
                t.notify(user, Notice::DebugDisabled);
            }
        }

        Ok(t)
    }

    /// `Paired --next--> Searching(any)`; the partner goes Idle
    pub fn next(&mut self, user: UserId) -> Result<Transition, ChatError> {
        match self.presence(user) {
            Presence::Idle => return Err(ChatError::NothingToStop),
            Presence::Searching(_) => return Err(ChatError::AlreadySearching),
            Presence::Paired(_) | Presence::Debug => {}
        }
        if !self.state.profiles.contains_key(&user) {
            return Err(ChatError::NotRegistered);
        }

        let mut t = Transition::default();
        if self.end_session(user, &mut t) == Some(user) {
            t.notify(user, Notice::DebugDisabled);
        }
        self.begin_search(user, None, &mut t);
        Ok(t)
    }

    /// Try to pair a waiting user now
    ///
    /// Safe to call at any time; a user who is not searching yields an
    /// empty transition.
    pub fn attempt_match(&mut self, user: UserId) -> Transition {
        let mut t = Transition::default();
        self.match_into(user, &mut t);
        t
    }

    /// Deferred retry for one specific search entry
    ///
    /// A retry for an entry that was since removed or replaced is a no-op.
    pub fn retry_match(&mut self, user: UserId, ticket: Ticket) -> Transition {
        let current = self.state.searches.get(user).map(|entry| entry.ticket);
        if current != Some(ticket) {
            debug!("Ignoring stale retry {} for user {}", ticket, user);
            return Transition::default();
        }
        self.attempt_match(user)
    }

    /// Enter or leave loop-back debug mode
    ///
    /// Entering tears down any search or session first.
    pub fn toggle_debug(&mut self, user: UserId) -> Transition {
        let mut t = Transition::default();

        match self.presence(user) {
            Presence::Debug => {
                self.end_session(user, &mut t);
                t.notify(user, Notice::DebugDisabled);
                return t;
            }
            Presence::Searching(_) => {
                self.state.searches.remove(user);
                t.push(Effect::CancelRetry { user });
            }
            Presence::Paired(_) => {
                self.end_session(user, &mut t);
            }
            Presence::Idle => {}
        }

        self.state.sessions.pair_loopback(user);
        info!("User {} entered debug mode", user);
        t.notify(user, Notice::DebugEnabled);
        t
    }

    /// The user's connection is gone: drop their search or session
    pub fn disconnect(&mut self, user: UserId) -> Transition {
        let mut t = Transition::default();

        match self.presence(user) {
            Presence::Idle => {}
            Presence::Searching(_) => {
                self.state.searches.remove(user);
                t.push(Effect::CancelRetry { user });
            }
            Presence::Paired(_) | Presence::Debug => {
                self.end_session(user, &mut t);
            }
        }
        self.state.warnings.remove(&user);

        t
    }

    /// Resolve the recipient and reply anchor for an inbound message
    pub fn plan_relay(&self, user: UserId, message: &InboundMessage) -> Result<RelayPlan, ChatError> {
        let to = self
            .state
            .sessions
            .partner_of(user)
            .ok_or(ChatError::NotInSession)?;

        let kind = message.content.kind();
        let marker = (to == user && kind.is_voice_or_sticker()).then_some(kind);

        Ok(RelayPlan {
            from: user,
            to,
            local_id: message.id,
            reply_to: self.counterpart(user, message.reply_to),
            marker,
        })
    }

    /// Resolve how an edit reaches the partner
    ///
    /// Only the author may edit: a copy the user received from the partner
    /// is refused with `NotAuthor`.
    pub fn plan_edit(&self, user: UserId, message: &InboundMessage) -> Result<EditPlan, ChatError> {
        let plan = self.plan_relay(user, message)?;
        let links = self.state.sessions.links(user);

        if links.and_then(|links| links.received(message.id)).is_some() {
            return Err(ChatError::NotAuthor);
        }

        match links.and_then(|links| links.sent(message.id)) {
            Some(target) => Ok(EditPlan::InPlace {
                from: plan.from,
                to: plan.to,
                local_id: plan.local_id,
                target,
                reply_to: plan.reply_to,
            }),
            None => Ok(EditPlan::Fresh(plan)),
        }
    }

    /// Record a delivered relay in both correspondence maps
    ///
    /// Returns false (and records nothing) if the session is gone.
    pub fn record_relay(&mut self, plan: &RelayPlan, relayed: MessageId) -> bool {
        if !self.session_alive(plan.from, plan.to) {
            return false;
        }

        if let Some(links) = self.state.sessions.links_mut(plan.from) {
            links.link_sent(plan.local_id, relayed);
        }
        if let Some(links) = self.state.sessions.links_mut(plan.to) {
            links.link_received(relayed, plan.local_id);
        }
        debug!(
            "Linked {} of user {} to {} of user {}",
            plan.local_id, plan.from, relayed, plan.to
        );
        true
    }

    /// Point a correspondence entry at a resent copy
    pub fn relink(
        &mut self,
        from: UserId,
        to: UserId,
        local_id: MessageId,
        old: MessageId,
        new: MessageId,
    ) -> bool {
        if !self.session_alive(from, to) {
            return false;
        }

        if let Some(links) = self.state.sessions.links_mut(to) {
            links.unlink_received(old);
            links.link_received(new, local_id);
        }
        if let Some(links) = self.state.sessions.links_mut(from) {
            links.link_sent(local_id, new);
        }
        true
    }

    /// Forget a correspondence entry whose relayed copy no longer exists
    pub fn unlink(&mut self, from: UserId, to: UserId, local_id: MessageId, old: MessageId) {
        if !self.session_alive(from, to) {
            return;
        }

        if let Some(links) = self.state.sessions.links_mut(to) {
            links.unlink_received(old);
        }
        if let Some(links) = self.state.sessions.links_mut(from) {
            links.unlink_sent(local_id);
        }
    }

    /// Remember that the user missed a state-change notice
    pub fn flag_warning(&mut self, user: UserId) {
        self.state.warnings.insert(user);
    }

    /// Consume a pending delivery warning
    pub fn take_warning(&mut self, user: UserId) -> bool {
        self.state.warnings.remove(&user)
    }

    fn counterpart(&self, user: UserId, id: Option<MessageId>) -> Option<MessageId> {
        let id = id?;
        self.state.sessions.links(user)?.get(id)
    }

    fn session_alive(&self, from: UserId, to: UserId) -> bool {
        self.state.sessions.partner_of(from) == Some(to)
    }

    fn begin_search(&mut self, user: UserId, filter: Option<Gender>, t: &mut Transition) {
        let ticket = self.state.searches.insert(user, filter);
        info!("User {} searching (filter {:?}, ticket {})", user, filter, ticket);
        t.notify(user, Notice::Searching);
        self.match_into(user, t);
    }

    fn match_into(&mut self, user: UserId, t: &mut Transition) {
        let Some(entry) = self.state.searches.get(user).copied() else {
            return;
        };

        let Some(partner) = find_partner(&self.state.searches, &self.state.profiles, user) else {
            debug!(
                "No partner for user {}, {} waiting",
                user,
                self.state.searches.len()
            );
            t.push(Effect::ScheduleRetry {
                user,
                ticket: entry.ticket,
            });
            return;
        };

        self.state.searches.remove(user);
        self.state.searches.remove(partner);
        self.state.sessions.pair(user, partner);
        info!("Paired users {} and {}", user, partner);

        t.push(Effect::CancelRetry { user });
        t.push(Effect::CancelRetry { user: partner });
        t.notify(user, Notice::PartnerFound);
        t.notify(partner, Notice::PartnerFound);
    }

    /// Tear down the user's session; the other side is told `PartnerLeft`
    fn end_session(&mut self, user: UserId, t: &mut Transition) -> Option<UserId> {
        let partner = self.state.sessions.unpair(user)?;
        if partner != user {
            info!("Session {} <-> {} ended by {}", user, partner, user);
            t.notify(partner, Notice::PartnerLeft);
        } else {
            info!("User {} left debug mode", user);
        }
        Some(partner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContent;
    use crate::profile::{AgeBracket, Country};

    const A: UserId = UserId(1);
    const B: UserId = UserId(2);
    const C: UserId = UserId(3);

    fn profile(gender: Gender) -> UserProfile {
        UserProfile {
            gender,
            country: Country::Ukraine,
            age: AgeBracket::From18To21,
        }
    }

    fn controller(users: &[(UserId, Gender)]) -> SessionController {
        let profiles = users.iter().map(|(u, g)| (*u, profile(*g))).collect();
        SessionController::with_profiles(profiles)
    }

    fn text(id: i64, reply_to: Option<i64>) -> InboundMessage {
        InboundMessage {
            id: MessageId(id),
            content: MessageContent::Text {
                text: "hi".to_string(),
            },
            reply_to: reply_to.map(MessageId),
        }
    }

    #[test]
    fn test_start_requires_profile() {
        let mut ctl = SessionController::new();
        assert_eq!(ctl.start(A, None), Err(ChatError::NotRegistered));
        assert_eq!(ctl.presence(A), Presence::Idle);
    }

    #[test]
    fn test_start_without_partner_schedules_retry() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        let t = ctl.start(A, Some(Gender::Female)).unwrap();

        assert_eq!(ctl.presence(A), Presence::Searching(Some(Gender::Female)));
        assert_eq!(t.notices_for(A), vec![&Notice::Searching]);
        assert!(t
            .effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleRetry { user, .. } if *user == A)));
    }

    #[test]
    fn test_mutual_match() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, Some(Gender::Female)).unwrap();
        let t = ctl.start(B, None).unwrap();

        assert_eq!(ctl.presence(A), Presence::Paired(B));
        assert_eq!(ctl.presence(B), Presence::Paired(A));
        assert!(ctl.state().searches().is_empty());
        assert_eq!(t.notices_for(A), vec![&Notice::PartnerFound]);
        assert_eq!(
            t.notices_for(B),
            vec![&Notice::Searching, &Notice::PartnerFound]
        );
        assert!(ctl.state().is_consistent());
    }

    #[test]
    fn test_start_conflicts() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, Some(Gender::Male)).unwrap();
        assert_eq!(ctl.start(A, None), Err(ChatError::AlreadySearching));
        // Filter unchanged by the rejected call
        assert_eq!(ctl.presence(A), Presence::Searching(Some(Gender::Male)));

        ctl.stop(A).unwrap();
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();
        assert_eq!(ctl.start(A, None), Err(ChatError::AlreadyPaired));
    }

    #[test]
    fn test_stop_from_idle() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        assert_eq!(ctl.stop(A), Err(ChatError::NothingToStop));
        assert_eq!(ctl.next(A), Err(ChatError::NothingToStop));
    }

    #[test]
    fn test_stop_search() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        ctl.start(A, None).unwrap();
        let t = ctl.stop(A).unwrap();

        assert_eq!(ctl.presence(A), Presence::Idle);
        assert!(t.effects.contains(&Effect::CancelRetry { user: A }));
        assert_eq!(t.notices_for(A), vec![&Notice::SearchStopped]);
    }

    #[test]
    fn test_stop_session_notifies_peer() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();

        let t = ctl.stop(B).unwrap();
        assert_eq!(ctl.presence(A), Presence::Idle);
        assert_eq!(ctl.presence(B), Presence::Idle);
        assert_eq!(t.notices_for(A), vec![&Notice::PartnerLeft]);
        assert_eq!(t.notices_for(B), vec![&Notice::SessionEnded]);
        assert!(ctl.state().sessions().is_empty());
    }

    #[test]
    fn test_next_requeues_without_filter() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, Some(Gender::Female)).unwrap();
        ctl.start(B, None).unwrap();

        let t = ctl.next(A).unwrap();
        assert_eq!(ctl.presence(A), Presence::Searching(None));
        assert_eq!(ctl.presence(B), Presence::Idle);
        assert_eq!(t.notices_for(B), vec![&Notice::PartnerLeft]);
        assert!(ctl.state().sessions().links(A).is_none());
        assert!(ctl.state().sessions().links(B).is_none());
    }

    #[test]
    fn test_next_pairs_with_waiting_user() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female), (C, Gender::Male)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();
        ctl.start(C, None).unwrap();

        ctl.next(A).unwrap();
        assert_eq!(ctl.presence(A), Presence::Paired(C));
        assert_eq!(ctl.presence(B), Presence::Idle);
    }

    #[test]
    fn test_next_while_searching() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        ctl.start(A, Some(Gender::Female)).unwrap();
        assert_eq!(ctl.next(A), Err(ChatError::AlreadySearching));
    }

    #[test]
    fn test_retry_ticket() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Male)]);
        ctl.start(A, Some(Gender::Female)).unwrap();
        let ticket = ctl.state().searches().get(A).unwrap().ticket;

        // Still waiting: the retry reschedules with the same ticket
        let t = ctl.retry_match(A, ticket);
        assert_eq!(t.effects, vec![Effect::ScheduleRetry { user: A, ticket }]);

        // Entry replaced: the old ticket is stale
        ctl.stop(A).unwrap();
        ctl.start(A, None).unwrap();
        assert!(ctl.retry_match(A, ticket).effects.is_empty());

        // No entry for B carries that ticket
        ctl.start(B, None).unwrap();
        assert!(ctl.retry_match(B, ticket).effects.is_empty());
    }

    #[test]
    fn test_retry_finds_late_candidate() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, Some(Gender::Female)).unwrap();
        let ticket = ctl.state().searches().get(A).unwrap().ticket;

        // B arrives but only wants a female, so no pairing
        ctl.start(B, Some(Gender::Female)).unwrap();
        assert_eq!(ctl.state().searches().len(), 2);

        // B widens the search without a match attempt; A's retry pairs them
        ctl.stop(B).unwrap();
        ctl.state.searches.insert(B, None);
        let t = ctl.retry_match(A, ticket);
        assert_eq!(ctl.presence(A), Presence::Paired(B));
        assert_eq!(t.notices_for(B), vec![&Notice::PartnerFound]);
    }

    #[test]
    fn test_debug_tears_down_session() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();

        let t = ctl.toggle_debug(A);
        assert_eq!(ctl.presence(A), Presence::Debug);
        assert_eq!(ctl.presence(B), Presence::Idle);
        assert_eq!(t.notices_for(B), vec![&Notice::PartnerLeft]);
        assert_eq!(t.notices_for(A), vec![&Notice::DebugEnabled]);
        assert_eq!(ctl.start(A, None), Err(ChatError::DebugActive));

        let t = ctl.toggle_debug(A);
        assert_eq!(ctl.presence(A), Presence::Idle);
        assert_eq!(t.notices_for(A), vec![&Notice::DebugDisabled]);
    }

    #[test]
    fn test_debug_cancels_search() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        ctl.start(A, None).unwrap();
        let t = ctl.toggle_debug(A);

        assert!(t.effects.contains(&Effect::CancelRetry { user: A }));
        assert!(ctl.state().searches().is_empty());
        assert!(ctl.state().is_consistent());
    }

    #[test]
    fn test_disconnect() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female), (C, Gender::Male)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();
        ctl.start(C, Some(Gender::Female)).unwrap();

        let t = ctl.disconnect(A);
        assert_eq!(t.notices_for(B), vec![&Notice::PartnerLeft]);
        assert!(t.notices_for(A).is_empty());
        assert_eq!(ctl.presence(B), Presence::Idle);

        let t = ctl.disconnect(C);
        assert_eq!(t.effects, vec![Effect::CancelRetry { user: C }]);
        assert!(ctl.disconnect(C).effects.is_empty());
    }

    #[test]
    fn test_register_only_when_idle() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        ctl.start(A, None).unwrap();
        assert_eq!(ctl.register(A, profile(Gender::Female)), Err(ChatError::Busy));

        ctl.stop(A).unwrap();
        let t = ctl.register(A, profile(Gender::Female)).unwrap();
        assert_eq!(t.notices_for(A), vec![&Notice::Registered]);
        assert_eq!(ctl.profile(A).unwrap().gender, Gender::Female);
    }

    #[test]
    fn test_relay_requires_session() {
        let ctl = controller(&[(A, Gender::Male)]);
        assert_eq!(ctl.plan_relay(A, &text(1, None)), Err(ChatError::NotInSession));
        assert_eq!(ctl.plan_edit(A, &text(1, None)), Err(ChatError::NotInSession));
    }

    #[test]
    fn test_reply_anchor_round_trip() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();

        // A's message 10 arrives in B's chat as 20
        let plan = ctl.plan_relay(A, &text(10, None)).unwrap();
        assert_eq!(plan.to, B);
        assert!(ctl.record_relay(&plan, MessageId(20)));

        // B replies to 20 with 21: anchored to 10 in A's chat
        let plan = ctl.plan_relay(B, &text(21, Some(20))).unwrap();
        assert_eq!(plan.reply_to, Some(MessageId(10)));

        // Reply to an unknown message has no anchor
        let plan = ctl.plan_relay(B, &text(22, Some(99))).unwrap();
        assert_eq!(plan.reply_to, None);
    }

    #[test]
    fn test_edit_plans() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();
        let plan = ctl.plan_relay(A, &text(10, None)).unwrap();
        ctl.record_relay(&plan, MessageId(20));

        assert!(matches!(
            ctl.plan_edit(A, &text(10, None)).unwrap(),
            EditPlan::InPlace { target: MessageId(20), to: B, .. }
        ));
        assert!(matches!(
            ctl.plan_edit(A, &text(11, None)).unwrap(),
            EditPlan::Fresh(_)
        ));
        // B received 20 but did not write it
        assert_eq!(ctl.plan_edit(B, &text(20, None)), Err(ChatError::NotAuthor));

        assert!(ctl.relink(A, B, MessageId(10), MessageId(20), MessageId(30)));
        let links_b = ctl.state().sessions().links(B).unwrap();
        assert_eq!(links_b.get(MessageId(30)), Some(MessageId(10)));
        assert_eq!(links_b.get(MessageId(20)), None);
        assert_eq!(
            ctl.state().sessions().links(A).unwrap().get(MessageId(10)),
            Some(MessageId(30))
        );

        ctl.unlink(A, B, MessageId(10), MessageId(30));
        assert!(ctl.state().sessions().links(A).unwrap().is_empty());
        assert!(ctl.state().sessions().links(B).unwrap().is_empty());
    }

    #[test]
    fn test_record_after_session_end_is_dropped() {
        let mut ctl = controller(&[(A, Gender::Male), (B, Gender::Female)]);
        ctl.start(A, None).unwrap();
        ctl.start(B, None).unwrap();
        let plan = ctl.plan_relay(A, &text(10, None)).unwrap();

        ctl.stop(B).unwrap();
        assert!(!ctl.record_relay(&plan, MessageId(20)));
        assert!(ctl.state().sessions().links(A).is_none());
    }

    #[test]
    fn test_debug_marker_only_for_voice_class() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        ctl.toggle_debug(A);

        let sticker = InboundMessage {
            id: MessageId(1),
            content: MessageContent::Sticker {
                file_id: "s".to_string(),
                emoji: None,
            },
            reply_to: None,
        };
        let plan = ctl.plan_relay(A, &sticker).unwrap();
        assert_eq!(plan.to, A);
        assert_eq!(plan.marker, Some(MessageKind::Sticker));

        let plan = ctl.plan_relay(A, &text(2, None)).unwrap();
        assert_eq!(plan.marker, None);
    }

    #[test]
    fn test_warnings() {
        let mut ctl = controller(&[(A, Gender::Male)]);
        assert!(!ctl.take_warning(A));
        ctl.flag_warning(A);
        assert!(ctl.take_warning(A));
        assert!(!ctl.take_warning(A));
    }
}
