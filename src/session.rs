//! Session Table
//!
//! Live pairings and the message correspondence each one accumulates.

use std::collections::HashMap;

use crate::types::{MessageId, UserId};

/// Links between messages in one user's chat and their counterparts in the
/// partner's chat
///
/// Keys are ids in the owner's chat. `sent` holds the owner's own messages,
/// mapped to the copy the partner received; `received` holds copies the
/// owner received, mapped back to the partner's original. In a loop-back
/// session both halves belong to the same chat.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Correspondence {
    sent: HashMap<MessageId, MessageId>,
    received: HashMap<MessageId, MessageId>,
}

impl Correspondence {
    /// Counterpart of `id` in the partner's chat, whoever wrote it
    pub fn get(&self, id: MessageId) -> Option<MessageId> {
        self.sent
            .get(&id)
            .or_else(|| self.received.get(&id))
            .copied()
    }

    /// Relayed copy of a message the owner wrote
    pub fn sent(&self, id: MessageId) -> Option<MessageId> {
        self.sent.get(&id).copied()
    }

    /// Original of a copy the owner received
    pub fn received(&self, id: MessageId) -> Option<MessageId> {
        self.received.get(&id).copied()
    }

    pub fn link_sent(&mut self, local: MessageId, relayed: MessageId) {
        self.sent.insert(local, relayed);
    }

    pub fn link_received(&mut self, relayed: MessageId, original: MessageId) {
        self.received.insert(relayed, original);
    }

    pub fn unlink_sent(&mut self, local: MessageId) -> Option<MessageId> {
        self.sent.remove(&local)
    }

    pub fn unlink_received(&mut self, relayed: MessageId) -> Option<MessageId> {
        self.received.remove(&relayed)
    }

    pub fn len(&self) -> usize {
        self.sent.len() + self.received.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.received.is_empty()
    }
}

/// Symmetric user → partner table
///
/// `partner_of(a) == Some(b)` holds exactly when `partner_of(b) == Some(a)`.
/// A user paired with themselves is a loop-back (debug) session.
#[derive(Debug, Default)]
pub struct SessionTable {
    partners: HashMap<UserId, UserId>,
    links: HashMap<UserId, Correspondence>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session between `a` and `b` with empty correspondence
    ///
    /// Both users must be unpaired; callers check first.
    pub fn pair(&mut self, a: UserId, b: UserId) {
        debug_assert!(!self.partners.contains_key(&a));
        debug_assert!(!self.partners.contains_key(&b));

        self.partners.insert(a, b);
        self.partners.insert(b, a);
        self.links.insert(a, Correspondence::default());
        self.links.insert(b, Correspondence::default());
    }

    /// Open a loop-back session for `user`
    pub fn pair_loopback(&mut self, user: UserId) {
        debug_assert!(!self.partners.contains_key(&user));

        self.partners.insert(user, user);
        self.links.insert(user, Correspondence::default());
    }

    /// Close the session containing `user`, dropping both sides' links
    ///
    /// Returns the partner (the user itself for a loop-back session).
    pub fn unpair(&mut self, user: UserId) -> Option<UserId> {
        let partner = self.partners.remove(&user)?;
        self.partners.remove(&partner);
        self.links.remove(&user);
        self.links.remove(&partner);
        Some(partner)
    }

    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        self.partners.get(&user).copied()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.partners.contains_key(&user)
    }

    pub fn is_loopback(&self, user: UserId) -> bool {
        self.partner_of(user) == Some(user)
    }

    /// All paired users
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.partners.keys().copied()
    }

    pub fn links(&self, user: UserId) -> Option<&Correspondence> {
        self.links.get(&user)
    }

    pub fn links_mut(&mut self, user: UserId) -> Option<&mut Correspondence> {
        self.links.get_mut(&user)
    }

    /// Number of paired users (a loop-back session counts once)
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }
}
