//! Search Registry
//!
//! Users currently waiting for a partner. Lookups by user are O(1); iteration
//! runs oldest waiter first, which is the order the matcher scans in.

use std::collections::{BTreeMap, HashMap};

use crate::profile::Gender;
use crate::types::{Ticket, UserId};

/// One waiting user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchEntry {
    pub user: UserId,
    /// Desired partner gender (None = any)
    pub filter: Option<Gender>,
    pub ticket: Ticket,
}

/// Insertion-ordered set of search entries
#[derive(Debug, Default)]
pub struct SearchRegistry {
    entries: HashMap<UserId, SearchEntry>,
    order: BTreeMap<Ticket, UserId>,
    next_ticket: u64,
}

impl SearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waiting user at the back of the queue
    ///
    /// A user already listed is moved to the back with the new filter.
    pub fn insert(&mut self, user: UserId, filter: Option<Gender>) -> Ticket {
        self.remove(user);

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.entries.insert(
            user,
            SearchEntry {
                user,
                filter,
                ticket,
            },
        );
        self.order.insert(ticket, user);
        ticket
    }

    /// Remove a user's entry, returning it if it existed
    pub fn remove(&mut self, user: UserId) -> Option<SearchEntry> {
        let entry = self.entries.remove(&user)?;
        self.order.remove(&entry.ticket);
        Some(entry)
    }

    pub fn get(&self, user: UserId) -> Option<&SearchEntry> {
        self.entries.get(&user)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.entries.contains_key(&user)
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SearchEntry> {
        self.order
            .values()
            .filter_map(move |user| self.entries.get(user))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
