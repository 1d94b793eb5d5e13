//! Matcher
//!
//! First-fit partner selection over the search registry. Pure functions:
//! the controller applies the result.

use std::collections::HashMap;

use crate::profile::{Gender, UserProfile};
use crate::registry::SearchRegistry;
use crate::types::UserId;

/// Check whether a filter admits a gender
#[inline]
pub fn admits(filter: Option<Gender>, gender: Gender) -> bool {
    filter.map_or(true, |wanted| wanted == gender)
}

/// Check mutual compatibility of two searchers
///
/// Each side's filter must admit the other side's gender.
#[inline]
pub fn is_compatible(
    seeker: &UserProfile,
    seeker_filter: Option<Gender>,
    candidate: &UserProfile,
    candidate_filter: Option<Gender>,
) -> bool {
    admits(candidate_filter, seeker.gender) && admits(seeker_filter, candidate.gender)
}

/// Find the oldest waiting user compatible with `seeker`
///
/// `seeker` must be listed in the registry; its own entry supplies the
/// filter. Candidates without a profile are skipped.
pub fn find_partner(
    registry: &SearchRegistry,
    profiles: &HashMap<UserId, UserProfile>,
    seeker: UserId,
) -> Option<UserId> {
    let seeker_entry = registry.get(seeker)?;
    let seeker_profile = profiles.get(&seeker)?;

    registry
        .iter()
        .filter(|entry| entry.user != seeker)
        .find(|entry| {
            profiles.get(&entry.user).is_some_and(|candidate| {
                is_compatible(seeker_profile, seeker_entry.filter, candidate, entry.filter)
            })
        })
        .map(|entry| entry.user)
}
