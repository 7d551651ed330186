// SPDX-License-Identifier: MPL-2.0

//! Serve from the cache first, then reconcile with the remote client.
//!
//! Network failures never surface as errors here: they are logged and the
//! caller keeps what the cache had. Storage failures are returned.

mod feed;
mod profile;
mod reactions;

pub use feed::{FeedPhase, FeedSource, FeedSync};
pub use profile::{FollowChange, ProfileSync};
pub use reactions::{ReactionSync, ToggleOutcome};

use crate::nostr::Note;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where a delivered value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Read from the local store, possibly stale
    Cached,
    /// Just fetched from the remote client
    Fresh,
}

/// A value tagged with its origin. Watch channels yield at most one of each.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    pub fn cached(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Cached,
        }
    }

    pub fn fresh(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Fresh,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

/// What one sync step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Notes taken from the local store
    pub from_cache: usize,
    /// New notes the remote client returned
    pub from_network: usize,
    /// The remote call failed; cached data was kept
    pub network_failed: bool,
    /// Another call of the same kind was already in flight
    pub skipped: bool,
}

impl SyncOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Display order: newest first, ties by id
pub(crate) fn newest_first(a: &Note, b: &Note) -> CmpOrdering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Append notes not already displayed, then restore display order.
/// Returns how many were added.
pub(crate) fn merge_notes(displayed: &mut Vec<Note>, incoming: impl IntoIterator<Item = Note>) -> usize {
    let mut seen: HashSet<String> = displayed.iter().map(|note| note.id.clone()).collect();
    let before = displayed.len();

    for note in incoming {
        if seen.insert(note.id.clone()) {
            displayed.push(note);
        }
    }

    let added = displayed.len() - before;
    if added > 0 {
        displayed.sort_by(newest_first);
    }
    added
}

/// Holds an in-flight flag for its lifetime
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    /// None if the flag was already set
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
