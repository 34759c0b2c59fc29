//! Per-conversation history pagination state.
//!
//! History is fetched backwards: offset 0 is the newest message, and every
//! applied page moves the offset further into the past. One fetch slot is
//! shared across all conversations, so at most one history request is ever
//! outstanding, and a response that no longer matches the conversation
//! state (peer switched, or pagination reset) is detected as stale.

use std::collections::{HashMap, HashSet};

use agora_shared::types::UserId;

/// The single outstanding history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFetch {
    pub peer: UserId,
    pub offset: u32,
}

/// Tracks offsets, completion, and the in-flight guard for every
/// conversation.
#[derive(Debug, Default)]
pub struct ConversationPager {
    /// Messages already consumed per peer.
    cursors: HashMap<UserId, u32>,
    /// Peers whose full history has been fetched.
    finished: HashSet<UserId>,
    /// The one fetch currently outstanding, if any.
    in_flight: Option<PendingFetch>,
}

impl ConversationPager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset pagination for `peer` ahead of an initial load. The in-flight
    /// guard is left alone: an outstanding fetch keeps its slot and is
    /// dealt with on completion.
    pub fn reset(&mut self, peer: UserId) {
        self.cursors.insert(peer, 0);
        self.finished.remove(&peer);
    }

    /// Offset already consumed for `peer`.
    pub fn offset(&self, peer: UserId) -> u32 {
        self.cursors.get(&peer).copied().unwrap_or(0)
    }

    /// Whether the beginning of the conversation with `peer` was reached.
    pub fn reached_beginning(&self, peer: UserId) -> bool {
        self.finished.contains(&peer)
    }

    /// Whether a history request is outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Claim the fetch slot for `peer` at its current offset.
    ///
    /// Returns `None` while another fetch is outstanding or once the
    /// beginning of the conversation was reached.
    pub fn begin(&mut self, peer: UserId) -> Option<PendingFetch> {
        if self.in_flight.is_some() || self.reached_beginning(peer) {
            return None;
        }
        let fetch = PendingFetch {
            peer,
            offset: self.offset(peer),
        };
        self.in_flight = Some(fetch);
        Some(fetch)
    }

    /// Release the fetch slot, returning what it was tracking.
    pub fn finish(&mut self) -> Option<PendingFetch> {
        self.in_flight.take()
    }

    /// Whether a finished fetch still matches the conversation state: same
    /// peer as the active conversation and an offset the pagination still
    /// expects.
    pub fn is_current(&self, fetch: &PendingFetch, active: UserId) -> bool {
        fetch.peer == active && fetch.offset == self.offset(active)
    }

    /// Record a successfully applied page, advancing the offset by the
    /// page length. A short page means the conversation start was reached;
    /// returns true when it was.
    pub fn advance(&mut self, peer: UserId, page_len: usize, page_size: u32) -> bool {
        let offset = self.offset(peer) + page_len as u32;
        self.cursors.insert(peer, offset);

        let reached = (page_len as u32) < page_size;
        if reached {
            self.finished.insert(peer);
        }
        reached
    }
}
