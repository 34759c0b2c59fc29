//! Presence roster bookkeeping.
//!
//! The backend is the authority on the roster: after every realtime event a
//! wholesale refresh replaces it. Between refreshes, realtime frames patch
//! the local copy in place so unread badges and previews react instantly.

use chrono::{DateTime, Utc};

use agora_shared::types::{PresenceEntry, UserId};

/// The chat partner roster, kept in display order.
#[derive(Debug)]
pub struct PresenceRoster {
    local_user: UserId,
    entries: Vec<PresenceEntry>,
}

impl PresenceRoster {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            entries: Vec::new(),
        }
    }

    /// Replace the whole roster with a fresh server snapshot.
    ///
    /// The local user is dropped, then entries are ordered by most recent
    /// message first; peers with no history sort last, alphabetically.
    pub fn replace_all(&mut self, mut entries: Vec<PresenceEntry>) {
        entries.retain(|e| e.user_id != self.local_user);
        entries.sort_by(|a, b| {
            b.last_message_timestamp
                .cmp(&a.last_message_timestamp)
                .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
        });
        self.entries = entries;
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[PresenceEntry] {
        &self.entries
    }

    /// Snapshot of the roster for sending to consumers.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.entries.clone()
    }

    /// Record a message from `sender` that arrived while another
    /// conversation was active: bump the unread badge and the preview.
    /// Echoes of our own messages are ignored.
    pub fn note_unread(&mut self, sender: UserId, preview: &str, timestamp: DateTime<Utc>) {
        if sender == self.local_user {
            return;
        }
        if let Some(entry) = self.entry_mut(sender) {
            entry.unread_count += 1;
            entry.last_message_content = Some(preview.to_string());
            entry.last_message_timestamp = Some(timestamp);
        }
    }

    /// Zero the unread badge for `peer`; called when its conversation is
    /// opened.
    pub fn clear_unread(&mut self, peer: UserId) {
        if let Some(entry) = self.entry_mut(peer) {
            entry.unread_count = 0;
        }
    }

    /// Flip a user's online flag in place.
    pub fn set_online(&mut self, user: UserId, online: bool) {
        if let Some(entry) = self.entry_mut(user) {
            entry.is_online = online;
        }
    }

    /// Unread badge for `peer`.
    pub fn unread_count(&self, peer: UserId) -> u32 {
        self.entries
            .iter()
            .find(|e| e.user_id == peer)
            .map(|e| e.unread_count)
            .unwrap_or(0)
    }

    fn entry_mut(&mut self, user: UserId) -> Option<&mut PresenceEntry> {
        self.entries.iter_mut().find(|e| e.user_id == user)
    }
}
