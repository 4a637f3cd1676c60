//! Single notification store for channel and local notifications.
//!
//! Every entry carries an [`Origin`]. Channel arrivals (push and backfill)
//! are appended in receive order; local notifications are prepended so the
//! newest user action comes first. Read state and clearing go through one
//! API regardless of origin.

use crate::notification::{Notification, NotificationId, Origin};

/// Ordered, origin-tagged notification list.
#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    entries: Vec<Notification>,
    dedupe_by_id: bool,
}

impl NotificationStore {
    /// Empty store. With `dedupe_by_id`, a channel notification whose id is
    /// already held by another channel entry is dropped.
    pub fn new(dedupe_by_id: bool) -> Self {
        Self {
            entries: Vec::new(),
            dedupe_by_id,
        }
    }

    /// Appends a push or backfill notification, tagging it [`Origin::Channel`].
    ///
    /// Returns `false` if it was dropped as a duplicate.
    pub fn push_arrived(&mut self, mut notification: Notification) -> bool {
        notification.origin = Origin::Channel;

        if self.dedupe_by_id
            && self
                .entries
                .iter()
                .any(|n| n.origin == Origin::Channel && n.id == notification.id)
        {
            log::debug!(
                "[NotificationChannel] Dropping duplicate notification {}",
                notification.id
            );
            return false;
        }

        self.entries.push(notification);
        true
    }

    /// Appends a batch of channel notifications in order.
    ///
    /// Returns the ones actually stored.
    pub fn extend_arrived(
        &mut self,
        notifications: impl IntoIterator<Item = Notification>,
    ) -> Vec<Notification> {
        let mut stored = Vec::new();
        for notification in notifications {
            if self.push_arrived(notification) {
                stored.extend(self.entries.last().cloned());
            }
        }
        stored
    }

    /// Prepends a locally synthesised notification, tagging it [`Origin::Local`].
    pub fn push_local(&mut self, mut notification: Notification) {
        notification.origin = Origin::Local;
        self.entries.insert(0, notification);
    }

    /// Marks every entry with `id` as read.
    ///
    /// Returns `true` if at least one entry changed.
    pub fn mark_as_read(&mut self, id: &NotificationId) -> bool {
        let mut changed = false;
        for n in self.entries.iter_mut().filter(|n| &n.id == id && !n.read) {
            n.read = true;
            changed = true;
        }
        changed
    }

    /// Marks everything as read and returns how many entries changed.
    pub fn mark_all_as_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.entries.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    /// Removes every entry of `origin` and returns how many were removed.
    pub fn clear_origin(&mut self, origin: Origin) -> usize {
        let before = self.entries.len();
        self.entries.retain(|n| n.origin != origin);
        before - self.entries.len()
    }

    /// Removes everything.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Number of unread entries across both origins.
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    /// Number of unread entries of one origin.
    pub fn unread_count_for(&self, origin: Origin) -> usize {
        self.entries
            .iter()
            .filter(|n| n.origin == origin && !n.read)
            .count()
    }

    /// Looks up the first entry with `id`.
    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|n| &n.id == id)
    }

    /// Entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    /// Channel entries in arrival order followed by local entries newest
    /// first, the order the notification panel shows them in.
    pub fn display_order(&self) -> Vec<Notification> {
        self.entries
            .iter()
            .filter(|n| n.origin == Origin::Channel)
            .chain(self.entries.iter().filter(|n| n.origin == Origin::Local))
            .cloned()
            .collect()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
