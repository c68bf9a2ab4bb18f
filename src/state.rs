use std::collections::HashSet;

use tracing::warn;

use crate::types::{NotificationRecord, NotificationSnapshot};

/// Default bound on retained notifications.
pub const DEFAULT_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    /// Same `id` already held; nothing changed.
    Duplicate,
}

/// In-memory notification list for one user: newest first, unique by `id`,
/// at most `cap` entries, plus the unread counter.
///
/// The counter is tracked separately from the list because the server's
/// count covers records beyond what the list retains.
#[derive(Debug, Clone)]
pub struct NotificationState {
    notifications: Vec<NotificationRecord>,
    unread_count: u64,
    cap: usize,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl NotificationState {
    pub fn new(cap: usize) -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            cap: cap.max(1),
        }
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn contains(&self, id: i64) -> bool {
        self.notifications.iter().any(|n| n.id == id)
    }

    pub fn get(&self, id: i64) -> Option<&NotificationRecord> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Replace everything with an authoritative list (history fetch or cache
    /// paint). Later duplicates of an `id` are discarded.
    pub fn replace(&mut self, notifications: Vec<NotificationRecord>, unread_count: u64) {
        let mut seen = HashSet::with_capacity(notifications.len());
        let before = notifications.len();
        let mut unique: Vec<NotificationRecord> = notifications
            .into_iter()
            .filter(|n| seen.insert(n.id))
            .collect();
        if unique.len() != before {
            warn!(
                dropped = before - unique.len(),
                "Discarded duplicate notification ids from history"
            );
        }
        unique.truncate(self.cap);
        self.notifications = unique;
        self.unread_count = unread_count;
    }

    pub fn restore(&mut self, snapshot: NotificationSnapshot) {
        self.replace(snapshot.notifications, snapshot.unread_count);
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
        }
    }

    /// Prepend a live notification unless its `id` is already held.
    pub fn push(&mut self, record: NotificationRecord) -> PushOutcome {
        if self.contains(record.id) {
            warn!(id = record.id, "Duplicate notification ignored");
            return PushOutcome::Duplicate;
        }
        if !record.read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, record);
        self.notifications.truncate(self.cap);
        PushOutcome::Inserted
    }

    pub fn set_unread_count(&mut self, unread_count: u64) {
        self.unread_count = unread_count;
    }

    /// Returns true if a held unread record was flipped.
    pub fn mark_read(&mut self, id: i64) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(record) if !record.read => {
                record.read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for record in &mut self.notifications {
            record.read = true;
        }
        self.unread_count = 0;
    }

    /// Returns the removed record, adjusting the counter if it was unread.
    pub fn remove(&mut self, id: i64) -> Option<NotificationRecord> {
        let idx = self.notifications.iter().position(|n| n.id == id)?;
        let removed = self.notifications.remove(idx);
        if !removed.read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
        self.unread_count = 0;
    }
}

#[cfg(test)]
pub(crate) fn record(id: i64, read: bool) -> NotificationRecord {
    NotificationRecord {
        id,
        user_address: "0xabc".to_string(),
        kind: "pool_settled".to_string(),
        title: format!("Notification {id}"),
        message: String::new(),
        data: serde_json::Value::Null,
        read,
        created_at: None,
    }
}
