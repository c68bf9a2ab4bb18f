use std::collections::HashSet;

use tracing::info;

use crate::types::NotificationRecord;

/// Platform surface for user-visible alerts outside the app.
pub trait SystemNotifier: Send + Sync {
    fn permission_granted(&self) -> bool;
    fn show(&self, record: &NotificationRecord);
}

/// Writes alerts to stderr through `tracing`. Stands in for an OS
/// notification daemon in the CLI.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl SystemNotifier for TerminalNotifier {
    fn permission_granted(&self) -> bool {
        true
    }

    fn show(&self, record: &NotificationRecord) {
        info!(
            id = record.id,
            kind = %record.kind,
            title = %record.title,
            "{}",
            record.message
        );
    }
}

/// Ids already surfaced as system alerts during this session.
#[derive(Debug, Default)]
pub struct ShownNotifications {
    ids: HashSet<i64>,
}

impl ShownNotifications {
    /// Returns true the first time `id` is seen.
    pub fn mark_shown(&mut self, id: i64) -> bool {
        self.ids.insert(id)
    }

    pub fn was_shown(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dispose(&mut self) {
        self.ids.clear();
    }
}

/// At most one system alert per distinct notification id.
pub struct AlertGate {
    notifier: Box<dyn SystemNotifier>,
    shown: ShownNotifications,
}

impl AlertGate {
    pub fn new(notifier: Box<dyn SystemNotifier>) -> Self {
        Self {
            notifier,
            shown: ShownNotifications::default(),
        }
    }

    /// Returns true if an alert was shown. Without permission nothing is
    /// recorded, so a later grant still alerts for the same id.
    pub fn offer(&mut self, record: &NotificationRecord) -> bool {
        if !self.notifier.permission_granted() {
            return false;
        }
        if !self.shown.mark_shown(record.id) {
            return false;
        }
        self.notifier.show(record);
        true
    }

    pub fn shown(&self) -> &ShownNotifications {
        &self.shown
    }

    pub fn dispose(&mut self) {
        self.shown.dispose();
    }
}
