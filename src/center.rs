//! Per-user notification cache.
//!
//! [`NotificationCenter`] merges three sources into one list: the durable
//! cache (painted first), the server history (replaces the paint), and live
//! push events (prepended, deduplicated by `id`). Mutations are optimistic:
//! local state changes first, the server call follows, and a failed call
//! leaves the local change in place until the next history fetch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::alerts::AlertGate;
use crate::api::{ApiError, NotificationApi};
use crate::cache::NotificationCache;
use crate::envelope::{ChannelEvent, EventPayload};
use crate::mutation::{Mutation, MutationKind, MutationLog};
use crate::state::{DEFAULT_CAP, NotificationState, PushOutcome};
use crate::types::{NotificationRecord, NotificationSnapshot};

/// Default page size for the history fetch.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// What [`NotificationCenter::apply`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Inserted(NotificationRecord),
    Duplicate(i64),
    UnreadCount(u64),
    /// Not a notification event, or not for the loaded user.
    Ignored,
}

pub struct NotificationCenter {
    api: Arc<dyn NotificationApi>,
    cache: NotificationCache,
    state: NotificationState,
    user: Option<String>,
    history_limit: u32,
    alerts: Option<AlertGate>,
    log: MutationLog,
}

impl NotificationCenter {
    pub fn new(api: Arc<dyn NotificationApi>, cache: NotificationCache) -> Self {
        Self {
            api,
            cache,
            state: NotificationState::new(DEFAULT_CAP),
            user: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            alerts: None,
            log: MutationLog::default(),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.state = NotificationState::new(cap);
        self
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_alerts(mut self, alerts: AlertGate) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        self.state.notifications()
    }

    pub fn unread_count(&self) -> u64 {
        self.state.unread_count()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.state.snapshot()
    }

    pub fn mutations(&self) -> &MutationLog {
        &self.log
    }

    /// Switch to `address`: paint from the durable cache, then replace with
    /// the server history. A failed fetch keeps the painted state.
    pub async fn load(&mut self, address: &str) -> NotificationSnapshot {
        let user = address.to_lowercase();
        self.state.clear();
        if let Some(cached) = self.cache.read(&user) {
            debug!(
                user = %user,
                count = cached.notifications.len(),
                "Painted notifications from cache"
            );
            self.state.restore(cached);
        }
        self.user = Some(user.clone());

        match self.api.fetch_history(&user, self.history_limit).await {
            Ok(history) => {
                self.state
                    .replace(history.notifications, history.unread_count);
                self.persist();
                info!(
                    user = %user,
                    count = self.state.notifications().len(),
                    unread = self.state.unread_count(),
                    "Loaded notification history"
                );
            }
            Err(e) => {
                warn!(user = %user, error = %e, "History fetch failed, keeping cached state");
            }
        }
        self.state.snapshot()
    }

    /// Fold a live notification into the list. `None` when no user is loaded
    /// or the record belongs to someone else.
    pub fn on_push_event(&mut self, record: NotificationRecord) -> Option<PushOutcome> {
        let user = self.user.as_deref()?;
        if !record.user_address.is_empty() && !record.user_address.eq_ignore_ascii_case(user) {
            debug!(id = record.id, owner = %record.user_address, "Notification for another user ignored");
            return None;
        }
        let alert = (!record.read).then(|| record.clone());
        let outcome = self.state.push(record);
        if outcome == PushOutcome::Inserted {
            self.persist();
            if let (Some(gate), Some(record)) = (self.alerts.as_mut(), alert) {
                gate.offer(&record);
            }
        }
        Some(outcome)
    }

    /// Route a decoded realtime event.
    pub fn apply(&mut self, event: &ChannelEvent) -> Applied {
        match &event.payload {
            EventPayload::Notification(record) => {
                match self.on_push_event(record.clone()) {
                    Some(PushOutcome::Inserted) => Applied::Inserted(record.clone()),
                    Some(PushOutcome::Duplicate) => Applied::Duplicate(record.id),
                    None => Applied::Ignored,
                }
            }
            EventPayload::UnreadCount(count) => {
                if self.user.is_none() {
                    return Applied::Ignored;
                }
                self.state.set_unread_count(*count);
                self.persist();
                Applied::UnreadCount(*count)
            }
            EventPayload::Update(_) => Applied::Ignored,
        }
    }

    /// Apply a mutation locally and record it as pending. Returns the log
    /// sequence number, or `None` when no user is loaded.
    pub fn begin(&mut self, kind: MutationKind) -> Option<u64> {
        let user = self.user.clone()?;
        match kind {
            MutationKind::MarkRead { id } => {
                self.state.mark_read(id);
            }
            MutationKind::MarkAllRead => self.state.mark_all_read(),
            MutationKind::Delete { id } => {
                self.state.remove(id);
            }
            MutationKind::DeleteAll => self.state.clear(),
        }
        if kind == MutationKind::DeleteAll {
            self.cache.clear(&user);
        } else {
            self.persist();
        }
        Some(self.log.begin(kind))
    }

    /// Record the server's answer for a pending mutation. Local state is not
    /// touched in either case: a success confirms what is already applied,
    /// and a failure keeps it.
    pub fn settle(&mut self, seq: u64, result: Result<(), ApiError>) -> Option<Mutation> {
        let confirmed = match &result {
            Ok(()) => true,
            Err(e) => {
                warn!(seq, error = %e, "Server rejected notification change, keeping local state");
                false
            }
        };
        let settled = self.log.settle(seq, confirmed).cloned();
        if settled.is_none() {
            debug!(seq, "Mutation already settled or evicted");
        }
        settled
    }

    pub async fn mark_as_read(&mut self, id: i64) -> Option<Mutation> {
        self.run(MutationKind::MarkRead { id }).await
    }

    pub async fn mark_all_as_read(&mut self) -> Option<Mutation> {
        self.run(MutationKind::MarkAllRead).await
    }

    pub async fn delete_notification(&mut self, id: i64) -> Option<Mutation> {
        self.run(MutationKind::Delete { id }).await
    }

    pub async fn delete_all_notifications(&mut self) -> Option<Mutation> {
        self.run(MutationKind::DeleteAll).await
    }

    async fn run(&mut self, kind: MutationKind) -> Option<Mutation> {
        let Some(seq) = self.begin(kind) else {
            warn!(?kind, "No user loaded, notification change skipped");
            return None;
        };
        let user = self.user.clone()?;
        let result = match kind {
            MutationKind::MarkRead { id } => self.api.mark_read(id, &user).await,
            MutationKind::MarkAllRead => self.api.mark_all_read(&user).await,
            MutationKind::Delete { id } => self.api.delete(id, &user).await,
            MutationKind::DeleteAll => self.api.delete_all(&user).await,
        };
        self.settle(seq, result)
    }

    /// Forget the loaded user and the session's alert history. The durable
    /// cache is left as is.
    pub fn dispose(&mut self) {
        self.user = None;
        self.state.clear();
        if let Some(gate) = self.alerts.as_mut() {
            gate.dispose();
        }
    }

    fn persist(&self) {
        if let Some(user) = &self.user {
            self.cache.write(user, &self.state.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::RecordingNotifier;
    use crate::api::NotificationHistory;
    use crate::cache::{CacheStore, MemoryCache, cache_key};
    use crate::channel::Channel;
    use crate::envelope::Route;
    use crate::mutation::MutationPhase;
    use crate::state::record;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeApi {
        history: Mutex<Option<NotificationHistory>>,
        fail: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn with_history(notifications: Vec<NotificationRecord>, unread_count: u64) -> Arc<Self> {
            let api = FakeApi::default();
            *api.history.lock() = Some(NotificationHistory {
                success: true,
                notifications,
                unread_count,
                message: None,
            });
            Arc::new(api)
        }

        fn outcome(&self, call: String) -> Result<(), ApiError> {
            self.calls.lock().push(call);
            if self.fail.load(Ordering::SeqCst) {
                Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn fetch_history(&self, address: &str, limit: u32) -> Result<NotificationHistory, ApiError> {
            self.calls.lock().push(format!("fetch {address} {limit}"));
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Status(StatusCode::BAD_GATEWAY));
            }
            Ok(self.history.lock().clone().unwrap_or_default())
        }

        async fn mark_read(&self, id: i64, address: &str) -> Result<(), ApiError> {
            self.outcome(format!("read {id} {address}"))
        }

        async fn mark_all_read(&self, address: &str) -> Result<(), ApiError> {
            self.outcome(format!("read-all {address}"))
        }

        async fn delete(&self, id: i64, address: &str) -> Result<(), ApiError> {
            self.outcome(format!("delete {id} {address}"))
        }

        async fn delete_all(&self, address: &str) -> Result<(), ApiError> {
            self.outcome(format!("delete-all {address}"))
        }
    }

    /// Memory store shared between the center and the test.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryCache>);

    impl CacheStore for SharedStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key)
        }
        fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.put(key, value)
        }
        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.0.remove(key)
        }
    }

    impl SharedStore {
        fn snapshot(&self, address: &str) -> Option<NotificationSnapshot> {
            let raw = self.0.get(&cache_key(address)).unwrap()?;
            Some(serde_json::from_str(&raw).unwrap())
        }
    }

    fn center(api: Arc<FakeApi>) -> (NotificationCenter, SharedStore) {
        let store = SharedStore::default();
        let cache = NotificationCache::new(Box::new(store.clone()));
        (NotificationCenter::new(api, cache), store)
    }

    fn ids(center: &NotificationCenter) -> Vec<i64> {
        center.notifications().iter().map(|n| n.id).collect()
    }

    fn push(record: NotificationRecord) -> ChannelEvent {
        ChannelEvent {
            route: Route::Channel(Channel::user("0xabc")),
            payload: EventPayload::Notification(record),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn history_then_pushes() {
        let api = FakeApi::with_history(vec![record(1, false), record(2, true)], 1);
        let (mut center, store) = center(api.clone());

        let snap = center.load("0xABC").await;
        assert_eq!(snap.unread_count, 1);
        assert_eq!(ids(&center), vec![1, 2]);
        assert_eq!(api.calls.lock()[0], "fetch 0xabc 50");

        assert_eq!(center.apply(&push(record(1, false))), Applied::Duplicate(1));
        assert_eq!(ids(&center), vec![1, 2]);
        assert_eq!(center.unread_count(), 1);

        assert!(matches!(center.apply(&push(record(3, false))), Applied::Inserted(_)));
        assert_eq!(ids(&center), vec![3, 1, 2]);
        assert_eq!(center.unread_count(), 2);

        let cached = store.snapshot("0xabc").unwrap();
        assert_eq!(cached, center.snapshot());
    }

    #[tokio::test]
    async fn events_queued_during_load_replay_without_duplicates() {
        let api = FakeApi::with_history(vec![record(2, false), record(1, true)], 1);
        let (mut center, _store) = center(api);

        // pushed while the history request was in flight
        let queued = vec![push(record(2, false)), push(record(3, false))];
        center.load("0xabc").await;
        let applied: Vec<Applied> = queued.iter().map(|ev| center.apply(ev)).collect();

        assert_eq!(applied[0], Applied::Duplicate(2));
        assert!(matches!(applied[1], Applied::Inserted(ref r) if r.id == 3));
        assert_eq!(ids(&center), vec![3, 2, 1]);
        assert_eq!(center.unread_count(), 2);
    }

    #[tokio::test]
    async fn cache_paints_before_fetch_and_survives_failure() {
        let api = Arc::new(FakeApi::default());
        api.fail.store(true, Ordering::SeqCst);
        let (mut center, store) = center(api.clone());
        store
            .put(
                &cache_key("0xabc"),
                &serde_json::to_string(&NotificationSnapshot {
                    notifications: vec![record(9, false)],
                    unread_count: 1,
                })
                .unwrap(),
            )
            .unwrap();

        center.load("0xabc").await;
        assert_eq!(ids(&center), vec![9]);
        assert_eq!(center.unread_count(), 1);
    }

    #[tokio::test]
    async fn fetched_history_replaces_paint() {
        let api = FakeApi::with_history(vec![record(4, true)], 0);
        let (mut center, store) = center(api);
        store
            .put(
                &cache_key("0xabc"),
                &serde_json::to_string(&NotificationSnapshot {
                    notifications: vec![record(9, false)],
                    unread_count: 1,
                })
                .unwrap(),
            )
            .unwrap();

        center.load("0xabc").await;
        assert_eq!(ids(&center), vec![4]);
        assert_eq!(center.unread_count(), 0);
        assert_eq!(store.snapshot("0xabc").unwrap().notifications.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_confirms() {
        let api = FakeApi::with_history(vec![record(1, false), record(2, false)], 2);
        let (mut center, store) = center(api.clone());
        center.load("0xabc").await;

        let m = center.mark_as_read(1).await.unwrap();
        assert_eq!(m.phase, MutationPhase::Confirmed);
        assert_eq!(center.unread_count(), 1);
        assert!(center.notifications()[0].read);
        assert_eq!(store.snapshot("0xabc").unwrap().unread_count, 1);
        assert!(api.calls.lock().contains(&"read 1 0xabc".to_string()));

        // already read: no second decrement
        center.mark_as_read(1).await;
        assert_eq!(center.unread_count(), 1);
    }

    #[tokio::test]
    async fn failed_mutation_keeps_local_state() {
        let api = FakeApi::with_history(vec![record(1, false), record(2, false)], 2);
        let (mut center, _store) = center(api.clone());
        center.load("0xabc").await;
        api.fail.store(true, Ordering::SeqCst);

        let m = center.mark_all_as_read().await.unwrap();
        assert_eq!(m.phase, MutationPhase::FailedKept);
        assert_eq!(center.unread_count(), 0);
        assert!(center.notifications().iter().all(|n| n.read));

        let m = center.delete_notification(2).await.unwrap();
        assert_eq!(m.phase, MutationPhase::FailedKept);
        assert_eq!(ids(&center), vec![1]);
    }

    #[tokio::test]
    async fn delete_adjusts_unread_and_delete_all_clears_cache() {
        let api = FakeApi::with_history(vec![record(1, false), record(2, true)], 1);
        let (mut center, store) = center(api);
        center.load("0xabc").await;

        center.delete_notification(1).await;
        assert_eq!(ids(&center), vec![2]);
        assert_eq!(center.unread_count(), 0);

        let m = center.delete_all_notifications().await.unwrap();
        assert_eq!(m.phase, MutationPhase::Confirmed);
        assert!(center.notifications().is_empty());
        assert!(store.snapshot("0xabc").is_none());
    }

    #[tokio::test]
    async fn late_confirmation_does_not_undo_a_newer_push() {
        let api = FakeApi::with_history(vec![record(1, false)], 1);
        let (mut center, _store) = center(api);
        center.load("0xabc").await;

        let seq = center.begin(MutationKind::Delete { id: 1 }).unwrap();
        // the server re-sends id 1 before the delete is confirmed
        assert_eq!(center.on_push_event(record(1, false)), Some(PushOutcome::Inserted));
        let settled = center.settle(seq, Ok(())).unwrap();
        assert_eq!(settled.phase, MutationPhase::Confirmed);
        assert_eq!(ids(&center), vec![1]);
        assert_eq!(center.unread_count(), 1);

        assert!(center.settle(seq, Ok(())).is_none());
        assert_eq!(center.mutations().pending().count(), 0);
    }

    #[tokio::test]
    async fn pushes_before_load_or_for_others_are_ignored() {
        let api = FakeApi::with_history(Vec::new(), 0);
        let (mut center, _store) = center(api);
        assert_eq!(center.on_push_event(record(1, false)), None);
        assert!(center.mark_as_read(1).await.is_none());

        center.load("0xabc").await;
        let mut foreign = record(2, false);
        foreign.user_address = "0xdef".to_string();
        assert_eq!(center.apply(&push(foreign)), Applied::Ignored);
        assert!(center.notifications().is_empty());
    }

    #[tokio::test]
    async fn unread_count_event_replaces_counter() {
        let api = FakeApi::with_history(vec![record(1, false)], 1);
        let (mut center, store) = center(api);
        center.load("0xabc").await;

        let event = ChannelEvent {
            route: Route::AllUsers,
            payload: EventPayload::UnreadCount(7),
            timestamp: None,
        };
        assert_eq!(center.apply(&event), Applied::UnreadCount(7));
        assert_eq!(center.unread_count(), 7);
        assert_eq!(store.snapshot("0xabc").unwrap().unread_count, 7);
    }

    #[tokio::test]
    async fn cap_applies_to_pushes() {
        let api = FakeApi::with_history(Vec::new(), 0);
        let (center, _store) = center(api);
        let mut center = center.with_cap(100);
        center.load("0xabc").await;
        for id in 1..=150 {
            center.on_push_event(record(id, false));
        }
        assert_eq!(center.notifications().len(), 100);
        assert_eq!(center.notifications()[0].id, 150);
    }

    #[tokio::test]
    async fn alerts_once_per_id_for_unread_pushes() {
        let api = FakeApi::with_history(Vec::new(), 0);
        let notifier = RecordingNotifier::default();
        let (center, _store) = center(api);
        let mut center = center.with_alerts(AlertGate::new(Box::new(notifier.clone())));
        center.load("0xabc").await;

        center.on_push_event(record(1, false));
        center.on_push_event(record(1, false));
        center.on_push_event(record(2, true));
        assert_eq!(*notifier.shown.lock(), vec![1]);

        center.dispose();
        assert!(center.user().is_none());
        assert!(center.notifications().is_empty());
    }
}
