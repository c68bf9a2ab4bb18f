use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::Channel;
use crate::envelope::ChannelEvent;

/// Callback invoked on the client's driver task for each routed event.
///
/// Handlers must not block; hand heavy work to another task.
pub type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler,
}

/// Channel → handlers table shared by the client handle, the driver and
/// every [`Subscription`].
#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    channels: Mutex<HashMap<Channel, Vec<Entry>>>,
}

impl Registry {
    /// Returns the entry id, its liveness flag, and whether this is the first
    /// handler on the channel.
    pub(crate) fn insert(&self, channel: &Channel, handler: Handler) -> (u64, Arc<AtomicBool>, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let mut channels = self.channels.lock();
        let entries = channels.entry(channel.clone()).or_default();
        let first = entries.is_empty();
        entries.push(Entry {
            id,
            active: active.clone(),
            handler,
        });
        (id, active, first)
    }

    /// Returns true when the channel has no handlers left.
    pub(crate) fn remove(&self, channel: &Channel, id: u64) -> bool {
        let mut channels = self.channels.lock();
        let Some(entries) = channels.get_mut(channel) else {
            return true;
        };
        entries.retain(|e| e.id != id);
        if entries.is_empty() {
            channels.remove(channel);
            true
        } else {
            false
        }
    }

    pub(crate) fn contains(&self, channel: &Channel) -> bool {
        self.channels.lock().contains_key(channel)
    }

    pub(crate) fn channels(&self) -> Vec<Channel> {
        let mut list: Vec<Channel> = self.channels.lock().keys().cloned().collect();
        list.sort();
        list
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    /// Drop every handler. Used when the client shuts down so queued
    /// streams observe end-of-stream.
    pub(crate) fn clear(&self) {
        let drained: Vec<Entry> = self
            .channels
            .lock()
            .drain()
            .flat_map(|(_, entries)| entries)
            .collect();
        for entry in &drained {
            entry.active.store(false, Ordering::Release);
        }
    }

    /// Deliver to every live handler whose channel matches the event's route.
    /// Returns the number of handlers invoked.
    pub(crate) fn dispatch(&self, event: &ChannelEvent) -> usize {
        let targets: Vec<(Arc<AtomicBool>, Handler)> = {
            let channels = self.channels.lock();
            channels
                .iter()
                .filter(|(channel, _)| event.route.matches(channel))
                .flat_map(|(_, entries)| entries.iter())
                .map(|e| (e.active.clone(), e.handler.clone()))
                .collect()
        };
        // Invoke outside the lock so handlers may subscribe or drop handles.
        let mut delivered = 0;
        for (active, handler) in targets {
            if active.load(Ordering::Acquire) {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }
}

/// Messages from handles to the driver task.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(Channel),
    Release(Channel),
    SetEnabled(bool),
    Reconnect,
    Disconnect,
    Shutdown,
}

/// Disposer for one channel subscription. Dropping it unregisters the
/// handler; once the drop returns, no new invocation of that handler begins.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    channel: Channel,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Arc<Registry>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub(crate) fn new(
        channel: Channel,
        id: u64,
        active: Arc<AtomicBool>,
        registry: Arc<Registry>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            channel,
            id,
            active,
            registry,
            commands,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Explicit form of dropping the handle.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if self.registry.remove(&self.channel, self.id) {
            debug!(channel = %self.channel, "Last handler released");
            // The driver may already be gone; nothing to release then.
            let _ = self.commands.send(Command::Release(self.channel.clone()));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

/// A subscription that queues events for async consumption.
#[derive(Debug)]
pub struct SubscriptionStream {
    subscription: Subscription,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl SubscriptionStream {
    pub(crate) fn new(subscription: Subscription, events: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self {
            subscription,
            events,
        }
    }

    pub fn channel(&self) -> &Channel {
        self.subscription.channel()
    }

    /// Next event for this channel. `None` once the client has shut down and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }
}
