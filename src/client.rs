//! Realtime channel client.
//!
//! A [`RealtimeClient`] owns one link to the push-update endpoint and a driver
//! task that runs the connection state machine:
//!
//! ```text
//! Idle ──subscribe──▶ Connecting ──ok──▶ Open ──close(1000)──▶ Idle
//!                        ▲    │            │
//!                        │    └──err──┐    └──close(other)──┐
//!                        │            ▼                     ▼
//!                        └──timer── Waiting ◀───────────────┘
//! ```
//!
//! Every open re-announces all subscribed channels. Retries are bounded by the
//! [`ReconnectPolicy`]; after the ceiling the client stays down until
//! [`RealtimeClient::reconnect`]. Handles talk to the driver over a command
//! channel, so a pending reconnect timer lives only inside the driver's
//! current phase and is dropped by any teardown.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::envelope::{self, ChannelEvent, Inbound, OutboundFrame};
use crate::reconnect::{ABNORMAL_CLOSE, CLEAN_CLOSE, ReconnectPolicy, RetryBudget, RetryDecision};
use crate::subscription::{Command, Registry, Subscription, SubscriptionStream};
use crate::transport::{Frame, Transport, TransportLink, WsTransport};
use crate::types::{ConnectionState, ConnectionStatus};

/// Construction parameters for a [`RealtimeClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub policy: ReconnectPolicy,
    /// Keepalive period while open; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Initial value of the enabled gate.
    pub enabled: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_WS_URL.to_string(),
            policy: ReconnectPolicy::default(),
            ping_interval: Some(Duration::from_secs(30)),
            enabled: true,
        }
    }
}

pub struct RealtimeClient {
    registry: Arc<Registry>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Spawn the driver task. Must be called inside a Tokio runtime.
    pub fn create(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(Registry::default());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::default());
        let driver = Driver::new(options, transport, registry.clone(), command_rx, status_tx);
        let task = tokio::spawn(driver.run());
        Self {
            registry,
            commands,
            status,
            task: Some(task),
        }
    }

    /// Client over the real WebSocket transport.
    pub fn websocket(options: ClientOptions) -> Self {
        Self::create(options, Arc::new(WsTransport))
    }

    /// Register `handler` for `channel`, opening the link if needed. The
    /// returned handle unsubscribes when dropped.
    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Subscription
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let (id, active, _first) = self.registry.insert(&channel, Arc::new(handler));
        self.send(Command::Subscribe(channel.clone()));
        Subscription::new(channel, id, active, self.registry.clone(), self.commands.clone())
    }

    /// Like [`subscribe`](Self::subscribe) but queues events for `recv().await`.
    pub fn subscribe_stream(&self, channel: Channel) -> SubscriptionStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(channel, move |event: &ChannelEvent| {
            let _ = tx.send(event.clone());
        });
        SubscriptionStream::new(subscription, rx)
    }

    /// `None` means the channel is not known yet (e.g. no wallet address):
    /// nothing is subscribed and no connection is attempted.
    pub fn connect<F>(&self, channel: Option<Channel>, handler: F) -> Option<Subscription>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        channel.map(|channel| self.subscribe(channel, handler))
    }

    /// Close the link with a clean close and cancel any pending reconnect.
    /// Subscriptions stay registered; a later subscribe or
    /// [`reconnect`](Self::reconnect) opens a fresh link.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Drop the current link (if any) and connect again with a fresh retry
    /// budget. This is the only way back after the attempt ceiling.
    pub fn reconnect(&self) {
        self.send(Command::Reconnect);
    }

    /// Gate connection on an external precondition. Disabling tears down the
    /// link; enabling connects when at least one channel is subscribed.
    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.registry.channels()
    }

    /// Disconnect, stop the driver and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Realtime driver task ended abnormally");
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Realtime driver already stopped");
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

type Opening = BoxFuture<'static, Result<Box<dyn TransportLink>>>;

enum Phase {
    Idle,
    Connecting(Opening),
    Open(Box<dyn TransportLink>),
    Waiting(Pin<Box<Sleep>>),
}

enum Wake {
    Command(Option<Command>),
    Opened(Result<Box<dyn TransportLink>>),
    Frame(Frame),
    Heartbeat,
    RetryDue,
}

struct Driver {
    url: String,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    budget: RetryBudget,
    enabled: bool,
    gave_up: bool,
    ping_interval: Option<Duration>,
    heartbeat: Option<Interval>,
    /// Channels a `subscribe` frame was sent for on the current link.
    announced: HashSet<Channel>,
    phase: Phase,
}

impl Driver {
    fn new(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            url: options.url,
            transport,
            registry,
            commands,
            status,
            budget: RetryBudget::new(options.policy),
            enabled: options.enabled,
            gave_up: false,
            ping_interval: options.ping_interval.filter(|d| !d.is_zero()),
            heartbeat: None,
            announced: HashSet::new(),
            phase: Phase::Idle,
        }
    }

    async fn run(mut self) {
        loop {
            let wake = match &mut self.phase {
                Phase::Idle => Wake::Command(self.commands.recv().await),
                Phase::Connecting(opening) => tokio::select! {
                    result = opening => Wake::Opened(result),
                    command = self.commands.recv() => Wake::Command(command),
                },
                Phase::Open(link) => tokio::select! {
                    frame = link.next_frame() => Wake::Frame(frame),
                    _ = heartbeat_tick(&mut self.heartbeat) => Wake::Heartbeat,
                    command = self.commands.recv() => Wake::Command(command),
                },
                Phase::Waiting(timer) => tokio::select! {
                    _ = timer.as_mut() => Wake::RetryDue,
                    command = self.commands.recv() => Wake::Command(command),
                },
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => {
                    self.teardown().await;
                    self.registry.clear();
                    debug!("Realtime driver stopped");
                    break;
                }
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Opened(Ok(link)) => self.on_open(link).await,
                Wake::Opened(Err(e)) => {
                    warn!(url = %self.url, error = %e, "Connection attempt failed");
                    self.on_closed(ABNORMAL_CLOSE);
                }
                Wake::Frame(Frame::Text(text)) => self.on_text(&text),
                Wake::Frame(Frame::Closed(code)) => self.on_closed(code),
                Wake::Heartbeat => {
                    if let Phase::Open(link) = &mut self.phase {
                        if let Err(e) = link.ping().await {
                            debug!(error = %e, "Heartbeat ping failed");
                        }
                    }
                }
                Wake::RetryDue => self.start_connecting(),
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe(channel) => match self.phase {
                Phase::Open(_) => self.announce(channel).await,
                Phase::Idle if self.enabled && !self.gave_up => self.start_connecting(),
                _ => {}
            },
            Command::Release(channel) => {
                if self.registry.contains(&channel) {
                    return;
                }
                if self.announced.remove(&channel) {
                    self.send(OutboundFrame::Unsubscribe { channel }).await;
                }
            }
            Command::SetEnabled(enabled) => {
                self.enabled = enabled;
                if !enabled {
                    info!("Realtime updates disabled");
                    self.teardown().await;
                } else if matches!(self.phase, Phase::Idle)
                    && !self.gave_up
                    && !self.registry.is_empty()
                {
                    self.start_connecting();
                }
            }
            Command::Reconnect => {
                info!("Manual reconnect requested");
                self.budget.reset();
                self.gave_up = false;
                self.teardown().await;
                if self.enabled {
                    self.start_connecting();
                }
            }
            Command::Disconnect => {
                self.budget.reset();
                self.gave_up = false;
                self.teardown().await;
            }
            // handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn start_connecting(&mut self) {
        let transport = self.transport.clone();
        let url = self.url.clone();
        info!(url = %url, attempt = self.budget.attempts(), "Connecting");
        self.phase = Phase::Connecting(Box::pin(async move { transport.open(&url).await }));
        self.publish(|s| {
            s.state = ConnectionState::Connecting;
            s.reconnect_pending = false;
        });
    }

    async fn on_open(&mut self, link: Box<dyn TransportLink>) {
        info!(url = %self.url, "Connected");
        self.budget.on_open();
        self.gave_up = false;
        self.announced.clear();
        self.phase = Phase::Open(link);
        self.heartbeat = self.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        self.publish(|s| {
            s.state = ConnectionState::Connected;
            s.retry_count = 0;
            s.reconnect_pending = false;
            s.gave_up = false;
        });
        // Server-side subscriptions do not survive a reconnect.
        for channel in self.registry.channels() {
            self.announce(channel).await;
        }
    }

    fn on_text(&self, text: &str) {
        match envelope::decode(text) {
            Ok(Inbound::Event(event)) => {
                if self.registry.dispatch(&event) == 0 {
                    debug!(route = ?event.route, "Dropping event with no subscriber");
                }
            }
            Ok(Inbound::Subscribed(channel)) => debug!(channel = %channel, "Subscription acknowledged"),
            Ok(Inbound::Unsubscribed(channel)) => debug!(channel = %channel, "Unsubscription acknowledged"),
            Ok(Inbound::ServerError(message)) => warn!(message = %message, "Server reported an error"),
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn on_closed(&mut self, code: u16) {
        self.phase = Phase::Idle;
        self.heartbeat = None;
        self.announced.clear();

        if code == CLEAN_CLOSE || !self.enabled {
            info!(code, "Connection closed");
            self.publish(|s| {
                s.state = ConnectionState::Disconnected;
                s.reconnect_pending = false;
            });
            return;
        }

        match self.budget.on_abnormal_close() {
            RetryDecision::Retry { attempt, delay } => {
                warn!(
                    code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Connection lost, scheduling reconnect"
                );
                self.phase = Phase::Waiting(Box::pin(tokio::time::sleep(delay)));
                self.publish(|s| {
                    s.state = ConnectionState::Disconnected;
                    s.retry_count = attempt;
                    s.reconnect_pending = true;
                });
            }
            RetryDecision::Exhausted => {
                error!(
                    attempts = self.budget.attempts(),
                    "Reconnect attempts exhausted, staying disconnected"
                );
                self.gave_up = true;
                self.publish(|s| {
                    s.state = ConnectionState::Disconnected;
                    s.reconnect_pending = false;
                    s.gave_up = true;
                });
            }
        }
    }

    /// Leave whatever phase we are in for `Idle`. Drops a pending timer or an
    /// in-flight open; closes an open link cleanly.
    async fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.phase, Phase::Idle);
        if let Phase::Open(mut link) = previous {
            link.close(CLEAN_CLOSE).await;
            info!("Disconnected");
        }
        self.heartbeat = None;
        self.announced.clear();
        let retry_count = self.budget.attempts();
        let gave_up = self.gave_up;
        self.publish(|s| {
            s.state = ConnectionState::Disconnected;
            s.retry_count = retry_count;
            s.reconnect_pending = false;
            s.gave_up = gave_up;
        });
    }

    async fn announce(&mut self, channel: Channel) {
        if self.announced.contains(&channel) {
            return;
        }
        debug!(channel = %channel, "Subscribing");
        if self.send(OutboundFrame::Subscribe { channel: channel.clone() }).await {
            self.announced.insert(channel);
        }
    }

    /// Returns false when there is no open link or the send failed. A failed
    /// send surfaces again as a close on the next read.
    async fn send(&mut self, frame: OutboundFrame) -> bool {
        let Phase::Open(link) = &mut self.phase else {
            return false;
        };
        match link.send_text(frame.to_text()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to send frame");
                false
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut ConnectionStatus)) {
        self.status.send_if_modified(|status| {
            let before = *status;
            update(status);
            *status != before
        });
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventPayload;
    use crate::transport::testing::FakeTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options() -> ClientOptions {
        ClientOptions {
            url: "ws://test.invalid/ws".to_string(),
            policy: ReconnectPolicy::default(),
            ping_interval: None,
            enabled: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn six_abnormal_closes_schedule_five_retries_then_stop() {
        let (transport, _servers) = FakeTransport::new(false);
        let client = RealtimeClient::create(options(), transport.clone());
        let _sub = client.subscribe(Channel::user("0xabc"), |_| {});

        let status = *client
            .watch_status()
            .wait_for(|s| s.gave_up)
            .await
            .unwrap();
        assert_eq!(status.retry_count, 5);
        assert!(!status.reconnect_pending);
        assert!(!status.is_connected());
        // one initial attempt plus five retries
        assert_eq!(transport.opens(), 6);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.opens(), 6);
        assert!(!client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (transport, _servers) = FakeTransport::new(false);
        let client = RealtimeClient::create(options(), transport.clone());
        let _sub = client.subscribe(Channel::user("0xabc"), |_| {});
        let mut status = client.watch_status();

        status.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(transport.opens(), 1);

        client.disconnect();
        status.wait_for(|s| !s.reconnect_pending).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.opens(), 1);
        assert!(!client.is_connected());
        // safe to repeat
        client.disconnect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_after_giving_up() {
        let (transport, mut servers) = FakeTransport::new(false);
        let client = RealtimeClient::create(options(), transport.clone());
        let _sub = client.subscribe(Channel::user("0xabc"), |_| {});
        client.watch_status().wait_for(|s| s.gave_up).await.unwrap();

        transport.accept.store(true, Ordering::SeqCst);
        client.reconnect();
        let mut server = servers.recv().await.unwrap();
        assert_eq!(
            server.next_json().await,
            json!({"type": "subscribe", "channel": "user:0xabc"})
        );
        let status = *client
            .watch_status()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();
        assert_eq!(status.retry_count, 0);
        assert!(!status.gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_announces_channel_and_routes_events() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let mut user = client.subscribe_stream(Channel::user("0xABC"));

        let mut server = servers.recv().await.unwrap();
        assert_eq!(
            server.next_json().await,
            json!({"type": "subscribe", "channel": "user:0xabc"})
        );
        client.watch_status().wait_for(|s| s.is_connected()).await.unwrap();

        server.push(json!({"type": "update", "channel": "pool:1", "data": {"poolId": 1}}));
        server.push(json!({"type": "update", "channel": "user:0xabc", "data": {"id": 1, "title": "t"}}));

        let event = user.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Notification(ref r) if r.id == 1));
        assert!(user.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_channel_reuses_open_link() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let _user = client.subscribe_stream(Channel::user("0xabc"));
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;
        client.watch_status().wait_for(|s| s.is_connected()).await.unwrap();

        let mut pool = client.subscribe_stream(Channel::pool(7));
        assert_eq!(
            server.next_json().await,
            json!({"type": "subscribe", "channel": "pool:7"})
        );
        server.push(json!({"type": "update", "channel": "pool:7", "data": {"poolId": 7}}));
        let event = pool.recv().await.unwrap();
        assert_eq!(event.payload, EventPayload::Update(json!({"poolId": 7})));
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_reconnects_and_resubscribes() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let mut user = client.subscribe_stream(Channel::user("0xabc"));
        let mut first = servers.recv().await.unwrap();
        first.next_text().await;

        drop(first);
        let mut second = servers.recv().await.unwrap();
        assert_eq!(
            second.next_json().await,
            json!({"type": "subscribe", "channel": "user:0xabc"})
        );
        let status = *client
            .watch_status()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();
        assert_eq!(status.retry_count, 0);
        assert_eq!(transport.opens(), 2);

        second.push(json!({"type": "notification", "notification": {"id": 4, "userAddress": "0xABC"}}));
        let event = user.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Notification(ref r) if r.id == 4));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_is_skipped() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let mut pool = client.subscribe_stream(Channel::pool(1));
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;

        server.to_client.send(Frame::Text("{not json".to_string())).unwrap();
        server.push(json!({"type": "mystery"}));
        server.push(json!({"type": "update", "channel": "pool:1", "data": {"n": 2}}));

        let event = pool.recv().await.unwrap();
        assert_eq!(event.payload, EventPayload::Update(json!({"n": 2})));
        assert!(client.is_connected());
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_server_close_is_not_retried() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let _sub = client.subscribe(Channel::pool(1), |_| {});
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;
        client.watch_status().wait_for(|s| s.is_connected()).await.unwrap();

        server.to_client.send(Frame::Closed(CLEAN_CLOSE)).unwrap();
        client.watch_status().wait_for(|s| !s.is_connected()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(transport.opens(), 1);
        assert!(!client.status().reconnect_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn no_channel_means_no_connection() {
        let (transport, _servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let sub = client.connect(None, |_| {});
        assert!(sub.is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.opens(), 0);
        assert!(!client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_client_waits_for_enable() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(
            ClientOptions {
                enabled: false,
                ..options()
            },
            transport.clone(),
        );
        let _sub = client.connect(Some(Channel::user("0xabc")), |_| {});
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.opens(), 0);

        client.set_enabled(true);
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;
        assert_eq!(transport.opens(), 1);

        client.set_enabled(false);
        assert_eq!(server.next_text().await, "close:1000");
        client.watch_status().wait_for(|s| !s.is_connected()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_sends_unsubscribe() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let sub = client.subscribe(Channel::pool(3), |_| {});
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;

        drop(sub);
        assert_eq!(
            server.next_json().await,
            json!({"type": "unsubscribe", "channel": "pool:3"})
        );
        assert!(client.channels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_cleanly_and_ends_streams() {
        let (transport, mut servers) = FakeTransport::new(true);
        let client = RealtimeClient::create(options(), transport.clone());
        let mut user = client.subscribe_stream(Channel::user("0xabc"));
        let mut server = servers.recv().await.unwrap();
        server.next_text().await;

        client.shutdown().await;
        assert_eq!(server.next_text().await, "close:1000");
        assert!(user.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_while_open() {
        struct PingCounter {
            pings: Arc<AtomicUsize>,
            inbound: mpsc::UnboundedReceiver<Frame>,
        }

        #[async_trait]
        impl TransportLink for PingCounter {
            async fn send_text(&mut self, _text: String) -> Result<()> {
                Ok(())
            }
            async fn ping(&mut self) -> Result<()> {
                self.pings.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn next_frame(&mut self) -> Frame {
                self.inbound
                    .recv()
                    .await
                    .unwrap_or(Frame::Closed(ABNORMAL_CLOSE))
            }
            async fn close(&mut self, _code: u16) {}
        }

        struct PingTransport {
            pings: Arc<AtomicUsize>,
            keep: parking_lot::Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
        }

        #[async_trait]
        impl Transport for PingTransport {
            async fn open(&self, _url: &str) -> Result<Box<dyn TransportLink>> {
                let (tx, inbound) = mpsc::unbounded_channel();
                self.keep.lock().push(tx);
                Ok(Box::new(PingCounter {
                    pings: self.pings.clone(),
                    inbound,
                }))
            }
        }

        let pings = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(PingTransport {
            pings: pings.clone(),
            keep: parking_lot::Mutex::new(Vec::new()),
        });
        let client = RealtimeClient::create(
            ClientOptions {
                ping_interval: Some(Duration::from_secs(30)),
                ..options()
            },
            transport,
        );
        let _sub = client.subscribe(Channel::pool(1), |_| {});
        client.watch_status().wait_for(|s| s.is_connected()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(pings.load(Ordering::SeqCst), 3);
    }
}
