//! Telemetry client: connection lifecycle, recovery and the current state.
//!
//! All mutations happen on one event loop task per client. The loop
//! multiplexes the live transport's events, the staleness watchdog and the
//! pending reconnect. The shared state sits behind a short-held mutex
//! together with the disposed flag, so once [`TelemetryClient::dispose`]
//! returns no further mutation can land.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use imu_dash_protocol::decode;

use crate::listeners::{ListenerSet, StateCallback, Subscription, lock};
use crate::reconnection::Deadline;
use crate::transport::{Connector, Transport, TransportEvent};
use crate::types::{ClientConfig, ClientState, ErrorKind, LinkState};
use crate::watchdog::Watchdog;
use crate::ws_transport::WsConnector;

/// Buffered transport events per connection.
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    state: ClientState,
    started: bool,
    disposed: bool,
}

/// State shared between the public handle and the event loop.
struct Shared {
    inner: Mutex<Inner>,
    listeners: Arc<ListenerSet>,
    state_tx: watch::Sender<ClientState>,
    cancel: CancellationToken,
}

impl Shared {
    fn snapshot(&self) -> ClientState {
        lock(&self.inner).state.clone()
    }

    /// Applies `f` and publishes the result if anything changed.
    ///
    /// A no-op once disposed. Listeners run after the lock is released.
    fn update(&self, f: impl FnOnce(&mut ClientState)) {
        self.apply(f, false);
    }

    /// Like [`update`](Self::update), but publishes even when the snapshot
    /// is unchanged, so every recorded error reaches the listeners.
    fn report(&self, f: impl FnOnce(&mut ClientState)) {
        self.apply(f, true);
    }

    fn apply(&self, f: impl FnOnce(&mut ClientState), always: bool) {
        let snapshot = {
            let mut inner = lock(&self.inner);
            if inner.disposed {
                return;
            }
            let before = inner.state.clone();
            f(&mut inner.state);
            if inner.state == before && !always {
                return;
            }
            inner.state.clone()
        };
        self.state_tx.send_replace(snapshot.clone());
        self.listeners.notify(&snapshot);
    }
}

/// Live telemetry feed with self-healing connection management.
///
/// Create with [`TelemetryClient::new`] (any [`Connector`]) or
/// [`TelemetryClient::websocket`], call [`start`](Self::start) inside a
/// Tokio runtime, then read [`state`](Self::state) or subscribe. Nothing in
/// the public API fails or panics; all failures surface as state.
pub struct TelemetryClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
}

impl TelemetryClient {
    /// Creates a client. No connection is attempted until [`start`](Self::start).
    pub fn new(connector: impl Connector, config: ClientConfig) -> Self {
        let (state_tx, _) = watch::channel(ClientState::default());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ClientState::default(),
                    started: false,
                    disposed: false,
                }),
                listeners: Arc::new(ListenerSet::default()),
                state_tx,
                cancel: CancellationToken::new(),
            }),
            connector: Arc::new(connector),
            config,
        }
    }

    /// Creates a client that connects to a WebSocket endpoint.
    pub fn websocket(url: impl Into<String>, config: ClientConfig) -> Self {
        Self::new(WsConnector::new(url), config)
    }

    /// Starts the connection sequence. Idempotent; a no-op after dispose.
    ///
    /// Must be called from within a Tokio runtime. Without one the error is
    /// logged and the client stays `Connecting` until started again.
    pub fn start(&self) {
        let runtime = {
            let mut inner = lock(&self.shared.inner);
            if inner.disposed || inner.started {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    inner.started = true;
                    handle
                }
                Err(e) => {
                    error!(error = %e, "telemetry client started outside a Tokio runtime");
                    return;
                }
            }
        };

        let driver = Driver::new(
            self.shared.clone(),
            self.connector.clone(),
            self.config.clone(),
        );
        runtime.spawn(driver.run());
    }

    /// Tears everything down: freezes the state, cancels the watchdog and any
    /// pending reconnect, and releases the transport. Idempotent, and safe to
    /// call from a state listener.
    pub fn dispose(&self) {
        {
            let mut inner = lock(&self.shared.inner);
            if inner.disposed {
                return;
            }
            inner.disposed = true;
        }
        self.shared.cancel.cancel();
        info!("telemetry client disposed");
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.inner).disposed
    }

    /// Current state snapshot.
    pub fn state(&self) -> ClientState {
        self.shared.snapshot()
    }

    /// Registers `callback` to run after every state change.
    ///
    /// It also runs for each rejected frame, even when `last_error` already
    /// reads [`ErrorKind::DecodeFailure`] and the snapshot looks the same.
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClientState) + Send + Sync + 'static,
    {
        let callback: StateCallback = Arc::new(callback);
        self.shared.listeners.add(callback)
    }

    /// Watch channel carrying the latest state, for async consumers.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.shared.state_tx.subscribe()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The transport currently owned by the loop.
struct Link {
    transport: Box<dyn Transport>,
    events: mpsc::Receiver<TransportEvent>,
    /// Open instant, then the receipt time of each decoded sample.
    last_activity: Option<Instant>,
}

impl Link {
    fn release(mut self) {
        self.transport.close();
    }
}

/// Event loop that owns the transport and the timers.
struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    link: Option<Link>,
    reconnect: Deadline,
    /// Armed while a transport is in its handshake.
    handshake: Deadline,
    watchdog: Watchdog,
    attempt: u32,
}

impl Driver {
    fn new(shared: Arc<Shared>, connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        let watchdog = Watchdog::new(config.watchdog_period, config.staleness_window);
        Self {
            shared,
            connector,
            config,
            link: None,
            reconnect: Deadline::default(),
            handshake: Deadline::default(),
            watchdog,
            attempt: 0,
        }
    }

    async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        self.connect();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = next_event(&mut self.link) => self.handle_event(event),

                () = self.reconnect.fired() => {
                    debug!(attempt = self.attempt, "reconnect timer fired");
                    self.connect();
                }

                () = self.handshake.fired() => {
                    warn!(
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "handshake timed out"
                    );
                    self.fail(ErrorKind::TransportError);
                }

                now = self.watchdog.tick() => self.check_staleness(now),
            }
        }

        self.reconnect.cancel();
        self.handshake.cancel();
        if let Some(link) = self.link.take() {
            link.release();
        }
        debug!("telemetry client loop stopped");
    }

    /// Creates a transport unless one is already live.
    fn connect(&mut self) {
        if self.link.is_some() {
            debug!("transport already live, ignoring connect request");
            return;
        }
        self.reconnect.cancel();
        self.shared.update(|s| s.link_state = LinkState::Connecting);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        match self.connector.connect(tx) {
            Ok(transport) => {
                self.link = Some(Link {
                    transport,
                    events: rx,
                    last_activity: None,
                });
                self.handshake.cancel();
                self.handshake.schedule(self.config.connect_timeout);
            }
            Err(e) => {
                warn!(error = %e, "could not create transport");
                self.fail(ErrorKind::TransportCreationFailed);
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let link_state = self.shared.snapshot().link_state;
        match event {
            TransportEvent::Open => {
                if link_state != LinkState::Connecting {
                    debug!(state = %link_state, "ignoring duplicate open");
                    return;
                }
                self.handshake.cancel();
                if let Some(link) = self.link.as_mut() {
                    link.last_activity = Some(Instant::now());
                }
                self.attempt = 0;
                self.shared.update(|s| {
                    s.link_state = LinkState::Open;
                    s.last_error = None;
                    s.attempt = 0;
                });
                info!("telemetry link open");
            }
            TransportEvent::Message(raw) => self.handle_message(link_state, &raw),
            TransportEvent::Error(reason) => {
                warn!(reason = %reason, state = %link_state, "transport error");
                self.fail(ErrorKind::TransportError);
            }
            TransportEvent::Closed => {
                info!(state = %link_state, "transport closed");
                self.fail(ErrorKind::TransportClosed);
            }
        }
    }

    fn handle_message(&mut self, link_state: LinkState, raw: &str) {
        if !matches!(link_state, LinkState::Open | LinkState::Stalled) {
            trace!(state = %link_state, "ignoring frame before handshake");
            return;
        }

        match decode(raw) {
            Ok(sample) => {
                let now = Instant::now();
                if let Some(link) = self.link.as_mut() {
                    link.last_activity = Some(now);
                }
                if link_state == LinkState::Stalled {
                    info!("telemetry flowing again");
                }
                trace!("sample decoded");
                self.shared.update(|s| {
                    s.link_state = LinkState::Open;
                    s.latest_sample = Some(sample);
                    s.last_sample_at = Some(now);
                });
            }
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                self.shared
                    .report(|s| s.last_error = Some(ErrorKind::DecodeFailure));
            }
        }
    }

    /// Releases the transport, reports `Closed` and schedules a reconnect.
    fn fail(&mut self, kind: ErrorKind) {
        self.handshake.cancel();
        if let Some(link) = self.link.take() {
            link.release();
        }
        self.attempt = self.attempt.saturating_add(1);
        let attempt = self.attempt;
        self.shared.update(|s| {
            s.link_state = LinkState::Closed;
            s.last_error = Some(kind);
            s.attempt = attempt;
        });

        let delay = self.config.reconnect.delay_for_attempt(attempt);
        if self.reconnect.schedule(delay) {
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %kind,
                "reconnect scheduled"
            );
        }
    }

    fn check_staleness(&mut self, now: Instant) {
        let Some(last_activity) = self.link.as_ref().and_then(|l| l.last_activity) else {
            return;
        };
        if self.shared.snapshot().link_state != LinkState::Open {
            return;
        }
        if self.watchdog.is_stale(last_activity, now) {
            warn!(
                silent_ms = now.saturating_duration_since(last_activity).as_millis() as u64,
                "no telemetry within staleness window"
            );
            self.shared.update(|s| s.link_state = LinkState::Stalled);
        }
    }
}

/// Next event from the live transport; pending forever without one.
///
/// A transport that drops its sender without reporting counts as closed.
async fn next_event(link: &mut Option<Link>) -> TransportEvent {
    match link {
        Some(link) => link.events.recv().await.unwrap_or(TransportEvent::Closed),
        None => std::future::pending().await,
    }
}
