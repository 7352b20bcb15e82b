//! Session manager: ties credential renewal to connection health.
//!
//! One driver task owns the session state machine and every write to the
//! transport sink (single-writer). Callers interact through cheap handle
//! methods that update the subscription ledger synchronously and pass frame
//! intents to the driver over a command channel. Network failures are
//! recovered locally via reconnect-with-backoff and ledger replay; only
//! fatal auth failures terminate the session.

use crate::{
    auth::CredentialStore,
    config::{ReconnectConfig, SessionConfig},
    data::{EventKind, SessionState},
    error::{AuthError, SdkError, TransportError},
    events::{CallbackId, ErrorCallback, EventCallback, EventDispatcher, StateCallback},
    frames::{self, OutboundFrame},
    ledger::{Subscription, SubscriptionLedger},
    transport::{FrameReceiver, FrameSink, Transport},
};
use rand::Rng;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Deterministic reconnect delay for attempt `n`:
/// `min(initial * multiplier^n, max)`.
pub fn backoff(config: &ReconnectConfig, attempt: u32) -> Duration {
    // The exponent saturates well past any realistic cap, keeping the
    // arithmetic finite for unbounded attempt counts.
    let exponent = attempt.min(64) as i32;
    let base = config.initial_delay.as_millis() as f64 * config.multiplier.powi(exponent);
    let capped = base.min(config.max_delay.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

/// [`backoff`] plus up to `jitter_factor` of additive random jitter, so a
/// fleet of clients does not reconnect in lockstep.
pub fn backoff_with_jitter(config: &ReconnectConfig, attempt: u32) -> Duration {
    let base = backoff(config, attempt);
    if config.jitter_factor == 0.0 {
        return base;
    }
    let spread = base.as_millis() as f64 * config.jitter_factor;
    let jitter = rand::thread_rng().gen_range(0.0..=spread);
    base + Duration::from_millis(jitter as u64)
}

enum Command {
    Send { epoch: u64, frame: OutboundFrame },
}

enum LoopExit {
    Shutdown,
    ConnectionLost,
}

enum EstablishError {
    Fatal(SdkError),
    Transient(SdkError),
}

/// Split an establish-phase failure by [`SdkError::is_retryable`]: transient
/// failures feed the backoff loop, the rest terminate the session.
fn classify(error: SdkError) -> EstablishError {
    if error.is_retryable() {
        EstablishError::Transient(error)
    } else {
        EstablishError::Fatal(error)
    }
}

/// The session orchestrator. Owns one transport channel at a time, consults
/// the credential store before establishing it, replays the subscription
/// ledger after every reconnect, and fans decoded events out through the
/// dispatcher.
pub struct SessionManager<T: Transport> {
    ctx: DriverCtx<T>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct DriverCtx<T: Transport> {
    config: SessionConfig,
    transport: Arc<T>,
    store: Arc<CredentialStore>,
    dispatcher: Arc<EventDispatcher>,
    ledger: Arc<Mutex<SubscriptionLedger>>,
    state: Arc<Mutex<SessionState>>,
    epoch: Arc<AtomicU64>,
}

impl<T: Transport> Clone for DriverCtx<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            ledger: Arc::clone(&self.ledger),
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

impl<T: Transport> DriverCtx<T> {
    fn set_state(&self, next: SessionState) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == next {
                return;
            }
            tracing::info!(from = %*state, to = %next, "session state transition");
            *state = next.clone();
        }
        self.dispatcher.dispatch_state(&next);
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn new(
        config: SessionConfig,
        store: Arc<CredentialStore>,
        transport: T,
    ) -> Result<Self, SdkError> {
        config.validate()?;
        Ok(Self {
            ctx: DriverCtx {
                config,
                transport: Arc::new(transport),
                store,
                dispatcher: Arc::new(EventDispatcher::new()),
                ledger: Arc::new(Mutex::new(SubscriptionLedger::new())),
                state: Arc::new(Mutex::new(SessionState::Disconnected)),
                epoch: Arc::new(AtomicU64::new(0)),
            },
            command_tx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            driver: Mutex::new(None),
        })
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.ctx.state.lock().unwrap().clone()
    }

    /// Snapshot of the subscription ledger in insertion order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.ctx.ledger.lock().unwrap().snapshot()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.ctx.dispatcher
    }

    /// Register an observer for an event kind
    pub fn on(&self, kind: EventKind, callback: EventCallback) -> CallbackId {
        self.ctx.dispatcher.register(kind, callback)
    }

    /// Remove a previously registered observer
    pub fn off(&self, kind: EventKind, id: CallbackId) -> bool {
        self.ctx.dispatcher.unregister(kind, id)
    }

    /// Register an observer on the error channel
    pub fn on_error(&self, callback: ErrorCallback) -> CallbackId {
        self.ctx.dispatcher.register_error(callback)
    }

    /// Register an observer for state transitions
    pub fn on_state_change(&self, callback: StateCallback) -> CallbackId {
        self.ctx.dispatcher.register_state(callback)
    }

    /// Start the session.
    ///
    /// Performs the initial credential check synchronously (a fatal auth
    /// failure is returned to the caller here), then hands off to the driver
    /// task. A no-op when the session is already running; after `Closed` a
    /// fresh call restarts the machine with the preserved ledger.
    pub async fn connect(&self) -> Result<(), SdkError> {
        match self.state() {
            SessionState::Disconnected | SessionState::Closed => {}
            state => {
                tracing::warn!(%state, "connect() ignored, session already running");
                return Ok(());
            }
        }

        if !self.ctx.store.has_credential() {
            return Err(SdkError::NotAuthenticated);
        }
        if let Err(e) = self.ctx.store.bearer_token().await {
            if e.is_fatal() {
                self.ctx.set_state(SessionState::Closed);
                return Err(SdkError::Auth(e));
            }
            // Transient: the driver retries with backoff.
            tracing::warn!("initial credential check failed transiently: {}", e);
        }

        // A previous driver that just reached Closed may still be unwinding;
        // let it finish so only one task ever writes session state.
        let previous = self.driver.lock().unwrap().take();
        if let Some(handle) = previous {
            let _ = handle.await;
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.command_tx.lock().unwrap() = Some(command_tx);
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);

        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            Self::drive(ctx, command_rx, shutdown_rx).await;
        });
        *self.driver.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Record a subscription intent. The subscribe frame is also queued for
    /// the connection whose epoch was current at the moment of the ledger
    /// mutation: the driver sends it once live, or drops it if that
    /// connection died first (the next replay covers it). Returns without
    /// waiting for any network round-trip.
    pub fn subscribe(&self, subscription: Subscription) {
        // Epoch is read under the ledger lock, the same lock `establish`
        // holds while bumping the epoch and snapshotting. An add that a
        // snapshot missed therefore carries the new epoch and is delivered
        // through the command queue instead, never both.
        let (added, epoch) = {
            let mut ledger = self.ctx.ledger.lock().unwrap();
            let added = ledger.add(subscription.clone());
            (added, self.ctx.epoch.load(Ordering::Acquire))
        };
        if !added {
            return;
        }
        tracing::debug!(%subscription, "subscription added to ledger");
        self.enqueue(epoch, OutboundFrame::subscribe(&subscription));
    }

    /// Drop a subscription intent and tell the peer on the current
    /// connection. Removing an absent subscription is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let (removed, epoch) = {
            let mut ledger = self.ctx.ledger.lock().unwrap();
            let removed = ledger.remove(subscription);
            (removed, self.ctx.epoch.load(Ordering::Acquire))
        };
        if !removed {
            return;
        }
        tracing::debug!(%subscription, "subscription removed from ledger");
        self.enqueue(epoch, OutboundFrame::unsubscribe(subscription));
    }

    fn enqueue(&self, epoch: u64, frame: OutboundFrame) {
        if let Some(tx) = self.command_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Command::Send { epoch, frame });
        }
    }

    /// Stop the session: cancels any pending reconnect timer, closes the
    /// channel, and transitions to `Closed`. The subscription ledger is
    /// preserved for a later `connect()`.
    pub fn disconnect(&self) {
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        *self.command_tx.lock().unwrap() = None;
    }

    /// Wait for the driver task to finish after `disconnect()`
    pub async fn join(&self) {
        let handle = self.driver.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn drive(
        ctx: DriverCtx<T>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut attempt: u32 = 0;
        loop {
            ctx.set_state(SessionState::Connecting);

            let established = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    ctx.set_state(SessionState::Closed);
                    return;
                }
                established = Self::establish(&ctx) => established,
            };

            match established {
                Ok((sink, frames, pending)) => {
                    attempt = 0;
                    ctx.set_state(SessionState::Live);
                    let exit = Self::live_loop(
                        &ctx,
                        sink,
                        frames,
                        pending,
                        &mut command_rx,
                        &mut shutdown_rx,
                    )
                    .await;
                    match exit {
                        LoopExit::Shutdown => {
                            ctx.set_state(SessionState::Closed);
                            return;
                        }
                        LoopExit::ConnectionLost => {}
                    }
                }
                Err(EstablishError::Fatal(error)) => {
                    tracing::error!("session terminated: {}", error);
                    ctx.dispatcher.dispatch_error(&error);
                    ctx.set_state(SessionState::Closed);
                    return;
                }
                Err(EstablishError::Transient(error)) => {
                    tracing::warn!("connection attempt failed: {}", error);
                }
            }

            ctx.set_state(SessionState::Reconnecting(attempt));
            let delay = backoff_with_jitter(&ctx.config.reconnect, attempt);
            attempt += 1;
            tracing::info!(?delay, attempt, "waiting before reconnect");

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    // Cancelled timer: no channel is opened after this point.
                    ctx.set_state(SessionState::Closed);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Obtain a valid credential, open the channel, authenticate, and replay
    /// the ledger. On success the session is ready to go `Live`; `pending`
    /// carries a frame that arrived during the auth grace window so it is
    /// processed first, in arrival order.
    async fn establish(
        ctx: &DriverCtx<T>,
    ) -> Result<(T::Sink, FrameReceiver, Option<String>), EstablishError> {
        let token = ctx
            .store
            .bearer_token()
            .await
            .map_err(|e| classify(SdkError::Auth(e)))?;

        let (mut sink, mut frames) = ctx
            .transport
            .connect(&ctx.config.stream_url, &token)
            .await
            .map_err(|e| classify(SdkError::Transport(e)))?;

        // New connection epoch and replay snapshot, taken under one ledger
        // lock: everything added before this point is in the snapshot (its
        // queued command carries a stale epoch and is dropped); everything
        // added after carries the new epoch and reaches this connection via
        // the command queue.
        let snapshot = {
            let ledger = ctx.ledger.lock().unwrap();
            ctx.epoch.fetch_add(1, Ordering::AcqRel);
            ledger.snapshot()
        };

        ctx.set_state(SessionState::Authenticating);
        sink.send(&OutboundFrame::auth(&token))
            .await
            .map_err(|e| classify(SdkError::Transport(e)))?;

        // The protocol has no positive auth ack: wait out a short grace
        // window for an explicit rejection, then proceed optimistically.
        let pending = match tokio::time::timeout(ctx.config.auth_grace, frames.recv()).await {
            Err(_elapsed) => None,
            Ok(None) => {
                return Err(classify(SdkError::Transport(TransportError::Io(
                    "channel closed during authentication".to_string(),
                ))))
            }
            Ok(Some(Err(e))) => {
                return Err(classify(SdkError::Transport(e)));
            }
            Ok(Some(Ok(text))) => {
                if let Ok(event) = frames::decode_frame(&text) {
                    if let Some(reason) = frames::auth_rejection_reason(&event) {
                        return Err(classify(SdkError::Auth(AuthError::Fatal(reason))));
                    }
                }
                Some(text)
            }
        };

        ctx.set_state(SessionState::Subscribing);
        tracing::info!(count = snapshot.len(), "replaying subscription ledger");
        for subscription in &snapshot {
            sink.send(&OutboundFrame::subscribe(subscription))
                .await
                .map_err(|e| classify(SdkError::Transport(e)))?;
        }

        Ok((sink, frames, pending))
    }

    async fn live_loop(
        ctx: &DriverCtx<T>,
        mut sink: T::Sink,
        mut frames: FrameReceiver,
        pending: Option<String>,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        let current_epoch = ctx.epoch.load(Ordering::Acquire);

        if let Some(text) = pending {
            Self::handle_frame(ctx, &text);
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    sink.close().await;
                    return LoopExit::Shutdown;
                }
                command = command_rx.recv() => match command {
                    Some(Command::Send { epoch, frame }) => {
                        if epoch != current_epoch {
                            tracing::debug!("dropping send queued against a dead connection");
                            continue;
                        }
                        if let Err(e) = sink.send(&frame).await {
                            tracing::warn!("send failed, reconnecting: {}", e);
                            sink.close().await;
                            return LoopExit::ConnectionLost;
                        }
                    }
                    // All command senders gone: the manager was dropped or
                    // disconnected, so the session has no owner left.
                    None => {
                        sink.close().await;
                        return LoopExit::Shutdown;
                    }
                },
                frame = frames.recv() => match frame {
                    Some(Ok(text)) => Self::handle_frame(ctx, &text),
                    Some(Err(e)) => {
                        tracing::warn!("transport error, reconnecting: {}", e);
                        sink.close().await;
                        return LoopExit::ConnectionLost;
                    }
                    None => {
                        tracing::info!("channel closed by peer, reconnecting");
                        sink.close().await;
                        return LoopExit::ConnectionLost;
                    }
                },
            }
        }
    }

    fn handle_frame(ctx: &DriverCtx<T>, text: &str) {
        match frames::decode_frame(text) {
            Ok(event) => {
                tracing::trace!(kind = ?event.kind(), "dispatching event");
                ctx.dispatcher.dispatch(&event);
            }
            Err(e) => {
                // Malformed frames are reported, never fatal to the channel.
                tracing::warn!("undecodable frame: {}", e);
                ctx.dispatcher.dispatch_error(&SdkError::Decode(e));
            }
        }
    }
}
