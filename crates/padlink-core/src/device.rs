//! Async driver for one device session.
//!
//! [`DeviceSession`] runs the connect and handshake steps on the caller's
//! task. [`DeviceSession::spawn`] then moves the session into a decode loop
//! that owns the measurement subscription and processes notifications one at
//! a time, in arrival order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use padlink_transport::{
    Central, Characteristic, LinkStatus, Peripheral, PeripheralId, ScanFilter, TransportError,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::buttons::ButtonEvent;
use crate::errors::{HandshakeError, SessionError};
use crate::handshake::perform_handshake;
use crate::protocol::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::session::{PacketOutcome, SessionInput, SessionMachine, SessionState, SessionStats};

/// Per-session settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    /// Log every packet at trace level
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            debug: false,
        }
    }
}

/// Aborts an in-flight handshake from another task.
#[derive(Clone, Debug)]
pub struct HandshakeCanceller(Arc<watch::Sender<bool>>);

impl HandshakeCanceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Why the decode loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Teardown {
    Requested,
    LinkLost,
}

/// A device session before its decode loop is running.
pub struct DeviceSession {
    machine: SessionMachine,
    options: SessionOptions,
    peripheral: Option<Arc<dyn Peripheral>>,
    measurements: Option<mpsc::Receiver<Bytes>>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl DeviceSession {
    pub fn new(options: SessionOptions) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            machine: SessionMachine::new(),
            options,
            peripheral: None,
            measurements: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn peripheral_id(&self) -> Option<PeripheralId> {
        self.peripheral.as_ref().map(|p| p.id())
    }

    pub fn canceller(&self) -> HandshakeCanceller {
        HandshakeCanceller(self.cancel_tx.clone())
    }

    /// Acquire a peripheral handle. Disconnected → Connecting → Handshaking.
    pub async fn connect(
        &mut self,
        central: &dyn Central,
        filter: &ScanFilter,
    ) -> Result<PeripheralId, SessionError> {
        self.machine.handle(SessionInput::Connect)?;

        match central.connect(filter).await {
            Ok(peripheral) => {
                let id = peripheral.id();
                info!(peripheral = %id, name = %peripheral.name(), "peripheral connected");
                self.peripheral = Some(peripheral);
                self.machine.handle(SessionInput::GattReady)?;
                Ok(id)
            }
            Err(e) => {
                warn!("connect failed: {}", e);
                self.machine.handle(SessionInput::ConnectFailed)?;
                Err(e.into())
            }
        }
    }

    /// Run the key exchange and enable measurement notifications.
    ///
    /// On failure the peripheral handle is released. The session returns to
    /// `Disconnected`, or ends `Closed` if the link dropped mid-exchange.
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        let peripheral = match (self.machine.state(), &self.peripheral) {
            (SessionState::Handshaking, Some(peripheral)) => peripheral.clone(),
            (state, _) => {
                return Err(SessionError::InvalidState {
                    operation: "handshake",
                    state,
                })
            }
        };

        let mut cancel = self.cancel_rx.clone();
        let result = async {
            let keys =
                perform_handshake(peripheral.as_ref(), self.options.handshake_timeout, &mut cancel)
                    .await?;
            let measurements = peripheral.subscribe(Characteristic::Measurement).await?;
            Ok::<_, SessionError>((keys, measurements))
        }
        .await;

        match result {
            Ok((keys, measurements)) => {
                self.machine.handle(SessionInput::HandshakeSucceeded(keys))?;
                self.measurements = Some(measurements);
                Ok(())
            }
            Err(e) => {
                warn!(peripheral = %peripheral.id(), "handshake failed: {}", e);
                let input = if is_link_loss(&e) {
                    SessionInput::LinkLost
                } else {
                    SessionInput::HandshakeFailed
                };
                self.machine.handle(input)?;
                if let Err(e) = peripheral.disconnect().await {
                    debug!("failed to release peripheral: {}", e);
                }
                self.peripheral = None;
                Err(e)
            }
        }
    }

    /// Abandon the session before its decode loop starts. Always ends `Closed`.
    pub async fn release(&mut self) {
        let _ = self.machine.handle(SessionInput::Disconnect);
        self.measurements = None;
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = peripheral.disconnect().await {
                debug!(peripheral = %peripheral.id(), "failed to release peripheral: {}", e);
            }
        }
    }

    /// Start the decode loop. Every emitted event is passed to `sink`.
    pub fn spawn<F>(self, sink: F) -> Result<DeviceSessionHandle, SessionError>
    where
        F: FnMut(ButtonEvent) + Send + 'static,
    {
        let state = self.machine.state();
        let (peripheral, measurements) = match (state, self.peripheral, self.measurements) {
            (SessionState::Subscribed, Some(p), Some(m)) => (p, m),
            (state, _, _) => {
                return Err(SessionError::InvalidState {
                    operation: "spawn",
                    state,
                })
            }
        };

        let peripheral_id = peripheral.id();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Subscribed);
        let stats = Arc::new(Mutex::new(self.machine.stats()));

        let task = tokio::spawn(run_decode_loop(DecodeLoop {
            machine: self.machine,
            peripheral,
            measurements,
            shutdown: shutdown_rx,
            state: state_tx,
            stats: stats.clone(),
            debug: self.options.debug,
            sink,
        }));

        Ok(DeviceSessionHandle {
            peripheral_id,
            state: state_rx,
            stats,
            shutdown: shutdown_tx,
            task: Some(task),
        })
    }
}

fn is_link_loss(err: &SessionError) -> bool {
    matches!(
        err,
        SessionError::Transport(TransportError::Disconnected)
            | SessionError::Handshake(HandshakeError::Transport(TransportError::Disconnected))
    )
}

/// Handle to a running device session. Dropping it ends the session.
pub struct DeviceSessionHandle {
    peripheral_id: PeripheralId,
    state: watch::Receiver<SessionState>,
    stats: Arc<Mutex<SessionStats>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DeviceSessionHandle {
    pub fn peripheral_id(&self) -> &PeripheralId {
        &self.peripheral_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch for state changes; the last value is always `Closed`.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }

    /// Wait until the session has closed for any reason.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(SessionState::is_terminal).await;
    }

    /// Unsubscribe, release the peripheral and wait for the loop to end.
    pub async fn disconnect(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("decode loop ended abnormally: {}", e);
            }
        }
    }
}

struct DecodeLoop<F> {
    machine: SessionMachine,
    peripheral: Arc<dyn Peripheral>,
    measurements: mpsc::Receiver<Bytes>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<SessionState>,
    stats: Arc<Mutex<SessionStats>>,
    debug: bool,
    sink: F,
}

async fn run_decode_loop<F>(mut ctx: DecodeLoop<F>)
where
    F: FnMut(ButtonEvent) + Send + 'static,
{
    let id = ctx.peripheral.id();
    let mut link = ctx.peripheral.link_status();
    info!(peripheral = %id, "session subscribed");

    let teardown = loop {
        let lost = *link.borrow_and_update() == LinkStatus::Disconnected;
        if lost {
            break Teardown::LinkLost;
        }

        tokio::select! {
            biased;

            _ = ctx.shutdown.changed() => break Teardown::Requested,
            changed = link.changed() => {
                if changed.is_err() {
                    break Teardown::LinkLost;
                }
            }
            notification = ctx.measurements.recv() => {
                let Some(packet) = notification else {
                    break Teardown::LinkLost;
                };
                handle_packet(&mut ctx, &id, &packet);
            }
        }
    };

    let input = match teardown {
        Teardown::Requested => SessionInput::Disconnect,
        Teardown::LinkLost => SessionInput::LinkLost,
    };
    // Close first so nothing decoded from here on can emit.
    let _ = ctx.machine.handle(input);
    ctx.measurements.close();

    if let Err(e) = ctx.peripheral.unsubscribe(Characteristic::Measurement).await {
        debug!(peripheral = %id, "unsubscribe failed: {}", e);
    }
    if let Err(e) = ctx.peripheral.disconnect().await {
        debug!(peripheral = %id, "disconnect failed: {}", e);
    }

    *ctx.stats.lock() = ctx.machine.stats();
    ctx.state.send_replace(SessionState::Closed);
    match teardown {
        Teardown::Requested => info!(peripheral = %id, "session disconnected"),
        Teardown::LinkLost => warn!(peripheral = %id, "link lost, session closed"),
    }
}

fn handle_packet<F>(ctx: &mut DecodeLoop<F>, id: &PeripheralId, packet: &[u8])
where
    F: FnMut(ButtonEvent),
{
    if ctx.debug {
        trace!(peripheral = %id, packet = %hex::encode(packet), "notification");
    }

    let outcome = ctx.machine.on_notification(packet);
    // Stats are current before any event is delivered.
    *ctx.stats.lock() = ctx.machine.stats();

    match outcome {
        PacketOutcome::Buttons(events) => {
            for event in events {
                if ctx.debug {
                    trace!(
                        peripheral = %id,
                        button = %event.button,
                        pressed = event.pressed,
                        source = %event.source,
                        "button event"
                    );
                }
                (ctx.sink)(event);
            }
        }
        PacketOutcome::AuthFailed { counter } => {
            debug!(peripheral = %id, counter, "dropping packet with bad tag");
        }
        PacketOutcome::Malformed { len } => {
            debug!(peripheral = %id, len, "dropping short packet");
        }
        PacketOutcome::UnknownOpcode(opcode) => {
            debug!(peripheral = %id, opcode, "ignoring unknown opcode");
        }
        PacketOutcome::Idle | PacketOutcome::Empty | PacketOutcome::Ignored => {}
    }
}
