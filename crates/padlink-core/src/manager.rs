//! Session manager: up to two pads, one merged event stream.
//!
//! A connect reserves its slot, then runs the radio connect and handshake
//! without holding the slot lock, so other slots and queries stay
//! responsive. A per-session reaper frees the slot when a session closes on
//! its own (link loss), so the aggregate state always reflects live sessions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use padlink_transport::{Central, PeripheralId};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info};

use crate::buttons::ButtonEvent;
use crate::config::PadlinkConfig;
use crate::device::{DeviceSession, DeviceSessionHandle, HandshakeCanceller};
use crate::errors::{HandshakeError, ManagerError};
use crate::session::{SessionState, SessionStats};

/// The two session slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PadSlot {
    First,
    Second,
}

impl fmt::Display for PadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PadSlot::First => "first",
            PadSlot::Second => "second",
        })
    }
}

/// Connected iff at least one session is subscribed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateState {
    Disconnected,
    Connected,
}

/// A button event tagged with the pad that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PadEvent {
    pub slot: PadSlot,
    pub peripheral: PeripheralId,
    pub event: ButtonEvent,
}

enum SlotEntry {
    /// Connect or handshake in flight. Holds the slot without the lock.
    Pending {
        attempt: u64,
        peripheral: Option<PeripheralId>,
        canceller: HandshakeCanceller,
    },
    Live {
        session_id: u64,
        handle: DeviceSessionHandle,
    },
}

impl SlotEntry {
    fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            SlotEntry::Pending { peripheral, .. } => peripheral.as_ref(),
            SlotEntry::Live { handle, .. } => Some(handle.peripheral_id()),
        }
    }

    fn is_attempt(&self, id: u64) -> bool {
        matches!(self, SlotEntry::Pending { attempt, .. } if *attempt == id)
    }

    fn live(&self) -> Option<&DeviceSessionHandle> {
        match self {
            SlotEntry::Live { handle, .. } => Some(handle),
            SlotEntry::Pending { .. } => None,
        }
    }
}

struct Inner {
    central: Arc<dyn Central>,
    config: PadlinkConfig,
    slots: Mutex<BTreeMap<PadSlot, SlotEntry>>,
    events: broadcast::Sender<PadEvent>,
    aggregate: watch::Sender<AggregateState>,
    next_id: AtomicU64,
}

impl Inner {
    fn refresh_aggregate(&self, slots: &BTreeMap<PadSlot, SlotEntry>) {
        let state = if slots
            .values()
            .filter_map(SlotEntry::live)
            .any(|handle| handle.state() == SessionState::Subscribed)
        {
            AggregateState::Connected
        } else {
            AggregateState::Disconnected
        };

        let changed = self.aggregate.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            info!(?state, "aggregate state changed");
        }
    }
}

/// Owns the device sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(central: Arc<dyn Central>, config: PadlinkConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (aggregate, _) = watch::channel(AggregateState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                central,
                config,
                slots: Mutex::new(BTreeMap::new()),
                events,
                aggregate,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &PadlinkConfig {
        &self.inner.config
    }

    pub async fn connect_first(&self) -> Result<PeripheralId, ManagerError> {
        self.connect(PadSlot::First).await
    }

    pub async fn connect_second(&self) -> Result<PeripheralId, ManagerError> {
        self.connect(PadSlot::Second).await
    }

    /// Connect, handshake and start a session in `slot`.
    ///
    /// The slot is reserved for the whole attempt. If the returned future is
    /// dropped mid-attempt, `disconnect(slot)` clears the reservation.
    pub async fn connect(&self, slot: PadSlot) -> Result<PeripheralId, ManagerError> {
        let attempt = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut session = DeviceSession::new(self.inner.config.session_options());
        {
            let mut slots = self.inner.slots.lock().await;
            if slots.contains_key(&slot) {
                return Err(ManagerError::SlotOccupied(slot));
            }
            slots.insert(
                slot,
                SlotEntry::Pending {
                    attempt,
                    peripheral: None,
                    canceller: session.canceller(),
                },
            );
        }

        let result = self.establish(slot, attempt, &mut session).await;

        let mut slots = self.inner.slots.lock().await;
        let reserved = slots.get(&slot).map_or(false, |entry| entry.is_attempt(attempt));
        let id = match result {
            Ok(id) => id,
            Err(e) => {
                if reserved {
                    slots.remove(&slot);
                }
                return Err(e);
            }
        };
        if !reserved {
            drop(slots);
            session.release().await;
            debug!(%slot, "connect abandoned after disconnect");
            return Err(HandshakeError::Cancelled.into());
        }

        let events = self.inner.events.clone();
        let peripheral = id.clone();
        let spawned = session.spawn(move |event| {
            // No listeners is fine.
            let _ = events.send(PadEvent {
                slot,
                peripheral: peripheral.clone(),
                event,
            });
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                slots.remove(&slot);
                return Err(e.into());
            }
        };

        self.spawn_reaper(slot, attempt, handle.state_changes());
        slots.insert(
            slot,
            SlotEntry::Live {
                session_id: attempt,
                handle,
            },
        );
        self.inner.refresh_aggregate(&slots);

        info!(%slot, peripheral = %id, "pad connected");
        Ok(id)
    }

    async fn establish(
        &self,
        slot: PadSlot,
        attempt: u64,
        session: &mut DeviceSession,
    ) -> Result<PeripheralId, ManagerError> {
        let filter = self.inner.config.scan_filter();
        let id = session.connect(self.inner.central.as_ref(), &filter).await?;

        let claimed = {
            let mut slots = self.inner.slots.lock().await;
            // Same radio link as another slot; leave it untouched.
            if slots
                .iter()
                .any(|(other, entry)| *other != slot && entry.peripheral() == Some(&id))
            {
                return Err(ManagerError::DuplicatePeripheral(id));
            }
            match slots.get_mut(&slot) {
                Some(SlotEntry::Pending {
                    attempt: current,
                    peripheral,
                    ..
                }) if *current == attempt => {
                    *peripheral = Some(id.clone());
                    true
                }
                _ => false,
            }
        };
        if !claimed {
            session.release().await;
            return Err(HandshakeError::Cancelled.into());
        }

        session.handshake().await?;
        Ok(id)
    }

    fn spawn_reaper(
        &self,
        slot: PadSlot,
        session_id: u64,
        mut state: watch::Receiver<SessionState>,
    ) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let _ = state.wait_for(SessionState::is_terminal).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };

            let mut slots = inner.slots.lock().await;
            let current = matches!(
                slots.get(&slot),
                Some(SlotEntry::Live { session_id: live, .. }) if *live == session_id
            );
            if current {
                slots.remove(&slot);
                debug!(%slot, "reaped closed session");
            }
            inner.refresh_aggregate(&slots);
        });
    }

    /// Disconnect the session in `slot`. Returns whether there was one.
    ///
    /// A connect still in flight is cancelled and its reservation dropped.
    pub async fn disconnect(&self, slot: PadSlot) -> bool {
        let mut slots = self.inner.slots.lock().await;
        let had_session = match slots.remove(&slot) {
            Some(SlotEntry::Pending { canceller, .. }) => {
                canceller.cancel();
                debug!(%slot, "pending connect cancelled");
                false
            }
            Some(SlotEntry::Live { handle, .. }) => {
                handle.disconnect().await;
                info!(%slot, "pad disconnected");
                true
            }
            None => false,
        };
        self.inner.refresh_aggregate(&slots);
        had_session
    }

    /// Cancel pending handshakes and disconnect every session.
    pub async fn disconnect_all(&self) {
        let mut slots = self.inner.slots.lock().await;
        let drained = std::mem::take(&mut *slots);
        for (slot, entry) in drained {
            match entry {
                SlotEntry::Pending { canceller, .. } => {
                    canceller.cancel();
                    debug!(%slot, "pending connect cancelled");
                }
                SlotEntry::Live { handle, .. } => {
                    handle.disconnect().await;
                    info!(%slot, "pad disconnected");
                }
            }
        }
        self.inner.refresh_aggregate(&slots);
    }

    /// Register a listener on the merged event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PadEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> AggregateState {
        *self.inner.aggregate.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<AggregateState> {
        self.inner.aggregate.subscribe()
    }

    pub async fn stats(&self, slot: PadSlot) -> Option<SessionStats> {
        let slots = self.inner.slots.lock().await;
        slots.get(&slot).and_then(SlotEntry::live).map(|handle| handle.stats())
    }

    /// Live sessions and their peripherals. Pending connects are not listed.
    pub async fn sessions(&self) -> Vec<(PadSlot, PeripheralId)> {
        let slots = self.inner.slots.lock().await;
        slots
            .iter()
            .filter_map(|(slot, entry)| entry.live().map(|handle| (*slot, handle.peripheral_id().clone())))
            .collect()
    }
}
