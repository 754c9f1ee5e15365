//! Device session state machine.
//!
//! `SessionMachine` is the protocol half of a device session: a transition
//! function over [`SessionInput`] with no I/O. The async driver in
//! [`crate::device`] feeds it transport events and forwards what it emits.
//!
//! ```text
//! Disconnected -> Connecting -> Handshaking -> Subscribed
//!        ^             |             |            |
//!        +-------------+-------------+            |
//!  (attempt failed)                               v
//!           any state --link lost / disconnect--> Closed
//! ```

use std::collections::BTreeMap;

use padlink_crypto::counter_window::{CounterObservation, CounterWindow};
use padlink_crypto::{decrypt, KeyMaterial};

use crate::buttons::{self, Button, ButtonEvent, PadSide};
use crate::errors::SessionError;
use crate::protocol::{parse_plaintext, Message};

/// Device session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh, or back here after a failed attempt
    Disconnected,
    /// Acquiring a peripheral handle
    Connecting,
    /// Key exchange in flight
    Handshaking,
    /// Keys installed, telemetry flowing
    Subscribed,
    /// Terminal; a new session is needed to reconnect
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Inputs to [`SessionMachine::handle`].
pub enum SessionInput<'a> {
    Connect,
    /// Peripheral handle acquired, services resolved
    GattReady,
    ConnectFailed,
    HandshakeSucceeded(KeyMaterial),
    HandshakeFailed,
    /// Raw measurement notification
    Notification(&'a [u8]),
    LinkLost,
    Disconnect,
}

impl SessionInput<'_> {
    fn name(&self) -> &'static str {
        match self {
            SessionInput::Connect => "connect",
            SessionInput::GattReady => "gatt-ready",
            SessionInput::ConnectFailed => "connect-failed",
            SessionInput::HandshakeSucceeded(_) => "handshake-succeeded",
            SessionInput::HandshakeFailed => "handshake-failed",
            SessionInput::Notification(_) => "notification",
            SessionInput::LinkLost => "link-lost",
            SessionInput::Disconnect => "disconnect",
        }
    }
}

/// What became of one notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Authentic button status; carries the events it produced (maybe none)
    Buttons(Vec<ButtonEvent>),
    Idle,
    UnknownOpcode(u8),
    /// Authentic but empty plaintext
    Empty,
    AuthFailed { counter: u32 },
    /// Shorter than counter + tag
    Malformed { len: usize },
    /// Arrived outside `Subscribed`
    Ignored,
}

/// Per-session diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_received: u64,
    pub authentic: u64,
    pub auth_failures: u64,
    pub malformed: u64,
    pub idle_heartbeats: u64,
    pub unknown_opcodes: u64,
    pub events_emitted: u64,
    /// Distinct packet counters among authentic packets
    pub distinct_counters: u64,
    pub repeated_counters: u64,
    /// Notifications that arrived while not subscribed
    pub ignored: u64,
}

/// Pure device session state machine.
pub struct SessionMachine {
    state: SessionState,
    key: Option<KeyMaterial>,
    side: PadSide,
    pressed: BTreeMap<Button, bool>,
    counters: CounterWindow,
    stats: SessionStats,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            key: None,
            side: PadSide::Unknown,
            pressed: BTreeMap::new(),
            counters: CounterWindow::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Side last reported by the pad.
    pub fn side(&self) -> PadSide {
        self.side
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Apply one input. Returns the button events it produced.
    pub fn handle(&mut self, input: SessionInput<'_>) -> Result<Vec<ButtonEvent>, SessionError> {
        use SessionState::*;

        match (self.state, input) {
            (_, SessionInput::Notification(packet)) => {
                Ok(match self.on_notification(packet) {
                    PacketOutcome::Buttons(events) => events,
                    _ => Vec::new(),
                })
            }
            (_, SessionInput::LinkLost) | (_, SessionInput::Disconnect) => {
                self.close();
                Ok(Vec::new())
            }
            (Disconnected, SessionInput::Connect) => {
                self.state = Connecting;
                Ok(Vec::new())
            }
            (Connecting, SessionInput::GattReady) => {
                self.state = Handshaking;
                Ok(Vec::new())
            }
            (Connecting, SessionInput::ConnectFailed) | (Handshaking, SessionInput::HandshakeFailed) => {
                self.state = Disconnected;
                Ok(Vec::new())
            }
            (Handshaking, SessionInput::HandshakeSucceeded(key)) => {
                self.key = Some(key);
                self.state = Subscribed;
                Ok(Vec::new())
            }
            (state, input) => Err(SessionError::InvalidState {
                operation: input.name(),
                state,
            }),
        }
    }

    /// Decrypt, authenticate and decode one notification.
    pub fn on_notification(&mut self, packet: &[u8]) -> PacketOutcome {
        let key = match (&self.state, &self.key) {
            (SessionState::Subscribed, Some(key)) => key,
            _ => {
                self.stats.ignored += 1;
                return PacketOutcome::Ignored;
            }
        };
        self.stats.packets_received += 1;

        let decrypted = match decrypt(key, packet) {
            Ok(decrypted) => decrypted,
            Err(_) => {
                self.stats.malformed += 1;
                return PacketOutcome::Malformed { len: packet.len() };
            }
        };
        if !decrypted.authentic {
            self.stats.auth_failures += 1;
            return PacketOutcome::AuthFailed {
                counter: decrypted.counter,
            };
        }

        self.stats.authentic += 1;
        match self.counters.observe(decrypted.counter) {
            CounterObservation::Fresh => self.stats.distinct_counters += 1,
            CounterObservation::Repeated => self.stats.repeated_counters += 1,
            CounterObservation::BehindWindow => {}
        }

        match parse_plaintext(&decrypted.plaintext) {
            Message::ButtonStatus(payload) => {
                let events = self.apply_button_status(payload);
                self.stats.events_emitted += events.len() as u64;
                PacketOutcome::Buttons(events)
            }
            Message::Idle => {
                self.stats.idle_heartbeats += 1;
                PacketOutcome::Idle
            }
            Message::Unknown(opcode) => {
                self.stats.unknown_opcodes += 1;
                PacketOutcome::UnknownOpcode(opcode)
            }
            Message::Empty => PacketOutcome::Empty,
        }
    }

    fn apply_button_status(&mut self, payload: &[u8]) -> Vec<ButtonEvent> {
        let state = buttons::decode(payload);

        // The pad field applies to the rest of the same payload.
        if let Some(side) = state.pad_side() {
            self.side = side;
        }

        let mut events = Vec::new();
        for (button, value) in state.iter().filter(|(b, _)| b.is_discrete()) {
            let pressed = value == 0;
            let was_pressed = self.pressed.insert(button, pressed).unwrap_or(false);
            if pressed != was_pressed {
                events.push(ButtonEvent {
                    button,
                    pressed,
                    source: self.side,
                });
            }
        }
        events
    }

    fn close(&mut self) {
        // Dropping the key material zeroizes it.
        self.key = None;
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padlink_crypto::ccm::seal;

    fn sequential_key() -> KeyMaterial {
        let mut raw = [0u8; 36];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        KeyMaterial::from_bytes(raw)
    }

    fn subscribed() -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.handle(SessionInput::Connect).unwrap();
        machine.handle(SessionInput::GattReady).unwrap();
        machine
            .handle(SessionInput::HandshakeSucceeded(sequential_key()))
            .unwrap();
        machine
    }

    fn packet(counter: u32, plaintext: &[u8]) -> Vec<u8> {
        seal(&sequential_key(), counter.to_le_bytes(), plaintext)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.state(), SessionState::Disconnected);

        machine.handle(SessionInput::Connect).unwrap();
        assert_eq!(machine.state(), SessionState::Connecting);
        machine.handle(SessionInput::GattReady).unwrap();
        assert_eq!(machine.state(), SessionState::Handshaking);
        machine
            .handle(SessionInput::HandshakeSucceeded(sequential_key()))
            .unwrap();
        assert_eq!(machine.state(), SessionState::Subscribed);
        assert!(machine.has_key());
    }

    #[test]
    fn test_handshake_failure_returns_to_disconnected() {
        let mut machine = SessionMachine::new();
        machine.handle(SessionInput::Connect).unwrap();
        machine.handle(SessionInput::GattReady).unwrap();
        machine.handle(SessionInput::HandshakeFailed).unwrap();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert!(!machine.has_key());

        machine.handle(SessionInput::Connect).unwrap();
        machine.handle(SessionInput::ConnectFailed).unwrap();
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut machine = SessionMachine::new();
        let err = machine.handle(SessionInput::GattReady).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                operation: "gatt-ready",
                state: SessionState::Disconnected
            }
        ));

        let err = machine
            .handle(SessionInput::HandshakeSucceeded(sequential_key()))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        assert!(!machine.has_key());
    }

    #[test]
    fn test_closed_session_is_not_reusable() {
        let mut machine = subscribed();
        machine.handle(SessionInput::LinkLost).unwrap();
        assert_eq!(machine.state(), SessionState::Closed);
        assert!(!machine.has_key());

        assert!(machine.handle(SessionInput::Connect).is_err());
        // Disconnect after close is a no-op.
        machine.handle(SessionInput::Disconnect).unwrap();
        assert_eq!(machine.state(), SessionState::Closed);
    }

    #[test]
    fn test_pad_field_updates_side_without_event() {
        let mut machine = subscribed();
        let outcome = machine.on_notification(&packet(1, &[0x07, 0x08, 0x01]));

        assert_eq!(outcome, PacketOutcome::Buttons(vec![]));
        assert_eq!(machine.side(), PadSide::Right);
        assert_eq!(machine.stats().events_emitted, 0);
    }

    #[test]
    fn test_side_applies_to_same_payload() {
        let mut machine = subscribed();
        let outcome = machine.on_notification(&packet(2, &[0x07, 0x08, 0x00, 0x10, 0x00]));

        assert_eq!(
            outcome,
            PacketOutcome::Buttons(vec![ButtonEvent {
                button: Button::Y,
                pressed: true,
                source: PadSide::Left,
            }])
        );
    }

    #[test]
    fn test_events_only_on_change() {
        let mut machine = subscribed();

        // Released is the initial state, so a release report is silent.
        let events = machine
            .handle(SessionInput::Notification(&packet(1, &[0x07, 0x20, 0x01])))
            .unwrap();
        assert!(events.is_empty());

        let events = machine
            .handle(SessionInput::Notification(&packet(2, &[0x07, 0x20, 0x00])))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].pressed);

        let events = machine
            .handle(SessionInput::Notification(&packet(3, &[0x07, 0x20, 0x00])))
            .unwrap();
        assert!(events.is_empty());

        let events = machine
            .handle(SessionInput::Notification(&packet(4, &[0x07, 0x20, 0x01])))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].pressed);
        assert_eq!(events[0].source, PadSide::Unknown);
    }

    #[test]
    fn test_axes_do_not_emit_events() {
        let mut machine = subscribed();
        let events = machine
            .handle(SessionInput::Notification(&packet(
                1,
                &[0x07, 0x40, 0x00, 0x48, 0x00, 0x38, 0x00],
            )))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, Button::Shifter);
    }

    #[test]
    fn test_rejections_are_counted_not_fatal() {
        let mut machine = subscribed();

        let mut forged = packet(1, &[0x07, 0x10, 0x00]);
        let last = forged.len() - 1;
        forged[last] ^= 0xFF;
        assert_eq!(
            machine.on_notification(&forged),
            PacketOutcome::AuthFailed { counter: 1 }
        );
        assert_eq!(
            machine.on_notification(&[1, 2, 3]),
            PacketOutcome::Malformed { len: 3 }
        );
        assert_eq!(machine.on_notification(&packet(2, &[0x15])), PacketOutcome::Idle);
        assert_eq!(
            machine.on_notification(&packet(3, &[0x99, 0x01])),
            PacketOutcome::UnknownOpcode(0x99)
        );
        assert_eq!(machine.on_notification(&packet(4, &[])), PacketOutcome::Empty);

        assert_eq!(machine.state(), SessionState::Subscribed);
        let stats = machine.stats();
        assert_eq!(stats.packets_received, 5);
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.idle_heartbeats, 1);
        assert_eq!(stats.unknown_opcodes, 1);
        assert_eq!(stats.authentic, 3);
    }

    #[test]
    fn test_counter_bookkeeping() {
        let mut machine = subscribed();
        machine.on_notification(&packet(1, &[0x15]));
        machine.on_notification(&packet(2, &[0x15]));
        machine.on_notification(&packet(2, &[0x15]));

        let stats = machine.stats();
        assert_eq!(stats.distinct_counters, 2);
        assert_eq!(stats.repeated_counters, 1);
    }

    #[test]
    fn test_notifications_outside_subscribed_are_ignored() {
        let mut machine = SessionMachine::new();
        assert_eq!(
            machine.on_notification(&packet(1, &[0x07, 0x10, 0x00])),
            PacketOutcome::Ignored
        );

        let mut machine = subscribed();
        machine.handle(SessionInput::LinkLost).unwrap();
        let events = machine
            .handle(SessionInput::Notification(&packet(5, &[0x07, 0x10, 0x00])))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(machine.stats().ignored, 1);
        assert_eq!(machine.stats().packets_received, 0);
    }
}
