//! padlink core - pairing, session state and telemetry decoding for BLE pads.
//!
//! This crate implements:
//! - The key exchange with a pad (P-256 ECDH + HKDF over the pad's framing)
//! - Button-status payload decoding
//! - The device session state machine and its async driver
//! - The session manager merging up to two pads into one event stream
//! - Configuration and a simulated pad for tests and demos

#![forbid(unsafe_code)]

// Protocol
pub mod protocol;
pub mod buttons;
pub mod handshake;

// State machines and drivers
pub mod session;
pub mod device;
pub mod manager;

// Supporting modules
pub mod config;
pub mod errors;
pub mod harness;

#[cfg(test)]
mod proptests;

pub use buttons::{Button, ButtonEvent, ButtonState, PadSide};
pub use config::{ConfigError, PadlinkConfig};
pub use device::{DeviceSession, DeviceSessionHandle, SessionOptions};
pub use errors::{HandshakeError, ManagerError, SessionError};
pub use manager::{AggregateState, PadEvent, PadSlot, SessionManager};
pub use session::{SessionMachine, SessionState, SessionStats};
