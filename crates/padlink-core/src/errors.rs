//! Error types for padlink core.
//!
//! Packet-level problems (bad tags, short packets, unknown opcodes) are not
//! errors here; the session counts and drops them. Everything below is
//! terminal for the attempt or session it is returned from.

use std::time::Duration;

use padlink_crypto::kex::KexError;
use padlink_transport::{PeripheralId, TransportError};
use thiserror::Error;

use crate::manager::PadSlot;
use crate::session::SessionState;

/// Key exchange failures. Each one ends the attempt; nothing is retried.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No usable response before the deadline
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Response carried the marker but not a usable public key
    #[error("malformed handshake response: {0}")]
    MalformedResponse(String),

    /// Session was torn down while waiting
    #[error("handshake cancelled")]
    Cancelled,

    #[error("key derivation failed: {0}")]
    KeyDerivation(KexError),

    #[error("transport error during handshake: {0}")]
    Transport(#[from] TransportError),
}

impl From<KexError> for HandshakeError {
    fn from(err: KexError) -> Self {
        match err {
            KexError::InvalidPublicKey => {
                HandshakeError::MalformedResponse("peer public key is not a P-256 point".to_string())
            }
            other => HandshakeError::KeyDerivation(other),
        }
    }
}

/// Device session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not allowed in the current state
    #[error("invalid state: {operation} not allowed in {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Session manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The slot already holds a live session
    #[error("slot {0} already has a session")]
    SlotOccupied(PadSlot),

    /// Connect resolved to a pad that is already in the session set
    #[error("peripheral {0} is already connected")]
    DuplicatePeripheral(PeripheralId),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl From<HandshakeError> for ManagerError {
    fn from(err: HandshakeError) -> Self {
        ManagerError::Session(SessionError::Handshake(err))
    }
}
