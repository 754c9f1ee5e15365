//! Pad wire protocol: handshake framing and plaintext opcodes.
//!
//! Request (host → control point, 72 bytes):
//! `HANDSHAKE_REQUEST_PREFIX(8) || host_pub_x(32) || host_pub_y(32)`
//!
//! Response (pad → handshake response indication, at least 72 bytes):
//! `HANDSHAKE_RESPONSE_MARKER(2) || reserved(6) || pad_pub_x(32) || pad_pub_y(32)`

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use padlink_crypto::kex::{RawPublicKey, RAW_PUBLIC_KEY_LEN};

use crate::errors::HandshakeError;

/// Vendor tag in front of the host public key.
pub const HANDSHAKE_REQUEST_PREFIX: [u8; 8] = [0x00, 0x00, 0x01, 0x00, 0x40, 0x00, 0x00, 0x00];

/// First two bytes of a handshake response.
pub const HANDSHAKE_RESPONSE_MARKER: [u8; 2] = [0x00, 0x01];

/// Offset of the pad public key inside the response.
pub const RESPONSE_KEY_OFFSET: usize = 8;

pub const HANDSHAKE_REQUEST_LEN: usize = HANDSHAKE_REQUEST_PREFIX.len() + RAW_PUBLIC_KEY_LEN;
pub const HANDSHAKE_RESPONSE_MIN_LEN: usize = RESPONSE_KEY_OFFSET + RAW_PUBLIC_KEY_LEN;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Plaintext opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ButtonStatus = 0x07,
    Idle = 0x15,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x07 => Some(Opcode::ButtonStatus),
            0x15 => Some(Opcode::Idle),
            _ => None,
        }
    }
}

/// An authenticated plaintext split by opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message<'a> {
    ButtonStatus(&'a [u8]),
    /// Heartbeat; carries nothing of interest
    Idle,
    Unknown(u8),
    /// Authentic but zero-length plaintext
    Empty,
}

/// Split `opcode || payload`.
pub fn parse_plaintext(plaintext: &[u8]) -> Message<'_> {
    let Some((&opcode, payload)) = plaintext.split_first() else {
        return Message::Empty;
    };
    match Opcode::from_byte(opcode) {
        Some(Opcode::ButtonStatus) => Message::ButtonStatus(payload),
        Some(Opcode::Idle) => Message::Idle,
        None => Message::Unknown(opcode),
    }
}

/// Build the 72-byte handshake request for `host_pub`.
pub fn encode_handshake_request(host_pub: &RawPublicKey) -> Bytes {
    let mut buf = BytesMut::with_capacity(HANDSHAKE_REQUEST_LEN);
    buf.put_slice(&HANDSHAKE_REQUEST_PREFIX);
    buf.put_slice(host_pub);
    buf.freeze()
}

/// Extract the pad public key from a handshake indication.
///
/// `Ok(None)` means the indication is not a handshake response and should be
/// skipped. A marked response that is too short is malformed.
pub fn parse_handshake_response(bytes: &[u8]) -> Result<Option<RawPublicKey>, HandshakeError> {
    if !bytes.starts_with(&HANDSHAKE_RESPONSE_MARKER) {
        return Ok(None);
    }
    if bytes.len() < HANDSHAKE_RESPONSE_MIN_LEN {
        return Err(HandshakeError::MalformedResponse(format!(
            "response is {} bytes, need at least {}",
            bytes.len(),
            HANDSHAKE_RESPONSE_MIN_LEN
        )));
    }

    let mut key = [0u8; RAW_PUBLIC_KEY_LEN];
    key.copy_from_slice(&bytes[RESPONSE_KEY_OFFSET..HANDSHAKE_RESPONSE_MIN_LEN]);
    Ok(Some(key))
}

/// Build a handshake response the way a pad does. Used by simulators.
pub fn encode_handshake_response(pad_pub: &RawPublicKey) -> Bytes {
    let mut buf = BytesMut::with_capacity(HANDSHAKE_RESPONSE_MIN_LEN);
    buf.put_slice(&HANDSHAKE_RESPONSE_MARKER);
    buf.put_bytes(0, RESPONSE_KEY_OFFSET - HANDSHAKE_RESPONSE_MARKER.len());
    buf.put_slice(pad_pub);
    buf.freeze()
}

/// Host public key from a handshake request, if the frame is one.
pub fn parse_handshake_request(bytes: &[u8]) -> Option<RawPublicKey> {
    if bytes.len() != HANDSHAKE_REQUEST_LEN || !bytes.starts_with(&HANDSHAKE_REQUEST_PREFIX) {
        return None;
    }
    let mut key = [0u8; RAW_PUBLIC_KEY_LEN];
    key.copy_from_slice(&bytes[HANDSHAKE_REQUEST_PREFIX.len()..]);
    Some(key)
}
