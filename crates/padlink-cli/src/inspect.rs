//! Offline inspection of captured packets and payloads.

use padlink_core::buttons::{self, Button, ButtonState};
use padlink_core::protocol::{parse_plaintext, Message};
use padlink_crypto::key_material::KEY_MATERIAL_LEN;
use padlink_crypto::{decrypt, DecryptError, KeyMaterial};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("key material must be {expected} bytes, got {len}")]
    KeyLength { expected: usize, len: usize },

    #[error(transparent)]
    Decrypt(#[from] DecryptError),
}

/// Parse hex, tolerating whitespace, `:` separators and a `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, InputError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).map_err(|e| InputError::InvalidHex(e.to_string()))
}

/// Parse the 36 bytes of session key material (AES key then nonce prefix).
pub fn parse_key_material(input: &str) -> Result<KeyMaterial, InputError> {
    let bytes = parse_hex(input)?;
    KeyMaterial::from_slice(&bytes).ok_or(InputError::KeyLength {
        expected: KEY_MATERIAL_LEN,
        len: bytes.len(),
    })
}

/// One decoded payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    pub name: &'static str,
    pub tag: u8,
    pub value: u64,
    /// Only set for discrete buttons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub side: Option<String>,
    pub fields: Vec<FieldReport>,
}

impl From<&ButtonState> for DecodeReport {
    fn from(state: &ButtonState) -> Self {
        let fields = state
            .iter()
            .map(|(button, value)| FieldReport {
                name: button.name(),
                tag: button.tag(),
                value,
                pressed: if button.is_discrete() {
                    state.is_pressed(button)
                } else {
                    None
                },
            })
            .collect();

        Self {
            side: state.pad_side().map(|side| side.to_string()),
            fields,
        }
    }
}

/// Decode a button-status payload given without its opcode byte.
pub fn decode_payload(payload: &[u8]) -> DecodeReport {
    DecodeReport::from(&buttons::decode(payload))
}

/// What an authentic plaintext turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageReport {
    ButtonStatus(DecodeReport),
    Idle,
    Unknown { opcode: u8 },
    Empty,
}

impl MessageReport {
    pub fn from_plaintext(plaintext: &[u8]) -> Self {
        match parse_plaintext(plaintext) {
            Message::ButtonStatus(payload) => MessageReport::ButtonStatus(decode_payload(payload)),
            Message::Idle => MessageReport::Idle,
            Message::Unknown(opcode) => MessageReport::Unknown { opcode },
            Message::Empty => MessageReport::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptReport {
    pub counter: u32,
    pub authentic: bool,
    /// Omitted when the tag did not match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageReport>,
}

/// Decrypt one captured packet. Unauthentic plaintext is never reported.
pub fn decrypt_packet(key: &KeyMaterial, packet: &[u8]) -> Result<DecryptReport, InputError> {
    let decrypted = decrypt(key, packet)?;
    let counter = decrypted.counter;
    let authentic = decrypted.authentic;

    let (plaintext, message) = match decrypted.into_authentic() {
        Some(plaintext) => (
            Some(hex::encode(&plaintext)),
            Some(MessageReport::from_plaintext(&plaintext)),
        ),
        None => (None, None),
    };

    Ok(DecryptReport {
        counter,
        authentic,
        plaintext,
        message,
    })
}

/// Discrete buttons in a stable order, for cycling through in demos.
pub fn discrete_buttons() -> impl Iterator<Item = Button> + Clone {
    Button::ALL.into_iter().filter(|b| b.is_discrete())
}
