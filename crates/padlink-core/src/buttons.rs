//! Button-status payload decoding.
//!
//! The payload is a list of `(tag, varint)` fields. Only wire type 0 carries
//! a value; a tag with any other wire type is skipped on its own. Binary
//! buttons report `0` while pressed.

use std::collections::BTreeMap;
use std::fmt;

/// Low bits of a tag byte.
const WIRE_TYPE_MASK: u8 = 0x07;
const WIRE_TYPE_VARINT: u8 = 0;

const CONTINUATION: u8 = 0x80;
const VALUE_BITS: u8 = 0x7F;

/// Fields a button-status payload can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    /// Which half of the controller sent the payload (meta field)
    Pad,
    Y,
    Z,
    A,
    B,
    OnOff,
    Shifter,
    /// Analog axis
    Joystick,
    /// Analog axis
    Brake,
}

impl Button {
    pub const ALL: [Button; 9] = [
        Button::Pad,
        Button::Y,
        Button::Z,
        Button::A,
        Button::B,
        Button::OnOff,
        Button::Shifter,
        Button::Joystick,
        Button::Brake,
    ];

    /// Full tag byte for this field.
    pub fn tag(self) -> u8 {
        match self {
            Button::Pad => 0x08,
            Button::Y => 0x10,
            Button::Z => 0x18,
            Button::A => 0x20,
            Button::B => 0x28,
            Button::OnOff => 0x30,
            Button::Shifter => 0x38,
            Button::Joystick => 0x40,
            Button::Brake => 0x48,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Button::ALL.into_iter().find(|b| b.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Pad => "pad",
            Button::Y => "Y",
            Button::Z => "Z",
            Button::A => "A",
            Button::B => "B",
            Button::OnOff => "ONOFF",
            Button::Shifter => "Shifter",
            Button::Joystick => "joystick",
            Button::Brake => "brake",
        }
    }

    /// Buttons that turn into press/release events.
    pub fn is_discrete(self) -> bool {
        !matches!(self, Button::Pad | Button::Joystick | Button::Brake)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Controller half, as self-reported in the `pad` field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PadSide {
    Left,
    Right,
    #[default]
    Unknown,
}

impl PadSide {
    pub fn from_value(value: u64) -> Self {
        match value {
            0 => PadSide::Left,
            1 => PadSide::Right,
            _ => PadSide::Unknown,
        }
    }
}

impl fmt::Display for PadSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PadSide::Left => "left",
            PadSide::Right => "right",
            PadSide::Unknown => "unknown",
        })
    }
}

/// Decoded field values of one payload. Later duplicates overwrite earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ButtonState(BTreeMap<Button, u64>);

impl ButtonState {
    pub fn get(&self, button: Button) -> Option<u64> {
        self.0.get(&button).copied()
    }

    /// `None` when the payload did not mention `button`.
    pub fn is_pressed(&self, button: Button) -> Option<bool> {
        self.get(button).map(|value| value == 0)
    }

    pub fn pad_side(&self) -> Option<PadSide> {
        self.get(Button::Pad).map(PadSide::from_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Button, u64)> + '_ {
        self.0.iter().map(|(b, v)| (*b, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Button, u64)> for ButtonState {
    fn from_iter<I: IntoIterator<Item = (Button, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A press or release of a discrete button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub pressed: bool,
    pub source: PadSide,
}

/// Read one base-128 varint. Returns the value and the bytes consumed.
///
/// Bits past 64 are dropped. Running off the end yields whatever was read.
pub fn read_varint(bytes: &[u8]) -> (u64, usize) {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut consumed = 0;

    for &byte in bytes {
        consumed += 1;
        if shift < u64::BITS {
            value |= u64::from(byte & VALUE_BITS) << shift;
        }
        shift = shift.saturating_add(7);
        if byte & CONTINUATION == 0 {
            break;
        }
    }
    (value, consumed)
}

/// Append `value` as a base-128 varint.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= u64::from(CONTINUATION) {
        out.push((value as u8 & VALUE_BITS) | CONTINUATION);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encode fields as a button-status payload (without the opcode).
pub fn encode(fields: &[(Button, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * 2);
    for &(button, value) in fields {
        out.push(button.tag());
        encode_varint(value, &mut out);
    }
    out
}

/// Decode a button-status payload.
pub fn decode(payload: &[u8]) -> ButtonState {
    let mut fields = BTreeMap::new();
    let mut pos = 0;

    while pos < payload.len() {
        let tag = payload[pos];
        pos += 1;

        if tag & WIRE_TYPE_MASK != WIRE_TYPE_VARINT {
            continue;
        }
        if pos == payload.len() {
            // Tag without a value.
            break;
        }

        let (value, used) = read_varint(&payload[pos..]);
        pos += used;

        if let Some(button) = Button::from_tag(tag) {
            fields.insert(button, value);
        }
    }

    ButtonState(fields)
}
