//! Test harness for padlink core functionality.
//!
//! [`SimulatedPad`] plays the pad side of the protocol on top of a
//! [`MockPeripheral`]: it answers the handshake, derives the same key
//! material as the host and sends sealed telemetry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use padlink_crypto::ccm::seal;
use padlink_crypto::kex::{derive_key_material, LocalKeyPair};
use padlink_crypto::KeyMaterial;
use padlink_transport::testing::{MockCentral, MockPeripheral};
use padlink_transport::Characteristic;
use parking_lot::Mutex;

use crate::buttons::{self, Button, PadSide};
use crate::protocol::{encode_handshake_response, parse_handshake_request, Opcode};

/// How the simulated pad answers a handshake request.
#[derive(Clone, Debug, Default)]
pub enum ResponseMode {
    /// Answer with a well-formed response
    #[default]
    Normal,
    /// Never answer
    Silent,
    /// Send these indications first, then answer normally
    NoiseFirst(Vec<Vec<u8>>),
    /// Send only this indication
    Raw(Vec<u8>),
}

/// Pad-side protocol simulator.
pub struct SimulatedPad {
    peripheral: Arc<MockPeripheral>,
    keys: Arc<Mutex<Option<KeyMaterial>>>,
    counter: AtomicU32,
}

impl SimulatedPad {
    /// A pad that answers handshakes normally.
    pub fn new(id: &str, name: &str) -> Self {
        Self::with_mode(id, name, ResponseMode::Normal)
    }

    pub fn with_mode(id: &str, name: &str, mode: ResponseMode) -> Self {
        Self::with_key_pair(id, name, LocalKeyPair::generate(), mode)
    }

    pub fn with_key_pair(id: &str, name: &str, pair: LocalKeyPair, mode: ResponseMode) -> Self {
        let peripheral = Arc::new(MockPeripheral::new(id, name));
        let keys: Arc<Mutex<Option<KeyMaterial>>> = Arc::new(Mutex::new(None));

        let pair = Arc::new(pair);
        let hook_keys = keys.clone();
        peripheral.set_write_hook(Arc::new(
            move |p: &MockPeripheral, characteristic: Characteristic, data: &[u8]| {
                if characteristic != Characteristic::ControlPoint {
                    return;
                }
                let Some(host_pub) = parse_handshake_request(data) else {
                    return;
                };

                // The pad puts its own key first in the salt.
                let derived = pair
                    .diffie_hellman(&host_pub)
                    .and_then(|shared| derive_key_material(&shared[..], pair.public_raw(), &host_pub));
                let Ok(material) = derived else {
                    return;
                };
                *hook_keys.lock() = Some(material);

                let response = encode_handshake_response(pair.public_raw());
                match &mode {
                    ResponseMode::Normal => {
                        p.notify(Characteristic::HandshakeResponse, response);
                    }
                    ResponseMode::Silent => {}
                    ResponseMode::NoiseFirst(noise) => {
                        for indication in noise {
                            p.notify(Characteristic::HandshakeResponse, indication.clone());
                        }
                        p.notify(Characteristic::HandshakeResponse, response);
                    }
                    ResponseMode::Raw(raw) => {
                        p.notify(Characteristic::HandshakeResponse, raw.clone());
                    }
                }
            },
        ));

        Self {
            peripheral,
            keys,
            counter: AtomicU32::new(1),
        }
    }

    pub fn peripheral(&self) -> Arc<MockPeripheral> {
        self.peripheral.clone()
    }

    /// Key material derived during the last handshake.
    pub fn key_material(&self) -> Option<KeyMaterial> {
        self.keys.lock().clone()
    }

    pub fn is_paired(&self) -> bool {
        self.keys.lock().is_some()
    }

    /// Seal `plaintext` under the next counter. `None` before a handshake.
    pub fn seal_next(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let keys = self.keys.lock();
        let key = keys.as_ref()?;
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(seal(key, counter.to_le_bytes(), plaintext))
    }

    /// Seal and notify. Returns whether the host was listening.
    pub fn send_plaintext(&self, plaintext: &[u8]) -> bool {
        match self.seal_next(plaintext) {
            Some(packet) => self.send_raw(packet),
            None => false,
        }
    }

    /// Send a button-status packet reporting `side` and `fields`.
    pub fn send_buttons(&self, side: PadSide, fields: &[(Button, u64)]) -> bool {
        self.send_plaintext(&button_status(side, fields))
    }

    /// Press (`true`) or release one button.
    pub fn send_press(&self, side: PadSide, button: Button, pressed: bool) -> bool {
        self.send_buttons(side, &[(button, if pressed { 0 } else { 1 })])
    }

    pub fn send_idle(&self) -> bool {
        self.send_plaintext(&[Opcode::Idle as u8])
    }

    /// Notify arbitrary bytes on the measurement characteristic.
    pub fn send_raw(&self, packet: impl Into<bytes::Bytes>) -> bool {
        self.peripheral.notify(Characteristic::Measurement, packet)
    }
}

/// BUTTON_STATUS plaintext with a leading `pad` field.
pub fn button_status(side: PadSide, fields: &[(Button, u64)]) -> Vec<u8> {
    let side_value = match side {
        PadSide::Left => 0,
        PadSide::Right => 1,
        PadSide::Unknown => 2,
    };
    let mut plaintext = vec![Opcode::ButtonStatus as u8];
    plaintext.extend(buttons::encode(&[(Button::Pad, side_value)]));
    plaintext.extend(buttons::encode(fields));
    plaintext
}

/// Central that hands out the given pads in order.
pub fn central_for(pads: &[&SimulatedPad]) -> Arc<MockCentral> {
    let central = Arc::new(MockCentral::new());
    for pad in pads {
        central.push(pad.peripheral());
    }
    central
}
