//! Packet parsing and authenticated decryption.
//!
//! Wire layout: `counter(4, little-endian) || ciphertext || tag(4)`.

use crate::ccm::{self, COUNTER_LEN, TAG_LEN};
use crate::key_material::KeyMaterial;
use crate::utils::constant_time_compare_array;

/// Smallest packet: counter and tag around an empty ciphertext.
pub const MIN_PACKET_LEN: usize = COUNTER_LEN + TAG_LEN;

/// Error type for packet decryption.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("packet too short: {len} bytes, need at least 8")]
    TooShort { len: usize },
}

/// Borrowed view over a received packet.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    counter: [u8; COUNTER_LEN],
    ciphertext: &'a [u8],
    tag: [u8; TAG_LEN],
}

impl<'a> Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecryptError> {
        if bytes.len() < MIN_PACKET_LEN {
            return Err(DecryptError::TooShort { len: bytes.len() });
        }
        let (counter, rest) = bytes.split_at(COUNTER_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut counter_arr = [0u8; COUNTER_LEN];
        counter_arr.copy_from_slice(counter);
        let mut tag_arr = [0u8; TAG_LEN];
        tag_arr.copy_from_slice(tag);

        Ok(Self {
            counter: counter_arr,
            ciphertext,
            tag: tag_arr,
        })
    }

    /// Counter bytes exactly as transmitted (these go into the nonce).
    pub fn counter_bytes(&self) -> &[u8; COUNTER_LEN] {
        &self.counter
    }

    /// Counter interpreted as little-endian, for logs and diagnostics only.
    pub fn counter(&self) -> u32 {
        u32::from_le_bytes(self.counter)
    }

    pub fn ciphertext(&self) -> &'a [u8] {
        self.ciphertext
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }
}

/// Result of [`decrypt`].
///
/// `plaintext` is only meaningful when `authentic` is true; callers must
/// drop it otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub counter: u32,
    pub plaintext: Vec<u8>,
    pub authentic: bool,
}

impl Decrypted {
    /// The plaintext if the tag matched.
    pub fn into_authentic(self) -> Option<Vec<u8>> {
        self.authentic.then_some(self.plaintext)
    }
}

/// Decrypt one packet and check its tag.
///
/// A tag mismatch is reported through [`Decrypted::authentic`], not as an
/// error, so a noisy link never tears down the session.
pub fn decrypt(key: &KeyMaterial, packet: &[u8]) -> Result<Decrypted, DecryptError> {
    let packet = Packet::parse(packet)?;
    let nonce = ccm::build_nonce(key.nonce_prefix(), packet.counter_bytes());

    let mut plaintext = packet.ciphertext().to_vec();
    ccm::apply_keystream(key.aes_key(), &nonce, &mut plaintext);

    let expected = ccm::cbc_mac_tag(key.aes_key(), &nonce, &plaintext);
    let authentic = constant_time_compare_array(&expected, packet.tag());

    Ok(Decrypted {
        counter: packet.counter(),
        plaintext,
        authentic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccm::seal;
    use hex::FromHex;

    fn sequential_key() -> KeyMaterial {
        let mut raw = [0u8; 36];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        KeyMaterial::from_bytes(raw)
    }

    #[test]
    fn test_known_answer_button_status() {
        let key = sequential_key();
        let packet = <Vec<u8>>::from_hex("010000004f6e47073d008e").unwrap();

        let out = decrypt(&key, &packet).unwrap();
        assert!(out.authentic);
        assert_eq!(out.counter, 1);
        assert_eq!(out.plaintext, vec![0x07, 0x08, 0x01]);
    }

    #[test]
    fn test_known_answer_empty_ciphertext() {
        let key = sequential_key();
        let packet = <Vec<u8>>::from_hex("0400000026c13bd9").unwrap();

        let out = decrypt(&key, &packet).unwrap();
        assert!(out.authentic);
        assert!(out.plaintext.is_empty());
    }

    #[test]
    fn test_too_short() {
        let key = sequential_key();
        for len in 0..MIN_PACKET_LEN {
            let packet = vec![0u8; len];
            assert_eq!(decrypt(&key, &packet), Err(DecryptError::TooShort { len }));
        }
    }

    #[test]
    fn test_tampered_tag_is_not_authentic() {
        let key = sequential_key();
        let mut packet = seal(&key, [9, 0, 0, 0], &[0x07, 0x20, 0x00]);
        let last = packet.len() - 1;
        packet[last] ^= 0x01;

        let out = decrypt(&key, &packet).unwrap();
        assert!(!out.authentic);
        assert!(out.into_authentic().is_none());
    }

    #[test]
    fn test_tampered_counter_is_not_authentic() {
        let key = sequential_key();
        let mut packet = seal(&key, [9, 0, 0, 0], &[0x07, 0x20, 0x00]);
        packet[0] = 10;

        assert!(!decrypt(&key, &packet).unwrap().authentic);
    }

    #[test]
    fn test_wrong_key_is_not_authentic() {
        let key = sequential_key();
        let other = KeyMaterial::from_bytes([0x11; 36]);
        let packet = seal(&key, [1, 2, 3, 4], &[0x15, 0x00]);

        assert!(!decrypt(&other, &packet).unwrap().authentic);
    }

    #[test]
    fn test_packet_views() {
        let bytes = [1u8, 0, 0, 0, 0xAA, 0xBB, 9, 8, 7, 6];
        let packet = Packet::parse(&bytes).unwrap();
        assert_eq!(packet.counter(), 1);
        assert_eq!(packet.counter_bytes(), &[1, 0, 0, 0]);
        assert_eq!(packet.ciphertext(), &[0xAA, 0xBB]);
        assert_eq!(packet.tag(), &[9, 8, 7, 6]);
    }
}
