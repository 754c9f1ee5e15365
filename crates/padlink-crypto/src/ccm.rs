//! Counter-mode encryption with a single CBC-MAC tag.
//!
//! Parameterised as in RFC 3610 with `L = 7` (8-byte nonce) and `M = 4`
//! (4-byte tag). Two details are specific to the pad firmware and must be
//! reproduced bit for bit:
//! - the first CTR block starts with `0x01` rather than the RFC flags byte,
//! - the tag is the truncated CBC-MAC itself; it is not encrypted with `S_0`.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;

use crate::key_material::{KeyMaterial, NONCE_PREFIX_LEN};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

pub const BLOCK_LEN: usize = 16;
pub const NONCE_LEN: usize = 8;
pub const COUNTER_LEN: usize = 4;
pub const TAG_LEN: usize = 4;
/// Bytes used for the message length in `B0` and for the block counter in `A_i`.
pub const LENGTH_FIELD_LEN: usize = 7;

/// `B0` flags: no associated data, `M' = (4-2)/2 = 1`, `L' = 7-1 = 6`.
pub const B0_FLAGS: u8 = 0x0e;
/// Leading byte of every CTR block as sent by the pad.
pub const CTR_FLAGS: u8 = 0x01;

pub type Nonce = [u8; NONCE_LEN];
pub type Tag = [u8; TAG_LEN];

/// `nonce = prefix(4) || counter(4)`; the counter is used as transmitted.
pub fn build_nonce(prefix: &[u8; NONCE_PREFIX_LEN], counter: &[u8; COUNTER_LEN]) -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(counter);
    nonce
}

/// First CTR block: `0x01 || nonce || block_counter = 1` (7 bytes, big-endian).
pub fn initial_counter_block(nonce: &Nonce) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[0] = CTR_FLAGS;
    block[1..1 + NONCE_LEN].copy_from_slice(nonce);
    block[BLOCK_LEN - 1] = 1;
    block
}

/// `B0 = flags || nonce || len(plaintext)` with the length in 7 big-endian bytes.
pub fn b0_block(nonce: &Nonce, message_len: usize) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[0] = B0_FLAGS;
    block[1..1 + NONCE_LEN].copy_from_slice(nonce);
    let len = (message_len as u64).to_be_bytes();
    block[1 + NONCE_LEN..].copy_from_slice(&len[8 - LENGTH_FIELD_LEN..]);
    block
}

/// XOR the CTR keystream into `data` in place. Encryption and decryption are
/// the same operation.
pub fn apply_keystream(key: &[u8; 32], nonce: &Nonce, data: &mut [u8]) {
    let iv = initial_counter_block(nonce);
    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(&iv));
    cipher.apply_keystream(data);
}

/// CBC-MAC over `B0 || plaintext || zero padding` with a zero IV, truncated
/// to the first 4 bytes of the final block.
pub fn cbc_mac_tag(key: &[u8; 32], nonce: &Nonce, plaintext: &[u8]) -> Tag {
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut state = GenericArray::clone_from_slice(&b0_block(nonce, plaintext.len()));
    cipher.encrypt_block(&mut state);

    for chunk in plaintext.chunks(BLOCK_LEN) {
        // A short final chunk is implicitly zero padded: XOR with 0 is a no-op.
        for (s, p) in state.iter_mut().zip(chunk) {
            *s ^= p;
        }
        cipher.encrypt_block(&mut state);
    }

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&state[..TAG_LEN]);
    tag
}

/// Produce a wire packet `counter || ciphertext || tag`.
///
/// The pad is the only sender in production; this is the reference
/// encryptor used by the simulator and tests.
pub fn seal(key: &KeyMaterial, counter: [u8; COUNTER_LEN], plaintext: &[u8]) -> Vec<u8> {
    let nonce = build_nonce(key.nonce_prefix(), &counter);
    let tag = cbc_mac_tag(key.aes_key(), &nonce, plaintext);

    let mut out = Vec::with_capacity(COUNTER_LEN + plaintext.len() + TAG_LEN);
    out.extend_from_slice(&counter);
    out.extend_from_slice(plaintext);
    apply_keystream(key.aes_key(), &nonce, &mut out[COUNTER_LEN..]);
    out.extend_from_slice(&tag);
    out
}
