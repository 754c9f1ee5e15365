//! Cryptography for padlink.
//!
//! Everything in this crate is synchronous and free of I/O:
//! - [`kex`]: P-256 key agreement and HKDF-SHA256 derivation of [`KeyMaterial`]
//! - [`ccm`]: nonce, counter block and CBC-MAC construction (L=7, M=4)
//! - [`packet`]: packet parsing and authenticated decryption
//! - [`counter_window`]: bookkeeping of packet counters seen on a link

#![forbid(unsafe_code)]

pub mod key_material;
pub mod kex;
pub mod ccm;
pub mod packet;
pub mod counter_window;
pub mod utils;

#[cfg(test)]
mod proptests;

pub use key_material::KeyMaterial;
pub use packet::{decrypt, DecryptError, Decrypted, Packet};
