//! Transport abstractions for talking to BLE pads.
//!
//! The core never touches a radio stack directly: it drives a [`Central`]
//! and the [`Peripheral`] handles it returns. Platform backends implement
//! these traits; [`testing`] provides in-memory mocks.

#![forbid(unsafe_code)]

pub mod traits;
pub mod testing;

pub use traits::*;
