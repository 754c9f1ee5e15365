//! Key exchange with a pad.
//!
//! The host subscribes to the handshake response characteristic, writes its
//! ephemeral public key to the control point, then waits for the first of a
//! marked response, the deadline, cancellation or the link dropping.

use std::time::Duration;

use padlink_crypto::kex::LocalKeyPair;
use padlink_crypto::KeyMaterial;
use padlink_transport::{Characteristic, LinkStatus, Peripheral, TransportError};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::errors::HandshakeError;
use crate::protocol::{encode_handshake_request, parse_handshake_response};

/// Run the handshake with a fresh ephemeral key pair.
pub async fn perform_handshake(
    peripheral: &dyn Peripheral,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<KeyMaterial, HandshakeError> {
    let local = LocalKeyPair::generate();
    perform_handshake_with(peripheral, &local, timeout, cancel).await
}

/// Run the handshake with a caller-supplied local key pair.
pub async fn perform_handshake_with(
    peripheral: &dyn Peripheral,
    local: &LocalKeyPair,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<KeyMaterial, HandshakeError> {
    if *cancel.borrow() {
        return Err(HandshakeError::Cancelled);
    }

    let mut responses = peripheral.subscribe(Characteristic::HandshakeResponse).await?;
    let result = exchange(peripheral, local, timeout, cancel, &mut responses).await;

    if let Err(e) = peripheral.unsubscribe(Characteristic::HandshakeResponse).await {
        debug!("failed to release handshake subscription: {}", e);
    }

    if result.is_ok() {
        info!(peripheral = %peripheral.id(), "handshake complete");
    }
    result
}

async fn exchange(
    peripheral: &dyn Peripheral,
    local: &LocalKeyPair,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
    responses: &mut tokio::sync::mpsc::Receiver<bytes::Bytes>,
) -> Result<KeyMaterial, HandshakeError> {
    let mut link = peripheral.link_status();
    if *link.borrow_and_update() == LinkStatus::Disconnected {
        return Err(HandshakeError::Transport(TransportError::Disconnected));
    }

    let request = encode_handshake_request(local.public_raw());
    peripheral
        .write(Characteristic::ControlPoint, request)
        .await?;
    debug!(peripheral = %peripheral.id(), "handshake request sent");

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let pad_pub = loop {
        tokio::select! {
            biased;

            _ = cancelled(cancel) => return Err(HandshakeError::Cancelled),
            changed = link.changed() => {
                if changed.is_err() || *link.borrow_and_update() == LinkStatus::Disconnected {
                    return Err(HandshakeError::Transport(TransportError::Disconnected));
                }
            }
            _ = &mut deadline => return Err(HandshakeError::Timeout(timeout)),
            indication = responses.recv() => {
                let Some(bytes) = indication else {
                    return Err(HandshakeError::Transport(TransportError::Disconnected));
                };
                match parse_handshake_response(&bytes)? {
                    Some(key) => break key,
                    None => trace!(len = bytes.len(), "skipping unmarked indication"),
                }
            }
        }
    };

    Ok(local.derive_key_material(&pad_pub)?)
}

/// Resolves once the cancel flag is raised. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
