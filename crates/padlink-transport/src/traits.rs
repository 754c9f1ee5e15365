//! Transport traits for the BLE central and its connected peripherals.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Stable identifier of a physical peripheral (its BLE address on real stacks).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(pub String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// GATT characteristics used by the pad protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Host writes the handshake request here.
    ControlPoint,
    /// Pad answers the handshake with an indication here.
    HandshakeResponse,
    /// Encrypted telemetry notifications.
    Measurement,
}

impl Characteristic {
    pub fn name(&self) -> &'static str {
        match self {
            Characteristic::ControlPoint => "control-point",
            Characteristic::HandshakeResponse => "handshake-response",
            Characteristic::Measurement => "measurement",
        }
    }
}

/// Which peripherals a connect may resolve to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Advertised local name must start with this.
    pub name_prefix: Option<String>,
    /// Primary service the peripheral must advertise.
    pub service_uuid: Option<String>,
}

impl ScanFilter {
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_service_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuid = Some(uuid.into());
        self
    }

    /// Check an advertisement against the filter.
    pub fn matches(&self, name: &str, services: &[String]) -> bool {
        let name_ok = self
            .name_prefix
            .as_deref()
            .map_or(true, |prefix| name.starts_with(prefix));
        let service_ok = self
            .service_uuid
            .as_deref()
            .map_or(true, |uuid| services.iter().any(|s| s.eq_ignore_ascii_case(uuid)));
        name_ok && service_ok
    }
}

/// Link state reported by a peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// BLE central: resolves a scan filter to a connected peripheral.
#[async_trait]
pub trait Central: Send + Sync {
    /// Scan and connect to the first peripheral matching `filter`.
    async fn connect(&self, filter: &ScanFilter) -> Result<Arc<dyn Peripheral>, TransportError>;
}

/// A connected peripheral with its GATT services resolved.
#[async_trait]
pub trait Peripheral: Send + Sync {
    fn id(&self) -> PeripheralId;

    /// Advertised local name.
    fn name(&self) -> String;

    /// Write with response.
    async fn write(&self, characteristic: Characteristic, data: Bytes)
        -> Result<(), TransportError>;

    /// Enable notifications or indications. Values arrive on the returned
    /// channel in arrival order; the channel closes when the subscription ends.
    async fn subscribe(
        &self,
        characteristic: Characteristic,
    ) -> Result<mpsc::Receiver<Bytes>, TransportError>;

    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<(), TransportError>;

    /// Flips to [`LinkStatus::Disconnected`] once when the link drops.
    fn link_status(&self) -> watch::Receiver<LinkStatus>;

    /// Tear down the link and release the handle.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Common transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport disconnected")]
    Disconnected,

    #[error("Operation timed out")]
    Timeout,

    #[error("Characteristic not available: {0}")]
    UnknownCharacteristic(&'static str),

    #[error("No peripheral matched the scan filter")]
    NotFound,

    #[error("Other error: {0}")]
    Other(String),
}
