//! Testing utilities for transport implementations.

use crate::traits::{
    Central, Characteristic, LinkStatus, Peripheral, PeripheralId, ScanFilter, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

/// Depth of each mock subscription queue.
pub const NOTIFICATION_QUEUE: usize = 64;

/// Called synchronously on every successful write; lets a test play the peer.
pub type WriteHook = Arc<dyn Fn(&MockPeripheral, Characteristic, &[u8]) + Send + Sync>;

/// Mock peripheral for testing
pub struct MockPeripheral {
    id: PeripheralId,
    name: String,
    services: Vec<String>,
    writes: Mutex<Vec<(Characteristic, Bytes)>>,
    subscribers: Mutex<HashMap<Characteristic, mpsc::Sender<Bytes>>>,
    link: watch::Sender<LinkStatus>,
    connected: AtomicBool,
    disconnect_calls: AtomicUsize,
    write_hook: Mutex<Option<WriteHook>>,
    latency: Duration,
}

impl MockPeripheral {
    /// Create a new mock peripheral
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let (link, _) = watch::channel(LinkStatus::Connected);
        Self {
            id: PeripheralId::new(id),
            name: name.into(),
            services: Vec::new(),
            writes: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            link,
            connected: AtomicBool::new(true),
            disconnect_calls: AtomicUsize::new(0),
            write_hook: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    /// Advertise a primary service
    pub fn with_service(mut self, uuid: impl Into<String>) -> Self {
        self.services.push(uuid.into());
        self
    }

    /// Configure simulated write latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Install a hook run after each write
    pub fn set_write_hook(&self, hook: WriteHook) {
        *self.write_hook.lock() = Some(hook);
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Push a value to the current subscriber of `characteristic`.
    ///
    /// Returns `false` when nobody is subscribed or the queue is full.
    pub fn notify(&self, characteristic: Characteristic, data: impl Into<Bytes>) -> bool {
        let sender = self.subscribers.lock().get(&characteristic).cloned();
        match sender {
            Some(tx) => tx.try_send(data.into()).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self, characteristic: Characteristic) -> bool {
        self.subscribers
            .lock()
            .get(&characteristic)
            .map_or(false, |tx| !tx.is_closed())
    }

    /// Get recorded writes
    pub fn get_writes(&self) -> Vec<(Characteristic, Bytes)> {
        self.writes.lock().clone()
    }

    /// Clear recorded writes
    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Simulate the radio link dropping.
    ///
    /// Existing subscription channels stay open so tests can push stray
    /// notifications after the loss.
    pub fn lose_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.link.send_replace(LinkStatus::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of `disconnect()` calls made by the host.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    fn id(&self) -> PeripheralId {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn write(
        &self,
        characteristic: Characteristic,
        data: Bytes,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        // Simulate latency
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        self.writes.lock().push((characteristic, data.clone()));

        let hook = self.write_hook.lock().clone();
        if let Some(hook) = hook {
            hook(self, characteristic, &data);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
    ) -> Result<mpsc::Receiver<Bytes>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        self.subscribers.lock().insert(characteristic, tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<(), TransportError> {
        self.subscribers.lock().remove(&characteristic);
        Ok(())
    }

    fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.lock().clear();
        self.link.send_replace(LinkStatus::Disconnected);
        Ok(())
    }
}

/// Mock central handing out queued peripherals in order
pub struct MockCentral {
    available: Mutex<VecDeque<Arc<MockPeripheral>>>,
    connect_attempts: AtomicUsize,
}

impl MockCentral {
    pub fn new() -> Self {
        Self {
            available: Mutex::new(VecDeque::new()),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// Queue a peripheral for a later `connect`
    pub fn push(&self, peripheral: Arc<MockPeripheral>) {
        self.available.lock().push_back(peripheral);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.available.lock().len()
    }
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Central for MockCentral {
    async fn connect(&self, filter: &ScanFilter) -> Result<Arc<dyn Peripheral>, TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let mut available = self.available.lock();
        let position = available
            .iter()
            .position(|p| filter.matches(&p.name, p.services()))
            .ok_or(TransportError::NotFound)?;
        let peripheral = available.remove(position).ok_or(TransportError::NotFound)?;
        Ok(peripheral as Arc<dyn Peripheral>)
    }
}
