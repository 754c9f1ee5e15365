//! Simulated session run.
//!
//! Pairs the session manager with one or two [`SimulatedPad`]s, presses and
//! releases buttons on each and collects what comes out of the merged event
//! stream.

use std::time::Duration;

use padlink_core::harness::{central_for, SimulatedPad};
use padlink_core::{
    ManagerError, PadEvent, PadSide, PadSlot, PadlinkConfig, SessionManager, SessionStats,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::inspect::discrete_buttons;

/// How long to wait for each expected event.
const EVENT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SimulateError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("expected {expected} events, received {received}")]
    EventsMissing { expected: usize, received: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub slot: String,
    pub peripheral: String,
    pub button: String,
    pub pressed: bool,
    pub source: String,
}

impl From<&PadEvent> for EventRecord {
    fn from(event: &PadEvent) -> Self {
        Self {
            slot: event.slot.to_string(),
            peripheral: event.peripheral.to_string(),
            button: event.event.button.to_string(),
            pressed: event.event.pressed,
            source: event.event.source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub slot: String,
    pub peripheral: String,
    pub packets_received: u64,
    pub authentic: u64,
    pub auth_failures: u64,
    pub malformed: u64,
    pub events_emitted: u64,
    pub distinct_counters: u64,
}

impl SessionReport {
    fn new(slot: PadSlot, peripheral: String, stats: SessionStats) -> Self {
        Self {
            slot: slot.to_string(),
            peripheral,
            packets_received: stats.packets_received,
            authentic: stats.authentic,
            auth_failures: stats.auth_failures,
            malformed: stats.malformed,
            events_emitted: stats.events_emitted,
            distinct_counters: stats.distinct_counters,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub events: Vec<EventRecord>,
    pub sessions: Vec<SessionReport>,
}

struct PadEntry {
    slot: PadSlot,
    side: PadSide,
    pad: SimulatedPad,
}

/// One or two virtual pads wired to a session manager.
pub struct Simulation {
    manager: SessionManager,
    pads: Vec<PadEntry>,
}

impl Simulation {
    /// `pad_count` is clamped to 1..=2. The first pad reports itself as the
    /// left half, the second as the right.
    pub fn new(config: PadlinkConfig, pad_count: usize) -> Self {
        let prefix = config
            .scan
            .name_prefix
            .clone()
            .unwrap_or_else(|| "PAD".to_string());

        let layout = [
            (PadSlot::First, PadSide::Left, "SIM:01", "L"),
            (PadSlot::Second, PadSide::Right, "SIM:02", "R"),
        ];
        let pads: Vec<PadEntry> = layout
            .into_iter()
            .take(pad_count.clamp(1, 2))
            .map(|(slot, side, id, suffix)| PadEntry {
                slot,
                side,
                pad: SimulatedPad::new(id, &format!("{prefix}-{suffix}")),
            })
            .collect();

        let refs: Vec<&SimulatedPad> = pads.iter().map(|entry| &entry.pad).collect();
        let manager = SessionManager::new(central_for(&refs), config);

        Self { manager, pads }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Connect every pad, then press and release `presses` buttons on each.
    ///
    /// `on_event` sees every event as it arrives.
    pub async fn run<F>(&self, presses: usize, mut on_event: F) -> Result<SimulationSummary, SimulateError>
    where
        F: FnMut(&PadEvent),
    {
        let mut events = self.manager.subscribe();
        let mut summary = SimulationSummary::default();

        for entry in &self.pads {
            let id = self.manager.connect(entry.slot).await?;
            info!(slot = %entry.slot, peripheral = %id, "simulated pad paired");
        }

        let expected = self.pads.len() * presses * 2;
        for (round, button) in discrete_buttons().cycle().take(presses).enumerate() {
            for entry in &self.pads {
                for pressed in [true, false] {
                    debug!(round, slot = %entry.slot, %button, pressed, "sending");
                    entry.pad.send_press(entry.side, button, pressed);

                    let Some(event) = next_event(&mut events).await else {
                        return Err(SimulateError::EventsMissing {
                            expected,
                            received: summary.events.len(),
                        });
                    };
                    on_event(&event);
                    summary.events.push(EventRecord::from(&event));
                }
            }
        }

        for (slot, peripheral) in self.manager.sessions().await {
            if let Some(stats) = self.manager.stats(slot).await {
                summary
                    .sessions
                    .push(SessionReport::new(slot, peripheral.to_string(), stats));
            }
        }

        Ok(summary)
    }

    pub async fn shutdown(&self) {
        self.manager.disconnect_all().await;
    }
}

async fn next_event(events: &mut broadcast::Receiver<PadEvent>) -> Option<PadEvent> {
    loop {
        match tokio::time::timeout(EVENT_WAIT, events.recv()).await {
            Ok(Ok(event)) => return Some(event),
            Ok(Err(RecvError::Lagged(skipped))) => {
                debug!(skipped, "event listener lagged");
            }
            Ok(Err(RecvError::Closed)) | Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padlink_core::{AggregateState, Button};

    #[tokio::test]
    async fn test_single_pad_run() {
        let simulation = Simulation::new(PadlinkConfig::default(), 1);
        let mut seen = 0;

        let summary = simulation.run(3, |_| seen += 1).await.unwrap();
        assert_eq!(seen, 6);
        assert_eq!(summary.events.len(), 6);
        assert_eq!(summary.events[0].button, Button::Y.to_string());
        assert!(summary.events[0].pressed);
        assert!(!summary.events[1].pressed);
        assert!(summary.events.iter().all(|e| e.source == "left"));

        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].authentic, 6);
        assert_eq!(summary.sessions[0].events_emitted, 6);
        assert_eq!(summary.sessions[0].distinct_counters, 6);

        simulation.shutdown().await;
        assert_eq!(simulation.manager().state(), AggregateState::Disconnected);
    }

    #[tokio::test]
    async fn test_two_pads_interleave() {
        let simulation = Simulation::new(PadlinkConfig::default(), 2);

        let summary = simulation.run(1, |_| {}).await.unwrap();
        let sources: Vec<_> = summary
            .events
            .iter()
            .map(|e| (e.slot.as_str(), e.source.as_str()))
            .collect();
        assert_eq!(
            sources,
            vec![
                ("first", "left"),
                ("first", "left"),
                ("second", "right"),
                ("second", "right"),
            ]
        );
        assert_eq!(summary.sessions.len(), 2);

        simulation.shutdown().await;
    }

    #[tokio::test]
    async fn test_scan_prefix_names_pads() {
        let mut config = PadlinkConfig::default();
        config.scan.name_prefix = Some("MYPAD".to_string());
        let simulation = Simulation::new(config, 1);

        let summary = simulation.run(0, |_| {}).await.unwrap();
        assert!(summary.events.is_empty());
        assert_eq!(summary.sessions.len(), 1);

        simulation.shutdown().await;
    }
}
