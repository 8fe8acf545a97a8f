//! Location feed: turns position signals into fetch cycles.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::orchestrator::FetchOrchestrator;
use crate::types::Coord;

/// Something the location provider reported
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSignal {
    Fix { latitude: f64, longitude: f64 },
    /// Acquisition failed (permission denied, no provider, ...)
    Unavailable(String),
}

impl LocationSignal {
    pub fn fix(latitude: f64, longitude: f64) -> Self {
        Self::Fix {
            latitude,
            longitude,
        }
    }
}

/// Consume `signals` until the sender side closes.
///
/// A fix identical to the previous one is dropped; an `Unavailable` signal
/// fails the slots and forgets the last fix so the next fix always starts
/// a cycle.
pub async fn drive_location_feed(
    orchestrator: Arc<FetchOrchestrator>,
    mut signals: mpsc::Receiver<LocationSignal>,
) {
    let mut last_fix: Option<Coord> = None;

    while let Some(signal) = signals.recv().await {
        match signal {
            LocationSignal::Fix {
                latitude,
                longitude,
            } => {
                let coord = Coord {
                    lat: latitude,
                    lon: longitude,
                };
                if last_fix == Some(coord) {
                    tracing::debug!("Ignoring repeated location fix");
                    continue;
                }
                last_fix = Some(coord);
                orchestrator.start_cycle(latitude, longitude);
            }
            LocationSignal::Unavailable(reason) => {
                last_fix = None;
                orchestrator.location_unavailable(&reason);
            }
        }
    }

    tracing::debug!("Location feed closed");
}
