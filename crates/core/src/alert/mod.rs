//! Arrival and proximity alerts with per-journey de-duplication.
//!
//! The engine only decides *when* to notify and with what payload; delivery
//! belongs to the host's notification transport.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::AlertConfig;
use crate::eta::EtaResult;
use crate::progression::JourneyProgress;

/// A notification the host should deliver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    /// The destination is a handful of stations away.
    Proximity {
        station_name: String,
        stations_away: usize,
        eta_text: Option<String>,
    },
    /// The vehicle is at the destination.
    Arrival { station_name: String },
}

/// Decides when alerts fire, at most once per trigger per journey.
pub struct AlertManager {
    config: AlertConfig,
    triggered_thresholds: HashSet<usize>,
    arrival_notified: bool,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            triggered_thresholds: HashSet::new(),
            arrival_notified: false,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    /// Forget everything fired so far; called at journey start.
    pub fn reset(&mut self, config: AlertConfig) {
        self.config = config;
        self.triggered_thresholds.clear();
        self.arrival_notified = false;
    }

    /// Evaluate the latest progression state. Returns an event the first
    /// time each trigger is crossed, `None` otherwise.
    pub fn evaluate(
        &mut self,
        journey: &JourneyProgress,
        eta: Option<&EtaResult>,
    ) -> Option<AlertEvent> {
        let station_name = journey.destination().name.to_string();

        if journey.has_arrived {
            if self.arrival_notified {
                return None;
            }
            self.arrival_notified = true;
            info!(station = %station_name, "arrival alert");
            return Some(AlertEvent::Arrival { station_name });
        }

        // Nothing further fires for a journey once arrival has been
        // announced, even if progression state wobbles afterwards.
        if self.arrival_notified {
            return None;
        }

        let remaining = journey.remaining_count();
        if remaining == 0 || remaining > self.config.threshold as usize {
            return None;
        }
        if !self.triggered_thresholds.insert(remaining) {
            return None;
        }

        let eta_text = eta
            .and_then(|e| e.eta_to_destination)
            .map(format_duration);

        info!(station = %station_name, remaining, "proximity alert");
        Some(AlertEvent::Proximity {
            station_name,
            stations_away: remaining,
            eta_text,
        })
    }
}

fn format_duration(duration: Duration) -> String {
    let minutes = (duration.as_secs_f64() / 60.0).round() as u64;
    if minutes < 1 {
        "under a minute".to_string()
    } else {
        format!("about {minutes} min")
    }
}
