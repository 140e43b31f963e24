//! Tunable thresholds for the tracking engines.
//!
//! Defaults are the production values; hosts may deserialize overrides from
//! their settings layer. Distances are meters, speeds m/s.

use std::time::Duration;

use next_stop_transit::{RouteDirection, StationIdentifier};
use serde::Deserialize;

/// Station progression radii and gap healing.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Within this distance the vehicle is "at" a station.
    pub station_radius: f64,
    /// Within this distance a station is "approaching".
    pub approach_radius: f64,
    /// Hysteresis distance confirming a genuine visit before marking passed.
    pub exit_radius: f64,
    /// Largest contiguous run of unvisited stations healed as skipped.
    pub max_missed_stations: usize,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            station_radius: 100.0,
            approach_radius: 300.0,
            exit_radius: 150.0,
            max_missed_stations: 2,
        }
    }
}

/// Direction inference gates and confidence shaping.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    pub history_capacity: usize,
    pub min_samples: usize,
    /// Minimum net displacement between oldest and newest sample.
    pub min_displacement: f64,
    /// Confidence at or above which inference replaces the active direction.
    pub override_confidence: f64,
    /// Confidence at or above which an inference counts as confident.
    pub confident_threshold: f64,
    /// Legs within this many degrees of the previous leg count as consistent.
    pub consistency_tolerance: f64,
    /// Maximum confidence bonus for a fully consistent history.
    pub consistency_bonus: f64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            min_samples: 3,
            min_displacement: 50.0,
            override_confidence: 0.85,
            confident_threshold: 0.7,
            consistency_tolerance: 45.0,
            consistency_bonus: 0.20,
        }
    }
}

/// ETA projection tuning.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    pub smoother_capacity: usize,
    pub min_samples: usize,
    /// Below this speed the vehicle counts as stationary and no ETA is given.
    pub stationary_threshold: f64,
    /// Weight of the instantaneous speed in the blended projection speed.
    pub current_weight: f64,
    /// Weight of the rolling average in the blended projection speed.
    pub average_weight: f64,
    /// Divisor applied to the projection speed for the destination ETA,
    /// absorbing intermediate stops the model does not represent.
    pub destination_slowdown: f64,
    pub slow_traffic_below: f64,
    pub good_flow_above: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            smoother_capacity: 10,
            min_samples: 3,
            stationary_threshold: 0.5,
            current_weight: 0.3,
            average_weight: 0.7,
            destination_slowdown: 1.2,
            slow_traffic_below: 2.0,
            good_flow_above: 15.0,
        }
    }
}

/// Edge-case warning thresholds.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of the GPS staleness check.
    pub staleness_check_period: Duration,
    pub weak_signal_after: Duration,
    pub signal_lost_after: Duration,
    pub low_speed_below: f64,
    pub stationary_below: f64,
    /// Consecutive sub-threshold updates before a speed warning raises.
    pub speed_warning_updates: u32,
    /// Inference confidence required to raise a wrong-direction warning.
    pub wrong_direction_confidence: f64,
    /// Beyond this distance from every station the vehicle is off-route.
    pub off_route_distance: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            staleness_check_period: Duration::from_secs(5),
            weak_signal_after: Duration::from_secs(15),
            signal_lost_after: Duration::from_secs(30),
            low_speed_below: 2.0,
            stationary_below: 0.5,
            speed_warning_updates: 5,
            wrong_direction_confidence: 0.7,
            off_route_distance: 500.0,
        }
    }
}

/// Proximity alert threshold: fire when this many stations remain.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub threshold: u32,
}

impl AlertConfig {
    pub const MIN_THRESHOLD: u32 = 1;
    pub const MAX_THRESHOLD: u32 = 5;

    pub fn is_valid(&self) -> bool {
        (Self::MIN_THRESHOLD..=Self::MAX_THRESHOLD).contains(&self.threshold)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { threshold: 2 }
    }
}

/// Engine thresholds bundled for one tracker instance.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub progression: ProgressionConfig,
    pub direction: DirectionConfig,
    pub eta: EtaConfig,
    pub monitor: MonitorConfig,
}

/// What the user asked for: where to get off, which way, when to be told.
#[derive(Clone, Debug, Deserialize)]
pub struct JourneyConfig {
    pub destination: StationIdentifier,
    /// Fixed travel direction; `None` defers to inference.
    #[serde(default)]
    pub direction: Option<RouteDirection>,
    #[serde(default)]
    pub alert: AlertConfig,
}

impl JourneyConfig {
    pub fn new(destination: StationIdentifier) -> Self {
        Self {
            destination,
            direction: None,
            alert: AlertConfig::default(),
        }
    }

    pub fn with_direction(mut self, direction: RouteDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.alert = AlertConfig { threshold };
        self
    }
}
