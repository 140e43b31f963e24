//! Raw fix normalization.
//!
//! The platform GPS layer hands this module raw fixes; it repairs missing
//! speeds, smooths them, and emits the [`LocationUpdate`] every downstream
//! engine consumes. Tracking is a two-state machine (idle/active) so a host
//! can tear the stream down and back up without leaking stale smoothing
//! history into the next session.

pub mod smoothing;

use chrono::{DateTime, Utc};
use geo::Point;
use next_stop_transit::geodesy;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::location::smoothing::SpeedSmoother;

/// Window for the live speed smoother fed by raw fixes.
const LIVE_SMOOTHING_WINDOW: usize = 5;

/// One raw sample from the platform position source.
///
/// `speed` is whatever the device reported; absent or negative values are
/// repaired from consecutive fixes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

/// A normalized position sample, the unit of work for every engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported or derived ground speed, m/s, never negative.
    pub raw_speed: f64,
    /// Recency-weighted speed over the last few samples, m/s.
    pub smoothed_speed: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationUpdate {
    pub fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

/// Availability checks the host's GPS layer must answer before tracking
/// can start.
pub trait PositionSource: Send + Sync {
    /// Is the platform location service switched on?
    fn service_enabled(&self) -> bool;

    /// Has the user granted location permission?
    fn permission_granted(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackingState {
    Idle,
    Active,
}

/// Normalizes raw fixes into [`LocationUpdate`]s while active.
pub struct LocationTracker {
    state: TrackingState,
    smoother: SpeedSmoother,
    previous: Option<PositionFix>,
}

impl LocationTracker {
    pub fn new() -> Self {
        Self {
            state: TrackingState::Idle,
            smoother: SpeedSmoother::new(LIVE_SMOOTHING_WINDOW),
            previous: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackingState::Active
    }

    /// Begin tracking. A no-op when already active; returns `false` without
    /// any state change when the source's availability checks fail.
    pub fn start(&mut self, source: &dyn PositionSource) -> bool {
        if self.state == TrackingState::Active {
            return true;
        }
        if !source.service_enabled() || !source.permission_granted() {
            debug!(
                service = source.service_enabled(),
                permission = source.permission_granted(),
                "cannot start tracking"
            );
            return false;
        }

        self.state = TrackingState::Active;
        debug!("tracking started");
        true
    }

    /// Stop tracking and discard smoothing history and the previous fix.
    pub fn stop(&mut self) {
        self.state = TrackingState::Idle;
        self.smoother.reset();
        self.previous = None;
        debug!("tracking stopped");
    }

    /// Normalize one raw fix. Returns `None` while idle.
    pub fn process_fix(&mut self, fix: PositionFix) -> Option<LocationUpdate> {
        if self.state == TrackingState::Idle {
            return None;
        }

        let raw_speed = self.repair_speed(&fix);
        let smoothed_speed = self.smoother.push(raw_speed);
        self.previous = Some(fix);

        trace!(
            lat = fix.latitude,
            lng = fix.longitude,
            raw_speed,
            smoothed_speed,
            "fix normalized"
        );

        Some(LocationUpdate {
            latitude: fix.latitude,
            longitude: fix.longitude,
            raw_speed,
            smoothed_speed,
            accuracy: fix.accuracy,
            timestamp: fix.timestamp,
        })
    }

    /// Use the reported speed when it is usable, otherwise derive it from
    /// the displacement since the previous fix.
    fn repair_speed(&self, fix: &PositionFix) -> f64 {
        if let Some(speed) = fix.speed {
            if speed.is_finite() && speed >= 0.0 {
                return speed;
            }
        }

        let Some(previous) = &self.previous else {
            return 0.0;
        };

        let elapsed = (fix.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return 0.0;
        }

        let travelled = geodesy::distance(previous.point(), fix.point());
        (travelled / elapsed).max(0.0)
    }
}

impl Default for LocationTracker {
    fn default() -> Self {
        Self::new()
    }
}
