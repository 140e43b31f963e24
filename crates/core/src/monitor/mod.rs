//! Edge-case warnings: GPS loss, crawling speed, wrong direction, off-route.
//!
//! One slot per warning kind; raising an already-active kind replaces it,
//! so consumers never see duplicates. Staleness runs off the periodic tick
//! because it must fire precisely when updates stop arriving.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use next_stop_transit::RouteDirection;
use serde::Serialize;
use tracing::warn;

use crate::config::MonitorConfig;
use crate::direction::DirectionInferenceResult;
use crate::location::LocationUpdate;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarningKind {
    GpsWeakSignal,
    GpsLost,
    LowSpeed,
    Stationary,
    WrongDirection,
    OffRoute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Debug, Serialize)]
pub struct EdgeCaseWarning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_dismissible: bool,
}

/// Watches the update stream for degraded conditions.
pub struct EdgeCaseMonitor {
    config: MonitorConfig,
    /// Last accepted update, or the journey start before any fix arrives.
    last_fix_at: Option<DateTime<Utc>>,
    low_speed_run: u32,
    stationary_run: u32,
    active: BTreeMap<WarningKind, EdgeCaseWarning>,
}

impl EdgeCaseMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            last_fix_at: None,
            low_speed_run: 0,
            stationary_run: 0,
            active: BTreeMap::new(),
        }
    }

    /// Clear everything and restart the staleness clock.
    pub fn reset(&mut self, started_at: DateTime<Utc>) {
        self.last_fix_at = Some(started_at);
        self.low_speed_run = 0;
        self.stationary_run = 0;
        self.active.clear();
    }

    pub fn active_warnings(&self) -> impl Iterator<Item = &EdgeCaseWarning> {
        self.active.values()
    }

    pub fn staleness_check_period(&self) -> std::time::Duration {
        self.config.staleness_check_period
    }

    pub fn is_active(&self, kind: WarningKind) -> bool {
        self.active.contains_key(&kind)
    }

    /// Dismiss a warning if it allows dismissal. Returns whether it was
    /// removed.
    pub fn dismiss(&mut self, kind: WarningKind) -> bool {
        if self.active.get(&kind).is_some_and(|w| w.is_dismissible) {
            self.active.remove(&kind);
            true
        } else {
            false
        }
    }

    /// Periodic staleness check, driven by the 5 s tick.
    pub fn on_tick(&mut self, now: DateTime<Utc>) {
        let Some(last) = self.last_fix_at else {
            return;
        };
        let Ok(elapsed) = (now - last).to_std() else {
            return;
        };

        if elapsed > self.config.signal_lost_after {
            self.active.remove(&WarningKind::GpsWeakSignal);
            self.raise(
                WarningKind::GpsLost,
                Severity::Critical,
                "GPS signal lost",
                format!("No location fix for {} seconds", elapsed.as_secs()),
                now,
                false,
            );
        } else if elapsed > self.config.weak_signal_after {
            self.raise(
                WarningKind::GpsWeakSignal,
                Severity::Warning,
                "Weak GPS signal",
                format!("No location fix for {} seconds", elapsed.as_secs()),
                now,
                true,
            );
        }
    }

    /// Evaluate a fresh update against every watched condition.
    pub fn on_location_update(
        &mut self,
        update: &LocationUpdate,
        inference: &DirectionInferenceResult,
        active_direction: Option<RouteDirection>,
        min_station_distance: f64,
    ) {
        self.last_fix_at = Some(update.timestamp);
        self.active.remove(&WarningKind::GpsWeakSignal);
        self.active.remove(&WarningKind::GpsLost);

        self.check_speed(update);
        self.check_direction(inference, active_direction, update.timestamp);
        self.check_off_route(min_station_distance, update.timestamp);
    }

    fn check_speed(&mut self, update: &LocationUpdate) {
        let speed = update.smoothed_speed;

        if speed >= self.config.low_speed_below {
            self.low_speed_run = 0;
            self.stationary_run = 0;
            self.active.remove(&WarningKind::LowSpeed);
            self.active.remove(&WarningKind::Stationary);
            return;
        }

        self.low_speed_run += 1;
        if speed < self.config.stationary_below {
            self.stationary_run += 1;
        } else {
            self.stationary_run = 0;
        }

        if self.low_speed_run >= self.config.speed_warning_updates {
            self.raise(
                WarningKind::LowSpeed,
                Severity::Info,
                "Moving slowly",
                format!("Speed has stayed under {:.1} m/s", self.config.low_speed_below),
                update.timestamp,
                true,
            );
        }
        if self.stationary_run >= self.config.speed_warning_updates {
            self.raise(
                WarningKind::Stationary,
                Severity::Info,
                "Vehicle stopped",
                "The vehicle does not appear to be moving".to_string(),
                update.timestamp,
                true,
            );
        }
    }

    fn check_direction(
        &mut self,
        inference: &DirectionInferenceResult,
        active_direction: Option<RouteDirection>,
        now: DateTime<Utc>,
    ) {
        let (Some(inferred), Some(active)) = (inference.inferred, active_direction) else {
            return;
        };

        if inferred == active {
            self.active.remove(&WarningKind::WrongDirection);
        } else if inference.confidence >= self.config.wrong_direction_confidence {
            self.raise(
                WarningKind::WrongDirection,
                Severity::Warning,
                "Wrong direction?",
                format!("You selected {active} but appear to be heading {inferred}"),
                now,
                true,
            );
        }
    }

    fn check_off_route(&mut self, min_station_distance: f64, now: DateTime<Utc>) {
        if min_station_distance > self.config.off_route_distance {
            self.raise(
                WarningKind::OffRoute,
                Severity::Warning,
                "Off route",
                format!(
                    "Nearest station is {:.0} m away",
                    min_station_distance
                ),
                now,
                true,
            );
        } else {
            self.active.remove(&WarningKind::OffRoute);
        }
    }

    fn raise(
        &mut self,
        kind: WarningKind,
        severity: Severity,
        title: &str,
        message: String,
        timestamp: DateTime<Utc>,
        is_dismissible: bool,
    ) {
        let fresh = !self.active.contains_key(&kind);
        if fresh {
            warn!(%kind, ?severity, "{message}");
        }
        self.active.insert(
            kind,
            EdgeCaseWarning {
                kind,
                severity,
                title: title.to_string(),
                message,
                timestamp,
                is_dismissible,
            },
        );
    }
}
