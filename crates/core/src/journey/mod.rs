//! The update pipeline tying every engine together.
//!
//! One [`JourneyTracker`] is the single writer for all journey state. Each
//! accepted fix is pushed through the engines in dependency order
//! (direction, then progression, then ETA and edge cases, then alerts) and
//! the result is published as an immutable [`JourneySnapshot`]. The async
//! wrapper that serializes fixes against the staleness tick lives in
//! [`runtime`].

pub mod runtime;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use next_stop_transit::{RouteCatalog, RouteDirection, StationIdentifier};
use serde::Serialize;
use tracing::{info, warn};

use crate::alert::{AlertEvent, AlertManager};
use crate::config::{JourneyConfig, TrackerConfig};
use crate::direction::{DirectionInferenceEngine, DirectionInferenceResult, DirectionManager};
use crate::error::{Result, TrackerError};
use crate::eta::{EtaEngine, EtaResult};
use crate::location::{LocationTracker, LocationUpdate, PositionFix, PositionSource};
use crate::monitor::{EdgeCaseMonitor, EdgeCaseWarning, WarningKind};
use crate::progression::{ProgressionSnapshot, StationProgressionEngine};

/// Everything a host needs to render after one update or tick.
#[derive(Clone, Debug, Serialize)]
pub struct JourneySnapshot {
    pub location: Option<LocationUpdate>,
    pub direction: Option<DirectionInferenceResult>,
    pub effective_direction: Option<RouteDirection>,
    pub progression: Option<ProgressionSnapshot>,
    pub eta: Option<EtaResult>,
    pub warnings: Vec<EdgeCaseWarning>,
    /// Alert fired by this update, if any.
    pub alert: Option<AlertEvent>,
}

/// Owns the engines and drives them in topological order.
pub struct JourneyTracker {
    catalog: Arc<RouteCatalog>,
    location: LocationTracker,
    inference: DirectionInferenceEngine,
    direction: DirectionManager,
    progression: StationProgressionEngine,
    eta: EtaEngine,
    monitor: EdgeCaseMonitor,
    alerts: AlertManager,
    /// Destination waiting for a direction before records can be sliced.
    pending_destination: Option<StationIdentifier>,
    last_location: Option<LocationUpdate>,
    last_inference: Option<DirectionInferenceResult>,
}

impl JourneyTracker {
    pub fn new(catalog: Arc<RouteCatalog>, config: TrackerConfig) -> Self {
        Self {
            location: LocationTracker::new(),
            inference: DirectionInferenceEngine::new(catalog.clone(), config.direction),
            direction: DirectionManager::new(),
            progression: StationProgressionEngine::new(catalog.clone(), config.progression),
            eta: EtaEngine::new(config.eta),
            monitor: EdgeCaseMonitor::new(config.monitor),
            alerts: AlertManager::new(Default::default()),
            pending_destination: None,
            last_location: None,
            last_inference: None,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<RouteCatalog> {
        &self.catalog
    }

    /// How often the staleness tick should fire.
    pub fn staleness_check_period(&self) -> std::time::Duration {
        self.monitor.staleness_check_period()
    }

    /// Set up a fresh journey, discarding any previous one.
    ///
    /// With no direction configured, progression stays dormant until
    /// inference resolves one; updates in the meantime are no-ops against
    /// journey state.
    pub fn initialize_journey(
        &mut self,
        config: &JourneyConfig,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        if !config.alert.is_valid() {
            return Err(TrackerError::InvalidConfig(format!(
                "alert threshold {} outside {}..={}",
                config.alert.threshold,
                crate::config::AlertConfig::MIN_THRESHOLD,
                crate::config::AlertConfig::MAX_THRESHOLD,
            )));
        }
        if self.catalog.get(&config.destination).is_none() {
            return Err(TrackerError::UnknownStation(config.destination.clone()));
        }

        self.inference.reset();
        self.direction.reset();
        self.progression.reset();
        self.eta.reset();
        self.monitor.reset(started_at);
        self.alerts.reset(config.alert);
        self.last_location = None;
        self.last_inference = None;

        if let Some(direction) = config.direction {
            self.direction.select(direction);
            self.progression
                .initialize_journey(direction, &config.destination)?;
            self.pending_destination = None;
        } else {
            info!(destination = %config.destination, "journey waiting for direction");
            self.pending_destination = Some(config.destination.clone());
        }

        Ok(())
    }

    /// Begin consuming fixes. Mirrors [`LocationTracker::start`].
    pub fn start(&mut self, source: &dyn PositionSource) -> bool {
        self.location.start(source)
    }

    /// Stop consuming fixes and discard smoothing and inference history.
    pub fn stop(&mut self) {
        self.location.stop();
        self.inference.reset();
    }

    /// User picked a direction by hand.
    pub fn select_direction(&mut self, direction: RouteDirection) {
        self.direction.select(direction);
        self.activate_pending_journey();
    }

    /// Let inference drive direction selection again.
    pub fn enable_auto_direction(&mut self) {
        self.direction.enable_auto();
    }

    /// Operator correction: force a station (and everything before it)
    /// resolved.
    pub fn mark_station_passed(&mut self, id: &StationIdentifier) -> Result<JourneySnapshot> {
        self.progression.mark_station_passed(id)?;
        Ok(self.snapshot(None))
    }

    pub fn dismiss_warning(&mut self, kind: WarningKind) -> bool {
        self.monitor.dismiss(kind)
    }

    /// Process one raw fix through every engine. Returns `None` while
    /// tracking is idle.
    pub fn handle_fix(&mut self, fix: PositionFix) -> Option<JourneySnapshot> {
        let update = self.location.process_fix(fix)?;
        self.last_location = Some(update);

        self.inference.record(update);
        let primary = self.inference.infer();
        let inference = if primary.inferred.is_some() {
            primary
        } else {
            self.inference.infer_from_approach()
        };
        self.direction.apply_inference(&inference);
        self.activate_pending_journey();

        let active_direction = self.direction.active();
        let alert = match self
            .progression
            .update(update.point(), update.timestamp, active_direction)
        {
            Some(journey) => {
                let eta = self.eta.update(&update, journey);
                self.alerts.evaluate(journey, Some(eta))
            }
            None => None,
        };

        let min_station_distance = self.catalog.min_distance_to_any(update.point());
        self.monitor
            .on_location_update(&update, &inference, active_direction, min_station_distance);
        self.last_inference = Some(inference);

        Some(self.snapshot(alert))
    }

    /// Periodic staleness check between fixes.
    pub fn handle_tick(&mut self, now: DateTime<Utc>) -> JourneySnapshot {
        self.monitor.on_tick(now);
        self.snapshot(None)
    }

    pub fn current_snapshot(&self) -> JourneySnapshot {
        self.snapshot(None)
    }

    /// Once a destination is pending and a direction is known, slice the
    /// journey records.
    fn activate_pending_journey(&mut self) {
        let (Some(destination), Some(direction)) =
            (self.pending_destination.as_ref(), self.direction.active())
        else {
            return;
        };

        match self.progression.initialize_journey(direction, destination) {
            Ok(()) => {
                self.pending_destination = None;
            }
            Err(error) => {
                // Destination was validated at journey setup; failure here
                // would mean the catalog changed underneath us.
                warn!(%error, "could not activate pending journey");
            }
        }
    }

    fn snapshot(&self, alert: Option<AlertEvent>) -> JourneySnapshot {
        JourneySnapshot {
            location: self.last_location,
            direction: self.last_inference.clone(),
            effective_direction: self.direction.active(),
            progression: self.progression.journey().map(|j| j.snapshot()),
            eta: self.eta.last().cloned(),
            warnings: self.monitor.active_warnings().cloned().collect(),
            alert,
        }
    }
}
