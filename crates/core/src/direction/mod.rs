//! Travel-direction inference from recent movement.
//!
//! The primary signal compares the vehicle's net movement bearing against
//! the line's spine bearing; a fallback looks at which of the two nearest
//! stations the vehicle is closing on. A [`DirectionManager`] arbitrates
//! between manual selection and automatic override.

use std::collections::VecDeque;
use std::sync::Arc;

use next_stop_transit::{geodesy, RouteCatalog, RouteDirection};
use serde::Serialize;
use tracing::debug;

use crate::config::DirectionConfig;
use crate::location::LocationUpdate;

/// Outcome of one inference pass. Recomputed on every sample.
#[derive(Clone, Debug, Serialize)]
pub struct DirectionInferenceResult {
    pub inferred: Option<RouteDirection>,
    /// In [0, 1]; 0 when the history cannot support a call.
    pub confidence: f64,
    /// The vehicle's movement bearing, degrees in [0, 360).
    pub bearing: f64,
    /// Diagnostic for logs and debug UI.
    pub reasoning: String,
    /// Confident enough to replace the active direction.
    pub should_override: bool,
}

impl DirectionInferenceResult {
    fn undecided(bearing: f64, reasoning: String) -> Self {
        Self {
            inferred: None,
            confidence: 0.0,
            bearing,
            reasoning,
            should_override: false,
        }
    }
}

/// Infers travel direction from a bounded history of location updates.
pub struct DirectionInferenceEngine {
    config: DirectionConfig,
    catalog: Arc<RouteCatalog>,
    /// Spine bearing of the northbound ordering; southbound is its reciprocal.
    northbound_bearing: f64,
    history: VecDeque<LocationUpdate>,
}

impl DirectionInferenceEngine {
    pub fn new(catalog: Arc<RouteCatalog>, config: DirectionConfig) -> Self {
        let northbound_bearing = catalog.spine_bearing(RouteDirection::Northbound);
        Self {
            config,
            catalog,
            northbound_bearing,
            history: VecDeque::with_capacity(config.history_capacity),
        }
    }

    pub fn record(&mut self, update: LocationUpdate) {
        self.history.push_back(update);
        if self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Primary inference: net movement bearing versus the line's spine.
    pub fn infer(&self) -> DirectionInferenceResult {
        let (Some(oldest), Some(newest)) = (self.history.front(), self.history.back()) else {
            return DirectionInferenceResult::undecided(0.0, "no samples buffered".into());
        };

        if self.history.len() < self.config.min_samples {
            return DirectionInferenceResult::undecided(
                0.0,
                format!(
                    "only {} of {} samples buffered",
                    self.history.len(),
                    self.config.min_samples
                ),
            );
        }

        let displacement = geodesy::distance(oldest.point(), newest.point());
        if displacement < self.config.min_displacement {
            return DirectionInferenceResult::undecided(
                0.0,
                format!(
                    "net displacement {:.0} m below {:.0} m",
                    displacement, self.config.min_displacement
                ),
            );
        }

        let bearing = geodesy::initial_bearing(oldest.point(), newest.point());
        let south_bearing = geodesy::normalize_bearing(self.northbound_bearing + 180.0);

        let north_diff = geodesy::bearing_difference(bearing, self.northbound_bearing);
        let south_diff = geodesy::bearing_difference(bearing, south_bearing);

        let (direction, diff) = if north_diff <= south_diff {
            (RouteDirection::Northbound, north_diff)
        } else {
            (RouteDirection::Southbound, south_diff)
        };

        let base = 1.0 - diff.min(90.0) / 90.0;
        let bonus = self.config.consistency_bonus * self.leg_consistency();
        let confidence = (base + bonus).clamp(0.0, 1.0);

        DirectionInferenceResult {
            inferred: Some(direction),
            confidence,
            bearing,
            reasoning: format!(
                "movement bearing {:.0}\u{b0} is {:.0}\u{b0} off the {} spine",
                bearing, diff, direction
            ),
            should_override: confidence >= self.config.override_confidence,
        }
    }

    /// Fraction of consecutive legs whose bearing stays within the
    /// consistency tolerance of the previous leg.
    fn leg_consistency(&self) -> f64 {
        let legs: Vec<f64> = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| geodesy::initial_bearing(a.point(), b.point()))
            .collect();

        if legs.len() < 2 {
            return 0.0;
        }

        let consistent = legs
            .windows(2)
            .filter(|pair| {
                geodesy::bearing_difference(pair[0], pair[1]) < self.config.consistency_tolerance
            })
            .count();

        consistent as f64 / (legs.len() - 1) as f64
    }

    /// Fallback: which of the two nearest stations is the vehicle closing
    /// on? Decides with a fixed 0.75 confidence, or reports unclear at 0.3.
    pub fn infer_from_approach(&self) -> DirectionInferenceResult {
        let mut latest = self.history.iter().rev();
        let (Some(newest), Some(previous)) = (latest.next(), latest.next()) else {
            return approach_unclear(0.0, "fewer than two samples");
        };

        let bearing = geodesy::initial_bearing(previous.point(), newest.point());

        let nearest = self.catalog.nearest(newest.point(), 2);
        let [first, second] = nearest.as_slice() else {
            return approach_unclear(bearing, "fewer than two stations nearby");
        };

        let closing = |station: &next_stop_transit::Station| {
            geodesy::distance(newest.point(), station.location)
                < geodesy::distance(previous.point(), station.location)
        };

        let direction = match (closing(first), closing(second)) {
            (true, false) => order_implied_direction(first, second),
            (false, true) => order_implied_direction(second, first),
            _ => {
                return approach_unclear(bearing, "not closing on a single station");
            }
        };

        DirectionInferenceResult {
            inferred: Some(direction),
            confidence: 0.75,
            bearing,
            reasoning: format!("closing on a station that is {} of its neighbor", direction),
            should_override: false,
        }
    }
}

/// Direction implied by approaching `target` rather than `other`.
fn order_implied_direction(
    target: &next_stop_transit::Station,
    other: &next_stop_transit::Station,
) -> RouteDirection {
    if target.order(RouteDirection::Northbound) > other.order(RouteDirection::Northbound) {
        RouteDirection::Northbound
    } else {
        RouteDirection::Southbound
    }
}

fn approach_unclear(bearing: f64, reason: &str) -> DirectionInferenceResult {
    DirectionInferenceResult {
        inferred: None,
        confidence: 0.3,
        bearing,
        reasoning: format!("approach test unclear: {reason}"),
        should_override: false,
    }
}

// ============================================================================
// Direction selection policy
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionMode {
    /// User-selected direction, immune to inference.
    Manual,
    /// Inference with `should_override` replaces the active direction.
    Auto,
}

/// Holds the direction the rest of the pipeline should treat as active.
pub struct DirectionManager {
    active: Option<RouteDirection>,
    mode: DirectionMode,
}

impl DirectionManager {
    pub fn new() -> Self {
        Self {
            active: None,
            mode: DirectionMode::Auto,
        }
    }

    pub fn active(&self) -> Option<RouteDirection> {
        self.active
    }

    pub fn mode(&self) -> DirectionMode {
        self.mode
    }

    /// Manual selection persists until re-selected or auto is re-enabled.
    pub fn select(&mut self, direction: RouteDirection) {
        self.mode = DirectionMode::Manual;
        self.active = Some(direction);
        debug!(%direction, "direction selected manually");
    }

    pub fn enable_auto(&mut self) {
        self.mode = DirectionMode::Auto;
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.mode = DirectionMode::Auto;
    }

    /// Apply an inference result under the current mode. Returns `true`
    /// when the active direction changed.
    pub fn apply_inference(&mut self, result: &DirectionInferenceResult) -> bool {
        if self.mode != DirectionMode::Auto || !result.should_override {
            return false;
        }
        let Some(inferred) = result.inferred else {
            return false;
        };
        if self.active == Some(inferred) {
            return false;
        }

        debug!(direction = %inferred, confidence = result.confidence, "direction override");
        self.active = Some(inferred);
        true
    }
}

impl Default for DirectionManager {
    fn default() -> Self {
        Self::new()
    }
}
