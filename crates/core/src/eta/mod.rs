//! Distance and time estimates for the remaining journey.
//!
//! Projection speed blends the instantaneous sample with a longer rolling
//! average so a single noisy fix cannot swing the ETA. A stationary vehicle
//! gets no ETA at all rather than a divergent one.

use std::time::Duration;

use itertools::Itertools;
use next_stop_transit::geodesy;
use serde::Serialize;
use tracing::trace;

use crate::config::EtaConfig;
use crate::location::smoothing::SpeedSmoother;
use crate::location::LocationUpdate;
use crate::progression::JourneyProgress;

/// Traffic classification for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum EtaStatus {
    #[strum(serialize = "Arrived!")]
    Arrived,
    #[strum(serialize = "Gathering speed data...")]
    GatheringData,
    #[strum(serialize = "Vehicle stopped")]
    Stopped,
    #[strum(serialize = "Slow traffic")]
    SlowTraffic,
    #[strum(serialize = "Normal traffic")]
    NormalTraffic,
    #[strum(serialize = "Good traffic flow")]
    GoodFlow,
}

/// One ETA computation. The engine retains the latest result between
/// updates; it never resets to empty between samples.
#[derive(Clone, Debug, Serialize)]
pub struct EtaResult {
    pub distance_to_next_station: f64,
    pub distance_to_destination: f64,
    pub eta_to_next_station: Option<Duration>,
    pub eta_to_destination: Option<Duration>,
    /// Instantaneous speed from the current sample, m/s.
    pub current_speed: f64,
    /// Rolling recency-weighted average, m/s.
    pub average_speed: f64,
    pub is_stationary: bool,
    pub status: EtaStatus,
}

pub struct EtaEngine {
    config: EtaConfig,
    smoother: SpeedSmoother,
    last: Option<EtaResult>,
}

impl EtaEngine {
    pub fn new(config: EtaConfig) -> Self {
        Self {
            config,
            smoother: SpeedSmoother::new(config.smoother_capacity),
            last: None,
        }
    }

    pub fn last(&self) -> Option<&EtaResult> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last = None;
    }

    pub fn update(&mut self, update: &LocationUpdate, journey: &JourneyProgress) -> &EtaResult {
        let config = self.config;

        let current = update.raw_speed;
        let average = self.smoother.push(current);
        let samples = self.smoother.len();

        // Blend once the rolling average is trustworthy; otherwise trust
        // the instantaneous sample alone, or call the vehicle stationary.
        let effective = if samples >= config.min_samples && average > config.stationary_threshold {
            config.current_weight * current + config.average_weight * average
        } else if current > config.stationary_threshold {
            current
        } else {
            0.0
        };
        let is_stationary = effective <= 0.0;

        let position = update.point();
        let destination = journey.destination().location;
        let remaining: Vec<_> = journey
            .remaining_stations()
            .map(|r| r.station.location)
            .collect();

        let distance_to_next_station = remaining
            .first()
            .map(|&next| geodesy::distance(position, next))
            .unwrap_or_else(|| geodesy::distance(position, destination));

        let distance_to_destination = if remaining.is_empty() {
            geodesy::distance(position, destination)
        } else {
            let legs: f64 = remaining
                .iter()
                .tuple_windows()
                .map(|(a, b)| geodesy::distance(*a, *b))
                .sum();
            geodesy::distance(position, remaining[0]) + legs
        };

        let (eta_to_next_station, eta_to_destination) = if is_stationary {
            (None, None)
        } else {
            // Destination projection runs slower to absorb the dwell time
            // of intermediate stops.
            let destination_speed = effective / config.destination_slowdown;
            (
                Some(Duration::from_secs_f64(distance_to_next_station / effective)),
                Some(Duration::from_secs_f64(
                    distance_to_destination / destination_speed,
                )),
            )
        };

        let status = if journey.has_arrived {
            EtaStatus::Arrived
        } else if is_stationary {
            if samples < config.min_samples {
                EtaStatus::GatheringData
            } else {
                EtaStatus::Stopped
            }
        } else if effective < config.slow_traffic_below {
            EtaStatus::SlowTraffic
        } else if effective > config.good_flow_above {
            EtaStatus::GoodFlow
        } else {
            EtaStatus::NormalTraffic
        };

        trace!(
            effective,
            distance_to_next_station,
            distance_to_destination,
            ?status,
            "eta recomputed"
        );

        &*self.last.insert(EtaResult {
            distance_to_next_station,
            distance_to_destination,
            eta_to_next_station,
            eta_to_destination,
            current_speed: current,
            average_speed: average,
            is_stationary,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use geo::Point;
    use next_stop_transit::{RouteCatalog, RouteDirection, Station, StationIdentifier};
    use std::sync::Arc;

    use crate::config::ProgressionConfig;
    use crate::progression::StationProgressionEngine;

    fn catalog() -> Arc<RouteCatalog> {
        let stations = (0u32..4)
            .map(|i| {
                Station::new(
                    StationIdentifier::new(format!("s{i}")),
                    format!("Station {i}"),
                    Point::new(0.0, 40.0 + i as f64 * 0.01),
                    i,
                    3 - i,
                    i == 0 || i == 3,
                )
            })
            .collect();
        Arc::new(RouteCatalog::from_stations(stations).unwrap())
    }

    fn update_with_speed(lat: f64, speed: f64) -> LocationUpdate {
        LocationUpdate {
            latitude: lat,
            longitude: 0.0,
            raw_speed: speed,
            smoothed_speed: speed,
            accuracy: 5.0,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn journey_to(destination: &str) -> StationProgressionEngine {
        let mut engine = StationProgressionEngine::new(catalog(), ProgressionConfig::default());
        engine
            .initialize_journey(
                RouteDirection::Northbound,
                &StationIdentifier::new(destination),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_stationary_has_no_eta() {
        let progression = journey_to("s3");
        let mut eta = EtaEngine::new(EtaConfig::default());

        let result = eta.update(
            &update_with_speed(40.0, 0.0),
            progression.journey().unwrap(),
        );

        assert!(result.is_stationary);
        assert!(result.eta_to_next_station.is_none());
        assert!(result.eta_to_destination.is_none());
        assert_eq!(result.status, EtaStatus::GatheringData);
    }

    #[test]
    fn test_stopped_after_enough_samples() {
        let progression = journey_to("s3");
        let mut eta = EtaEngine::new(EtaConfig::default());

        for _ in 0..3 {
            eta.update(
                &update_with_speed(40.0, 0.0),
                progression.journey().unwrap(),
            );
        }

        assert_eq!(eta.last().unwrap().status, EtaStatus::Stopped);
    }

    #[test]
    fn test_blended_speed_and_slowdown() {
        let mut progression = journey_to("s3");
        let mut eta = EtaEngine::new(EtaConfig::default());

        // South of s0, moving at a constant 10 m/s
        let journey_point = 39.99;
        let _ = progression.update(
            Point::new(0.0, journey_point),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            None,
        );
        let journey = progression.journey().unwrap();

        for _ in 0..5 {
            eta.update(&update_with_speed(journey_point, 10.0), journey);
        }
        let result = eta.last().unwrap();

        // Constant speed: blend is 0.3*10 + 0.7*10 = 10
        assert_relative_eq!(result.current_speed, 10.0);
        assert_relative_eq!(result.average_speed, 10.0, epsilon = 1e-9);

        let next_secs = result.eta_to_next_station.unwrap().as_secs_f64();
        assert_relative_eq!(
            next_secs,
            result.distance_to_next_station / 10.0,
            epsilon = 0.01
        );

        // Destination ETA uses speed / 1.2
        let dest_secs = result.eta_to_destination.unwrap().as_secs_f64();
        assert_relative_eq!(
            dest_secs,
            result.distance_to_destination / (10.0 / 1.2),
            epsilon = 0.01
        );
    }

    #[test]
    fn test_destination_distance_sums_remaining_legs() {
        let progression = journey_to("s3");
        let mut eta = EtaEngine::new(EtaConfig::default());

        // ~1112 m south of s0; four stations each ~1112 m apart
        let result = eta.update(
            &update_with_speed(39.99, 10.0),
            progression.journey().unwrap(),
        );

        let leg = 1_112.0;
        assert_relative_eq!(result.distance_to_next_station, leg, epsilon = 5.0);
        assert_relative_eq!(result.distance_to_destination, 4.0 * leg, epsilon = 20.0);
    }

    #[test]
    fn test_status_labels() {
        let progression = journey_to("s3");
        let journey = progression.journey().unwrap();
        let mut eta = EtaEngine::new(EtaConfig::default());

        assert_eq!(
            eta.update(&update_with_speed(40.0, 1.0), journey).status,
            EtaStatus::SlowTraffic
        );
        assert_eq!(
            eta.update(&update_with_speed(40.0, 20.0), journey).status,
            EtaStatus::GoodFlow
        );

        assert_eq!(format!("{}", EtaStatus::GoodFlow), "Good traffic flow");
        assert_eq!(format!("{}", EtaStatus::Arrived), "Arrived!");
        assert_eq!(
            format!("{}", EtaStatus::GatheringData),
            "Gathering speed data..."
        );
    }

    #[test]
    fn test_last_result_retained() {
        let progression = journey_to("s3");
        let mut eta = EtaEngine::new(EtaConfig::default());

        assert!(eta.last().is_none());
        eta.update(
            &update_with_speed(40.0, 5.0),
            progression.journey().unwrap(),
        );
        assert!(eta.last().is_some());

        eta.reset();
        assert!(eta.last().is_none());
    }
}
