//! Station progression: the journey state machine.
//!
//! One record per station between the route start and the destination,
//! mutated in place on every location update. Radii give the machine its
//! hysteresis: a station only counts as genuinely visited once the vehicle
//! has been within the exit radius, so pass-through noise near the approach
//! boundary cannot flap a record's status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::Point;
use next_stop_transit::{geodesy, RouteCatalog, RouteDirection, Station, StationIdentifier};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ProgressionConfig;
use crate::error::{Result, TrackerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StationStatus {
    Upcoming,
    Approaching,
    AtStation,
    Passed,
    Skipped,
}

impl StationStatus {
    /// Counts toward `passed_count`.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Passed | Self::Skipped)
    }
}

/// Live record for one station of the active journey.
#[derive(Clone, Debug)]
pub struct StationPassRecord {
    pub station: Arc<Station>,
    pub status: StationStatus,
    pub entered_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    /// Closest the vehicle has ever been, non-increasing once set.
    pub min_distance_seen: Option<f64>,
}

impl StationPassRecord {
    fn new(station: Arc<Station>) -> Self {
        Self {
            station,
            status: StationStatus::Upcoming,
            entered_at: None,
            exited_at: None,
            min_distance_seen: None,
        }
    }

    fn visited_within(&self, radius: f64) -> bool {
        self.min_distance_seen.is_some_and(|d| d <= radius)
    }

    fn mark_passed(&mut self, at: Option<DateTime<Utc>>) {
        self.status = StationStatus::Passed;
        if self.exited_at.is_none() {
            self.exited_at = at;
        }
    }
}

/// The active journey's mutable state.
#[derive(Clone, Debug)]
pub struct JourneyProgress {
    pub direction: RouteDirection,
    pub records: Vec<StationPassRecord>,
    pub current_index: Option<usize>,
    pub next_index: Option<usize>,
    pub passed_count: usize,
    pub has_arrived: bool,
}

impl JourneyProgress {
    pub fn destination(&self) -> &Arc<Station> {
        // Records always run from the route start through the destination.
        &self.records.last().expect("journey has at least one record").station
    }

    pub fn remaining_count(&self) -> usize {
        self.records.len() - self.passed_count
    }

    pub fn current_station(&self) -> Option<&Arc<Station>> {
        self.current_index.map(|i| &self.records[i].station)
    }

    pub fn next_station(&self) -> Option<&Arc<Station>> {
        self.next_index.map(|i| &self.records[i].station)
    }

    /// Stations not yet resolved, in route order.
    pub fn remaining_stations(&self) -> impl Iterator<Item = &StationPassRecord> {
        self.records.iter().filter(|r| {
            matches!(
                r.status,
                StationStatus::Upcoming | StationStatus::Approaching
            )
        })
    }

    pub fn snapshot(&self) -> ProgressionSnapshot {
        ProgressionSnapshot {
            records: self
                .records
                .iter()
                .map(|r| RecordSnapshot {
                    station: r.station.id.clone(),
                    name: r.station.name.to_string(),
                    status: r.status,
                    entered_at: r.entered_at,
                    exited_at: r.exited_at,
                    min_distance_seen: r.min_distance_seen,
                })
                .collect(),
            direction: self.direction,
            destination: self.destination().id.clone(),
            current_station: self.current_station().map(|s| s.id.clone()),
            next_station: self.next_station().map(|s| s.id.clone()),
            passed_count: self.passed_count,
            remaining_count: self.remaining_count(),
            has_arrived: self.has_arrived,
        }
    }
}

/// Immutable per-update view published to hosts.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressionSnapshot {
    pub records: Vec<RecordSnapshot>,
    pub direction: RouteDirection,
    pub destination: StationIdentifier,
    pub current_station: Option<StationIdentifier>,
    pub next_station: Option<StationIdentifier>,
    pub passed_count: usize,
    pub remaining_count: usize,
    pub has_arrived: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecordSnapshot {
    pub station: StationIdentifier,
    pub name: String,
    pub status: StationStatus,
    pub entered_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    pub min_distance_seen: Option<f64>,
}

/// Drives the per-station records from location updates.
pub struct StationProgressionEngine {
    config: ProgressionConfig,
    catalog: Arc<RouteCatalog>,
    journey: Option<JourneyProgress>,
}

impl StationProgressionEngine {
    pub fn new(catalog: Arc<RouteCatalog>, config: ProgressionConfig) -> Self {
        Self {
            config,
            catalog,
            journey: None,
        }
    }

    pub fn journey(&self) -> Option<&JourneyProgress> {
        self.journey.as_ref()
    }

    /// Slice the direction-ordered station list from the route start up to
    /// and including the destination, one upcoming record each.
    pub fn initialize_journey(
        &mut self,
        direction: RouteDirection,
        destination: &StationIdentifier,
    ) -> Result<()> {
        let ordered = self.catalog.ordered(direction);
        let destination_index = ordered
            .iter()
            .position(|s| &s.id == destination)
            .ok_or_else(|| TrackerError::UnknownStation(destination.clone()))?;

        let records = ordered[..=destination_index]
            .iter()
            .map(|s| StationPassRecord::new(s.clone()))
            .collect::<Vec<_>>();

        info!(
            %direction,
            %destination,
            stations = records.len(),
            "journey initialized"
        );

        self.journey = Some(JourneyProgress {
            direction,
            records,
            current_index: None,
            next_index: None,
            passed_count: 0,
            has_arrived: false,
        });

        Ok(())
    }

    pub fn reset(&mut self) {
        self.journey = None;
    }

    /// Process one fix. A no-op without an active journey or after arrival.
    ///
    /// Idempotent under repeated identical input, and monotonic in resolved
    /// stations under normal forward travel.
    pub fn update(
        &mut self,
        position: Point,
        at: DateTime<Utc>,
        effective_direction: Option<RouteDirection>,
    ) -> Option<&JourneyProgress> {
        let config = self.config;
        let journey = self.journey.as_mut()?;
        if journey.has_arrived {
            return Some(&*journey);
        }

        if let Some(direction) = effective_direction {
            if direction != journey.direction {
                debug!(
                    active = %direction,
                    journey = %journey.direction,
                    "effective direction disagrees with journey direction"
                );
            }
        }

        let distances: Vec<f64> = journey
            .records
            .iter()
            .map(|r| geodesy::distance(position, r.station.location))
            .collect();

        // First station within the at-station radius wins, favoring the
        // earliest route order if spacing ever let two overlap.
        let current_index = distances
            .iter()
            .position(|&d| d <= config.station_radius);
        journey.current_index = current_index;

        for (record, &distance) in journey.records.iter_mut().zip(&distances) {
            record.min_distance_seen = Some(
                record
                    .min_distance_seen
                    .map_or(distance, |seen| seen.min(distance)),
            );
        }

        for index in 0..journey.records.len() {
            let distance = distances[index];
            let behind_current = current_index.is_some_and(|current| index < current);

            if behind_current {
                let record = &mut journey.records[index];
                if !record.status.is_resolved() {
                    if record.visited_within(config.exit_radius) {
                        record.mark_passed(Some(at));
                    } else {
                        record.status = StationStatus::Skipped;
                        debug!(station = %record.station.id, "station skipped");
                    }
                }
            } else if distance <= config.station_radius {
                let is_destination = index == journey.records.len() - 1;
                let record = &mut journey.records[index];
                if record.status != StationStatus::AtStation {
                    record.status = StationStatus::AtStation;
                    if record.entered_at.is_none() {
                        record.entered_at = Some(at);
                    }
                    debug!(station = %record.station.id, "at station");
                }
                if is_destination && !journey.has_arrived {
                    journey.has_arrived = true;
                    info!(station = %record.station.id, "arrived at destination");
                }
            } else if distance <= config.approach_radius {
                let record = &mut journey.records[index];
                match record.status {
                    StationStatus::Upcoming => record.status = StationStatus::Approaching,
                    StationStatus::AtStation => record.mark_passed(Some(at)),
                    _ => {}
                }
            } else {
                // Far from this station: if it was being visited or
                // approached and some later station is already inside the
                // approach radius, the vehicle has moved on.
                let record_status = journey.records[index].status;
                if matches!(
                    record_status,
                    StationStatus::AtStation | StationStatus::Approaching
                ) {
                    let moved_on = distances[index + 1..]
                        .iter()
                        .any(|&d| d <= config.approach_radius);
                    if moved_on {
                        journey.records[index].mark_passed(Some(at));
                    }
                }
            }
        }

        heal_gaps(journey, current_index, config, at);

        journey.passed_count = journey
            .records
            .iter()
            .filter(|r| r.status.is_resolved())
            .count();
        journey.next_index = journey.records.iter().position(|r| {
            matches!(
                r.status,
                StationStatus::Upcoming | StationStatus::Approaching
            )
        });

        Some(&*journey)
    }

    /// Operator override: force a station passed, resolving everything
    /// before it. Fails fast on an id outside the active journey.
    pub fn mark_station_passed(&mut self, id: &StationIdentifier) -> Result<&JourneyProgress> {
        let config = self.config;
        let journey = self
            .journey
            .as_mut()
            .ok_or(TrackerError::NoActiveJourney)?;

        let target = journey
            .records
            .iter()
            .position(|r| &r.station.id == id)
            .ok_or_else(|| TrackerError::UnknownStation(id.clone()))?;

        for index in 0..=target {
            let record = &mut journey.records[index];
            if record.status.is_resolved() {
                continue;
            }
            if index == target || record.visited_within(config.exit_radius) {
                record.mark_passed(None);
            } else {
                record.status = StationStatus::Skipped;
            }
        }

        if target == journey.records.len() - 1 {
            journey.has_arrived = true;
        }

        journey.passed_count = journey
            .records
            .iter()
            .filter(|r| r.status.is_resolved())
            .count();
        journey.next_index = journey.records.iter().position(|r| {
            matches!(
                r.status,
                StationStatus::Upcoming | StationStatus::Approaching
            )
        });

        info!(station = %id, "station marked passed manually");
        Ok(&*journey)
    }
}

/// Resolve leftovers behind the current station: short unvisited runs
/// sandwiched between passed stations become skipped, and anything still
/// pending resolves by whether it was ever genuinely visited.
fn heal_gaps(
    journey: &mut JourneyProgress,
    current_index: Option<usize>,
    config: ProgressionConfig,
    at: DateTime<Utc>,
) {
    let Some(current) = current_index else {
        return;
    };

    let behind = &mut journey.records[..current];

    // Runs of non-passed records sandwiched between two passed neighbors.
    let mut last_passed: Option<usize> = None;
    for index in 0..behind.len() {
        if behind[index].status != StationStatus::Passed {
            continue;
        }
        if let Some(previous) = last_passed {
            let run_len = index - previous - 1;
            if run_len > 0 && run_len <= config.max_missed_stations {
                for record in &mut behind[previous + 1..index] {
                    if record.status != StationStatus::Passed {
                        record.status = StationStatus::Skipped;
                    }
                }
            }
        }
        last_passed = Some(index);
    }

    for record in &mut journey.records[..current] {
        if matches!(
            record.status,
            StationStatus::Upcoming | StationStatus::Approaching
        ) {
            if record.visited_within(config.exit_radius) {
                record.mark_passed(Some(at));
            } else {
                record.status = StationStatus::Skipped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use next_stop_transit::StationIdentifier;

    /// Stations on a meridian every ~1.11 km; northbound = increasing
    /// latitude. One degree of latitude is ~111.2 km, so 0.00045 deg ~ 50 m.
    fn catalog() -> Arc<RouteCatalog> {
        let stations = (0u32..5)
            .map(|i| {
                Station::new(
                    StationIdentifier::new(format!("s{i}")),
                    format!("Station {i}"),
                    Point::new(0.0, 40.0 + i as f64 * 0.01),
                    i,
                    4 - i,
                    i == 0 || i == 4,
                )
            })
            .collect();
        Arc::new(RouteCatalog::from_stations(stations).unwrap())
    }

    fn engine_to(destination: &str) -> StationProgressionEngine {
        let mut engine = StationProgressionEngine::new(catalog(), ProgressionConfig::default());
        engine
            .initialize_journey(
                RouteDirection::Northbound,
                &StationIdentifier::new(destination),
            )
            .unwrap();
        engine
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    /// A point `offset_m` meters north of station `i`.
    fn near_station(i: u32, offset_m: f64) -> Point {
        Point::new(0.0, 40.0 + i as f64 * 0.01 + offset_m / 111_195.0)
    }

    fn statuses(journey: &JourneyProgress) -> Vec<StationStatus> {
        journey.records.iter().map(|r| r.status).collect()
    }

    #[test]
    fn test_initialize_slices_to_destination() {
        let engine = engine_to("s2");
        let journey = engine.journey().unwrap();

        assert_eq!(journey.records.len(), 3);
        assert_eq!(journey.passed_count, 0);
        assert_eq!(journey.remaining_count(), 3);
        assert!(!journey.has_arrived);
        assert!(journey
            .records
            .iter()
            .all(|r| r.status == StationStatus::Upcoming));
        assert_eq!(journey.destination().id.as_str(), "s2");
    }

    #[test]
    fn test_initialize_unknown_destination_fails() {
        let mut engine = StationProgressionEngine::new(catalog(), ProgressionConfig::default());
        let result = engine.initialize_journey(
            RouteDirection::Northbound,
            &StationIdentifier::new("nowhere"),
        );
        assert!(matches!(result, Err(TrackerError::UnknownStation(_))));
        assert!(engine.journey().is_none());
    }

    #[test]
    fn test_update_without_journey_is_noop() {
        let mut engine = StationProgressionEngine::new(catalog(), ProgressionConfig::default());
        assert!(engine.update(near_station(0, 0.0), at(0), None).is_none());
    }

    #[test]
    fn test_approach_then_arrive_then_pass() {
        let mut engine = engine_to("s2");

        // 200 m short of s0: approaching
        let _ = engine.update(near_station(0, -200.0), at(0), None);
        assert_eq!(
            statuses(engine.journey().unwrap())[0],
            StationStatus::Approaching
        );

        // 40 m from s0: at station, entered_at stamped
        let _ = engine.update(near_station(0, -40.0), at(5), None);
        let journey = engine.journey().unwrap();
        assert_eq!(statuses(journey)[0], StationStatus::AtStation);
        assert_eq!(journey.current_station().unwrap().id.as_str(), "s0");
        assert!(journey.records[0].entered_at.is_some());

        // 250 m past s0: passed, exited_at stamped
        let _ = engine.update(near_station(0, 250.0), at(10), None);
        let journey = engine.journey().unwrap();
        assert_eq!(statuses(journey)[0], StationStatus::Passed);
        assert!(journey.records[0].exited_at.is_some());
        assert_eq!(journey.passed_count, 1);
        assert_eq!(journey.next_station().unwrap().id.as_str(), "s1");
    }

    #[test]
    fn test_monotonic_forward_progression() {
        let mut engine = engine_to("s4");
        let mut last_passed = 0;

        // Drive straight through, sampling every ~250 m
        let mut second = 0;
        let mut lat = 39.995;
        while lat < 40.0405 {
            let journey = engine
                .update(Point::new(0.0, lat), at(second), None)
                .unwrap();
            assert!(
                journey.passed_count >= last_passed,
                "passed count regressed at lat {lat}"
            );
            last_passed = journey.passed_count;
            second += 5;
            lat += 0.00225;
        }

        let journey = engine.journey().unwrap();
        assert!(journey.has_arrived);
        assert_eq!(journey.passed_count + journey.remaining_count(), 5);
    }

    #[test]
    fn test_arrival_is_sticky() {
        let mut engine = engine_to("s2");

        let _ = engine.update(near_station(2, -30.0), at(0), None);
        assert!(engine.journey().unwrap().has_arrived);

        // Drifting away afterwards mutates nothing
        let _ = engine.update(near_station(2, 400.0), at(5), None);
        let journey = engine.journey().unwrap();
        assert!(journey.has_arrived);
        assert_eq!(statuses(journey)[2], StationStatus::AtStation);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut engine = engine_to("s2");
        let position = near_station(1, -120.0);

        let _ = engine.update(position, at(0), None);
        let first = statuses(engine.journey().unwrap());
        let first_passed = engine.journey().unwrap().passed_count;

        let _ = engine.update(position, at(0), None);
        assert_eq!(statuses(engine.journey().unwrap()), first);
        assert_eq!(engine.journey().unwrap().passed_count, first_passed);
    }

    #[test]
    fn test_no_flap_without_genuine_visit() {
        let mut engine = engine_to("s2");

        // Oscillate between 250 m and 350 m from s1 without ever entering
        // the exit radius; the record must stay approaching.
        let _ = engine.update(near_station(1, -250.0), at(0), None);
        let _ = engine.update(near_station(1, -350.0), at(5), None);
        let _ = engine.update(near_station(1, -250.0), at(10), None);
        let _ = engine.update(near_station(1, -350.0), at(15), None);

        assert_eq!(
            statuses(engine.journey().unwrap())[1],
            StationStatus::Approaching
        );
        assert_eq!(engine.journey().unwrap().passed_count, 0);
    }

    #[test]
    fn test_moved_on_resolves_abandoned_approach() {
        let mut engine = engine_to("s2");

        // Genuine visit to s0, then a fix already approaching s1 while far
        // from s0: s0 resolves to passed.
        let _ = engine.update(near_station(0, -50.0), at(0), None);
        let _ = engine.update(near_station(1, -200.0), at(5), None);

        let journey = engine.journey().unwrap();
        assert_eq!(statuses(journey)[0], StationStatus::Passed);
        assert_eq!(statuses(journey)[1], StationStatus::Approaching);
    }

    #[test]
    fn test_skip_healing_small_gap() {
        let mut engine = engine_to("s3");

        // Visit s0, then jump straight to s2 without ever nearing s1
        let _ = engine.update(near_station(0, -20.0), at(0), None);
        let _ = engine.update(near_station(0, 250.0), at(5), None);
        let _ = engine.update(near_station(2, -50.0), at(10), None);

        let journey = engine.journey().unwrap();
        assert_eq!(statuses(journey)[0], StationStatus::Passed);
        assert_eq!(statuses(journey)[1], StationStatus::Skipped);
        assert_eq!(statuses(journey)[2], StationStatus::AtStation);
        // Skipped stations count as resolved
        assert_eq!(journey.passed_count, 2);
        assert_eq!(journey.remaining_count(), 2);
    }

    #[test]
    fn test_mark_station_passed_override() {
        let mut engine = engine_to("s3");

        // s0 was genuinely visited earlier, s1 was not
        let _ = engine.update(near_station(0, -30.0), at(0), None);

        let journey = engine.mark_station_passed(&StationIdentifier::new("s1")).unwrap();
        assert_eq!(statuses(journey)[0], StationStatus::Passed);
        assert_eq!(statuses(journey)[1], StationStatus::Passed);
        assert_eq!(journey.passed_count, 2);
        assert_eq!(journey.next_station().unwrap().id.as_str(), "s2");
    }

    #[test]
    fn test_mark_station_passed_unknown_id() {
        let mut engine = engine_to("s2");
        // s4 exists on the line but is beyond the journey's destination
        assert!(matches!(
            engine.mark_station_passed(&StationIdentifier::new("s4")),
            Err(TrackerError::UnknownStation(_))
        ));
    }

    #[test]
    fn test_mark_destination_passed_arrives() {
        let mut engine = engine_to("s2");
        let journey = engine.mark_station_passed(&StationIdentifier::new("s2")).unwrap();
        assert!(journey.has_arrived);
    }

    #[test]
    fn test_invariant_counts_balance() {
        let mut engine = engine_to("s4");

        let mut second = 0;
        for lat in [39.998, 40.0, 40.005, 40.012, 40.021, 40.03] {
            if let Some(journey) = engine.update(Point::new(0.0, lat), at(second), None) {
                assert_eq!(
                    journey.passed_count + journey.remaining_count(),
                    journey.records.len()
                );
            }
            second += 5;
        }
    }
}
