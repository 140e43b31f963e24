//! Immutable station catalog with per-direction ordering and spatial lookups.
//!
//! Built once at startup; the tracking engines hold it behind an `Arc` for
//! the process lifetime. The catalog format (ids, names, coordinates, two
//! order ranks, terminal flag, landmark labels) is an external contract this
//! crate consumes but does not define.

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;
use rstar::RTree;

use crate::identifiers::StationIdentifier;
use crate::models::types::{Result, RouteDirection, Station, TransitError};
use crate::spatial::geodesy;
use crate::spatial::index::{query_point, StationNode};

/// The full ordered station set for one line.
///
/// Cheap to clone through `Arc<Station>` sharing; all lookups are by
/// reference and never mutate.
#[derive(Clone)]
pub struct RouteCatalog {
    stations: Vec<Arc<Station>>,
    station_map: HashMap<StationIdentifier, Arc<Station>>,
    northbound: Vec<Arc<Station>>,
    southbound: Vec<Arc<Station>>,
    tree: RTree<StationNode>,
}

impl RouteCatalog {
    /// Build and validate a catalog from raw station records.
    ///
    /// Fails on an empty set, duplicate ids, or duplicate order ranks within
    /// either direction.
    pub fn from_stations(stations: Vec<Station>) -> Result<Self> {
        if stations.is_empty() {
            return Err(TransitError::EmptyCatalog);
        }

        let stations: Vec<Arc<Station>> = stations.into_iter().map(Arc::new).collect();

        let mut station_map = HashMap::with_capacity(stations.len());
        for station in &stations {
            if station_map
                .insert(station.id.clone(), station.clone())
                .is_some()
            {
                return Err(TransitError::InvalidCatalog(format!(
                    "duplicate station id {}",
                    station.id
                )));
            }
        }

        let northbound = ordered_by(&stations, RouteDirection::Northbound)?;
        let southbound = ordered_by(&stations, RouteDirection::Southbound)?;

        let tree = RTree::bulk_load(
            stations.iter().map(|s| StationNode::new(s.clone())).collect(),
        );

        Ok(Self {
            stations,
            station_map,
            northbound,
            southbound,
            tree,
        })
    }

    pub fn get(&self, id: &StationIdentifier) -> Option<&Arc<Station>> {
        self.station_map.get(id)
    }

    /// All stations, sorted by rank under the given direction.
    pub fn ordered(&self, direction: RouteDirection) -> &[Arc<Station>] {
        match direction {
            RouteDirection::Northbound => &self.northbound,
            RouteDirection::Southbound => &self.southbound,
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Arc<Station>> {
        self.stations.iter().filter(|s| s.is_terminal)
    }

    /// The line's overall bearing under the given direction: from the
    /// lowest-ranked to the highest-ranked station of that ordering.
    pub fn spine_bearing(&self, direction: RouteDirection) -> f64 {
        let ordered = self.ordered(direction);
        match (ordered.first(), ordered.last()) {
            (Some(first), Some(last)) => {
                geodesy::initial_bearing(first.location, last.location)
            }
            _ => 0.0,
        }
    }

    /// The `n` nearest stations to a point, nearest first.
    pub fn nearest(&self, point: Point, n: usize) -> Vec<Arc<Station>> {
        self.tree
            .nearest_neighbor_iter(&query_point(point))
            .take(n)
            .map(|node| node.station.clone())
            .collect()
    }

    /// Haversine distance to the closest station on the line.
    pub fn min_distance_to_any(&self, point: Point) -> f64 {
        // Coarse R-tree candidates, exact Haversine decision.
        self.tree
            .nearest_neighbor_iter(&query_point(point))
            .take(4)
            .map(|node| geodesy::distance(point, node.station.location))
            .fold(f64::INFINITY, f64::min)
    }
}

fn ordered_by(
    stations: &[Arc<Station>],
    direction: RouteDirection,
) -> Result<Vec<Arc<Station>>> {
    let mut ordered: Vec<Arc<Station>> = stations.to_vec();
    ordered.sort_by_key(|s| s.order(direction));

    for pair in ordered.windows(2) {
        if pair[0].order(direction) == pair[1].order(direction) {
            return Err(TransitError::InvalidCatalog(format!(
                "stations {} and {} share {} rank {}",
                pair[0].id,
                pair[1].id,
                direction,
                pair[0].order(direction)
            )));
        }
    }

    Ok(ordered)
}

// ============================================================================
// Catalog interchange format
// ============================================================================

/// One station as it appears in the external catalog file.
#[cfg(feature = "serde")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub north_order: u32,
    pub south_order: u32,
    #[serde(default)]
    pub is_terminal: bool,
    #[serde(default)]
    pub landmarks: Vec<String>,
}

#[cfg(feature = "serde")]
impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Station::new(
            StationIdentifier::new(&record.id),
            &record.name,
            Point::new(record.lng, record.lat),
            record.north_order,
            record.south_order,
            record.is_terminal,
        )
        .with_landmarks(record.landmarks.into_iter().map(Into::into).collect())
    }
}

#[cfg(feature = "serde")]
impl RouteCatalog {
    /// Load and validate a catalog from its JSON interchange form.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<StationRecord> = serde_json::from_str(json)
            .map_err(|e| TransitError::InvalidCatalog(e.to_string()))?;
        Self::from_stations(records.into_iter().map(Into::into).collect())
    }
}
