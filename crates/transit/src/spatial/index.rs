//! R-tree nodes for spatial indexing of stations.
//!
//! ## Two-Stage Filtering
//!
//! Spatial queries use a two-stage filtering approach:
//! 1. **R-tree filter**: Uses Euclidean distance in degrees for fast
//!    approximate candidate selection
//! 2. **Haversine filter**: Applies accurate geodesic distance on the
//!    filtered candidates
//!
//! The catalog's routes are short enough that the Euclidean approximation
//! never changes which candidates survive the second stage, but the exact
//! distances callers receive always come from the Haversine pass.

use std::sync::Arc;

use geo::Point;
use rstar::{PointDistance, RTreeObject, AABB};

use crate::models::types::Station;

#[derive(Clone)]
pub struct StationNode {
    pub station: Arc<Station>,
    point: [f64; 2],
}

impl StationNode {
    pub fn new(station: Arc<Station>) -> Self {
        let location = station.location;
        Self {
            station,
            point: [location.x(), location.y()],
        }
    }
}

impl RTreeObject for StationNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StationNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Key a query point for the R-tree.
pub fn query_point(point: Point) -> [f64; 2] {
    [point.x(), point.y()]
}
