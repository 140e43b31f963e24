//! Core data types for the station catalog.

use std::sync::Arc;

use geo::Point;

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// One of the two fixed station orderings for the same physical line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RouteDirection {
    Northbound,
    Southbound,
}

impl RouteDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Northbound => Self::Southbound,
            Self::Southbound => Self::Northbound,
        }
    }
}

impl std::fmt::Display for RouteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Northbound => write!(f, "northbound"),
            Self::Southbound => write!(f, "southbound"),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A station on the line.
///
/// Immutable once loaded. Identity is by `id`; the two order ranks define
/// the station's position under each travel direction.
#[derive(Clone, Debug)]
pub struct Station {
    pub id: StationIdentifier,
    pub name: Arc<str>,
    pub location: Point,
    pub north_order: u32,
    pub south_order: u32,
    pub is_terminal: bool,
    /// Nearby landmark labels for display ("City Hall", "Main St Market").
    pub landmarks: Vec<Arc<str>>,
}

impl Station {
    pub fn new(
        id: StationIdentifier,
        name: impl AsRef<str>,
        location: Point,
        north_order: u32,
        south_order: u32,
        is_terminal: bool,
    ) -> Self {
        Self {
            id,
            name: name.as_ref().into(),
            location,
            north_order,
            south_order,
            is_terminal,
            landmarks: Vec::new(),
        }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<Arc<str>>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn id(&self) -> &StationIdentifier {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Point {
        self.location
    }

    /// Rank of this station under the given travel direction.
    pub fn order(&self, direction: RouteDirection) -> u32 {
        match direction {
            RouteDirection::Northbound => self.north_order,
            RouteDirection::Southbound => self.south_order,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Station not found: {0}")]
    StationNotFound(StationIdentifier),

    #[error("Catalog contains no stations")]
    EmptyCatalog,

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(RouteDirection::Northbound.opposite(), RouteDirection::Southbound);
        assert_eq!(RouteDirection::Southbound.opposite(), RouteDirection::Northbound);
    }

    #[test]
    fn test_station_order() {
        let station = Station::new(
            StationIdentifier::new("s1"),
            "First",
            Point::new(-74.0, 40.7),
            0,
            9,
            true,
        );

        assert_eq!(station.order(RouteDirection::Northbound), 0);
        assert_eq!(station.order(RouteDirection::Southbound), 9);
    }
}
