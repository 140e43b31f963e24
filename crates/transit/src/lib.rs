//! # next-stop-transit
//!
//! Static route data for the next-stop tracking engines.
//!
//! ## Features
//!
//! - **Immutable catalog**: One ordered station set, loaded at startup
//! - **Two orderings**: Every station carries a rank per travel direction
//! - **Spatial queries**: Fast R-tree based nearest-station lookups
//! - **Geodesy**: Haversine distance and bearing math used by the engines
//!
//! ## Example
//!
//! ```
//! use next_stop_transit::prelude::*;
//! use geo::Point;
//!
//! let stations = vec![
//!     Station::new(StationIdentifier::new("union"), "Union Square", Point::new(-73.9904, 40.7359), 0, 2, true),
//!     Station::new(StationIdentifier::new("23rd"), "23rd Street", Point::new(-73.9927, 40.7410), 1, 1, false),
//!     Station::new(StationIdentifier::new("28th"), "28th Street", Point::new(-73.9942, 40.7454), 2, 0, false),
//! ];
//!
//! let catalog = RouteCatalog::from_stations(stations).unwrap();
//!
//! // Ordered per direction
//! let northbound = catalog.ordered(RouteDirection::Northbound);
//! assert_eq!(northbound.first().unwrap().name(), "Union Square");
//!
//! // Nearest-station query
//! let nearby = catalog.nearest(Point::new(-73.9910, 40.7365), 1);
//! assert_eq!(nearby[0].id().as_str(), "union");
//! ```

pub mod identifiers;
pub mod models;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{catalog::RouteCatalog, types::*};
    pub use crate::spatial::geodesy;
}

// Module declarations
pub use prelude::*;
