//! # next-stop-core
//!
//! Real-time transit arrival tracking: follows a vehicle along a fixed
//! station sequence from noisy GPS samples and answers four questions:
//! where is it, which way is it going, how many stations remain, and when
//! will it get there. Each alert fires exactly once per journey.
//!
//! ## Pipeline
//!
//! Every accepted fix flows through the engines in dependency order:
//!
//! ```text
//! LocationTracker ─▶ DirectionInferenceEngine ─▶ StationProgressionEngine
//!                                      │                   │
//!                                      ▼                   ▼
//!                               EdgeCaseMonitor   EtaEngine ─▶ AlertManager
//! ```
//!
//! [`journey::JourneyTracker`] owns all of it as the single writer;
//! [`journey::runtime`] wraps the tracker in a tokio task that serializes
//! the fix stream against the periodic GPS-staleness tick.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use geo::Point;
//! use next_stop_core::prelude::*;
//! use next_stop_transit::prelude::*;
//!
//! let catalog = Arc::new(RouteCatalog::from_stations(vec![
//!     Station::new(StationIdentifier::new("a"), "Alpha", Point::new(0.0, 40.00), 0, 1, true),
//!     Station::new(StationIdentifier::new("b"), "Bravo", Point::new(0.0, 40.01), 1, 0, true),
//! ]).unwrap());
//!
//! let mut tracker = JourneyTracker::new(catalog, TrackerConfig::default());
//! let journey = JourneyConfig::new(StationIdentifier::new("b"))
//!     .with_direction(RouteDirection::Northbound);
//! tracker.initialize_journey(&journey, Utc::now()).unwrap();
//! ```

pub mod alert;
pub mod config;
pub mod direction;
pub mod error;
pub mod eta;
pub mod journey;
pub mod location;
pub mod monitor;
pub mod progression;

// Re-exports for convenience
pub mod prelude {
    pub use crate::alert::{AlertEvent, AlertManager};
    pub use crate::config::{
        AlertConfig, DirectionConfig, EtaConfig, JourneyConfig, MonitorConfig, ProgressionConfig,
        TrackerConfig,
    };
    pub use crate::direction::{
        DirectionInferenceEngine, DirectionInferenceResult, DirectionManager, DirectionMode,
    };
    pub use crate::error::{Result, TrackerError};
    pub use crate::eta::{EtaEngine, EtaResult, EtaStatus};
    pub use crate::journey::{runtime, JourneySnapshot, JourneyTracker};
    pub use crate::location::{
        smoothing::SpeedSmoother, LocationTracker, LocationUpdate, PositionFix, PositionSource,
    };
    pub use crate::monitor::{EdgeCaseMonitor, EdgeCaseWarning, Severity, WarningKind};
    pub use crate::progression::{
        JourneyProgress, ProgressionSnapshot, StationPassRecord, StationProgressionEngine,
        StationStatus,
    };
}

pub use prelude::*;
