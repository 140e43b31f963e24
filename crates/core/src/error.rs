//! Engine-level errors.
//!
//! Recoverable input conditions (stale GPS, thin inference history, missing
//! configuration at update time) never surface here; they come back as
//! `None`/low-confidence results. These variants cover caller misuse and
//! invalid setup only.

use next_stop_transit::{StationIdentifier, TransitError};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("no active journey")]
    NoActiveJourney,

    #[error("unknown station: {0}")]
    UnknownStation(StationIdentifier),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transit(#[from] TransitError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
