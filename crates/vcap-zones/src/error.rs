//! Zone alarm errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("zone '{zone}' polygon has {points} points, at least 3 required")]
    InvalidPolygon { zone: String, points: usize },

    #[error("zone name must not be empty")]
    EmptyZoneName,

    #[error("duplicate zone '{0}'")]
    DuplicateZone(String),

    #[error("zone '{0}' not found")]
    UnknownZone(String),

    #[error("duplicate alarm '{alarm}' in zone '{zone}'")]
    DuplicateAlarm { zone: String, alarm: String },

    #[error("alarm '{alarm}': {reason}")]
    InvalidCondition { alarm: String, reason: String },

    #[error("snapshot timestamp {got} is earlier than {last}")]
    OutOfOrder { last: f64, got: f64 },

    #[error("snapshot timestamp {0} is not finite")]
    InvalidTimestamp(f64),

    #[error("zone monitor task failed: {0}")]
    MonitorFailed(String),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
