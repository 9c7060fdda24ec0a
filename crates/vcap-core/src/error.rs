//! Error types for capsule declarations, options and detections.

use thiserror::Error;

use crate::detection::NodeId;

/// Invalid detection data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("detection '{name}' has {points} points, a polygon needs at least 3")]
    InvalidPolygon { name: String, points: usize },

    #[error("detection '{0}' has non-finite coordinates")]
    NonFiniteCoords(String),

    #[error("parent {0} is not in this detection set")]
    UnknownParent(NodeId),

    #[error("detection {node} names parent {parent}, which does not precede it")]
    ParentNotEarlier { node: NodeId, parent: NodeId },
}

/// An option value rejected at configuration time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    #[error("unknown option '{0}'")]
    Unknown(String),

    #[error("option '{name}' expects {expected}, got {got}")]
    WrongType {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("option '{name}' value {value} is outside [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("option '{name}' value '{value}' is not one of {choices:?}")]
    NotAChoice {
        name: String,
        value: String,
        choices: Vec<String>,
    },

    #[error("option '{name}' declares min {min} above max {max}")]
    InvertedBounds {
        name: String,
        min: String,
        max: String,
    },
}

/// A capsule declaration that breaks the typed IO contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("capsule name must not be empty")]
    EmptyName,

    #[error("capsule '{0}' version must be at least 1")]
    InvalidVersion(String),

    #[error("capsule '{0}' input has size NONE but declares detections or keys")]
    NoneInputWithTags(String),

    #[error("capsule '{0}' consumes detections but declares no detection types")]
    InputWithoutDetections(String),

    #[error("capsule '{0}' output has size NONE but declares detections or keys")]
    NoneOutputWithTags(String),

    #[error("capsule '{0}' produces SINGLE output, which requires SINGLE input")]
    SingleOutputNeedsSingleInput(String),

    #[error("capsule '{capsule}' option error: {source}")]
    Option {
        capsule: String,
        #[source]
        source: OptionError,
    },
}

/// Common error type for vcap core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("option validation error: {0}")]
    Option(#[from] OptionError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;
