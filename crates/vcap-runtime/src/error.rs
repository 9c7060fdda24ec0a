//! Runtime errors: backends, composition and the capsule registry.

use thiserror::Error;
use vcap_batch::BatchError;
use vcap_core::{ContractError, OptionError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend '{0}' is closed")]
    Closed(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// A requested capsule set that cannot form a pipeline. Raised while
/// building, before any frame is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("unsatisfied dependency for {capsules:?}: {detail}")]
    UnsatisfiedDependency {
        capsules: Vec<String>,
        detail: String,
    },

    #[error("capsule '{0}' is not registered")]
    UnknownCapsule(String),

    #[error("capsule '{0}' requested more than once")]
    DuplicateCapsule(String),

    #[error("options for capsule '{capsule}': {source}")]
    Option {
        capsule: String,
        #[source]
        source: OptionError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("capsule '{name}' version {offered} does not replace loaded version {loaded}")]
    VersionNotNewer {
        name: String,
        loaded: u32,
        offered: u32,
    },

    #[error("capsule '{0}' is not registered")]
    NotFound(String),

    #[error("failed to load backend for '{capsule}': {source}")]
    Load {
        capsule: String,
        #[source]
        source: BackendError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("capsule '{capsule}' failed: {source}")]
    Backend {
        capsule: String,
        #[source]
        source: BackendError,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
