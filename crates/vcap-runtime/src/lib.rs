//! vcap Runtime
//!
//! Loads capsules (a [`Capsule`](vcap_core::Capsule) declaration plus a
//! [`Backend`]) into a [`CapsuleRegistry`] and composes requested capsules
//! into a [`Pipeline`] that turns one frame into a [`DetectionSet`](vcap_core::DetectionSet).
//!
//! Backends that run inference submit work to a per-backend
//! [`BatchScheduler`](vcap_batch::BatchScheduler), so concurrent frames share
//! batches.

pub mod backend;
pub mod capsules;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use backend::{
    Backend, BackendInput, BackendOutput, PredictInput, Predictor, PredictorProcessor, RawDetection,
};
pub use capsules::register_reference_capsules;
pub use error::{BackendError, CompositionError, PipelineError, RegistryError, Result};
pub use pipeline::{execution_order, run, OptionOverrides, Pipeline};
pub use registry::{CapsuleRegistry, LoadedCapsule};
