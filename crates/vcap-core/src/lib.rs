//! vcap Core
//!
//! Declarations and data shared by every part of the capsule runtime:
//!
//! - **node**: typed capsule IO ([`NodeDescription`], [`Size`])
//! - **detection**: the per-frame detection arena ([`DetectionSet`])
//! - **geometry**: polygons, bounding boxes, overlap and distance helpers
//! - **options**: option declarations and validated values
//! - **capsule**: capsule metadata and contract validation
//! - **frame**: frame buffers handed to backends
//!
//! # Example
//!
//! ```rust
//! use vcap_core::{Capsule, NodeDescription, OptionSpec, Size};
//!
//! let capsule = Capsule::new(
//!     "face_detector",
//!     1,
//!     NodeDescription::none(),
//!     NodeDescription::new(Size::All).detections(["face"]),
//! )
//! .with_option("threshold", OptionSpec::float("Minimum confidence", 0.5, 0.0, 1.0));
//!
//! assert!(capsule.validate().is_ok());
//! ```

pub mod capsule;
pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod node;
pub mod options;

// Re-export main types at crate root
pub use capsule::Capsule;
pub use detection::{DetectionNode, DetectionSet, NodeId};
pub use error::{ContractError, DetectionError, Error, OptionError, Result};
pub use frame::{Frame, FrameFormat};
pub use geometry::{
    distance, distancing_violations, is_overlapped, point_in_polygon, proximity, rect_to_coords,
    BoundingBox, Point, Violation,
};
pub use node::{DataTag, NodeDescription, Size};
pub use options::{resolve_options, OptionKind, OptionSpec, OptionValue, OptionValues};
