//! vcap Zone Alarms
//!
//! Watches polygons in the frame for conditions over recent history ("fewer
//! than one person at the counter for half of the last 5 seconds", "more
//! than two cars entering per second") and turns them into alerts with a
//! start and end time.
//!
//! ```
//! use vcap_core::{rect_to_coords, DetectionNode};
//! use vcap_zones::{Comparator, CountCondition, FrameSnapshot, Zone, ZoneAlarm, ZoneEvaluator};
//!
//! let zone = Zone::new("counter", rect_to_coords([0.0, 0.0, 100.0, 100.0])).with_alarm(
//!     ZoneAlarm::new("unattended").with_count(
//!         CountCondition::new(Comparator::LessThan, 1.0)
//!             .with_class_name("person")
//!             .window(5.0, 0.5),
//!     ),
//! );
//! let mut evaluator = ZoneEvaluator::new(vec![zone]).unwrap();
//!
//! let frame = evaluator.ingest(&FrameSnapshot::new(0.0, vec![])).unwrap();
//! assert_eq!(frame.events.len(), 1);
//! assert!(frame.events[0].is_open());
//! ```

pub mod alarm;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod monitor;
pub mod window;
pub mod zone;

pub use alarm::{Combine, ZoneAlarm};
pub use condition::{
    AttributeFilter, Comparator, CountCondition, DetectionFilter, Direction, IntersectionPoint,
    RateCondition,
};
pub use error::{Result, ZoneError};
pub use evaluator::{AlarmState, Alert, FrameEvaluation, FrameSnapshot, ZoneEvaluator, ZoneStatus};
pub use monitor::{AlertStream, StopPolicy, ZoneMonitor};
pub use window::SlidingWindow;
pub use zone::Zone;
