//! vcap Batch Scheduler
//!
//! Decouples "a frame needs this backend's output" from "the backend runs
//! inference". Frames submit requests without blocking; a dispatch task per
//! backend groups them into batches and resolves every request exactly once.
//!
//! ```text
//! submit ─┐
//! submit ─┼─▶ queue (bounded) ─▶ dispatch task ─▶ BatchProcessor::process_batch
//! submit ─┘                                            │
//!   ▲                                                  │
//!   └──────────── BatchHandle::wait ◀── result[i] ─────┘
//! ```

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::BatchConfig;
pub use error::{BatchError, Result};
pub use scheduler::{BatchHandle, BatchProcessor, BatchScheduler, SchedulerStats};
