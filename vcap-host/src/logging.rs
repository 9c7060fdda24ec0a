//! Logging setup with vcap segment prefixes.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{filter::ParseError, fmt, prelude::*, EnvFilter};

/// Crates whose events follow `--log-level`. Everything else logs warnings only.
const VCAP_CRATES: [&str; 5] = ["vcap_host", "vcap_runtime", "vcap_zones", "vcap_batch", "vcap_core"];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    Level(String),

    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
}

/// Filter directives for `level`, e.g. `warn,vcap_host=debug,...`.
pub fn directives(level: &str) -> Result<String, LoggingError> {
    let level = Level::from_str(level).map_err(|_| LoggingError::Level(level.to_string()))?;
    let level = level.as_str().to_lowercase();
    let mut out = String::from("warn");
    for krate in VCAP_CRATES {
        out.push_str(&format!(",{}={}", krate, level));
    }
    Ok(out)
}

/// Initialize tracing. `RUST_LOG` wins over `level`.
///
/// Logs go to stderr so stdout stays machine-readable.
pub fn init(level: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(level)?)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Async work in flight
    pub const PULSE: &str = "꩜";
    /// Graceful startup
    pub const PULSE_OPEN: &str = "✿";
    /// Graceful shutdown
    pub const PULSE_CLOSE: &str = "❀";
}
