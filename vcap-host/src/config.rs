//! Host configuration, loaded from a JSON file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcap_batch::{BatchConfig, BatchError};
use vcap_runtime::RawDetection;
use vcap_zones::{StopPolicy, Zone, ZoneError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid scheduler settings: {0}")]
    Scheduler(#[from] BatchError),

    #[error("invalid zone: {0}")]
    Zone(#[from] ZoneError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Device the backends are bound to
    pub device: String,
    pub scheduler: BatchConfig,
    pub zones: Vec<Zone>,
    /// Added to snapshot timestamps before alarms read the time of day
    pub utc_offset_seconds: i32,
    pub stop_policy: StopPolicy,
    /// What the scripted predictor reports for every frame
    pub predictions: Vec<RawDetection>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            scheduler: BatchConfig::default(),
            zones: Vec::new(),
            utc_offset_seconds: 0,
            stop_policy: StopPolicy::FlushOpen,
            predictions: Vec::new(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HostConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        let mut names = BTreeSet::new();
        for zone in &self.zones {
            zone.validate()?;
            if !names.insert(zone.name.as_str()) {
                return Err(ZoneError::DuplicateZone(zone.name.clone()).into());
            }
        }
        Ok(())
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }
}
