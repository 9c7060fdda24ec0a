//! Loaded capsules, queryable by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use vcap_core::Capsule;

use crate::backend::Backend;
use crate::error::RegistryError;

/// A capsule declaration with its running backend.
#[derive(Debug, Clone)]
pub struct LoadedCapsule {
    pub capsule: Capsule,
    pub backend: Arc<Backend>,
}

/// Owns every loaded backend. Closing the registry closes them all.
#[derive(Debug, Default)]
pub struct CapsuleRegistry {
    entries: RwLock<BTreeMap<String, LoadedCapsule>>,
}

impl CapsuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and load a capsule.
    ///
    /// A name that is already loaded is replaced only by a strictly higher
    /// version; the replaced backend is closed.
    pub async fn register(&self, capsule: Capsule, backend: Backend) -> Result<(), RegistryError> {
        capsule.validate()?;

        let replaced = {
            let mut entries = self.entries.write();
            if let Some(existing) = entries.get(&capsule.name) {
                if capsule.version <= existing.capsule.version {
                    return Err(RegistryError::VersionNotNewer {
                        name: capsule.name.clone(),
                        loaded: existing.capsule.version,
                        offered: capsule.version,
                    });
                }
            }
            info!(
                capsule = %capsule.name,
                version = capsule.version,
                backend = backend.kind(),
                "Capsule registered"
            );
            entries.insert(
                capsule.name.clone(),
                LoadedCapsule {
                    capsule,
                    backend: Arc::new(backend),
                },
            )
        };

        if let Some(old) = replaced {
            info!(
                capsule = %old.capsule.name,
                version = old.capsule.version,
                "Closing replaced capsule"
            );
            old.backend.close().await;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<LoadedCapsule> {
        self.entries.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Declarations of every loaded capsule, ordered by name.
    pub fn capsules(&self) -> Vec<Capsule> {
        self.entries
            .read()
            .values()
            .map(|e| e.capsule.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Unload one capsule and close its backend.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let removed = self
            .entries
            .write()
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        removed.backend.close().await;
        info!(capsule = %name, "Capsule unregistered");
        Ok(())
    }

    /// Unload and close everything.
    pub async fn close(&self) {
        let entries = std::mem::take(&mut *self.entries.write());
        if entries.is_empty() {
            return;
        }
        info!("❀ Closing {} capsules", entries.len());
        for (name, entry) in entries {
            if Arc::strong_count(&entry.backend) > 1 {
                warn!(capsule = %name, "Backend still in use by a pipeline while closing");
            }
            entry.backend.close().await;
        }
    }
}
