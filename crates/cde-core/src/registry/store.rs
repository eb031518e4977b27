//! Durable backing stores for the registry mapping.

use crate::error::{CdeError, Result};
use crate::metadata::{atomic_read_json, atomic_write_json};
use crate::models::RegisteredModule;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Module name -> registry entry, ordered for deterministic serialization.
pub type RegistryMap = BTreeMap<String, RegisteredModule>;

/// Backing storage for a [`super::ModuleRegistry`].
pub trait RegistryStore {
    /// Load the persisted mapping, or `None` if nothing was persisted yet.
    fn load(&self) -> Result<Option<RegistryMap>>;

    /// Persist the full mapping, replacing what was stored before.
    fn save(&mut self, modules: &RegistryMap) -> Result<()>;

    /// Human-readable location for logs and errors.
    fn location(&self) -> String;
}

/// JSON file store with atomic replace-on-write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    keep_backup: bool,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keep_backup: true,
        }
    }

    /// Disable the `.bak` copy of the previous registry file.
    pub fn without_backup(mut self) -> Self {
        self.keep_backup = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Option<RegistryMap>> {
        atomic_read_json(&self.path)
    }

    fn save(&mut self, modules: &RegistryMap) -> Result<()> {
        atomic_write_json(&self.path, modules, self.keep_backup)?;
        debug!("Persisted {} registry entries to {}", modules.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store. Clones share the same contents, so a second registry
/// opened on a clone sees what the first one persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: Arc<Mutex<Option<RegistryMap>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<RegistryMap>>> {
        self.contents
            .lock()
            .map_err(|_| CdeError::persistence("Memory store lock poisoned", "<memory>", None))
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<Option<RegistryMap>> {
        Ok(self.guard()?.clone())
    }

    fn save(&mut self, modules: &RegistryMap) -> Result<()> {
        *self.guard()? = Some(modules.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
