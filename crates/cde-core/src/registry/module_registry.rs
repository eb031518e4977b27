//! The registry handle.

use super::index::{ExecutableEntry, ExecutableIndex};
use super::store::{JsonFileStore, RegistryMap, RegistryStore};
use crate::error::{CdeError, Result};
use crate::models::{ModuleDescriptor, RegisteredModule};
use crate::platform::InstallRoot;
use crate::version::{compare_versions, VersionOrder};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Persisted mapping of installed modules.
///
/// Opened once per process and passed by reference to the lifecycle
/// controller and the daemon reconciler. The mapping itself is private;
/// each mutating operation works on a copy, persists it through the store and
/// only then replaces the in-memory view, so a failed write leaves both views
/// unchanged.
pub struct ModuleRegistry {
    root: InstallRoot,
    store: Box<dyn RegistryStore>,
    modules: RegistryMap,
    index: ExecutableIndex,
}

impl ModuleRegistry {
    /// Open the registry file of an installation root, creating an empty one
    /// if none exists yet.
    pub fn open(root: InstallRoot) -> Result<Self> {
        let store = JsonFileStore::new(root.registry_file());
        Self::with_store(root, Box::new(store))
    }

    /// Open a registry over an arbitrary backing store.
    pub fn with_store(root: InstallRoot, mut store: Box<dyn RegistryStore>) -> Result<Self> {
        let modules = match store.load()? {
            Some(modules) => {
                debug!("Loaded {} modules from {}", modules.len(), store.location());
                modules
            }
            None => {
                info!("Creating empty registry at {}", store.location());
                let empty = RegistryMap::new();
                store.save(&empty)?;
                empty
            }
        };

        let index = ExecutableIndex::build(&root, &modules);
        Ok(Self {
            root,
            store,
            modules,
            index,
        })
    }

    pub fn root(&self) -> &InstallRoot {
        &self.root
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredModule> {
        self.modules.get(name)
    }

    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.modules.get(name).map(|m| m.version.as_str())
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Insert or overwrite the entry for `descriptor.name`.
    ///
    /// Recorded daemon pids of a previous entry are dropped. Executable names
    /// must be unique within the descriptor.
    pub fn store(&mut self, descriptor: &ModuleDescriptor) -> Result<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = descriptor
            .executables
            .iter()
            .find(|e| !seen.insert(e.name.as_str()))
        {
            return Err(CdeError::MalformedDescriptor {
                path: self.root.module_dir(&descriptor.name),
                message: format!("duplicate executable name {:?}", dup.name),
            });
        }

        let entry = RegisteredModule::from_descriptor(descriptor);
        self.mutate(|modules| {
            modules.insert(entry.name.clone(), entry);
            Ok(())
        })?;
        info!("Registered {} {}", descriptor.name, descriptor.version);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.mutate(|modules| {
            modules
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| CdeError::NotFound {
                    name: name.to_string(),
                })
        })?;
        info!("Removed {} from registry", name);
        Ok(())
    }

    /// Compare the installed version against a candidate descriptor.
    ///
    /// `None` when the module is not installed. Otherwise the result reads
    /// "installed is `<order>` than candidate": [`VersionOrder::Earlier`]
    /// means the candidate is newer.
    pub fn precheck(&self, descriptor: &ModuleDescriptor) -> Result<Option<VersionOrder>> {
        self.version_of(&descriptor.name)
            .map(|installed| compare_versions(installed, &descriptor.version))
            .transpose()
    }

    /// Names of installed modules declaring a dependency on `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.modules
            .values()
            .filter(|m| m.name != name && m.depends_on(name))
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn executable(&self, module: &str, exec_name: &str) -> Option<&ExecutableEntry> {
        self.index.get(module, exec_name)
    }

    pub fn executable_path(&self, module: &str, exec_name: &str) -> Option<PathBuf> {
        self.index.get(module, exec_name).map(|e| e.path.clone())
    }

    pub fn is_daemon(&self, module: &str, exec_name: &str) -> Option<bool> {
        self.index.get(module, exec_name).map(|e| e.is_daemon)
    }

    pub fn get_pid(&self, module: &str, exec_name: &str) -> Option<u32> {
        self.index.get(module, exec_name).and_then(|e| e.pid)
    }

    /// Record the process id of a daemon.
    pub fn set_pid(&mut self, module: &str, exec_name: &str, pid: u32) -> Result<()> {
        self.write_pid(module, exec_name, Some(pid))?;
        debug!("Recorded pid {} for {}/{}", pid, module, exec_name);
        Ok(())
    }

    pub fn clear_pid(&mut self, module: &str, exec_name: &str) -> Result<()> {
        self.write_pid(module, exec_name, None)?;
        debug!("Cleared pid for {}/{}", module, exec_name);
        Ok(())
    }

    pub fn list_modules(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn list_executables(&self, module_filter: Option<&str>) -> Vec<ExecutableEntry> {
        self.index.entries(module_filter).cloned().collect()
    }

    fn write_pid(&mut self, module: &str, exec_name: &str, pid: Option<u32>) -> Result<()> {
        self.mutate(|modules| {
            let exec = modules
                .get_mut(module)
                .and_then(|m| m.executable_mut(exec_name))
                .ok_or_else(|| CdeError::UnknownExecutable {
                    module: module.to_string(),
                    exec: exec_name.to_string(),
                })?;
            if pid.is_some() && !exec.is_daemon {
                return Err(CdeError::Blocked {
                    reason: format!("{}/{} is not a daemon", module, exec_name),
                });
            }
            exec.pid = pid;
            Ok(())
        })
    }

    /// Copy, modify, persist, then commit and rebuild the index.
    fn mutate<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryMap) -> Result<()>,
    {
        let mut next = self.modules.clone();
        change(&mut next)?;
        self.store.save(&next)?;
        self.modules = next;
        self.index = ExecutableIndex::build(&self.root, &self.modules);
        Ok(())
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("root", &self.root)
            .field("store", &self.store.location())
            .field("modules", &self.modules.len())
            .finish()
    }
}
