//! Read-only consistency check between the registry and the installation
//! tree.
//!
//! Uninstall removes the registry entry before deleting the module directory,
//! and a failed delete leaves the directory behind. Manual changes to the
//! root can also remove directories of registered modules. This check finds
//! both. It never repairs anything.

use crate::config::CdeConfig;
use crate::error::{CdeError, Result};
use crate::platform::InstallRoot;
use crate::registry::ModuleRegistry;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// A registered executable whose file is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingExecutable {
    pub module: String,
    pub exec_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Registered modules without a module directory.
    pub orphaned_entries: Vec<String>,
    /// Directories holding a declaration file but no registry entry.
    pub orphaned_directories: Vec<PathBuf>,
    pub missing_executables: Vec<MissingExecutable>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_entries.is_empty()
            && self.orphaned_directories.is_empty()
            && self.missing_executables.is_empty()
    }
}

/// Compare the registry against the directories under its root.
pub fn check(registry: &ModuleRegistry) -> Result<ConsistencyReport> {
    let root = registry.root();
    let mut report = ConsistencyReport::default();

    for module in registry.list_modules() {
        if !root.module_dir(&module).is_dir() {
            report.orphaned_entries.push(module);
        }
    }

    for exec in registry.list_executables(None) {
        if report.orphaned_entries.contains(&exec.module) {
            continue;
        }
        if !exec.path.is_file() {
            report.missing_executables.push(MissingExecutable {
                module: exec.module,
                exec_name: exec.name,
                path: exec.path,
            });
        }
    }

    let entries =
        std::fs::read_dir(root.path()).map_err(|e| CdeError::io_with_path(e, root.path()))?;
    let mut orphaned = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CdeError::io_with_path(e, root.path()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if InstallRoot::is_reserved_name(&name) || !path.is_dir() {
            continue;
        }
        let has_descriptor = path.join(CdeConfig::DESCRIPTOR_FILE_NAME).is_file();
        if !registry.is_installed(&name) && has_descriptor {
            orphaned.push(path);
        }
    }
    orphaned.sort();
    report.orphaned_directories = orphaned;

    debug!("Consistency check of {}: {:?}", root.path().display(), report);
    Ok(report)
}
