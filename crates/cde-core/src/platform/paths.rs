//! Installation root layout.
//!
//! Every path the module manager touches derives from one [`InstallRoot`]:
//!
//! ```text
//! <root>/.cdereg                       registry file
//! <root>/.cdereg.lock                  advisory lock
//! <root>/.cde-scratch/                 package extraction area
//! <root>/<module>/bin/<relative path>  executables
//! <root>/<module>/scpt/post_inst       lifecycle hooks
//! <root>/<module>-<ver>-bck-<ts>.zip   backup archives
//! ```

use crate::config::{CdeConfig, LayoutConfig};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// The root directory of a CDE installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoot {
    root: PathBuf,
}

impl InstallRoot {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root from `CDE_ROOT_DIR`, falling back to `/opt/d-ecu`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(CdeConfig::ROOT_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CdeConfig::DEFAULT_ROOT_DIR));
        Self::new(root)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join(CdeConfig::REGISTRY_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(CdeConfig::LOCK_FILE_NAME)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(CdeConfig::SCRATCH_DIR_NAME)
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.root.join(module)
    }

    /// `<root>/<module>/bin/<relative_path>`.
    pub fn executable_path(&self, module: &str, relative_path: &str) -> PathBuf {
        self.module_dir(module)
            .join(LayoutConfig::BIN_DIR_NAME)
            .join(relative_path)
    }

    pub fn hook_path(&self, module: &str, hook: &str) -> PathBuf {
        self.module_dir(module)
            .join(LayoutConfig::SCRIPT_DIR_NAME)
            .join(hook)
    }

    /// `<root>/<module>-<version>-bck-<YYYYMMDDHHMM>.zip`.
    pub fn backup_archive_path(&self, module: &str, version: &str, at: DateTime<Local>) -> PathBuf {
        self.root.join(backup_archive_name(module, version, at))
    }

    /// Whether a root entry is bookkeeping rather than a module directory.
    pub fn is_reserved_name(name: &str) -> bool {
        name.starts_with('.')
    }
}

pub fn backup_archive_name(module: &str, version: &str, at: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}-{}.{}",
        module,
        version,
        LayoutConfig::BACKUP_MARKER,
        at.format(LayoutConfig::BACKUP_TIMESTAMP_FORMAT),
        LayoutConfig::BACKUP_EXTENSION
    )
}
