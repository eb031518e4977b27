//! Atomic file operations for the registry JSON file.
//!
//! Writes go through:
//! 1. Serialize and write to a temp file with a PID suffix
//! 2. fsync so the data reaches the flash before the rename
//! 3. Optional `.bak` copy of the previous file
//! 4. Atomic rename onto the target path
//!
//! A power cut on the appliance therefore leaves either the old or the new
//! registry on disk, never a truncated one.

use crate::error::{CdeError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or a persistence error if it
/// cannot be read or parsed.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CdeError::persistence(format!("Failed to read {}", path.display()), path, Some(e))
    })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| {
        CdeError::persistence(format!("Failed to parse {}: {}", path.display(), e), path, None)
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                CdeError::persistence(
                    format!("Failed to create directory {}", parent.display()),
                    parent,
                    Some(e),
                )
            })?;
        }
    }

    let temp_path = temp_path_for(path);

    let serialized = serde_json::to_string_pretty(data).map_err(|e| {
        CdeError::persistence(format!("Failed to serialize registry: {}", e), path, None)
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                CdeError::persistence(
                    format!("Failed to create temp file {}", temp_path.display()),
                    &temp_path,
                    Some(e),
                )
            })?;

        file.write_all(serialized.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                CdeError::persistence(
                    format!("Failed to write temp file {}", temp_path.display()),
                    &temp_path,
                    Some(e),
                )
            })?;
    }

    if keep_backup && path.exists() {
        let backup_path = backup_path_for(path);
        if let Err(e) = fs::copy(path, &backup_path) {
            // Not fatal: the rename below still commits the new content
            warn!("Failed to create backup {}: {}", backup_path.display(), e);
        } else {
            debug!("Created backup: {}", backup_path.display());
        }
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(CdeError::persistence(
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path,
            Some(e),
        ));
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// `.cdereg` has no extension, so suffixes are appended to the full file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    with_suffix(path, &format!(".{}.tmp", process::id()))
}

pub(crate) fn backup_path_for(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}
