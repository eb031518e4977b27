//! Filesystem tree operations for install and upgrade.
//!
//! Upgrade merge policy, applied to the top level of the module directory:
//!
//! | entry in new package           | action                                      |
//! |--------------------------------|---------------------------------------------|
//! | core directory (`bin`, `lib`…) | old one deleted, new one copied in          |
//! | other directory, also in old   | every file copied as `<file>.<ver>.NEW`     |
//! | other directory, new only      | copied as-is                                |
//! | file                           | copied over the old one                     |
//!
//! Directories present only in the old installation are deleted. Top-level
//! files present only in the old installation are kept. Nothing here is
//! transactional: an I/O failure midway leaves a partially merged tree.

use crate::config::LayoutConfig;
use crate::error::{CdeError, Result};
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What an upgrade merge did, for logging and reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub replaced_dirs: Vec<String>,
    pub merged_dirs: Vec<String>,
    pub added_dirs: Vec<String>,
    pub removed_dirs: Vec<String>,
    pub copied_files: Vec<String>,
    /// Number of `.NEW` files written into merged directories.
    pub staged_files: usize,
}

/// Merge a freshly extracted package tree into an installed module directory.
pub fn merge_upgrade(installed: &Path, package: &Path, new_version: &str) -> Result<MergeSummary> {
    let mut summary = MergeSummary::default();
    let suffix = format!(".{}.{}", new_version, LayoutConfig::MERGED_FILE_SUFFIX);

    let package_entries = read_dir_names(package)?;

    for name in &package_entries {
        let source = package.join(name);
        let target = installed.join(name);
        let label = name.to_string_lossy().into_owned();

        if source.is_dir() {
            if LayoutConfig::CORE_DIRS.contains(&label.as_str()) {
                remove_path(&target)?;
                copy_dir_recursive(&source, &target)?;
                summary.replaced_dirs.push(label);
            } else if target.is_dir() {
                summary.staged_files += stage_new_files(&source, &target, &suffix)?;
                summary.merged_dirs.push(label);
            } else {
                remove_path(&target)?;
                copy_dir_recursive(&source, &target)?;
                summary.added_dirs.push(label);
            }
        } else {
            if target.is_dir() {
                remove_path(&target)?;
            }
            fs::copy(&source, &target).map_err(|e| CdeError::io_with_path(e, &source))?;
            summary.copied_files.push(label);
        }
    }

    for name in read_dir_names(installed)? {
        let target = installed.join(&name);
        if target.is_dir() && !package_entries.contains(&name) {
            remove_path(&target)?;
            summary.removed_dirs.push(name.to_string_lossy().into_owned());
        }
    }

    debug!("Merged {} into {}: {:?}", package.display(), installed.display(), summary);
    Ok(summary)
}

/// Copy every file under `source` to the same relative place under
/// `target`, with `suffix` appended to the file name.
fn stage_new_files(source: &Path, target: &Path, suffix: &str) -> Result<usize> {
    let mut staged = 0;
    let mut walker = WalkDir::new(source).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| CdeError::Io {
            message: format!("Failed to walk {}: {}", source.display(), e),
            path: Some(source.to_path_buf()),
            source: e.into_io_error(),
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            if dest.exists() && !dest.is_dir() {
                warn!(
                    "{} is a file in the installed tree; skipping directory",
                    dest.display()
                );
                walker.skip_current_dir();
                continue;
            }
            fs::create_dir_all(&dest).map_err(|e| CdeError::io_with_path(e, &dest))?;
        } else {
            let mut staged_name = dest.file_name().map(OsString::from).unwrap_or_default();
            staged_name.push(suffix);
            let staged_path = dest.with_file_name(staged_name);
            if let Some(parent) = staged_path.parent() {
                fs::create_dir_all(parent).map_err(|e| CdeError::io_with_path(e, parent))?;
            }
            fs::copy(entry.path(), &staged_path)
                .map_err(|e| CdeError::io_with_path(e, entry.path()))?;
            staged += 1;
        }
    }
    Ok(staged)
}

/// Move a directory tree, falling back to copy and delete across devices.
pub fn move_dir(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| CdeError::io_with_path(e, parent))?;
    }

    if let Err(e) = fs::rename(source, dest) {
        debug!("Rename failed, falling back to copy: {}", e);
        copy_dir_recursive(source, dest)?;
        if let Err(rm_err) = fs::remove_dir_all(source) {
            warn!("Failed to remove source after copy: {}", rm_err);
        }
    }
    Ok(())
}

pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| CdeError::io_with_path(e, dest))?;

    for entry in fs::read_dir(source).map_err(|e| CdeError::io_with_path(e, source))? {
        let entry = entry.map_err(|e| CdeError::io_with_path(e, source))?;
        let src_path = entry.path();
        let dst_path = dest.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| CdeError::io_with_path(e, &src_path))?;
        }
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return Ok(());
    };
    result.map_err(|e| CdeError::io_with_path(e, path))
}

fn read_dir_names(dir: &Path) -> Result<Vec<OsString>> {
    let mut names = fs::read_dir(dir)
        .map_err(|e| CdeError::io_with_path(e, dir))?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| CdeError::io_with_path(e, dir))?;
    names.sort();
    Ok(names)
}
