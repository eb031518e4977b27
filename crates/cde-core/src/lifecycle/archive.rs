//! Package extraction and backup archives.
//!
//! Both are zip files. Packages carry `module.info` either at the archive
//! root or inside a single top-level directory; backups hold the module
//! directory under its own name, so unpacking one at the installation root
//! restores the module in place.

use crate::error::{CdeError, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Unpacks a module package into a directory.
pub trait PackageExtractor {
    fn extract(&self, package: &Path, dest: &Path) -> Result<()>;
}

/// Writes an archive of a module directory.
pub trait BackupArchiver {
    fn archive(&self, source_dir: &Path, dest: &Path) -> Result<()>;
}

/// [`PackageExtractor`] for zip packages.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipPackageExtractor;

impl PackageExtractor for ZipPackageExtractor {
    fn extract(&self, package: &Path, dest: &Path) -> Result<()> {
        let failed = |message: String| CdeError::ExtractionFailed {
            package: package.to_path_buf(),
            message,
        };

        let file = File::open(package).map_err(|e| failed(format!("cannot open package: {}", e)))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| failed(format!("invalid zip archive: {}", e)))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| failed(format!("cannot read entry {}: {}", i, e)))?;

            let outpath = match entry.enclosed_name() {
                Some(path) => dest.join(path),
                None => return Err(failed(format!("entry {:?} escapes the package", entry.name()))),
            };

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath).map_err(|e| CdeError::io_with_path(e, &outpath))?;
            } else {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| CdeError::io_with_path(e, parent))?;
                }
                let mut outfile =
                    File::create(&outpath).map_err(|e| CdeError::io_with_path(e, &outpath))?;
                io::copy(&mut entry, &mut outfile)
                    .map_err(|e| failed(format!("cannot extract {}: {}", outpath.display(), e)))?;
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
                }
            }
        }

        debug!(
            "Extracted {} entries from {} into {}",
            archive.len(),
            package.display(),
            dest.display()
        );
        Ok(())
    }
}

/// [`BackupArchiver`] writing deflated zip archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipBackupArchiver;

impl BackupArchiver for ZipBackupArchiver {
    fn archive(&self, source_dir: &Path, dest: &Path) -> Result<()> {
        let failed = |message: String| CdeError::ArchiveFailed {
            path: dest.to_path_buf(),
            message,
        };

        let prefix = source_dir
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| failed(format!("{} has no directory name", source_dir.display())))?;

        let file = File::create(dest).map_err(|e| failed(format!("cannot create archive: {}", e)))?;
        let mut writer = zip::ZipWriter::new(file);

        let mut files = 0usize;
        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| failed(format!("cannot walk module directory: {}", e)))?;
            let relative = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(|e| failed(e.to_string()))?;
            let name = archive_entry_name(&prefix.join(relative));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(entry_mode(&entry));

            if entry.file_type().is_dir() {
                writer
                    .add_directory(format!("{}/", name), options)
                    .map_err(|e| failed(e.to_string()))?;
            } else if entry.file_type().is_file() {
                writer
                    .start_file(name, options)
                    .map_err(|e| failed(e.to_string()))?;
                let mut input = File::open(entry.path())
                    .map_err(|e| failed(format!("cannot read {}: {}", entry.path().display(), e)))?;
                io::copy(&mut input, &mut writer).map_err(|e| failed(e.to_string()))?;
                files += 1;
            } else {
                debug!("Skipping special file {}", entry.path().display());
            }
        }

        let mut file = writer.finish().map_err(|e| failed(e.to_string()))?;
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| failed(e.to_string()))?;

        info!("Backed up {} ({} files) to {}", source_dir.display(), files, dest.display());
        Ok(())
    }
}

/// Zip entry names always use `/`.
fn archive_entry_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_mode(entry: &walkdir::DirEntry) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        entry
            .metadata()
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o644)
    }

    #[cfg(not(unix))]
    {
        if entry.file_type().is_dir() {
            0o755
        } else {
            0o644
        }
    }
}

/// Locate the directory holding `descriptor_name` inside an extracted
/// package: the extraction root itself, or its single top-level directory.
pub fn package_content_root(extracted: &Path, descriptor_name: &str) -> Option<PathBuf> {
    if extracted.join(descriptor_name).is_file() {
        return Some(extracted.to_path_buf());
    }

    let entries: Vec<_> = std::fs::read_dir(extracted)
        .ok()?
        .filter_map(|e| e.ok())
        .collect();
    match entries.as_slice() {
        [only] if only.path().join(descriptor_name).is_file() => Some(only.path()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_package() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("gps.zip");
        write_zip(&package, &[("module.info", "[main]\n"), ("bin/gpsd.py", "print()\n")]);

        let dest = temp_dir.path().join("out");
        ZipPackageExtractor.extract(&package, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("bin/gpsd.py")).unwrap(), "print()\n");
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("evil.zip");
        write_zip(&package, &[("../outside", "x")]);

        let result = ZipPackageExtractor.extract(&package, &temp_dir.path().join("out"));
        assert!(matches!(result, Err(CdeError::ExtractionFailed { .. })));
        assert!(!temp_dir.path().join("outside").exists());
    }

    #[test]
    fn test_extract_invalid_archive() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("broken.zip");
        std::fs::write(&package, "not a zip").unwrap();

        let result = ZipPackageExtractor.extract(&package, temp_dir.path());
        assert!(matches!(result, Err(CdeError::ExtractionFailed { .. })));
    }

    #[test]
    fn test_backup_restores_under_module_name() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("canlogger");
        std::fs::create_dir_all(module.join("data/sub")).unwrap();
        std::fs::write(module.join("data/sub/log.txt"), "frames").unwrap();
        std::fs::write(module.join("module.info"), "[main]\n").unwrap();

        let backup = temp_dir.path().join("canlogger-1.0-bck-201801010000.zip");
        ZipBackupArchiver.archive(&module, &backup).unwrap();

        let restored = temp_dir.path().join("restored");
        ZipPackageExtractor.extract(&backup, &restored).unwrap();
        assert_eq!(
            std::fs::read_to_string(restored.join("canlogger/data/sub/log.txt")).unwrap(),
            "frames"
        );
        assert!(restored.join("canlogger/module.info").is_file());
    }

    #[test]
    fn test_package_content_root() {
        let temp_dir = TempDir::new().unwrap();
        let flat = temp_dir.path().join("flat");
        std::fs::create_dir_all(&flat).unwrap();
        std::fs::write(flat.join("module.info"), "").unwrap();
        assert_eq!(package_content_root(&flat, "module.info"), Some(flat.clone()));

        let wrapped = temp_dir.path().join("wrapped");
        std::fs::create_dir_all(wrapped.join("gps-1.0")).unwrap();
        std::fs::write(wrapped.join("gps-1.0/module.info"), "").unwrap();
        assert_eq!(
            package_content_root(&wrapped, "module.info"),
            Some(wrapped.join("gps-1.0"))
        );

        let empty = temp_dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        assert_eq!(package_content_root(&empty, "module.info"), None);
    }
}
