//! File permission handling for module executables and hooks.

use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Make a file executable (mode 0o755).
///
/// No-op on non-unix targets, where executability is not a mode bit.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use crate::error::CdeError;
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).map_err(|e| CdeError::io_with_path(e, path))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions).map_err(|e| CdeError::io_with_path(e, path))?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(not(unix))]
    {
        debug!("Skipping executable bit for: {}", path.display());
    }

    Ok(())
}

/// Check if a file has any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    #[cfg(unix)]
    fn test_set_executable() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("post_inst");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();

        assert!(!is_executable(&file));
        set_executable(&file).unwrap();
        assert!(is_executable(&file));
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_file_is_not_executable() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_executable(&temp_dir.path().join("missing")));
        assert!(set_executable(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_directory_is_not_executable() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_executable(temp_dir.path()));
    }
}
