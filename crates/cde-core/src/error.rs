//! Error types for the CDE module manager.
//!
//! Precondition outcomes (already installed, dependencies missing, dependents
//! present) are not errors: they are reported through the lifecycle outcome
//! enums. The variants here are the hard failures a front-end turns into a
//! non-zero exit status.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the CDE core library.
#[derive(Debug, Error)]
pub enum CdeError {
    // Version and descriptor errors
    #[error("Malformed version string: {version:?}")]
    MalformedVersion { version: String },

    #[error("Malformed module descriptor {path:?}: {message}")]
    MalformedDescriptor { path: PathBuf, message: String },

    // Registry errors
    #[error("Registry persistence error at {path:?}: {message}")]
    Persistence {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Module not found in registry: {name}")]
    NotFound { name: String },

    #[error("Module is not installed: {name}")]
    NotInstalled { name: String },

    #[error("Dependencies not satisfied for {module}: {missing:?}")]
    DependencyUnsatisfied { module: String, missing: Vec<String> },

    #[error("Operation blocked: {reason}")]
    Blocked { reason: String },

    // Archive errors
    #[error("Package extraction failed for {package:?}: {message}")]
    ExtractionFailed { package: PathBuf, message: String },

    #[error("Backup archive creation failed for {path:?}: {message}")]
    ArchiveFailed { path: PathBuf, message: String },

    // Process errors
    #[error("Unknown executable {exec} in module {module}")]
    UnknownExecutable { module: String, exec: String },

    #[error("Failed to launch {path:?}: {message}")]
    ProcessLaunchFailed { path: PathBuf, message: String },

    #[error("Failed to signal process {pid}: {message}")]
    SignalFailed { pid: u32, message: String },

    // Locking
    #[error("Installation root is locked by another instance: {path:?}")]
    LockHeld { path: PathBuf },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for CDE operations.
pub type Result<T> = std::result::Result<T, CdeError>;

impl From<std::io::Error> for CdeError {
    fn from(err: std::io::Error) -> Self {
        CdeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CdeError {
    fn from(err: serde_json::Error) -> Self {
        CdeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CdeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CdeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a persistence error for the registry file.
    pub fn persistence(
        message: impl Into<String>,
        path: impl Into<PathBuf>,
        source: Option<std::io::Error>,
    ) -> Self {
        CdeError::Persistence {
            message: message.into(),
            path: path.into(),
            source,
        }
    }

    /// Process exit code for a command line front-end.
    ///
    /// - 1: generic failure
    /// - 2: blocked by a precondition
    /// - 3: module or executable not known
    /// - 4: malformed input (version, descriptor, package)
    /// - 5: registry persistence failure
    /// - 6: process launch or signalling failure
    /// - 7: installation root locked by another instance
    pub fn exit_code(&self) -> i32 {
        match self {
            CdeError::Blocked { .. } | CdeError::DependencyUnsatisfied { .. } => 2,

            CdeError::NotFound { .. }
            | CdeError::NotInstalled { .. }
            | CdeError::UnknownExecutable { .. } => 3,

            CdeError::MalformedVersion { .. }
            | CdeError::MalformedDescriptor { .. }
            | CdeError::ExtractionFailed { .. } => 4,

            CdeError::Persistence { .. } | CdeError::Json { .. } => 5,

            CdeError::ProcessLaunchFailed { .. } | CdeError::SignalFailed { .. } => 6,

            CdeError::LockHeld { .. } => 7,

            CdeError::ArchiveFailed { .. } | CdeError::Io { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CdeError::NotInstalled {
            name: "canlogger".into(),
        };
        assert_eq!(err.to_string(), "Module is not installed: canlogger");

        let err = CdeError::MalformedVersion {
            version: "1".into(),
        };
        assert_eq!(err.to_string(), "Malformed version string: \"1\"");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CdeError::Blocked {
                reason: "x".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            CdeError::UnknownExecutable {
                module: "m".into(),
                exec: "e".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            CdeError::LockHeld {
                path: PathBuf::from("/opt/d-ecu/.cdereg.lock")
            }
            .exit_code(),
            7
        );
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let err = CdeError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/tmp/x",
        );
        match err {
            CdeError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected error: {other}"),
        }
    }
}
