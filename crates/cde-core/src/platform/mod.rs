//! Platform abstraction layer.
//!
//! All OS-specific behavior lives here:
//! - `paths` - Installation root layout
//! - `permissions` - Executable bits for module programs and hooks
//! - `process` - Process table scans, signals and launching
//!
//! The appliance runs Linux; other unix targets work, non-unix targets only
//! compile.

pub mod paths;
pub mod permissions;
pub mod process;

pub use paths::InstallRoot;
pub use permissions::{is_executable, set_executable};
pub use process::{
    is_process_alive, match_executable, shebang_interpreter, ProcessControl, ProcessEntry,
    SystemProcessControl,
};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        "unix"
    }
    #[cfg(not(unix))]
    {
        "unsupported"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        assert!(["linux", "unix", "unsupported"].contains(&current_platform()));
    }
}
