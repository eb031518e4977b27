//! Centralized configuration for the CDE module manager.
//!
//! This module provides the constants for the installation layout, the
//! registry file, lifecycle hooks and daemon supervision.

use std::time::Duration;

/// Installation-wide configuration.
pub struct CdeConfig;

impl CdeConfig {
    /// Root directory of the CDE environment on the appliance.
    pub const DEFAULT_ROOT_DIR: &'static str = "/opt/d-ecu";
    /// Environment variable overriding the root directory.
    pub const ROOT_DIR_ENV: &'static str = "CDE_ROOT_DIR";
    pub const REGISTRY_FILE_NAME: &'static str = ".cdereg";
    pub const LOCK_FILE_NAME: &'static str = ".cdereg.lock";
    pub const DESCRIPTOR_FILE_NAME: &'static str = "module.info";
    /// Scratch area for package extraction, relative to the root.
    pub const SCRATCH_DIR_NAME: &'static str = ".cde-scratch";
    /// The module manager's own package; it cannot uninstall itself.
    pub const SELF_MODULE_NAME: &'static str = "cde_cli";
}

/// Layout of a module installation directory.
pub struct LayoutConfig;

impl LayoutConfig {
    pub const BIN_DIR_NAME: &'static str = "bin";
    pub const SCRIPT_DIR_NAME: &'static str = "scpt";
    /// Directories replaced wholesale on upgrade.
    pub const CORE_DIRS: [&'static str; 5] = ["bin", "lib", "doc", "scpt", "src"];
    pub const POST_INSTALL_HOOK: &'static str = "post_inst";
    pub const POST_UPGRADE_HOOK: &'static str = "post_upg";
    pub const POST_UNINSTALL_HOOK: &'static str = "post_uninst";
    /// Suffix appended (after the new version) to files merged into user-data directories.
    pub const MERGED_FILE_SUFFIX: &'static str = "NEW";
    pub const BACKUP_MARKER: &'static str = "bck";
    pub const BACKUP_TIMESTAMP_FORMAT: &'static str = "%Y%m%d%H%M";
    pub const BACKUP_EXTENSION: &'static str = "zip";
}

/// Daemon supervision timing.
pub struct DaemonConfig;

impl DaemonConfig {
    /// Interval between liveness polls after a graceful terminate.
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Number of liveness polls before escalating to a forceful kill.
    pub const STOP_POLL_ATTEMPTS: u32 = 10;
    /// Programs that may appear as `argv[0]` of a shebang-launched script.
    /// Version suffixes (`python3.11`) are stripped before comparison.
    pub const SCRIPT_INTERPRETERS: &'static [&'static str] = &[
        "sh", "bash", "dash", "ash", "zsh", "ksh", "busybox", "python", "perl", "ruby", "lua",
        "node", "env",
    ];
}
