//! Best-effort post-lifecycle hook scripts.
//!
//! A module may ship `scpt/post_inst`, `scpt/post_upg` and
//! `scpt/post_uninst`. They run with no arguments from the module directory.
//! A hook never undoes a committed registry change: failures are logged and
//! reported in the operation outcome.

use crate::config::LayoutConfig;
use crate::platform::{is_executable, InstallRoot};
use serde::Serialize;
use std::process::Command;
use tracing::{debug, info, warn};

/// Lifecycle points that can trigger a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PostInstall,
    PostUpgrade,
    PostUninstall,
}

impl Hook {
    pub fn file_name(self) -> &'static str {
        match self {
            Hook::PostInstall => LayoutConfig::POST_INSTALL_HOOK,
            Hook::PostUpgrade => LayoutConfig::POST_UPGRADE_HOOK,
            Hook::PostUninstall => LayoutConfig::POST_UNINSTALL_HOOK,
        }
    }
}

/// Result of running a hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookOutcome {
    /// The module ships no such hook.
    Absent,
    Succeeded,
    Failed { message: String },
}

impl HookOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, HookOutcome::Failed { .. })
    }
}

/// Runs hook scripts of installed modules.
#[derive(Debug, Clone)]
pub struct HookRunner {
    root: InstallRoot,
}

impl HookRunner {
    pub fn new(root: InstallRoot) -> Self {
        Self { root }
    }

    pub fn run(&self, module: &str, hook: Hook) -> HookOutcome {
        let path = self.root.hook_path(module, hook.file_name());
        if !path.exists() {
            debug!("No {} hook for {}", hook.file_name(), module);
            return HookOutcome::Absent;
        }

        let outcome = if !is_executable(&path) {
            HookOutcome::Failed {
                message: format!("{} is not executable", path.display()),
            }
        } else {
            match Command::new(&path)
                .current_dir(self.root.module_dir(module))
                .status()
            {
                Ok(status) if status.success() => HookOutcome::Succeeded,
                Ok(status) => HookOutcome::Failed {
                    message: format!("{} exited with {}", path.display(), status),
                },
                Err(e) => HookOutcome::Failed {
                    message: format!("cannot run {}: {}", path.display(), e),
                },
            }
        };

        match &outcome {
            HookOutcome::Failed { message } => {
                warn!("{} hook of {} failed: {}", hook.file_name(), module, message)
            }
            _ => info!("Ran {} hook of {}", hook.file_name(), module),
        }
        outcome
    }
}
