//! Daemon supervision and registry/process-table reconciliation.
//!
//! The registry records the pid a daemon was started with; the OS process
//! table says what is actually running. [`DaemonReconciler::status`]
//! classifies the difference, and [`DaemonReconciler::align`] writes the
//! observed state back when the user asks for it. Nothing is aligned
//! automatically.

use crate::config::DaemonConfig;
use crate::error::{CdeError, Result};
use crate::platform::{match_executable, ProcessControl};
use crate::registry::{ExecutableEntry, ModuleRegistry};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry pid compared with the observed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    NotRunning,
    Running,
    /// Running, but started outside the module manager.
    RunningUnregistered,
    /// Registered pid, but the process is gone.
    ExitedUnregistered,
    /// Running under a different pid than the registered one.
    RestartedUnregistered,
    /// The module or executable is not registered.
    Unknown,
}

impl DaemonStatus {
    /// Classify a registered pid against an observed one.
    pub fn classify(registered: Option<u32>, observed: Option<u32>) -> Self {
        match (registered, observed) {
            (None, None) => DaemonStatus::NotRunning,
            (Some(r), Some(o)) if r == o => DaemonStatus::Running,
            (None, Some(_)) => DaemonStatus::RunningUnregistered,
            (Some(_), None) => DaemonStatus::ExitedUnregistered,
            (Some(_), Some(_)) => DaemonStatus::RestartedUnregistered,
        }
    }

    /// Whether registry and process table disagree.
    pub fn is_drift(self) -> bool {
        matches!(
            self,
            DaemonStatus::RunningUnregistered
                | DaemonStatus::ExitedUnregistered
                | DaemonStatus::RestartedUnregistered
        )
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DaemonStatus::NotRunning => "not running",
            DaemonStatus::Running => "running",
            DaemonStatus::RunningUnregistered => "running (unregistered)",
            DaemonStatus::ExitedUnregistered => "exited (unregistered)",
            DaemonStatus::RestartedUnregistered => "restarted (unregistered)",
            DaemonStatus::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Status of one executable together with the pid observed in the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonReport {
    pub module: String,
    pub exec_name: String,
    pub status: DaemonStatus,
    pub registered_pid: Option<u32>,
    pub observed_pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A daemon was launched in the background and its pid recorded.
    Daemon { pid: u32 },
    /// A plain program ran to completion.
    Completed { exit_code: Option<i32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    NotRunning,
    /// Exited after the graceful terminate signal.
    Terminated { pid: u32 },
    /// Needed the forceful kill signal.
    Killed { pid: u32 },
}

/// Bounded terminate-then-kill escalation used by [`DaemonReconciler::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub poll_interval: Duration,
    pub attempts: u32,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DaemonConfig::STOP_POLL_INTERVAL,
            attempts: DaemonConfig::STOP_POLL_ATTEMPTS,
        }
    }
}

/// Start, stop and status of module executables.
pub struct DaemonReconciler<'r, P: ProcessControl> {
    registry: &'r mut ModuleRegistry,
    processes: P,
    policy: StopPolicy,
}

impl<'r, P: ProcessControl> DaemonReconciler<'r, P> {
    pub fn new(registry: &'r mut ModuleRegistry, processes: P) -> Self {
        Self {
            registry,
            processes,
            policy: StopPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    /// First live process running the executable's file.
    pub fn locate_process(&self, module: &str, exec_name: &str) -> Option<u32> {
        let path = self.registry.executable_path(module, exec_name)?;
        self.processes.locate_process(&path)
    }

    pub fn status(&self, module: &str, exec_name: &str) -> DaemonReport {
        let Some(entry) = self.registry.executable(module, exec_name) else {
            return DaemonReport {
                module: module.to_string(),
                exec_name: exec_name.to_string(),
                status: DaemonStatus::Unknown,
                registered_pid: None,
                observed_pid: None,
            };
        };
        let observed = self.processes.locate_process(&entry.path);
        report(entry, observed)
    }

    /// Status of every registered daemon, optionally limited to one module.
    pub fn status_all(&self, module_filter: Option<&str>) -> Vec<DaemonReport> {
        let snapshot = self.processes.snapshot();
        self.registry
            .list_executables(module_filter)
            .iter()
            .filter(|e| e.is_daemon)
            .map(|e| report(e, match_executable(&snapshot, &e.path)))
            .collect()
    }

    /// Write the observed pid into the registry, or clear it when nothing
    /// runs. Returns the status after alignment.
    pub fn align(&mut self, module: &str, exec_name: &str) -> Result<DaemonReport> {
        let before = self.status(module, exec_name);
        match before.status {
            DaemonStatus::Unknown => return Err(unknown(module, exec_name)),
            DaemonStatus::RunningUnregistered | DaemonStatus::RestartedUnregistered => {
                if let Some(pid) = before.observed_pid {
                    self.registry.set_pid(module, exec_name, pid)?;
                    info!("Aligned {}/{} to running pid {}", module, exec_name, pid);
                }
            }
            DaemonStatus::ExitedUnregistered => {
                self.registry.clear_pid(module, exec_name)?;
                info!("Cleared stale pid of {}/{}", module, exec_name);
            }
            DaemonStatus::Running | DaemonStatus::NotRunning => {
                debug!("{}/{} already consistent", module, exec_name);
            }
        }
        Ok(self.status(module, exec_name))
    }

    /// Launch an executable. Daemons are detached and their pid recorded;
    /// plain programs run to completion.
    pub fn start(
        &mut self,
        module: &str,
        exec_name: &str,
        extra_args: &[String],
    ) -> Result<StartOutcome> {
        let entry = self
            .registry
            .executable(module, exec_name)
            .cloned()
            .ok_or_else(|| unknown(module, exec_name))?;
        let cwd = self.registry.root().module_dir(module);

        if !entry.is_daemon {
            info!("Running {}/{}", module, exec_name);
            let exit_code = self.processes.run(&entry.path, extra_args, &cwd)?;
            return Ok(StartOutcome::Completed { exit_code });
        }

        if let Some(pid) = self.processes.locate_process(&entry.path) {
            return Err(CdeError::Blocked {
                reason: format!("{}/{} is already running with pid {}", module, exec_name, pid),
            });
        }

        let pid = self.processes.spawn_detached(&entry.path, extra_args, &cwd)?;
        self.registry.set_pid(module, exec_name, pid)?;
        info!("Started {}/{} with pid {}", module, exec_name, pid);
        Ok(StartOutcome::Daemon { pid })
    }

    /// Stop a daemon: terminate, poll, then kill once if still alive.
    /// The registered pid is cleared in every case.
    pub fn stop(&mut self, module: &str, exec_name: &str) -> Result<StopOutcome> {
        let report = self.status(module, exec_name);
        if report.status == DaemonStatus::Unknown {
            return Err(unknown(module, exec_name));
        }

        let outcome = match report.observed_pid {
            None => {
                debug!("{}/{} is not running ({})", module, exec_name, report.status);
                StopOutcome::NotRunning
            }
            Some(pid) => self.escalate(pid)?,
        };

        if report.registered_pid.is_some() {
            self.registry.clear_pid(module, exec_name)?;
        }
        info!("Stopped {}/{}: {:?}", module, exec_name, outcome);
        Ok(outcome)
    }

    fn escalate(&self, pid: u32) -> Result<StopOutcome> {
        if !self.processes.terminate(pid)? {
            return Ok(StopOutcome::Terminated { pid });
        }

        for attempt in 1..=self.policy.attempts {
            std::thread::sleep(self.policy.poll_interval);
            if !self.processes.is_alive(pid) {
                debug!("Process {} exited after {} polls", pid, attempt);
                return Ok(StopOutcome::Terminated { pid });
            }
        }

        warn!(
            "Process {} still alive after {} attempts, sending kill",
            pid, self.policy.attempts
        );
        self.processes.kill(pid)?;
        Ok(StopOutcome::Killed { pid })
    }
}

fn report(entry: &ExecutableEntry, observed: Option<u32>) -> DaemonReport {
    DaemonReport {
        module: entry.module.clone(),
        exec_name: entry.name.clone(),
        status: DaemonStatus::classify(entry.pid, observed),
        registered_pid: entry.pid,
        observed_pid: observed,
    }
}

fn unknown(module: &str, exec_name: &str) -> CdeError {
    CdeError::UnknownExecutable {
        module: module.to_string(),
        exec: exec_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(DaemonStatus::classify(None, None), DaemonStatus::NotRunning);
        assert_eq!(DaemonStatus::classify(Some(5), Some(5)), DaemonStatus::Running);
        assert_eq!(
            DaemonStatus::classify(None, Some(5)),
            DaemonStatus::RunningUnregistered
        );
        assert_eq!(
            DaemonStatus::classify(Some(5), None),
            DaemonStatus::ExitedUnregistered
        );
        assert_eq!(
            DaemonStatus::classify(Some(5), Some(6)),
            DaemonStatus::RestartedUnregistered
        );
    }

    #[test]
    fn test_drift() {
        assert!(!DaemonStatus::Running.is_drift());
        assert!(!DaemonStatus::Unknown.is_drift());
        assert!(DaemonStatus::ExitedUnregistered.is_drift());
    }

    #[test]
    fn test_default_policy() {
        let policy = StopPolicy::default();
        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.poll_interval, Duration::from_secs(1));
    }
}
