//! Platform-specific process management.
//!
//! [`ProcessControl`] is the seam between the daemon reconciler and the OS:
//! process table scans, liveness checks, signals and launching. The
//! [`SystemProcessControl`] implementation uses `sysinfo` for the process
//! table and `nix` for signals; tests substitute their own implementation.

use crate::config::DaemonConfig;
use crate::error::{CdeError, Result};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Full argument vector; `argv[0]` is the program as launched.
    pub argv: Vec<OsString>,
}

impl ProcessEntry {
    pub fn new<I, S>(pid: u32, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            pid,
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this process runs `exec_path`, either directly (`argv[0]`) or
    /// as a script (`argv[1]`) whose `argv[0]` is an interpreter.
    pub fn runs(&self, exec_path: &Path) -> bool {
        self.runs_script(exec_path, None)
    }

    /// Like [`ProcessEntry::runs`], additionally accepting the interpreter
    /// named on the script's `#!` line.
    fn runs_script(&self, exec_path: &Path, shebang: Option<&str>) -> bool {
        let target = exec_path.as_os_str();
        match self.argv.as_slice() {
            [first, ..] if first.as_os_str() == target => true,
            [first, second, ..] if second.as_os_str() == target => {
                is_interpreter(first, shebang)
            }
            _ => false,
        }
    }
}

/// Whether `program` names a script interpreter.
fn is_interpreter(program: &OsStr, shebang: Option<&str>) -> bool {
    let Some(name) = Path::new(program).file_name().and_then(OsStr::to_str) else {
        return false;
    };
    if shebang == Some(name) {
        return true;
    }
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    DaemonConfig::SCRIPT_INTERPRETERS.contains(&base)
}

/// File name of the interpreter on a script's `#!` line, looking through
/// `/usr/bin/env`.
pub fn shebang_interpreter(script: &Path) -> Option<String> {
    let file = File::open(script).ok()?;
    let mut line = String::new();
    BufReader::new(file.take(256)).read_line(&mut line).ok()?;

    let mut words = line.strip_prefix("#!")?.split_whitespace();
    let name = |word: &str| {
        Path::new(word)
            .file_name()
            .and_then(OsStr::to_str)
            .map(str::to_string)
    };
    let program = name(words.next()?)?;
    if program == "env" {
        return words.find(|w| !w.starts_with('-')).and_then(name);
    }
    Some(program)
}

/// Find the first process in `entries` running `exec_path`.
pub fn match_executable(entries: &[ProcessEntry], exec_path: &Path) -> Option<u32> {
    let shebang = shebang_interpreter(exec_path);
    entries
        .iter()
        .find(|e| e.runs_script(exec_path, shebang.as_deref()))
        .map(|e| e.pid)
}

/// OS process operations needed for daemon supervision.
pub trait ProcessControl {
    /// Snapshot of live processes, in ascending pid order.
    fn snapshot(&self) -> Vec<ProcessEntry>;

    /// Whether a process with this pid currently exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Send a graceful terminate request (SIGTERM).
    ///
    /// Returns `false` if the process was already gone.
    fn terminate(&self, pid: u32) -> Result<bool>;

    /// Send a forceful kill (SIGKILL).
    ///
    /// Returns `false` if the process was already gone.
    fn kill(&self, pid: u32) -> Result<bool>;

    /// Launch `program` as a detached background process and return its pid.
    fn spawn_detached(&self, program: &Path, args: &[String], cwd: &Path) -> Result<u32>;

    /// Launch `program` and wait for it. Returns the exit code, if any.
    fn run(&self, program: &Path, args: &[String], cwd: &Path) -> Result<Option<i32>>;

    /// Locate the first live process running `exec_path`.
    fn locate_process(&self, exec_path: &Path) -> Option<u32> {
        match_executable(&self.snapshot(), exec_path)
    }
}

/// [`ProcessControl`] backed by the real OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessControl for SystemProcessControl {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        let mut entries: Vec<ProcessEntry> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                argv: process
                    .cmd()
                    .iter()
                    .map(|arg| Path::new(arg).as_os_str().to_os_string())
                    .collect(),
            })
            .collect();
        entries.sort_by_key(|e| e.pid);

        debug!("Process table snapshot: {} processes", entries.len());
        entries
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        #[cfg(unix)]
        {
            send_signal(pid, nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            Err(CdeError::SignalFailed {
                pid,
                message: "signals are not supported on this platform".into(),
            })
        }
    }

    fn kill(&self, pid: u32) -> Result<bool> {
        #[cfg(unix)]
        {
            send_signal(pid, nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            Err(CdeError::SignalFailed {
                pid,
                message: "signals are not supported on this platform".into(),
            })
        }
    }

    fn spawn_detached(&self, program: &Path, args: &[String], cwd: &Path) -> Result<u32> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group: terminal signals sent to the CLI don't reach the daemon
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| CdeError::ProcessLaunchFailed {
            path: program.to_path_buf(),
            message: e.to_string(),
        })?;

        let pid = child.id();
        info!("Launched {} in background with PID {}", program.display(), pid);
        Ok(pid)
    }

    fn run(&self, program: &Path, args: &[String], cwd: &Path) -> Result<Option<i32>> {
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .map_err(|e| CdeError::ProcessLaunchFailed {
                path: program.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!("{} exited with {}", program.display(), status);
        Ok(status.code())
    }
}

/// Check if a process with the given PID is alive.
///
/// Uses `kill(pid, 0)`; a zombie child of this process is reaped first so
/// it does not count as alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::sys::wait::{waitpid, WaitPidFlag};
        use nix::unistd::Pid;

        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return false,
        };
        let nix_pid = Pid::from_raw(raw);

        // ECHILD for processes we did not spawn; harmless
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

        match kill(nix_pid, None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        warn!("Process alive check not implemented for this platform");
        let _ = pid;
        false
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => {
            return Err(CdeError::SignalFailed {
                pid,
                message: "pid out of range".into(),
            })
        }
    };

    debug!("Sending {:?} to process {}", signal, pid);
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => {
            debug!("Process {} already exited", pid);
            Ok(false)
        }
        Err(e) => {
            warn!("Failed to send {:?} to {}: {}", signal, pid, e);
            Err(CdeError::SignalFailed {
                pid,
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
        assert!(!is_process_alive(0));
    }

    #[test]
    fn test_entry_matches_direct_and_shebang_launch() {
        let exec = PathBuf::from("/opt/d-ecu/canlogger/bin/loggerd.py");

        let direct = ProcessEntry::new(10, ["/opt/d-ecu/canlogger/bin/loggerd.py", "--fast"]);
        let shebang = ProcessEntry::new(
            11,
            ["/usr/bin/python", "/opt/d-ecu/canlogger/bin/loggerd.py"],
        );
        let other = ProcessEntry::new(12, ["/usr/bin/python", "/opt/d-ecu/gps/bin/gpsd.py"]);
        let argument_only = ProcessEntry::new(
            13,
            ["/usr/bin/vi", "-R", "/opt/d-ecu/canlogger/bin/loggerd.py"],
        );
        let kernel_thread = ProcessEntry::new(14, Vec::<String>::new());
        let versioned =
            ProcessEntry::new(15, ["python3.11", "/opt/d-ecu/canlogger/bin/loggerd.py"]);

        assert!(direct.runs(&exec));
        assert!(shebang.runs(&exec));
        assert!(versioned.runs(&exec));
        assert!(!other.runs(&exec));
        assert!(!argument_only.runs(&exec));
        assert!(!kernel_thread.runs(&exec));
    }

    #[test]
    fn test_viewer_of_executable_is_not_a_match() {
        let exec = PathBuf::from("/opt/d-ecu/canlogger/bin/loggerd.py");
        for viewer in ["/usr/bin/less", "/usr/bin/tail", "/usr/bin/vi", "cat"] {
            let entry = ProcessEntry::new(20, [viewer, "/opt/d-ecu/canlogger/bin/loggerd.py"]);
            assert!(!entry.runs(&exec), "{} matched", viewer);
            assert_eq!(match_executable(&[entry], &exec), None);
        }
    }

    #[test]
    fn test_shebang_interpreter() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let write = |name: &str, contents: &str| {
            let path = temp_dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        };

        let direct = write("a", "#!/opt/tools/mytcl -f\nputs hi\n");
        let via_env = write("b", "#!/usr/bin/env -S tclsh8\n");
        let plain = write("c", "echo hi\n");

        assert_eq!(shebang_interpreter(&direct).as_deref(), Some("mytcl"));
        assert_eq!(shebang_interpreter(&via_env).as_deref(), Some("tclsh8"));
        assert_eq!(shebang_interpreter(&plain), None);
        assert_eq!(shebang_interpreter(&temp_dir.path().join("missing")), None);

        let entries = [ProcessEntry::new(
            30,
            [OsString::from("/opt/tools/mytcl"), direct.clone().into()],
        )];
        assert_eq!(match_executable(&entries, &direct), Some(30));
    }

    #[test]
    fn test_match_executable_first_wins() {
        let exec = PathBuf::from("/opt/d-ecu/m/bin/d");
        let entries = vec![
            ProcessEntry::new(5, ["/bin/sh"]),
            ProcessEntry::new(7, ["/bin/sh", "/opt/d-ecu/m/bin/d"]),
            ProcessEntry::new(9, ["/opt/d-ecu/m/bin/d"]),
        ];
        assert_eq!(match_executable(&entries, &exec), Some(7));
        assert_eq!(match_executable(&entries, Path::new("/nope")), None);
    }

    #[test]
    fn test_snapshot_contains_self() {
        let control = SystemProcessControl::new();
        let me = std::process::id();
        assert!(control.snapshot().iter().any(|e| e.pid == me));
    }

    #[test]
    #[cfg(unix)]
    fn test_signal_nonexistent_process() {
        let control = SystemProcessControl::new();
        // Above the Linux pid_max ceiling of 2^22
        assert!(!control.terminate(4_194_304).unwrap_or(false));
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_and_kill_detached() {
        let control = SystemProcessControl::new();
        let cwd = std::env::temp_dir();
        let pid = control
            .spawn_detached(Path::new("/bin/sleep"), &["30".to_string()], &cwd)
            .unwrap();
        assert!(control.is_alive(pid));

        assert!(control.kill(pid).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!control.is_alive(pid));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_reports_exit_code() {
        let control = SystemProcessControl::new();
        let cwd = std::env::temp_dir();
        let code = control
            .run(Path::new("/bin/sh"), &["-c".into(), "exit 3".into()], &cwd)
            .unwrap();
        assert_eq!(code, Some(3));

        let missing = control.run(Path::new("/nonexistent/program"), &[], &cwd);
        assert!(matches!(missing, Err(CdeError::ProcessLaunchFailed { .. })));
    }
}
