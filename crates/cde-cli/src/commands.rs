//! Command execution and outcome reporting.

use crate::Command;
use anyhow::{Context, Result};
use cde_core::consistency;
use cde_core::{
    DaemonReconciler, DaemonReport, Disposition, InstallOutcome, InstallRoot, LifecycleController,
    ModuleRegistry, RootLock, StartOutcome, StopOutcome, SystemProcessControl, UninstallOutcome,
    UpgradeOutcome,
};
use std::path::Path;
use tracing::{info, warn};

/// Run one command against an installation root and return the exit code.
pub fn run(root_dir: &Path, command: &Command) -> Result<u8> {
    let root = InstallRoot::new(root_dir);

    let _lock = if command.is_mutating() {
        Some(RootLock::try_acquire(&root)?)
    } else {
        None
    };

    let mut registry = ModuleRegistry::open(root)
        .with_context(|| format!("Failed to open registry under {}", root_dir.display()))?;

    let disposition = match command {
        Command::Install { package } => {
            let outcome = LifecycleController::new(&mut registry)
                .install(package)
                .with_context(|| format!("Install of {} failed", package.display()))?;
            report_install(&outcome);
            outcome.disposition()
        }
        Command::Upgrade { package } => {
            let outcome = LifecycleController::new(&mut registry)
                .upgrade(package)
                .with_context(|| format!("Upgrade from {} failed", package.display()))?;
            report_upgrade(&outcome);
            outcome.disposition()
        }
        Command::Uninstall { module, no_backup } => {
            let outcome = LifecycleController::new(&mut registry).uninstall(module, !no_backup)?;
            report_uninstall(&outcome);
            outcome.disposition()
        }
        Command::List { module } => {
            list(&registry, module.as_deref());
            Disposition::Success
        }
        Command::Start { module, exec, args } => {
            let mut reconciler = DaemonReconciler::new(&mut registry, SystemProcessControl::new());
            match reconciler.start(module, exec, args)? {
                StartOutcome::Daemon { pid } => {
                    println!("{}/{} started with pid {}", module, exec, pid)
                }
                StartOutcome::Completed { exit_code } => match exit_code {
                    Some(code) => println!("{}/{} exited with code {}", module, exec, code),
                    None => println!("{}/{} terminated by a signal", module, exec),
                },
            }
            Disposition::Success
        }
        Command::Stop { module, exec } => {
            let mut reconciler = DaemonReconciler::new(&mut registry, SystemProcessControl::new());
            match reconciler.stop(module, exec)? {
                StopOutcome::NotRunning => println!("{}/{} was not running", module, exec),
                StopOutcome::Terminated { pid } => {
                    println!("{}/{} (pid {}) stopped", module, exec, pid)
                }
                StopOutcome::Killed { pid } => {
                    println!("{}/{} (pid {}) did not exit and was killed", module, exec, pid)
                }
            }
            Disposition::Success
        }
        Command::Status {
            module,
            exec,
            align,
        } => {
            status(&mut registry, module.as_deref(), exec.as_deref(), *align)?;
            Disposition::Success
        }
        Command::Check => {
            let report = consistency::check(&registry)?;
            for module in &report.orphaned_entries {
                println!("registered but missing directory: {}", module);
            }
            for dir in &report.orphaned_directories {
                println!("unregistered module directory: {}", dir.display());
            }
            for exec in &report.missing_executables {
                println!(
                    "missing executable {}/{}: {}",
                    exec.module,
                    exec.exec_name,
                    exec.path.display()
                );
            }
            if report.is_consistent() {
                println!("registry and installation tree are consistent");
                Disposition::Success
            } else {
                Disposition::Blocked
            }
        }
    };

    Ok(disposition.exit_code() as u8)
}

fn report_install(outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed { module, version, hook } => {
            println!("Installed {} {}", module, version);
            if hook.is_failure() {
                warn!("post-install hook of {} failed: {:?}", module, hook);
            }
        }
        InstallOutcome::Skipped { module, version } => {
            println!("{} {} is already installed, nothing to do", module, version)
        }
        InstallOutcome::Blocked { module, reason } => {
            println!("Install of {} blocked: {}", module, reason)
        }
    }
}

fn report_upgrade(outcome: &UpgradeOutcome) {
    match outcome {
        UpgradeOutcome::Upgraded {
            module,
            from,
            to,
            backup,
            hook,
        } => {
            println!("Upgraded {} from {} to {}", module, from, to);
            if let Some(backup) = backup {
                println!("Backup written to {}", backup.display());
            }
            if hook.is_failure() {
                warn!("post-upgrade hook of {} failed: {:?}", module, hook);
            }
        }
        UpgradeOutcome::Skipped { module, version } => {
            println!("{} {} is already installed, nothing to do", module, version)
        }
        UpgradeOutcome::Blocked { module, reason } => {
            println!("Upgrade of {} blocked: {}", module, reason)
        }
    }
}

fn report_uninstall(outcome: &UninstallOutcome) {
    match outcome {
        UninstallOutcome::Uninstalled {
            module,
            backup,
            hook,
            leftover_directory,
        } => {
            println!("Uninstalled {}", module);
            if let Some(backup) = backup {
                println!("Backup written to {}", backup.display());
            }
            if hook.is_failure() {
                warn!("post-uninstall hook of {} failed: {:?}", module, hook);
            }
            if let Some(reason) = leftover_directory {
                println!(
                    "Module directory of {} could not be removed ({}); run `check`",
                    module, reason
                );
            }
        }
        UninstallOutcome::Blocked { module, reason } => {
            println!("Uninstall of {} blocked: {}", module, reason)
        }
    }
}

fn list(registry: &ModuleRegistry, module: Option<&str>) {
    let modules = registry.list_modules();
    let selected = modules
        .iter()
        .filter(|name| module.map_or(true, |m| m == name.as_str()));

    for name in selected {
        println!("{} {}", name, registry.version_of(name).unwrap_or_default());
        for exec in registry.list_executables(Some(name)) {
            let kind = if exec.is_daemon { "daemon" } else { "program" };
            match exec.pid {
                Some(pid) => println!("  {} ({}, pid {})", exec.name, kind, pid),
                None => println!("  {} ({})", exec.name, kind),
            }
        }
    }
}

fn status(
    registry: &mut ModuleRegistry,
    module: Option<&str>,
    exec: Option<&str>,
    align: bool,
) -> Result<()> {
    let mut reconciler = DaemonReconciler::new(registry, SystemProcessControl::new());

    let reports = match (module, exec) {
        (Some(module), Some(exec)) => vec![reconciler.status(module, exec)],
        (filter, _) => reconciler.status_all(filter),
    };

    for report in reports {
        print_report(&report);
        if align && report.status.is_drift() {
            let aligned = reconciler.align(&report.module, &report.exec_name)?;
            info!("Aligned {}/{}", aligned.module, aligned.exec_name);
            print!("  aligned -> ");
            print_report(&aligned);
        }
    }
    Ok(())
}

fn print_report(report: &DaemonReport) {
    let pid = |p: Option<u32>| p.map_or_else(|| "-".to_string(), |p| p.to_string());
    println!(
        "{}/{}: {} (registered {}, observed {})",
        report.module,
        report.exec_name,
        report.status,
        pid(report.registered_pid),
        pid(report.observed_pid)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_and_check_on_fresh_root() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(run(temp_dir.path(), &Command::List { module: None }).unwrap(), 0);
        assert_eq!(run(temp_dir.path(), &Command::Check).unwrap(), 0);
        assert!(temp_dir.path().join(".cdereg").is_file());
    }

    #[test]
    fn test_uninstall_unknown_module_maps_to_not_found_code() {
        let temp_dir = TempDir::new().unwrap();
        let command = Command::Uninstall {
            module: "ghost".into(),
            no_backup: false,
        };
        let err = run(temp_dir.path(), &command).unwrap_err();
        let code = err.downcast_ref::<cde_core::CdeError>().map(|e| e.exit_code());
        assert_eq!(code, Some(3));
    }

    #[test]
    fn test_check_reports_orphaned_directory() {
        let temp_dir = TempDir::new().unwrap();
        let orphan = temp_dir.path().join("gps");
        std::fs::create_dir_all(&orphan).unwrap();
        std::fs::write(orphan.join("module.info"), "[main]\n").unwrap();

        assert_eq!(run(temp_dir.path(), &Command::Check).unwrap(), 2);
    }

    #[test]
    fn test_mutating_command_refused_while_locked() {
        let temp_dir = TempDir::new().unwrap();
        let _held = RootLock::try_acquire(&InstallRoot::new(temp_dir.path())).unwrap();

        let command = Command::Uninstall {
            module: "gps".into(),
            no_backup: true,
        };
        let err = run(temp_dir.path(), &command).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<cde_core::CdeError>(),
            Some(cde_core::CdeError::LockHeld { .. })
        ));
    }
}
