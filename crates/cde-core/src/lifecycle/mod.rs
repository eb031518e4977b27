//! Install, upgrade and uninstall of CDE modules.
//!
//! Each operation is a fixed sequence over the registry and the installation
//! tree. Precondition failures (same version already installed, missing
//! dependencies, dependents present) come back as outcome values; only
//! I/O, parse and persistence failures are errors.
//!
//! Packages are unpacked into a private temporary directory below
//! `<root>/.cde-scratch`, which is removed on every exit path when the
//! [`tempfile::TempDir`] guard drops.
//!
//! The registry commit is the durability boundary. Hooks run after it and
//! never roll it back; an uninstall whose directory removal fails still
//! removes the registry entry (see [`crate::consistency`] for the check
//! that finds such leftovers).

mod archive;
mod hooks;
mod merge;

pub use archive::{
    package_content_root, BackupArchiver, PackageExtractor, ZipBackupArchiver, ZipPackageExtractor,
};
pub use hooks::{Hook, HookOutcome, HookRunner};
pub use merge::{copy_dir_recursive, merge_upgrade, move_dir, MergeSummary};

use crate::config::CdeConfig;
use crate::dependency::{unsatisfied_dependencies, UnsatisfiedDependency};
use crate::descriptor::parse_descriptor;
use crate::error::{CdeError, Result};
use crate::models::ModuleDescriptor;
use crate::platform::set_executable;
use crate::registry::ModuleRegistry;
use crate::version::VersionOrder;
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Why an operation refused to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    /// Some version is already installed; only upgrade may replace it.
    UseUpgrade { installed: String },
    /// Upgrade of a module that is not installed.
    NotInstalled,
    /// Upgrade to a version older than the installed one.
    InstalledIsNewer { installed: String },
    DependenciesNotSatisfied { missing: Vec<UnsatisfiedDependency> },
    /// Uninstall would break these installed modules.
    HasDependents { dependents: Vec<String> },
    /// The module manager's own package.
    ProtectedModule,
    /// An unregistered directory already occupies the module's place.
    OrphanedDirectory { path: PathBuf },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::UseUpgrade { installed } => {
                write!(f, "version {} already installed, use upgrade instead", installed)
            }
            BlockReason::NotInstalled => write!(f, "not installed, use install instead"),
            BlockReason::InstalledIsNewer { installed } => {
                write!(f, "installed version {} is newer", installed)
            }
            BlockReason::DependenciesNotSatisfied { missing } => {
                let list: Vec<String> = missing.iter().map(ToString::to_string).collect();
                write!(f, "dependencies not satisfied: {}", list.join(", "))
            }
            BlockReason::HasDependents { dependents } => {
                write!(f, "would break dependents: {}", dependents.join(", "))
            }
            BlockReason::ProtectedModule => write!(f, "the module manager cannot uninstall itself"),
            BlockReason::OrphanedDirectory { path } => write!(
                f,
                "{} exists but is not registered; remove it first",
                path.display()
            ),
        }
    }
}

/// Tri-state result class shared by all lifecycle outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Skipped,
    Blocked,
}

impl Disposition {
    /// Process exit code: skipped is not a failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::Success | Disposition::Skipped => 0,
            Disposition::Blocked => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed {
        module: String,
        version: String,
        hook: HookOutcome,
    },
    /// The same version is already installed; nothing changed.
    Skipped { module: String, version: String },
    Blocked { module: String, reason: BlockReason },
}

impl InstallOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            InstallOutcome::Installed { .. } => Disposition::Success,
            InstallOutcome::Skipped { .. } => Disposition::Skipped,
            InstallOutcome::Blocked { .. } => Disposition::Blocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UpgradeOutcome {
    Upgraded {
        module: String,
        from: String,
        to: String,
        /// `None` only when the module directory was missing.
        backup: Option<PathBuf>,
        hook: HookOutcome,
    },
    Skipped { module: String, version: String },
    Blocked { module: String, reason: BlockReason },
}

impl UpgradeOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            UpgradeOutcome::Upgraded { .. } => Disposition::Success,
            UpgradeOutcome::Skipped { .. } => Disposition::Skipped,
            UpgradeOutcome::Blocked { .. } => Disposition::Blocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UninstallOutcome {
    Uninstalled {
        module: String,
        backup: Option<PathBuf>,
        hook: HookOutcome,
        /// Set when the registry entry was removed but the directory could
        /// not be deleted.
        leftover_directory: Option<String>,
    },
    Blocked { module: String, reason: BlockReason },
}

impl UninstallOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            UninstallOutcome::Uninstalled { .. } => Disposition::Success,
            UninstallOutcome::Blocked { .. } => Disposition::Blocked,
        }
    }
}

/// An extracted package waiting in the scratch area.
struct StagedPackage {
    // Removes the scratch directory on drop
    _scratch: TempDir,
    content: PathBuf,
    descriptor: ModuleDescriptor,
}

/// Drives module lifecycle operations over one registry.
pub struct LifecycleController<'r> {
    registry: &'r mut ModuleRegistry,
    extractor: Box<dyn PackageExtractor>,
    archiver: Box<dyn BackupArchiver>,
    hooks: HookRunner,
}

impl<'r> LifecycleController<'r> {
    /// Controller using zip packages and zip backups.
    pub fn new(registry: &'r mut ModuleRegistry) -> Self {
        Self::with_collaborators(
            registry,
            Box::new(ZipPackageExtractor),
            Box::new(ZipBackupArchiver),
        )
    }

    pub fn with_collaborators(
        registry: &'r mut ModuleRegistry,
        extractor: Box<dyn PackageExtractor>,
        archiver: Box<dyn BackupArchiver>,
    ) -> Self {
        let hooks = HookRunner::new(registry.root().clone());
        Self {
            registry,
            extractor,
            archiver,
            hooks,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &*self.registry
    }

    /// Install a module that is not installed yet.
    pub fn install(&mut self, package: &Path) -> Result<InstallOutcome> {
        let staged = self.stage(package)?;
        let descriptor = &staged.descriptor;
        let module = descriptor.name.clone();

        match self.registry.precheck(descriptor)? {
            None => {}
            Some(VersionOrder::Equal) => {
                info!("{} {} is already installed", module, descriptor.version);
                return Ok(InstallOutcome::Skipped {
                    module,
                    version: descriptor.version.clone(),
                });
            }
            Some(VersionOrder::Later) | Some(VersionOrder::Earlier) => {
                let installed = self.installed_version(&module);
                return Ok(self.blocked_install(module, BlockReason::UseUpgrade { installed }));
            }
        }

        let missing = unsatisfied_dependencies(descriptor, self.registry());
        if !missing.is_empty() {
            let reason = BlockReason::DependenciesNotSatisfied { missing };
            return Ok(self.blocked_install(module, reason));
        }

        let module_dir = self.registry.root().module_dir(&module);
        if module_dir.exists() {
            let reason = BlockReason::OrphanedDirectory { path: module_dir };
            return Ok(self.blocked_install(module, reason));
        }

        move_dir(&staged.content, &module_dir)?;
        self.mark_executables(descriptor);

        if let Err(e) = self.registry.store(descriptor) {
            if let Err(rm_err) = std::fs::remove_dir_all(&module_dir) {
                warn!(
                    "Failed to remove {} after registry failure: {}",
                    module_dir.display(),
                    rm_err
                );
            }
            return Err(e);
        }
        info!("Installed {} {}", module, descriptor.version);

        let hook = self.hooks.run(&module, Hook::PostInstall);
        Ok(InstallOutcome::Installed {
            module,
            version: descriptor.version.clone(),
            hook,
        })
    }

    /// Replace an installed module with a newer version.
    pub fn upgrade(&mut self, package: &Path) -> Result<UpgradeOutcome> {
        let staged = self.stage(package)?;
        let descriptor = &staged.descriptor;
        let module = descriptor.name.clone();

        match self.registry.precheck(descriptor)? {
            Some(VersionOrder::Earlier) => {}
            None => return Ok(self.blocked_upgrade(module, BlockReason::NotInstalled)),
            Some(VersionOrder::Equal) => {
                info!("{} {} is already installed", module, descriptor.version);
                return Ok(UpgradeOutcome::Skipped {
                    module,
                    version: descriptor.version.clone(),
                });
            }
            Some(VersionOrder::Later) => {
                let installed = self.installed_version(&module);
                let reason = BlockReason::InstalledIsNewer { installed };
                return Ok(self.blocked_upgrade(module, reason));
            }
        }

        let missing = unsatisfied_dependencies(descriptor, self.registry());
        if !missing.is_empty() {
            let reason = BlockReason::DependenciesNotSatisfied { missing };
            return Ok(self.blocked_upgrade(module, reason));
        }

        let from = self.installed_version(&module);
        let module_dir = self.registry.root().module_dir(&module);

        let backup = if module_dir.is_dir() {
            Some(self.backup(&module, &from, &module_dir)?)
        } else {
            warn!(
                "{} is registered but {} is missing; installing without backup",
                module,
                module_dir.display()
            );
            std::fs::create_dir_all(&module_dir)
                .map_err(|e| CdeError::io_with_path(e, &module_dir))?;
            None
        };

        let summary = merge_upgrade(&module_dir, &staged.content, &descriptor.version)?;
        debug!(
            "{}: {} staged .NEW files, {} directories removed",
            module,
            summary.staged_files,
            summary.removed_dirs.len()
        );
        self.mark_executables(descriptor);

        self.registry.store(descriptor)?;
        info!("Upgraded {} from {} to {}", module, from, descriptor.version);

        let hook = self.hooks.run(&module, Hook::PostUpgrade);
        Ok(UpgradeOutcome::Upgraded {
            module,
            from,
            to: descriptor.version.clone(),
            backup,
            hook,
        })
    }

    /// Remove an installed module, optionally backing it up first.
    pub fn uninstall(&mut self, module: &str, do_backup: bool) -> Result<UninstallOutcome> {
        let version = self
            .registry
            .version_of(module)
            .map(str::to_string)
            .ok_or_else(|| CdeError::NotInstalled {
                name: module.to_string(),
            })?;

        if module == CdeConfig::SELF_MODULE_NAME {
            return Ok(self.blocked_uninstall(module, BlockReason::ProtectedModule));
        }

        let dependents = self.registry.dependents(module);
        if !dependents.is_empty() {
            return Ok(self.blocked_uninstall(module, BlockReason::HasDependents { dependents }));
        }

        let module_dir = self.registry.root().module_dir(module);
        let backup = if do_backup && module_dir.is_dir() {
            Some(self.backup(module, &version, &module_dir)?)
        } else {
            None
        };

        let hook = self.hooks.run(module, Hook::PostUninstall);

        self.registry.remove(module)?;

        let leftover_directory = match std::fs::remove_dir_all(&module_dir) {
            Ok(()) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    "{} removed from registry but {} could not be deleted: {}",
                    module,
                    module_dir.display(),
                    e
                );
                Some(e.to_string())
            }
        };
        info!("Uninstalled {} {}", module, version);

        Ok(UninstallOutcome::Uninstalled {
            module: module.to_string(),
            backup,
            hook,
            leftover_directory,
        })
    }

    /// Extract a package into a fresh scratch directory and parse its
    /// declaration file.
    fn stage(&self, package: &Path) -> Result<StagedPackage> {
        let scratch_root = self.registry.root().scratch_dir();
        std::fs::create_dir_all(&scratch_root)
            .map_err(|e| CdeError::io_with_path(e, &scratch_root))?;
        let scratch = tempfile::Builder::new()
            .prefix("pkg-")
            .tempdir_in(&scratch_root)
            .map_err(|e| CdeError::io_with_path(e, &scratch_root))?;

        self.extractor.extract(package, scratch.path())?;

        let content = package_content_root(scratch.path(), CdeConfig::DESCRIPTOR_FILE_NAME)
            .ok_or_else(|| CdeError::MalformedDescriptor {
                path: package.to_path_buf(),
                message: format!("package contains no {}", CdeConfig::DESCRIPTOR_FILE_NAME),
            })?;
        let descriptor = parse_descriptor(&content.join(CdeConfig::DESCRIPTOR_FILE_NAME))?;
        debug!(
            "Staged {} {} from {}",
            descriptor.name,
            descriptor.version,
            package.display()
        );

        Ok(StagedPackage {
            _scratch: scratch,
            content,
            descriptor,
        })
    }

    fn backup(&self, module: &str, version: &str, module_dir: &Path) -> Result<PathBuf> {
        let dest = self
            .registry
            .root()
            .backup_archive_path(module, version, Local::now());
        self.archiver.archive(module_dir, &dest)?;
        Ok(dest)
    }

    /// Give declared executables and hooks the executable bit.
    fn mark_executables(&self, descriptor: &ModuleDescriptor) {
        let root = self.registry.root();
        let executables = descriptor
            .executables
            .iter()
            .map(|e| root.executable_path(&descriptor.name, &e.relative_path));
        let hooks = [Hook::PostInstall, Hook::PostUpgrade, Hook::PostUninstall]
            .into_iter()
            .map(|h| root.hook_path(&descriptor.name, h.file_name()));

        for path in executables.chain(hooks).filter(|p| p.is_file()) {
            if let Err(e) = set_executable(&path) {
                warn!("Cannot mark {} executable: {}", path.display(), e);
            }
        }
    }

    fn installed_version(&self, module: &str) -> String {
        self.registry.version_of(module).unwrap_or_default().to_string()
    }

    fn blocked_install(&self, module: String, reason: BlockReason) -> InstallOutcome {
        info!("Install of {} blocked: {}", module, reason);
        InstallOutcome::Blocked { module, reason }
    }

    fn blocked_upgrade(&self, module: String, reason: BlockReason) -> UpgradeOutcome {
        info!("Upgrade of {} blocked: {}", module, reason);
        UpgradeOutcome::Blocked { module, reason }
    }

    fn blocked_uninstall(&self, module: &str, reason: BlockReason) -> UninstallOutcome {
        info!("Uninstall of {} blocked: {}", module, reason);
        UninstallOutcome::Blocked {
            module: module.to_string(),
            reason,
        }
    }
}
