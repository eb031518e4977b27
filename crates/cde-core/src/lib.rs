//! CDE Core - registry and lifecycle management for CDE modules.
//!
//! A CDE module is a versioned bundle of programs, daemons and scripts
//! installed under one root directory (`/opt/d-ecu` on the appliance). This
//! crate keeps the persisted registry of installed modules, gates install,
//! upgrade and uninstall on versions and dependencies, and reconciles
//! registered daemon pids with the OS process table.
//!
//! # Example
//!
//! ```rust,ignore
//! use cde_core::{InstallRoot, LifecycleController, ModuleRegistry};
//!
//! fn main() -> cde_core::Result<()> {
//!     let mut registry = ModuleRegistry::open(InstallRoot::from_env())?;
//!
//!     let outcome = LifecycleController::new(&mut registry)
//!         .install("canlogger-1.2.0.zip".as_ref())?;
//!     println!("{:?}", outcome);
//!
//!     for module in registry.list_modules() {
//!         println!("{} {}", module, registry.version_of(&module).unwrap_or("?"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Only one instance may run mutating operations against a root at a time;
//! front-ends enforce this with [`RootLock`].

pub mod config;
pub mod consistency;
pub mod daemon;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod metadata;
pub mod models;
pub mod platform;
pub mod registry;
pub mod version;

// Re-export commonly used types
pub use config::{CdeConfig, DaemonConfig, LayoutConfig};
pub use consistency::{ConsistencyReport, MissingExecutable};
pub use daemon::{
    DaemonReconciler, DaemonReport, DaemonStatus, StartOutcome, StopOutcome, StopPolicy,
};
pub use dependency::{
    check_dependencies, require_dependencies, unsatisfied_dependencies, UnsatisfiedDependency,
};
pub use descriptor::{parse_descriptor, parse_descriptor_str};
pub use error::{CdeError, Result};
pub use lifecycle::{
    BackupArchiver, BlockReason, Disposition, HookOutcome, InstallOutcome, LifecycleController,
    PackageExtractor, UninstallOutcome, UpgradeOutcome,
};
pub use lock::RootLock;
pub use models::{
    DependencySpec, ExecutableSpec, ModuleDescriptor, RegisteredExecutable, RegisteredModule,
};
pub use platform::{InstallRoot, ProcessControl, ProcessEntry, SystemProcessControl};
pub use registry::{
    ExecutableEntry, JsonFileStore, MemoryStore, ModuleRegistry, RegistryMap, RegistryStore,
};
pub use version::{compare_versions, VersionOrder};
