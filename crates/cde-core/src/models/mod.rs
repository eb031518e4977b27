//! Data models for CDE modules.
//!
//! [`ModuleDescriptor`] is the ephemeral shape parsed from a package's
//! declaration file; [`RegisteredModule`] is what the registry persists for
//! every installed module.

mod module;

pub use module::*;
