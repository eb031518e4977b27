//! The module registry: the persisted record of installed CDE modules.
//!
//! A module is installed if and only if it has an entry here. The registry
//! owns the mapping exclusively; every mutation goes through
//! [`ModuleRegistry`], persists synchronously through a [`RegistryStore`]
//! and then rebuilds the derived [`ExecutableIndex`].
//!
//! # Location
//!
//! The durable store is a JSON file at `<root>/.cdereg`. There is no
//! cross-process locking inside the registry: only one instance may run
//! mutating operations against a root at a time (see [`crate::lock`]).

mod index;
mod module_registry;
mod store;

pub use index::{ExecutableEntry, ExecutableIndex};
pub use module_registry::ModuleRegistry;
pub use store::{JsonFileStore, MemoryStore, RegistryMap, RegistryStore};
