//! Module descriptor and registry entry types.

use serde::{Deserialize, Serialize};

/// An executable declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableSpec {
    /// Name, unique within the module.
    pub name: String,
    /// Path relative to the module's `bin` directory.
    pub relative_path: String,
    pub is_daemon: bool,
}

/// A single-level dependency on another installed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub module_name: String,
    pub min_version: String,
}

/// Parsed contents of a module declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub executables: Vec<ExecutableSpec>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl ModuleDescriptor {
    /// Look up a declared executable by name.
    pub fn executable(&self, name: &str) -> Option<&ExecutableSpec> {
        self.executables.iter().find(|e| e.name == name)
    }

    /// Whether this module declares a dependency on `module`.
    pub fn depends_on(&self, module: &str) -> bool {
        self.dependencies.iter().any(|d| d.module_name == module)
    }
}

/// An executable as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredExecutable {
    pub name: String,
    pub relative_path: String,
    pub is_daemon: bool,
    /// Last known daemon process id. Always `None` for plain programs.
    #[serde(default)]
    pub pid: Option<u32>,
}

impl From<&ExecutableSpec> for RegisteredExecutable {
    fn from(spec: &ExecutableSpec) -> Self {
        Self {
            name: spec.name.clone(),
            relative_path: spec.relative_path.clone(),
            is_daemon: spec.is_daemon,
            pid: None,
        }
    }
}

/// Persisted registry entry for an installed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModule {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub executables: Vec<RegisteredExecutable>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl RegisteredModule {
    /// Build a fresh registry entry; every daemon starts without a pid.
    pub fn from_descriptor(descriptor: &ModuleDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            executables: descriptor.executables.iter().map(Into::into).collect(),
            dependencies: descriptor.dependencies.clone(),
        }
    }

    /// The descriptor this entry was registered from, without runtime pids.
    pub fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: self.name.clone(),
            version: self.version.clone(),
            executables: self
                .executables
                .iter()
                .map(|e| ExecutableSpec {
                    name: e.name.clone(),
                    relative_path: e.relative_path.clone(),
                    is_daemon: e.is_daemon,
                })
                .collect(),
            dependencies: self.dependencies.clone(),
        }
    }

    pub fn executable(&self, name: &str) -> Option<&RegisteredExecutable> {
        self.executables.iter().find(|e| e.name == name)
    }

    pub(crate) fn executable_mut(&mut self, name: &str) -> Option<&mut RegisteredExecutable> {
        self.executables.iter_mut().find(|e| e.name == name)
    }

    pub fn depends_on(&self, module: &str) -> bool {
        self.dependencies.iter().any(|d| d.module_name == module)
    }
}
