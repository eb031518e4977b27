//! Single-level dependency checks against the registry.
//!
//! A dependency is satisfied when the named module is installed and its
//! installed version is not earlier than the declared minimum. There is no
//! transitive resolution.

use crate::error::{CdeError, Result};
use crate::models::ModuleDescriptor;
use crate::registry::ModuleRegistry;
use crate::version::{compare_versions, VersionOrder};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// A declared dependency the registry cannot satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsatisfiedDependency {
    pub module_name: String,
    pub min_version: String,
    /// Installed version, if the module is installed at all.
    pub installed: Option<String>,
}

impl fmt::Display for UnsatisfiedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.installed {
            Some(installed) => write!(
                f,
                "{} >= {} (installed: {})",
                self.module_name, self.min_version, installed
            ),
            None => write!(f, "{} >= {} (not installed)", self.module_name, self.min_version),
        }
    }
}

/// Every dependency of `descriptor` that is missing or too old.
///
/// An installed version that cannot be compared counts as unsatisfied.
pub fn unsatisfied_dependencies(
    descriptor: &ModuleDescriptor,
    registry: &ModuleRegistry,
) -> Vec<UnsatisfiedDependency> {
    descriptor
        .dependencies
        .iter()
        .filter_map(|dep| {
            let installed = registry.version_of(&dep.module_name);
            let satisfied = match installed {
                None => false,
                Some(version) => match compare_versions(version, &dep.min_version) {
                    Ok(order) => order != VersionOrder::Earlier,
                    Err(e) => {
                        warn!(
                            "Cannot compare {} {} against {}: {}",
                            dep.module_name, version, dep.min_version, e
                        );
                        false
                    }
                },
            };

            if satisfied {
                None
            } else {
                debug!("{} requires {} >= {}", descriptor.name, dep.module_name, dep.min_version);
                Some(UnsatisfiedDependency {
                    module_name: dep.module_name.clone(),
                    min_version: dep.min_version.clone(),
                    installed: installed.map(str::to_string),
                })
            }
        })
        .collect()
}

/// Whether every dependency of `descriptor` is satisfied.
pub fn check_dependencies(descriptor: &ModuleDescriptor, registry: &ModuleRegistry) -> bool {
    unsatisfied_dependencies(descriptor, registry).is_empty()
}

/// Fail with [`CdeError::DependencyUnsatisfied`] listing every unsatisfied
/// dependency.
pub fn require_dependencies(
    descriptor: &ModuleDescriptor,
    registry: &ModuleRegistry,
) -> Result<()> {
    let missing = unsatisfied_dependencies(descriptor, registry);
    if missing.is_empty() {
        return Ok(());
    }
    Err(CdeError::DependencyUnsatisfied {
        module: descriptor.name.clone(),
        missing: missing.iter().map(ToString::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DependencySpec;
    use crate::platform::InstallRoot;
    use crate::registry::MemoryStore;

    fn module(name: &str, version: &str, deps: &[(&str, &str)]) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.into(),
            version: version.into(),
            executables: vec![],
            dependencies: deps
                .iter()
                .map(|(m, v)| DependencySpec {
                    module_name: m.to_string(),
                    min_version: v.to_string(),
                })
                .collect(),
        }
    }

    fn registry_with(modules: &[ModuleDescriptor]) -> ModuleRegistry {
        let mut registry =
            ModuleRegistry::with_store(InstallRoot::new("/opt/d-ecu"), Box::new(MemoryStore::new()))
                .unwrap();
        for m in modules {
            registry.store(m).unwrap();
        }
        registry
    }

    #[test]
    fn test_no_dependencies_is_satisfied() {
        let registry = registry_with(&[]);
        assert!(check_dependencies(&module("gps", "1.0", &[]), &registry));
    }

    #[test]
    fn test_version_thresholds() {
        let registry = registry_with(&[module("canbus", "1.4.2", &[])]);

        assert!(check_dependencies(&module("a", "1.0", &[("canbus", "1.4")]), &registry));
        assert!(check_dependencies(&module("a", "1.0", &[("canbus", "1.4.9")]), &registry));
        assert!(check_dependencies(&module("a", "1.0", &[("canbus", "1.0")]), &registry));
        assert!(!check_dependencies(&module("a", "1.0", &[("canbus", "1.5")]), &registry));
    }

    #[test]
    fn test_reports_full_failing_set() {
        let registry = registry_with(&[module("canbus", "1.0", &[])]);
        let candidate = module("a", "1.0", &[("canbus", "2.0"), ("gps", "1.0"), ("canbus", "0.9")]);

        let missing = unsatisfied_dependencies(&candidate, &registry);
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].installed.as_deref(), Some("1.0"));
        assert_eq!(missing[1].module_name, "gps");
        assert_eq!(missing[1].to_string(), "gps >= 1.0 (not installed)");
    }

    #[test]
    fn test_require_dependencies_error() {
        let registry = registry_with(&[]);
        let needy = module("a", "1.0", &[("gps", "1.0")]);
        let err = require_dependencies(&needy, &registry).unwrap_err();
        match err {
            CdeError::DependencyUnsatisfied { module, missing } => {
                assert_eq!(module, "a");
                assert_eq!(missing, vec!["gps >= 1.0 (not installed)".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(require_dependencies(&module("b", "1.0", &[]), &registry).is_ok());
    }
}
