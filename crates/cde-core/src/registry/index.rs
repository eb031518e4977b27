//! Flattened executable index derived from the registry.

use super::store::RegistryMap;
use crate::platform::InstallRoot;
use std::path::PathBuf;

/// One executable of one installed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableEntry {
    pub module: String,
    pub name: String,
    /// Absolute path: `<root>/<module>/bin/<relative path>`.
    pub path: PathBuf,
    pub is_daemon: bool,
    pub pid: Option<u32>,
}

/// Read-only lookup table over every registered executable.
///
/// Rebuilt wholesale from the registry mapping after each mutation; nothing
/// outside the registry module can construct or modify one.
#[derive(Debug, Clone, Default)]
pub struct ExecutableIndex {
    entries: Vec<ExecutableEntry>,
}

impl ExecutableIndex {
    pub(super) fn build(root: &InstallRoot, modules: &RegistryMap) -> Self {
        let entries = modules
            .values()
            .flat_map(|module| {
                module.executables.iter().map(move |exec| ExecutableEntry {
                    module: module.name.clone(),
                    name: exec.name.clone(),
                    path: root.executable_path(&module.name, &exec.relative_path),
                    is_daemon: exec.is_daemon,
                    pid: exec.pid,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, module: &str, exec_name: &str) -> Option<&ExecutableEntry> {
        self.entries
            .iter()
            .find(|e| e.module == module && e.name == exec_name)
    }

    /// Entries in module-name order, optionally restricted to one module.
    pub fn entries<'a>(
        &'a self,
        module_filter: Option<&'a str>,
    ) -> impl Iterator<Item = &'a ExecutableEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| module_filter.map_or(true, |m| e.module == m))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegisteredExecutable, RegisteredModule};

    fn module(name: &str, execs: &[(&str, bool)]) -> RegisteredModule {
        RegisteredModule {
            name: name.into(),
            version: "1.0".into(),
            executables: execs
                .iter()
                .map(|(n, d)| RegisteredExecutable {
                    name: n.to_string(),
                    relative_path: format!("{}.py", n),
                    is_daemon: *d,
                    pid: None,
                })
                .collect(),
            dependencies: vec![],
        }
    }

    #[test]
    fn test_build_flattens_modules() {
        let mut map = RegistryMap::new();
        map.insert("gps".into(), module("gps", &[("gpsd", true)]));
        map.insert("canlogger".into(), module("canlogger", &[("dump", false), ("loggerd", true)]));

        let index = ExecutableIndex::build(&InstallRoot::new("/opt/d-ecu"), &map);
        assert_eq!(index.len(), 3);

        let gpsd = index.get("gps", "gpsd").unwrap();
        assert_eq!(gpsd.path, PathBuf::from("/opt/d-ecu/gps/bin/gpsd.py"));
        assert!(gpsd.is_daemon);

        let names: Vec<_> = index.entries(Some("canlogger")).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["dump", "loggerd"]);
        assert!(index.get("gps", "dump").is_none());
    }
}
