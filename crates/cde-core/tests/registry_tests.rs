//! Integration tests for registry persistence.

use cde_core::{
    CdeError, DependencySpec, ExecutableSpec, InstallRoot, JsonFileStore, ModuleDescriptor,
    ModuleRegistry, RegistryMap, RegistryStore, VersionOrder,
};
use std::fs;
use tempfile::TempDir;

fn descriptor(name: &str, version: &str) -> ModuleDescriptor {
    ModuleDescriptor {
        name: name.into(),
        version: version.into(),
        executables: vec![
            ExecutableSpec {
                name: "svc".into(),
                relative_path: "svc/main.py".into(),
                is_daemon: true,
            },
            ExecutableSpec {
                name: "cli".into(),
                relative_path: "cli.sh".into(),
                is_daemon: false,
            },
        ],
        dependencies: vec![DependencySpec {
            module_name: "canbus".into(),
            min_version: "1.0".into(),
        }],
    }
}

#[test]
fn test_round_trip_through_fresh_load() {
    let temp_dir = TempDir::new().unwrap();
    let root = InstallRoot::new(temp_dir.path());

    let mut registry = ModuleRegistry::open(root.clone()).unwrap();
    let modules = [descriptor("canbus", "1.4"), descriptor("canlogger", "1.2.0")];
    for d in &modules {
        registry.store(d).unwrap();
    }
    registry.set_pid("canlogger", "svc", 812).unwrap();

    let reloaded = ModuleRegistry::open(root.clone()).unwrap();
    for d in &modules {
        assert_eq!(&reloaded.lookup(&d.name).unwrap().descriptor(), d);
    }
    assert_eq!(reloaded.get_pid("canlogger", "svc"), Some(812));
    assert_eq!(reloaded.list_executables(None), registry.list_executables(None));

    // Byte-identical after load -> store -> load
    let store = JsonFileStore::new(root.registry_file());
    let first: RegistryMap = store.load().unwrap().unwrap();
    let mut resave = JsonFileStore::new(temp_dir.path().join("copy")).without_backup();
    resave.save(&first).unwrap();
    assert_eq!(resave.load().unwrap().unwrap(), first);
    assert_eq!(
        fs::read_to_string(root.registry_file()).unwrap(),
        fs::read_to_string(temp_dir.path().join("copy")).unwrap()
    );
}

#[test]
fn test_corrupt_registry_is_persistence_error() {
    let temp_dir = TempDir::new().unwrap();
    let root = InstallRoot::new(temp_dir.path());
    fs::write(root.registry_file(), "{ truncated").unwrap();

    let result = ModuleRegistry::open(root);
    assert!(matches!(result, Err(CdeError::Persistence { .. })));
}

#[test]
fn test_previous_registry_kept_as_backup() {
    let temp_dir = TempDir::new().unwrap();
    let root = InstallRoot::new(temp_dir.path());
    let mut registry = ModuleRegistry::open(root.clone()).unwrap();
    registry.store(&descriptor("gps", "0.3")).unwrap();

    let backup = temp_dir.path().join(".cdereg.bak");
    let previous: RegistryMap =
        serde_json::from_str(&fs::read_to_string(backup).unwrap()).unwrap();
    assert!(previous.is_empty());
}

#[test]
fn test_precheck_uses_installed_then_candidate() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = ModuleRegistry::open(InstallRoot::new(temp_dir.path())).unwrap();
    registry.store(&descriptor("gps", "1.2.0")).unwrap();

    assert_eq!(
        registry.precheck(&descriptor("gps", "1.3.0")).unwrap(),
        Some(VersionOrder::Earlier)
    );
    assert_eq!(
        registry.precheck(&descriptor("gps", "1.1")).unwrap(),
        Some(VersionOrder::Later)
    );
    assert!(matches!(
        registry.precheck(&descriptor("gps", "one")),
        Err(CdeError::MalformedVersion { .. })
    ));
}
