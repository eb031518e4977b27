//! Shared helpers for cde-core integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A temporary installation root plus a directory for package files.
pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("root")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("packages")).unwrap();
        Self { temp_dir }
    }

    pub fn root_dir(&self) -> PathBuf {
        self.temp_dir.path().join("root")
    }

    pub fn package_path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.path().join("packages").join(file_name)
    }
}

/// Builder for zip module packages.
pub struct PackageBuilder {
    name: String,
    version: String,
    programs: Vec<(String, String)>,
    daemons: Vec<(String, String)>,
    dependencies: Vec<(String, String)>,
    files: Vec<(String, String, u32)>,
    wrapper_dir: Option<String>,
}

impl PackageBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            programs: Vec::new(),
            daemons: Vec::new(),
            dependencies: Vec::new(),
            files: Vec::new(),
            wrapper_dir: None,
        }
    }

    /// Declare a program and ship a shell script for it under `bin/`.
    pub fn program(mut self, name: &str, script: &str) -> Self {
        let rel = format!("{}.sh", name);
        self.files.push((format!("bin/{}", rel), script.to_string(), 0o755));
        self.programs.push((name.to_string(), rel));
        self
    }

    pub fn daemon(mut self, name: &str, script: &str) -> Self {
        let rel = format!("{}.sh", name);
        self.files.push((format!("bin/{}", rel), script.to_string(), 0o755));
        self.daemons.push((name.to_string(), rel));
        self
    }

    pub fn depends_on(mut self, module: &str, min_version: &str) -> Self {
        self.dependencies.push((module.to_string(), min_version.to_string()));
        self
    }

    pub fn file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.to_string(), 0o644));
        self
    }

    pub fn hook(mut self, hook: &str, script: &str) -> Self {
        self.files.push((format!("scpt/{}", hook), script.to_string(), 0o755));
        self
    }

    /// Put everything inside one top-level directory.
    pub fn wrapped_in(mut self, dir: &str) -> Self {
        self.wrapper_dir = Some(dir.to_string());
        self
    }

    pub fn descriptor(&self) -> String {
        let section = |title: &str, entries: &[(String, String)]| {
            let mut out = format!("[{}]\n", title);
            for (k, v) in entries {
                out.push_str(&format!("{} = {}\n", k, v));
            }
            out
        };
        format!(
            "[main]\nname = {}\nversion = {}\n\n{}\n{}\n{}",
            self.name,
            self.version,
            section("programs", &self.programs),
            section("daemons", &self.daemons),
            section("dependencies", &self.dependencies)
        )
    }

    pub fn write(&self, dest: &Path) -> PathBuf {
        let prefix = self
            .wrapper_dir
            .as_ref()
            .map(|d| format!("{}/", d))
            .unwrap_or_default();

        let mut writer = zip::ZipWriter::new(File::create(dest).unwrap());
        let descriptor = self.descriptor();
        let mut entries: Vec<(String, &str, u32)> =
            vec![(format!("{}module.info", prefix), descriptor.as_str(), 0o644)];
        for (path, contents, mode) in &self.files {
            entries.push((format!("{}{}", prefix, path), contents.as_str(), *mode));
        }

        for (path, contents, mode) in entries {
            let options = SimpleFileOptions::default().unix_permissions(mode);
            writer.start_file(path, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        dest.to_path_buf()
    }
}
