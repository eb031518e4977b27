//! Module declaration file (`module.info`) parsing.
//!
//! The declaration file is a section-based key/value text file:
//!
//! ```text
//! [main]
//! name = canlogger
//! version = 1.2.0
//!
//! [programs]
//! dump = dump.py
//!
//! [daemons]
//! loggerd = loggerd.py
//!
//! [dependencies]
//! canbus = 1.0
//! ```
//!
//! `main` is mandatory. `programs`, `daemons` and `dependencies` may be
//! omitted and then count as empty. Keys accept `=` or `:` as separator and
//! are case-insensitive; lines starting with `#` or `;` are comments.

use crate::error::{CdeError, Result};
use crate::models::{DependencySpec, ExecutableSpec, ModuleDescriptor};
use crate::version::significant_components;
use std::collections::HashSet;
use std::path::{Component, Path};
use tracing::debug;

const MAIN_SECTION: &str = "main";
const PROGRAMS_SECTION: &str = "programs";
const DAEMONS_SECTION: &str = "daemons";
const DEPENDENCIES_SECTION: &str = "dependencies";

/// Read and parse a declaration file.
pub fn parse_descriptor(path: &Path) -> Result<ModuleDescriptor> {
    let contents = std::fs::read_to_string(path).map_err(|e| CdeError::MalformedDescriptor {
        path: path.to_path_buf(),
        message: format!("cannot read declaration file: {}", e),
    })?;
    parse_descriptor_str(&contents, path)
}

/// Parse declaration file contents. `origin` is only used in error messages.
pub fn parse_descriptor_str(contents: &str, origin: &Path) -> Result<ModuleDescriptor> {
    let malformed = |message: String| CdeError::MalformedDescriptor {
        path: origin.to_path_buf(),
        message,
    };

    let document = Document::parse(contents).map_err(malformed)?;

    let main = document
        .section(MAIN_SECTION)
        .ok_or_else(|| malformed("missing [main] section".to_string()))?;
    let name = lookup(main, "name")
        .ok_or_else(|| malformed("missing 'name' in [main]".to_string()))?
        .to_string();
    let version = lookup(main, "version")
        .ok_or_else(|| malformed("missing 'version' in [main]".to_string()))?
        .to_string();

    validate_module_name(&name).map_err(malformed)?;
    significant_components(&version)
        .map_err(|_| malformed(format!("unparsable version {:?}", version)))?;

    let mut executables = Vec::new();
    let mut seen = HashSet::new();
    for (section, is_daemon) in [(PROGRAMS_SECTION, false), (DAEMONS_SECTION, true)] {
        for (exec_name, relative_path) in document.section(section).unwrap_or_default() {
            if !seen.insert(exec_name.clone()) {
                return Err(malformed(format!(
                    "executable {:?} declared more than once",
                    exec_name
                )));
            }
            validate_relative_path(relative_path).map_err(malformed)?;
            executables.push(ExecutableSpec {
                name: exec_name.clone(),
                relative_path: relative_path.clone(),
                is_daemon,
            });
        }
    }

    let mut dependencies = Vec::new();
    for (module_name, min_version) in document.section(DEPENDENCIES_SECTION).unwrap_or_default() {
        significant_components(min_version).map_err(|_| {
            malformed(format!(
                "unparsable minimum version {:?} for dependency {}",
                min_version, module_name
            ))
        })?;
        dependencies.push(DependencySpec {
            module_name: module_name.clone(),
            min_version: min_version.clone(),
        });
    }

    debug!(
        "Parsed descriptor for {} {} ({} executables, {} dependencies)",
        name,
        version,
        executables.len(),
        dependencies.len()
    );

    Ok(ModuleDescriptor {
        name,
        version,
        executables,
        dependencies,
    })
}

fn lookup<'a>(entries: &'a [(String, String)], key: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Module names become directory names under the installation root.
fn validate_module_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
        return Err(format!("invalid module name {:?}", name));
    }
    Ok(())
}

fn validate_relative_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("empty executable path".to_string());
    }
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(format!("executable path {:?} must stay inside bin/", path));
    }
    Ok(())
}

/// Sections in file order, each holding its entries in file order.
struct Document {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl Document {
    fn parse(contents: &str) -> std::result::Result<Self, String> {
        let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| format!("line {}: unterminated section header", line_no))?
                    .trim();
                if name.is_empty() {
                    return Err(format!("line {}: empty section name", line_no));
                }
                if sections.iter().any(|(s, _)| s == name) {
                    return Err(format!("line {}: duplicate section [{}]", line_no, name));
                }
                sections.push((name.to_string(), Vec::new()));
                continue;
            }

            let (_, entries) = sections
                .last_mut()
                .ok_or_else(|| format!("line {}: entry outside of any section", line_no))?;

            let split_at = line
                .find(&['=', ':'][..])
                .ok_or_else(|| format!("line {}: expected 'key = value'", line_no))?;
            let key = line[..split_at].trim().to_lowercase();
            let value = line[split_at + 1..].trim().to_string();
            if key.is_empty() {
                return Err(format!("line {}: empty key", line_no));
            }
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(format!("line {}: duplicate key {:?}", line_no, key));
            }
            entries.push((key, value));
        }

        Ok(Self { sections })
    }

    fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(s, _)| s == name)
            .map(|(_, entries)| entries.as_slice())
    }
}
