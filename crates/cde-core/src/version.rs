//! Module version comparison.
//!
//! Only the first two numeric components (major, minor) of a dotted version
//! take part in a comparison. Patch and build numbers never block an install
//! or a dependency.

use crate::error::{CdeError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Outcome of comparing a version against another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrder {
    /// The first version is later than the second.
    Later,
    Equal,
    /// The first version is earlier than the second.
    Earlier,
}

impl From<Ordering> for VersionOrder {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Greater => VersionOrder::Later,
            Ordering::Equal => VersionOrder::Equal,
            Ordering::Less => VersionOrder::Earlier,
        }
    }
}

/// Compare two dotted version strings on their major and minor components.
///
/// Fails with [`CdeError::MalformedVersion`] when either string lacks two
/// leading numeric components.
pub fn compare_versions(first: &str, second: &str) -> Result<VersionOrder> {
    let first_key = significant_components(first)?;
    let second_key = significant_components(second)?;
    Ok(first_key.cmp(&second_key).into())
}

/// Parse the `(major, minor)` pair of a version string.
pub fn significant_components(version: &str) -> Result<(u64, u64)> {
    let malformed = || CdeError::MalformedVersion {
        version: version.to_string(),
    };

    let mut parts = version.trim().split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse::<u64>().ok())
        .ok_or_else(malformed)?;
    let minor = parts
        .next()
        .and_then(|p| p.parse::<u64>().ok())
        .ok_or_else(malformed)?;

    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_difference() {
        assert_eq!(
            compare_versions("1.2.0", "1.3.0").unwrap(),
            VersionOrder::Earlier
        );
        assert_eq!(compare_versions("1.9", "1.2").unwrap(), VersionOrder::Later);
    }

    #[test]
    fn test_patch_is_ignored() {
        assert_eq!(
            compare_versions("2.0.5", "2.0.9").unwrap(),
            VersionOrder::Equal
        );
        assert_eq!(
            compare_versions("2.0.5-rc1", "2.0").unwrap(),
            VersionOrder::Equal
        );
    }

    #[test]
    fn test_components_compare_numerically() {
        // "10" sorts before "9" as a string
        assert_eq!(compare_versions("1.10", "1.9").unwrap(), VersionOrder::Later);
        assert_eq!(compare_versions("2.0", "10.0").unwrap(), VersionOrder::Earlier);
    }

    #[test]
    fn test_malformed_versions() {
        assert!(matches!(
            compare_versions("1", "1.0"),
            Err(CdeError::MalformedVersion { .. })
        ));
        assert!(matches!(
            compare_versions("1.0", "one.two"),
            Err(CdeError::MalformedVersion { .. })
        ));
        assert!(matches!(
            compare_versions("", "1.0"),
            Err(CdeError::MalformedVersion { .. })
        ));
    }
}
