//! Versions of stored representations.
//!
//! A dumper is registered with a concrete [`Version`] or unversioned.
//! A loader is registered with a [`VersionSelector`], which can also be one of the [`Any`](VersionSelector::Any) and [`All`](VersionSelector::All) sentinels.

use derive_more::Display;

/// The version of a stored representation.
pub type Version = u64;

/// Selects the stored versions a loader handles.
///
/// Loaders are chosen in this order of precedence:
///  1. [`Unversioned`](VersionSelector::Unversioned), if the stored container has no version,
///  2. [`All`](VersionSelector::All), regardless of the stored version,
///  3. [`Version`](VersionSelector::Version) matching the stored version exactly,
///  4. [`Any`](VersionSelector::Any).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    /// A concrete version.
    #[display("{_0}")]
    Version(Version),
    /// No version.
    #[display("none")]
    Unversioned,
    /// Used only if no other loader matches.
    #[display("any")]
    Any,
    /// Used for every stored version.
    #[display("all")]
    All,
}

impl From<Version> for VersionSelector {
    fn from(version: Version) -> Self {
        Self::Version(version)
    }
}

impl From<Option<Version>> for VersionSelector {
    fn from(version: Option<Version>) -> Self {
        version.map_or(Self::Unversioned, Self::Version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_selector_display() {
        assert_eq!(VersionSelector::from(3).to_string(), "3");
        assert_eq!(VersionSelector::from(None).to_string(), "none");
        assert_eq!(VersionSelector::Any.to_string(), "any");
        assert_eq!(VersionSelector::All.to_string(), "all");
    }
}
