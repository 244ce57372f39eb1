//! Global configuration options.

use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the hpreserve crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// The registries used for dumping and loading are not part of the global configuration.
/// They are passed explicitly to each [`PreserveFile`](crate::group::PreserveFile).
///
/// ## Warn Unwritten Delayed
/// > default: [`true`]
///
/// If enabled, closing a [`PreserveFile`](crate::group::PreserveFile) emits a warning for every delayed container that was never written.
///
/// ## Link Resolution Limit
/// > default: `32`
///
/// The maximum number of links followed while resolving a path in a [`StoreHierarchy`](crate::storage::StoreHierarchy).
/// This bounds the work done when links form a cycle.
///
/// ## Pretty Metadata
/// > default: [`true`]
///
/// If enabled, node metadata documents in a key-value store are written as pretty-printed JSON.
#[derive(Debug)]
pub struct Config {
    warn_unwritten_delayed: bool,
    link_resolution_limit: usize,
    pretty_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            warn_unwritten_delayed: true,
            link_resolution_limit: 32,
            pretty_metadata: true,
        }
    }
}

impl Config {
    /// Get the [warn unwritten delayed](#warn-unwritten-delayed) configuration.
    #[must_use]
    pub fn warn_unwritten_delayed(&self) -> bool {
        self.warn_unwritten_delayed
    }

    /// Set the [warn unwritten delayed](#warn-unwritten-delayed) configuration.
    pub fn set_warn_unwritten_delayed(&mut self, warn_unwritten_delayed: bool) {
        self.warn_unwritten_delayed = warn_unwritten_delayed;
    }

    /// Get the [link resolution limit](#link-resolution-limit) configuration.
    #[must_use]
    pub fn link_resolution_limit(&self) -> usize {
        self.link_resolution_limit
    }

    /// Set the [link resolution limit](#link-resolution-limit) configuration.
    pub fn set_link_resolution_limit(&mut self, link_resolution_limit: usize) {
        self.link_resolution_limit = link_resolution_limit;
    }

    /// Get the [pretty metadata](#pretty-metadata) configuration.
    #[must_use]
    pub fn pretty_metadata(&self) -> bool {
        self.pretty_metadata
    }

    /// Set the [pretty metadata](#pretty-metadata) configuration.
    pub fn set_pretty_metadata(&mut self, pretty_metadata: bool) {
        self.pretty_metadata = pretty_metadata;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global hpreserve configuration.
///
/// This might deadlock if the global config is already held mutably by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Returns a mutable reference to the global hpreserve configuration.
///
/// This might deadlock if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_pretty_metadata() {
        assert!(global_config().pretty_metadata());
        global_config_mut().set_pretty_metadata(false);
        assert!(!global_config().pretty_metadata());
        global_config_mut().set_pretty_metadata(true);
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert!(config.warn_unwritten_delayed());
        assert_eq!(config.link_resolution_limit(), 32);
    }
}
