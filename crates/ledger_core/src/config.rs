//! Database configuration.

use std::path::{Path, PathBuf};

/// Configuration for opening a [`crate::LedgerDb`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Snapshot file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,

    /// Whether local writes are journaled after opening.
    pub journaling: bool,

    /// Whether missing parent directories of `path` are created.
    pub create_dirs: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            journaling: true,
            create_dirs: true,
        }
    }
}

impl DbConfig {
    /// Creates an in-memory configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists the database at `path`.
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets whether local writes are journaled.
    #[must_use]
    pub const fn journaling(mut self, value: bool) -> Self {
        self.journaling = value;
        self
    }

    /// Sets whether parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DbConfig::default();
        assert!(config.path.is_none());
        assert!(config.journaling);
        assert!(config.create_dirs);
    }

    #[test]
    fn builder_pattern() {
        let config = DbConfig::new()
            .with_path("ledger.json")
            .journaling(false)
            .create_dirs(false);
        assert_eq!(config.path.as_deref(), Some(Path::new("ledger.json")));
        assert!(!config.journaling);
        assert!(!config.create_dirs);
    }
}
