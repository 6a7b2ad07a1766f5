//! Store configuration.

use std::time::Duration;

/// Configuration for opening an item store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store file (and its parent directories) if missing.
    pub create_if_missing: bool,

    /// Whether to pretty-print the JSON file.
    pub pretty: bool,

    /// Whether to fsync every rewrite before renaming it into place.
    pub sync_writes: bool,

    /// How often the reload watcher checks the staging file.
    pub poll_interval: Duration,

    /// How long the staging file must stay unchanged before it is reloaded.
    pub quiescence: Duration,

    /// Extension of the error marker written next to a staging file.
    pub error_marker_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            pretty: true,
            sync_writes: true,
            poll_interval: Duration::from_secs(1),
            quiescence: Duration::from_secs(3),
            error_marker_extension: "err".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to pretty-print the JSON file.
    #[must_use]
    pub const fn pretty(mut self, value: bool) -> Self {
        self.pretty = value;
        self
    }

    /// Sets whether rewrites are synced to disk.
    #[must_use]
    pub const fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the staging file poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the quiescence window.
    #[must_use]
    pub const fn quiescence(mut self, window: Duration) -> Self {
        self.quiescence = window;
        self
    }

    /// Sets the error marker extension.
    #[must_use]
    pub fn error_marker_extension(mut self, extension: impl Into<String>) -> Self {
        self.error_marker_extension = extension.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.pretty);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.quiescence, Duration::from_secs(3));
        assert_eq!(config.error_marker_extension, "err");
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_writes(false)
            .poll_interval(Duration::from_millis(10))
            .error_marker_extension("failed");

        assert!(!config.create_if_missing);
        assert!(!config.sync_writes);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.error_marker_extension, "failed");
    }
}
