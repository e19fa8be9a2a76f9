// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::shuffle::ShuffleStrategy;

/// Top-level configuration, usually read from a TOML file
///
/// Every section and field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub playback: PlaybackOptions,
    pub shuffle: ShuffleConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Where downloaded audio lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Application storage root (None = platform data directory)
    pub root: Option<PathBuf>,
    /// Name of the downloads subdirectory below the root
    pub downloads_dir: String,
}

impl StorageConfig {
    /// Resolve the storage root, falling back to `<data dir>/podplay`
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("podplay")
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            downloads_dir: "downloads".to_string(),
        }
    }
}

/// Settings applied to the underlying HTTP client
///
/// Retries are deliberately absent here; failed transfers surface to the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total request timeout in seconds (None = no timeout)
    pub timeout_secs: Option<u64>,
    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            connect_timeout_secs: 30,
            user_agent: concat!("podplay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Options for the playback manager
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// Seconds moved by skip forward / skip backward
    pub skip_interval_secs: f64,
    /// Stream the remote URL when playing an episode without a local file.
    /// When false, the episode is downloaded first.
    pub stream_remote: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            skip_interval_secs: 15.0,
            stream_remote: true,
        }
    }
}

/// Shuffle strategy selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    pub strategy: ShuffleStrategy,
    /// Fixed session seed for the deterministic strategy (None = random)
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.storage.downloads_dir, "downloads");
        assert_eq!(config.transport.connect_timeout_secs, 30);
        assert_eq!(config.playback.skip_interval_secs, 15.0);
        assert!(config.playback.stream_remote);
        assert_eq!(config.shuffle.strategy, ShuffleStrategy::Uniform);
        assert!(config.shuffle.seed.is_none());
    }

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            root = "/var/lib/podplay"
            downloads_dir = "episodes"

            [transport]
            timeout_secs = 600
            user_agent = "test-agent"

            [playback]
            skip_interval_secs = 30.0
            stream_remote = false

            [shuffle]
            strategy = "miller"
            seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.root_dir(), PathBuf::from("/var/lib/podplay"));
        assert_eq!(config.storage.downloads_dir, "episodes");
        assert_eq!(config.transport.timeout_secs, Some(600));
        assert_eq!(config.transport.connect_timeout_secs, 30);
        assert_eq!(config.transport.user_agent, "test-agent");
        assert_eq!(config.playback.skip_interval_secs, 30.0);
        assert!(!config.playback.stream_remote);
        assert_eq!(config.shuffle.strategy, ShuffleStrategy::Miller);
        assert_eq!(config.shuffle.seed, Some(42));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));

        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn load_reports_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podplay.toml");
        std::fs::write(&path, "[shuffle]\nstrategy = \"sideways\"\n").unwrap();

        let result = Config::load(&path);

        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }
}
