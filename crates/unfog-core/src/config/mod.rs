//! Configuration management for UNFOG.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/unfog/config.toml` |
//! | macOS | `~/Library/Application Support/com.unfog.Unfog/config.toml` |
//! | Windows | `%APPDATA%\unfog\Unfog\config\config.toml` |
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! [general]
//! device_name = "Kitchen iPhone"
//! role = "phone"
//!
//! [sync]
//! listen_addr = "0.0.0.0:52550"
//! peer_addr = "192.168.1.20:52550"
//! reconnect_delay = "5s"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::DeviceRole;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Peer link settings
    pub sync: SyncConfig,
    /// Metronome settings
    pub metronome: MetronomeConfig,
    /// Memo aid settings
    pub memo: MemoConfig,
    /// Where settings are kept
    pub storage: StorageConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name sent to the peer in the handshake
    pub device_name: String,
    /// Which device this process plays
    pub role: DeviceRole,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_name: hostname::get().map_or_else(
                |_| "UNFOG Device".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            role: DeviceRole::default(),
        }
    }
}

/// Peer link options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Address to listen on when waiting for the peer
    pub listen_addr: SocketAddr,
    /// Address of the peer when connecting out
    pub peer_addr: Option<SocketAddr>,
    /// Pause between connection attempts
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    /// Capacity of the store event channel
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, crate::DEFAULT_SYNC_PORT)),
            peer_addr: None,
            reconnect_delay: Duration::from_secs(5),
            event_capacity: crate::store::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Metronome options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Tempo used before anything has been stored
    pub default_tempo: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            default_tempo: crate::DEFAULT_TEMPO_BPM,
        }
    }
}

/// Memo aid options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoConfig {
    /// Speech language tag
    pub language: String,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            language: crate::DEFAULT_SPEECH_LANGUAGE.to_string(),
        }
    }
}

/// Storage options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the settings directory
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, defaulting if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if crate::settings::Tempo::new(self.metronome.default_tempo).is_err() {
            return Err(Error::InvalidConfig {
                key: "metronome.default_tempo".to_string(),
                reason: format!(
                    "must be between {} and {}",
                    crate::MIN_TEMPO_BPM,
                    crate::MAX_TEMPO_BPM
                ),
            });
        }
        if self.sync.event_capacity == 0 {
            return Err(Error::InvalidConfig {
                key: "sync.event_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.memo.language.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "memo.language".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Directory holding the settings and outbox files.
    ///
    /// Uses `storage.data_dir` when set, otherwise the platform data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(crate::storage::JsonFileStore::default_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "unfog", "Unfog")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.general.role, DeviceRole::Phone);
        assert_eq!(config.sync.listen_addr.port(), crate::DEFAULT_SYNC_PORT);
        assert_eq!(config.sync.peer_addr, None);
        assert_eq!(config.sync.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.metronome.default_tempo, 50);
        assert_eq!(config.memo.language, "en-US");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config").join("config.toml");

        let mut original = Config::default();
        original.general.device_name = "Test Watch".to_string();
        original.general.role = DeviceRole::Watch;
        original.sync.peer_addr = Some("127.0.0.1:6000".parse().unwrap());
        original.sync.reconnect_delay = Duration::from_millis(250);
        original.save_to(&config_path).expect("save");

        let loaded = Config::load_from(&config_path).expect("load");

        assert_eq!(loaded.general.device_name, "Test Watch");
        assert_eq!(loaded.general.role, DeviceRole::Watch);
        assert_eq!(loaded.sync.peer_addr, original.sync.peer_addr);
        assert_eq!(loaded.sync.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).expect("serialize");

        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("reconnect_delay = \"5s\""));
        assert!(toml_str.contains("role = \"phone\""));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[general]
role = "watch"

[sync]
reconnect_delay = "2m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.general.role, DeviceRole::Watch);
        assert_eq!(config.sync.reconnect_delay, Duration::from_secs(120));
        assert_eq!(config.sync.event_capacity, crate::store::DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.memo.language, crate::DEFAULT_SPEECH_LANGUAGE);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).expect("load");
        assert_eq!(config.metronome.default_tempo, crate::DEFAULT_TEMPO_BPM);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[metronome]\ndefault_tempo = 0\n").unwrap();

        match Config::load_from(&path) {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, "metronome.default_tempo"),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        std::fs::write(&path, "[sync]\nreconnect_delay = \"soon\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/unfog-test"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/unfog-test"));
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
