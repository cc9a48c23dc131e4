//! Persistent key-value storage for the synchronized settings.
//!
//! The store reads and writes its three fields through the small
//! [`KeyValueStore`] interface. Two backends are provided:
//!
//! - [`JsonFileStore`]: one JSON object file in the platform data directory,
//!   rewritten atomically on every change
//! - [`MemoryStore`]: an in-process map for tests and demos
//!
//! ## Storage Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.local/share/unfog/settings.json` |
//! | macOS | `~/Library/Application Support/Unfog/settings.json` |
//! | Windows | `%APPDATA%\Unfog\data\settings.json` |

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key holding the metronome tempo (integer).
pub const KEY_TEMPO: &str = "tempoBpm";

/// Key holding the comma-joined display order (string).
pub const KEY_DISPLAY_ORDER: &str = "displayOrder";

/// Key holding the memo text (string).
pub const KEY_MEMO_TEXT: &str = "memoText";

/// File name of the settings file inside the data directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Extension given to an unreadable settings file when it is moved aside.
pub const CORRUPT_EXTENSION: &str = "json.corrupt";

/// A minimal get/set interface over durable storage.
pub trait KeyValueStore: Send {
    /// Read a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Settings stored as a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    /// Path to the settings file
    path: PathBuf,
    /// Cached contents of the file
    values: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the store at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open_default() -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));
        Self::open(path)
    }

    /// Open the store inside a specific data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open_in(dir: &Path) -> Result<Self> {
        Self::open(dir.join(SETTINGS_FILE))
    }

    /// Open the store at a specific file path.
    ///
    /// A missing file is treated as an empty store. A file that is not a
    /// JSON object is renamed with the [`CORRUPT_EXTENSION`] and the store
    /// starts empty, so every field falls back to its default.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path,
                values: Map::new(),
            });
        }

        let contents = fs::read(&path).map_err(|e| {
            Error::Persistence(format!(
                "Failed to read settings at {}: {}",
                path.display(),
                e
            ))
        })?;

        let values = match serde_json::from_slice::<Map<String, Value>>(&contents) {
            Ok(values) => values,
            Err(e) => {
                let aside = path.with_extension(CORRUPT_EXTENSION);
                tracing::error!(
                    "Settings at {} are unreadable ({}), starting from defaults",
                    path.display(),
                    e
                );
                match fs::rename(&path, &aside) {
                    Ok(()) => tracing::warn!("Moved unreadable settings to {}", aside.display()),
                    Err(e) => tracing::warn!("Could not move {} aside: {}", path.display(), e),
                }
                Map::new()
            }
        };

        Ok(Self { path, values })
    }

    /// Get the default data directory.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "unfog", "Unfog")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the default settings file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Path to the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.values)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.save()
    }
}

/// Write a JSON document by writing a sibling temp file and renaming it over
/// the target.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    let file = fs::File::create(&tmp).map_err(|e| {
        Error::Persistence(format!("Failed to create {}: {}", tmp.display(), e))
    })?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| {
        Error::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
    })?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("Failed to flush {}: {}", tmp.display(), e)))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| {
        Error::Persistence(format!(
            "Failed to replace {}: {}",
            path.display(),
            e
        ))
    })
}

/// In-memory storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with values.
    #[must_use]
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
