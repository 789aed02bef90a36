//! Registry of named store files.
//!
//! The registry is a small JSON document:
//!
//! ```json
//! { "databases": [{ "name": "Default", "path": "inventory.db" }], "current_database": 0 }
//! ```
//!
//! Older installs wrote `{"database_path": "..."}`; that shape is upgraded on
//! load. A missing or unreadable registry yields a single default entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_NAME: &str = "Default";
pub const DEFAULT_STORE_FILE: &str = "inventory.db";

#[derive(Debug)]
pub enum RegistryError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Index outside `0..len`
    IndexOutOfRange { index: usize, len: usize },
    /// The path is already registered
    DuplicatePath(String),
    /// The registry must keep at least one entry
    LastEntry,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io(e) => write!(f, "I/O error: {e}"),
            RegistryError::Json(e) => write!(f, "JSON error: {e}"),
            RegistryError::IndexOutOfRange { index, len } => {
                write!(f, "store index {index} out of range (registry has {len} entries)")
            }
            RegistryError::DuplicatePath(p) => write!(f, "store path {p} is already registered"),
            RegistryError::LastEntry => write!(f, "cannot remove the only registered store"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Io(e) => Some(e),
            RegistryError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err)
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRegistry {
    pub databases: Vec<StoreEntry>,
    #[serde(default)]
    pub current_database: usize,
}

#[derive(Deserialize)]
struct LegacyRegistry {
    database_path: Option<String>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::single(DEFAULT_STORE_FILE)
    }
}

impl StoreRegistry {
    fn single(path: &str) -> Self {
        Self {
            databases: vec![StoreEntry {
                name: DEFAULT_STORE_NAME.to_string(),
                path: path.to_string(),
            }],
            current_database: 0,
        }
    }

    /// Reads the registry; never fails, falling back to the default entry.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                if path.exists() {
                    log::warn!("cannot read store registry {}: {}", path.display(), err);
                }
                return Self::default();
            }
        };

        match Self::parse(&text) {
            Ok(registry) => registry,
            Err(err) => {
                log::warn!(
                    "malformed store registry {}, using default: {}",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Parses either the current or the legacy single-path shape.
    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("databases").is_some() {
            let mut registry: StoreRegistry = serde_json::from_value(value)?;
            if registry.databases.is_empty() {
                return Ok(Self::default());
            }
            if registry.current_database >= registry.databases.len() {
                registry.current_database = 0;
            }
            return Ok(registry);
        }

        let legacy: LegacyRegistry = serde_json::from_value(value)?;
        Ok(Self::single(
            legacy.database_path.as_deref().unwrap_or(DEFAULT_STORE_FILE),
        ))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn current(&self) -> Option<&StoreEntry> {
        self.databases.get(self.current_database)
    }

    /// Path of the current store; relative paths resolve against `base`.
    pub fn current_path(&self, base: &Path) -> PathBuf {
        let raw = self
            .current()
            .map(|entry| entry.path.as_str())
            .unwrap_or(DEFAULT_STORE_FILE);
        resolve(base, raw)
    }

    pub fn path_at(&self, index: usize, base: &Path) -> Result<PathBuf, RegistryError> {
        self.databases
            .get(index)
            .map(|entry| resolve(base, &entry.path))
            .ok_or(RegistryError::IndexOutOfRange {
                index,
                len: self.databases.len(),
            })
    }

    pub fn add(&mut self, name: impl Into<String>, path: impl Into<String>) -> Result<usize, RegistryError> {
        let path = path.into();
        if self.databases.iter().any(|entry| entry.path == path) {
            return Err(RegistryError::DuplicatePath(path));
        }
        self.databases.push(StoreEntry {
            name: name.into(),
            path,
        });
        Ok(self.databases.len() - 1)
    }

    /// Removes an entry, keeping at least one. The current index keeps pointing
    /// at the same entry, or is clamped when that entry was the last one.
    pub fn remove(&mut self, index: usize) -> Result<StoreEntry, RegistryError> {
        if index >= self.databases.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: self.databases.len(),
            });
        }
        if self.databases.len() == 1 {
            return Err(RegistryError::LastEntry);
        }
        let removed = self.databases.remove(index);
        if index < self.current_database {
            self.current_database -= 1;
        } else if self.current_database >= self.databases.len() {
            self.current_database = self.databases.len() - 1;
        }
        Ok(removed)
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), RegistryError> {
        if index >= self.databases.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: self.databases.len(),
            });
        }
        self.current_database = index;
        Ok(())
    }
}

fn resolve(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
