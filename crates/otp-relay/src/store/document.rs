//! One JSON file holding one map of the store.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::error::{Result, StoreError};

/// A JSON document on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers only ever see a complete document.
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl<T: DeserializeOwned> JsonDocument<T> {
    /// Reads the document. Returns `None` when the file does not exist.
    pub fn read(&self) -> Result<Option<T>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }
}

impl<T: DeserializeOwned + Default> JsonDocument<T> {
    /// Reads the document, treating a missing file as the empty value.
    pub fn load(&self) -> Result<T> {
        Ok(self.read()?.unwrap_or_default())
    }
}

impl<T: Serialize> JsonDocument<T> {
    /// Atomically replaces the document with `value`.
    pub fn save(&self, value: &T) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(&json).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        debug!("Saved {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }
}

impl<T> JsonDocument<T> {
    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}
