//! Shared on-disk history document
//!
//! One JSON object holds every conversation, keyed by pipeline name. Saves
//! are read-modify-write under a process-wide lock and land through a
//! temporary file plus rename, so a crash never leaves a torn document.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};

use crate::engine::{ChatMessage, Role};
use crate::{Error, Result};

/// Handle to the shared history file, or an in-memory stand-in
#[derive(Debug)]
pub struct HistoryDocument {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl HistoryDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// A document that never touches disk
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the stored conversation for `key`
    ///
    /// Entries that are not user or assistant messages are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self, key: &str) -> Result<Vec<ChatMessage>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let document = read_document(path)?;

        let Some(entries) = document.get(key) else {
            return Ok(Vec::new());
        };
        let Value::Array(entries) = entries else {
            return Err(Error::Config(format!(
                "history for '{key}' is not a list"
            )));
        };

        Ok(entries
            .iter()
            .filter_map(|entry| serde_json::from_value::<ChatMessage>(entry.clone()).ok())
            .filter(|message| message.role != Role::System)
            .collect())
    }

    /// Replace the stored conversation for `key`
    ///
    /// Other keys are left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the existing document is unreadable or the write fails
    pub fn store(&self, key: &str, messages: &[ChatMessage]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = read_document(path)?;
        document.insert(key.to_string(), serde_json::to_value(messages)?);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &Value::Object(document))?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Config(format!(
            "history document {} is not a JSON object",
            path.display()
        ))),
    }
}
