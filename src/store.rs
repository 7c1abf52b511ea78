//! JSON-array file persistence shared by the note and calendar stores.
//!
//! Every mutation re-reads the file, edits the full list in memory and
//! rewrites the whole file pretty-printed. A file that cannot be parsed is
//! treated as an empty store and reported as a warning; the next save
//! overwrites it.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;

/// Entries that carry a store-assigned numeric id.
pub trait Identified {
    fn id(&self) -> u64;
}

/// Next id for a collection: one past the largest existing id, or 1 when empty.
pub fn next_id<T: Identified>(entries: &[T]) -> u64 {
    entries.iter().map(Identified::id).max().map_or(1, |max| max + 1)
}

/// A JSON array of `T` stored at a fixed path.
pub struct JsonFile<T> {
    path: PathBuf,
    label: &'static str,
    warnings: Vec<String>,
    reported_corrupt: bool,
    _entries: PhantomData<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
            warnings: Vec::new(),
            reported_corrupt: false,
            _entries: PhantomData,
        }
    }

    /// Reads the collection, treating a missing, empty or unreadable file as empty.
    ///
    /// # Details
    /// Parse and read failures are logged and queued as a user-facing warning
    /// once, until the file is readable again or overwritten.
    pub fn load(&mut self) -> Vec<T> {
        match self.try_load() {
            Ok(entries) => {
                self.reported_corrupt = false;
                entries
            }
            Err(_) if self.reported_corrupt => Vec::new(),
            Err(err) => {
                self.reported_corrupt = true;
                warn!(
                    "event=store_load store={} status=corrupt path={} error={:#}",
                    self.label,
                    self.path.display(),
                    err
                );
                self.warnings.push(format!(
                    "My {} file seems corrupted. I'm starting with a fresh {}.",
                    self.label, self.label
                ));
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Rewrites the whole file with `entries`.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&mut self, entries: &[T]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .with_context(|| format!("Failed to serialize {}", self.path.display()))?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.reported_corrupt = false;
        debug!(
            "event=store_save store={} entries={} path={}",
            self.label,
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Drains warnings raised by earlier loads.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
