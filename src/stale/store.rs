// src/stale/store.rs

//! The persisted check-value store.
//!
//! A single JSON file in the state directory maps resource names to the
//! value their probe returned last, plus when that value was first seen.
//! Loading tolerates a missing or corrupt file by starting empty; flushing
//! goes through write-to-temp-then-rename so a crash mid-run cannot corrupt
//! already-committed entries.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::Result;

pub const STORE_FILE: &str = "checks.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEntry {
    pub value: String,
    /// Seconds since the Unix epoch at which `value` was first recorded.
    pub recorded_at: u64,
}

#[derive(Debug)]
pub struct CheckStore {
    path: PathBuf,
    entries: HashMap<String, CheckEntry>,
    dirty: bool,
}

impl CheckStore {
    /// Load the store from `state_dir`, starting empty when the file is
    /// missing or unreadable.
    pub fn load(state_dir: &Path) -> CheckStore {
        let path = state_dir.join(STORE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "check store is corrupt; starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded check store");
        CheckStore {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, resource: &str) -> Option<&CheckEntry> {
        self.entries.get(resource)
    }

    pub fn record(&mut self, resource: &str, value: String, recorded_at: u64) {
        self.entries.insert(
            resource.to_string(),
            CheckEntry { value, recorded_at },
        );
        self.dirty = true;
    }

    /// Drop a resource's entry so the next run reprobes from scratch.
    pub fn invalidate(&mut self, resource: &str) {
        if self.entries.remove(resource).is_some() {
            self.dirty = true;
        }
    }

    /// Write the store out atomically. A no-op when nothing changed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)
            .map_err(std::io::Error::from)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| std::io::Error::from(e.error))?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed check store");
        Ok(())
    }
}
