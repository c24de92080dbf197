// Recent-URL history, persisted as JSON after every change

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::HistoryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub url: String,
    #[serde(default)]
    pub thumb_url: Option<String>,
}

/// Most-recent-first list of URLs, unique by url
#[derive(Debug)]
pub struct RecentUrls {
    path: PathBuf,
    limit: usize,
    entries: Vec<RecentEntry>,
}

impl RecentUrls {
    /// Read the list from `path`; a missing file starts empty
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };

        let mut history = Self {
            path,
            limit: limit.max(1),
            entries: dedupe(entries),
        };
        history.entries.truncate(history.limit);
        tracing::debug!(
            "[History] Loaded {} entries from {}",
            history.entries.len(),
            history.path.display()
        );
        Ok(history)
    }

    /// Load, falling back to an empty list when the file is unreadable
    pub fn load_or_empty(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        Self::load(&path, limit).unwrap_or_else(|e| {
            tracing::warn!("[History] {}; starting with an empty list", e);
            Self {
                path,
                limit: limit.max(1),
                entries: Vec::new(),
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RecentEntry] {
        &self.entries
    }

    /// Put `url` at the front, dropping any older record of it and the overflow
    pub fn add(&mut self, url: &str, thumb_url: Option<String>) -> Result<(), HistoryError> {
        self.entries.retain(|e| e.url != url);
        self.entries.insert(
            0,
            RecentEntry {
                url: url.to_string(),
                thumb_url,
            },
        );
        self.entries.truncate(self.limit);
        self.save()
    }

    /// Returns whether `url` was present
    pub fn remove(&mut self, url: &str) -> Result<bool, HistoryError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.url != url);
        let removed = self.entries.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.entries.clear();
        self.save()
    }

    fn save(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Keep the first (most recent) record of each url
fn dedupe(entries: Vec<RecentEntry>) -> Vec<RecentEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.url.clone()))
        .collect()
}
