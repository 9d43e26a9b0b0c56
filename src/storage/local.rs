//! Local filesystem state store.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml             # Monitor configuration
//! ├── closure_history.json    # Per-tunnel transition log
//! └── statistics.json         # Derived daily aggregates (cache)
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ClosureHistoryEntry, DailyStatistics, PersistedState};
use crate::storage::StateStore;

const HISTORY_FILE: &str = "closure_history.json";
const STATISTICS_FILE: &str = "statistics.json";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data. Corrupt content counts as absent.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(error) => {
                    log::warn!("Discarding corrupt {}: {}", key, error);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for LocalStore {
    async fn load(&self) -> Result<PersistedState> {
        let closure_history: HashMap<String, VecDeque<ClosureHistoryEntry>> = self
            .read_json(HISTORY_FILE)
            .await
            .unwrap_or_else(|error| {
                log::warn!("History load failed: {}", error);
                None
            })
            .unwrap_or_default();

        let statistics: DailyStatistics = self
            .read_json(STATISTICS_FILE)
            .await
            .unwrap_or_else(|error| {
                log::warn!("Statistics load failed: {}", error);
                None
            })
            .unwrap_or_default();

        Ok(PersistedState {
            closure_history,
            statistics,
        })
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        self.write_json(HISTORY_FILE, &state.closure_history)
            .await
            .map_err(|e| AppError::persistence(format!("{}: {}", HISTORY_FILE, e)))?;
        self.write_json(STATISTICS_FILE, &state.statistics)
            .await
            .map_err(|e| AppError::persistence(format!("{}: {}", STATISTICS_FILE, e)))?;
        Ok(())
    }
}
