//! Persistence layer.
//!
//! Saves and loads each trader's flips to/from a JSON file under the
//! configured history directory (`<dir>/<trader>.json`). Writes go to a
//! temp file first and are renamed into place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::history::{merge_flips, TradeHistoryStore};
use crate::types::{Flip, FlipperError};

/// Default history directory.
pub const DEFAULT_HISTORY_DIR: &str = "data/history";

/// On-disk shape of one trader's history.
#[derive(Debug, Serialize, Deserialize)]
struct TraderFile {
    trader: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    updated_at: DateTime<Utc>,
    flips: Vec<Flip>,
}

pub struct JsonHistoryStore {
    dir: PathBuf,
    /// Serialises read-merge-write cycles.
    write_lock: Mutex<()>,
}

impl JsonHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a trader. Bytes outside `[A-Za-z0-9-]` are written as
    /// `_XX` hex, so distinct names never share a file.
    pub fn path_for(&self, trader: &str) -> PathBuf {
        let mut safe = String::with_capacity(trader.len());
        for b in trader.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                safe.push(b as char);
            } else {
                safe.push_str(&format!("_{b:02X}"));
            }
        }
        self.dir.join(format!("{safe}.json"))
    }

    async fn read_file(&self, trader: &str) -> Result<Vec<Flip>, FlipperError> {
        let path = self.path_for(trader);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(trader, path = %path.display(), "No history file, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(FlipperError::Persistence(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let file: TraderFile = serde_json::from_str(&json).map_err(|e| {
            FlipperError::Persistence(format!("Failed to parse {}: {e}", path.display()))
        })?;
        Ok(file.flips)
    }

    /// Delete a trader's history file (for tests or reset).
    pub async fn delete_trader(&self, trader: &str) -> Result<(), FlipperError> {
        let path = self.path_for(trader);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlipperError::Persistence(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl TradeHistoryStore for JsonHistoryStore {
    async fn load_flips(&self, trader: &str) -> Result<Vec<Flip>, FlipperError> {
        self.read_file(trader).await
    }

    async fn save_flips(&self, trader: &str, flips: &[Flip]) -> Result<(), FlipperError> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_file(trader).await?;
        merge_flips(&mut all, flips);

        let file = TraderFile {
            trader: trader.to_string(),
            updated_at: Utc::now(),
            flips: all,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| FlipperError::Persistence(format!("Failed to serialise history: {e}")))?;

        let persist = |e: std::io::Error| FlipperError::Persistence(e.to_string());
        tokio::fs::create_dir_all(&self.dir).await.map_err(persist)?;
        let path = self.path_for(trader);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(persist)?;
        tokio::fs::rename(&tmp, &path).await.map_err(persist)?;

        info!(trader, flips = file.flips.len(), path = %path.display(), "History saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
