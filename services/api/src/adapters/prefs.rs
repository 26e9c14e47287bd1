//! services/api/src/adapters/prefs.rs
//!
//! A `PrefStore` persisted as one flat JSON object on disk. Each user sees the
//! file through a key prefix.
//!
//! Reads and writes hit the in-memory map; the file is rewritten by a background
//! task, so callers on the async path never wait on the disk.

use collection_core::ports::{PortError, PortResult, PrefStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

enum FileWrite {
    Snapshot(String),
    Flush(oneshot::Sender<()>),
}

pub struct JsonFilePrefs {
    values: Mutex<BTreeMap<String, bool>>,
    writes: mpsc::UnboundedSender<FileWrite>,
}

impl JsonFilePrefs {
    /// Opens the file at `path` and starts its writer task. A missing or
    /// unreadable file starts out empty.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Ignoring malformed preferences file: {}", e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        let (writes, pending) = mpsc::unbounded_channel();
        tokio::spawn(write_behind(path, pending));
        Self {
            values: Mutex::new(values),
            writes,
        }
    }

    pub fn for_user(self: &Arc<Self>, user_id: Uuid) -> UserPrefs {
        UserPrefs {
            file: self.clone(),
            prefix: format!("{user_id}:"),
        }
    }

    /// Waits until every change made so far has been written (or failed to).
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.writes.send(FileWrite::Flush(done)).is_ok() {
            let _ = written.await;
        }
    }
}

/// Writes snapshots in the order they were taken. Failures are logged; the
/// in-memory values stay authoritative.
async fn write_behind(path: PathBuf, mut pending: mpsc::UnboundedReceiver<FileWrite>) {
    while let Some(write) = pending.recv().await {
        match write {
            FileWrite::Snapshot(json) => {
                if let Err(e) = tokio::fs::write(&path, json).await {
                    warn!(path = %path.display(), "Could not write preferences file: {}", e);
                }
            }
            FileWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl PrefStore for JsonFilePrefs {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.lock().ok()?.get(key).copied()
    }

    fn set_bool(&self, key: &str, value: bool) -> PortResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        values.insert(key.to_string(), value);
        let json = serde_json::to_string_pretty(&*values)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        // Queued while the lock is held so snapshots reach the writer in order.
        self.writes
            .send(FileWrite::Snapshot(json))
            .map_err(|_| PortError::Unexpected("Preferences writer stopped".into()))
    }
}

/// One user's view of the shared preferences file.
pub struct UserPrefs {
    file: Arc<JsonFilePrefs>,
    prefix: String,
}

impl PrefStore for UserPrefs {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.file.get_bool(&format!("{}{key}", self.prefix))
    }

    fn set_bool(&self, key: &str, value: bool) -> PortResult<()> {
        self.file.set_bool(&format!("{}{key}", self.prefix), value)
    }
}
