//! Append-only notification history persisted as a pretty-printed JSON array
//!
//! Each append loads the whole file, pushes one entry and rewrites it via a
//! temp file and rename. The store assumes a single writing process; other
//! writers on the same file need external locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::HistoryEntry;

/// Default history location, relative to the working directory
pub const DEFAULT_HISTORY_PATH: &str = "logs/notification_history.json";

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries in append order; a missing or empty file is empty history
    pub async fn load(&self) -> Result<Vec<HistoryEntry>> {
        load_entries(&self.path).await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Append one entry and persist; returns the new number of entries
    pub async fn append(&self, entry: HistoryEntry) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        entries.push(entry);
        self.persist(&entries).await?;

        debug!(path = %self.path.display(), entries = entries.len(), "History persisted");
        Ok(entries.len())
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec_pretty(entries).context("Failed to serialize history")?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json)
            .await
            .context("Failed to write history data")?;
        file.sync_all().await.context("Failed to sync history file")?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, self.path))?;

        Ok(())
    }
}

/// Read a history file; shared with tooling that only needs read access
pub async fn load_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read history file {:?}", path))
        }
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse history file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(timestamp: i64, remediation: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            cpu_usage: 92.0,
            analysis: "analysis".to_string(),
            logs: "OutOfMemory in app".to_string(),
            remediation: remediation.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        assert!(store.load().await.unwrap().is_empty());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("history.json");
        let store = HistoryStore::new(&path);

        assert_eq!(store.append(entry(1, "first")).await.unwrap(), 1);
        assert_eq!(store.append(entry(2, "second")).await.unwrap(), 2);

        let entries = store.load().await.unwrap();
        let order: Vec<&str> = entries.iter().map(|e| e.remediation.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_is_pretty_printed_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let store = HistoryStore::new(&path);
        store.append(entry(7, "Restarted app container")).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.starts_with("[\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["timestamp"], 7);
        assert_eq!(value[0]["remediation"], "Restarted app container");
    }

    #[tokio::test]
    async fn test_appends_to_existing_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(
            &path,
            r#"[{"timestamp":1,"cpu_usage":85.5,"analysis":"a","logs":"","remediation":"No action taken"}]"#,
        )
        .await
        .unwrap();

        let store = HistoryStore::new(&path);
        assert_eq!(store.append(entry(2, "x")).await.unwrap(), 2);
        assert_eq!(store.load().await.unwrap()[0].cpu_usage, 85.5);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_and_left_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = HistoryStore::new(&path);
        assert!(store.append(entry(1, "x")).await.is_err());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{not json");
    }
}
