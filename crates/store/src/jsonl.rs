//! File-based log backend: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `ConversationEntry`. Appends touch only the
//! end of the file; edits rewrite the whole file through a temporary file and
//! a rename, so a crash never leaves a half-written log behind.

use async_trait::async_trait;
use parlor_core::entry::ConversationEntry;
use parlor_core::error::StoreError;
use parlor_core::store::LogBackend;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse JSONL content, skipping blank and corrupted lines.
    fn parse(content: &str, path: &Path) -> Vec<ConversationEntry> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<ConversationEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = %path.display(), line = n + 1, error = %e, "Skipping corrupted log entry");
                    None
                }
            })
            .collect()
    }

    fn encode(entry: &ConversationEntry) -> Result<String, StoreError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize entry: {e}")))?;
        line.push('\n');
        Ok(line)
    }

    async fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create log directory: {e}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl LogBackend for JsonlLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn load(&self) -> Result<Vec<ConversationEntry>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let entries = Self::parse(&content, &self.path);
        debug!(path = %self.path.display(), count = entries.len(), "Conversation log loaded");
        Ok(entries)
    }

    async fn append(&self, entry: &ConversationEntry) -> Result<(), StoreError> {
        self.ensure_parent().await?;
        let line = Self::encode(entry)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to append entry: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to sync log: {e}")))?;
        Ok(())
    }

    async fn rewrite(&self, entries: &[ConversationEntry]) -> Result<(), StoreError> {
        self.ensure_parent().await?;

        let mut content = String::new();
        for entry in entries {
            content.push_str(&Self::encode(entry)?);
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write log: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace log: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::entry::{EntryFields, EntryId};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(text: &str) -> ConversationEntry {
        ConversationEntry::from_fields(EntryId::new(), EntryFields::user(text).at(100))
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::new(dir.path().join("nope").join("talk.jsonl"));
        assert!(log.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona_1").join("talk.jsonl");

        let log = JsonlLog::new(&path);
        log.append(&entry("first")).await.unwrap();
        log.append(&entry("second")).await.unwrap();
        drop(log);

        let reloaded = JsonlLog::new(&path).load().await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].text, "first");
        assert_eq!(reloaded[1].text, "second");
    }

    #[tokio::test]
    async fn rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.jsonl");
        let log = JsonlLog::new(&path);
        log.append(&entry("a")).await.unwrap();
        log.append(&entry("b")).await.unwrap();

        log.rewrite(&[entry("only")]).await.unwrap();

        let loaded = log.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "only");
        assert!(!dir.path().join("talk.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn skips_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        let good = serde_json::to_string(&entry("valid")).unwrap();
        writeln!(tmp, "{good}").unwrap();
        writeln!(tmp, "{{not json").unwrap();
        writeln!(tmp).unwrap();
        writeln!(tmp, "{good}").unwrap();

        let log = JsonlLog::new(tmp.path());
        let loaded = log.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
