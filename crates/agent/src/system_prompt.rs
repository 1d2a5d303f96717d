//! System prompt assembly.
//!
//! The persona prompt is sent as written. Everything the application adds
//! (memories, the project file list, statistics, the current time) goes in
//! a single `<system>` block after it, so the model can tell the two apart.

use chrono::{FixedOffset, Offset, Utc};
use parlor_config::FeatureConfig;
use parlor_core::error::StoreError;
use parlor_store::{MemoryItem, MemoryStore, PersonaPaths};
use std::path::Path;
use crate::context::TIMESTAMP_FORMAT;
use crate::stats::TalkStats;

/// Inputs of the system prompt, gathered once per request round.
#[derive(Debug, Clone, Default)]
pub struct PromptParts {
    pub persona_prompt: String,
    pub memories: Vec<MemoryItem>,
    /// `None` when the project feature is off
    pub project_files: Option<Vec<String>>,
    /// `None` unless the current time is shown instead of timestamps
    pub current_time: Option<String>,
    pub offset: Option<FixedOffset>,
    pub statistics: bool,
}

impl PromptParts {
    /// Read the persona's prompt, memories and project folder.
    pub async fn gather(
        paths: &PersonaPaths,
        memory: &MemoryStore,
        features: &FeatureConfig,
        offset: FixedOffset,
    ) -> Result<Self, StoreError> {
        let persona_prompt = paths
            .read_system_prompt()
            .map_err(|e| StoreError::Storage(format!("Failed to read system prompt: {e}")))?;

        let memories = if features.memory {
            memory.list().await?
        } else {
            Vec::new()
        };

        let project_files = if features.project {
            Some(list_project_files(&paths.project_dir()).await?)
        } else {
            None
        };

        let current_time = (features.current_time && !features.timestamps).then(|| {
            let now = Utc::now().with_timezone(&offset);
            format!("{} (UTC{})", now.format(TIMESTAMP_FORMAT), offset)
        });

        Ok(Self {
            persona_prompt,
            memories,
            project_files,
            current_time,
            offset: Some(offset),
            statistics: features.statistics,
        })
    }

    /// The full system prompt. `stats` is ignored when statistics are off.
    pub fn render(&self, stats: Option<&TalkStats>) -> String {
        let offset = self.offset.unwrap_or_else(|| Utc.fix());
        let mut additional = String::new();

        for item in &self.memories {
            let updated = item.updated_at.with_timezone(&offset).format(TIMESTAMP_FORMAT);
            additional.push_str(&format!(
                "\n\n<memory id='{}' updated_at='{updated}'>{}</memory>",
                item.id, item.text
            ));
        }

        if let Some(files) = &self.project_files {
            additional.push_str(&format!("\n\n<project_files>\n{}\n</project_files>", files.join("\n")));
        }

        if self.statistics
            && let Some(stats) = stats
        {
            additional.push_str("\n\n");
            additional.push_str(&stats.render_tag());
        }

        if let Some(now) = &self.current_time {
            additional.push_str(&format!("\n\n<current_time>{now}</current_time>"));
        }

        if additional.is_empty() {
            self.persona_prompt.clone()
        } else {
            format!("{}\n\n<system>{additional}</system>", self.persona_prompt)
        }
    }
}

/// File names in the project folder, sorted. A missing folder is empty.
async fn list_project_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Storage(format!("Failed to list project files: {e}"))),
    };

    let mut names = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to list project files: {e}")))?
    {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parlor_core::PersonaId;
    use parlor_store::PersonaLock;

    fn memory_item(id: u32, text: &str) -> MemoryItem {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
        MemoryItem {
            id,
            text: text.into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn bare_prompt_has_no_system_block() {
        let parts = PromptParts {
            persona_prompt: "You are Mika.".into(),
            ..PromptParts::default()
        };
        assert_eq!(parts.render(None), "You are Mika.");
    }

    #[test]
    fn additions_go_in_one_system_block_in_order() {
        let parts = PromptParts {
            persona_prompt: "You are Mika.".into(),
            memories: vec![memory_item(1, "likes tea")],
            project_files: Some(vec!["notes.md".into(), "plan.txt".into()]),
            current_time: Some("2025-03-01 (Sat) 17:30:00 (UTC+09:00)".into()),
            offset: FixedOffset::east_opt(9 * 3600),
            statistics: true,
        };
        let stats = TalkStats {
            total: 2,
            archived: 0,
            user_last_8h: 1,
            need_rest_reminder: false,
            total_tokens: 210,
            raw_system_prompt_tokens: 4,
            built_system_prompt_tokens: 40,
        };

        let prompt = parts.render(Some(&stats));
        assert_eq!(
            prompt,
            "You are Mika.\n\n<system>\
             \n\n<memory id='1' updated_at='2025-03-01 (Sat) 17:30:00'>likes tea</memory>\
             \n\n<project_files>\nnotes.md\nplan.txt\n</project_files>\
             \n\n<conversations_statistics total='2' archived='0' user_messages_last_8h='1' total_tokens='210'/>\
             \n\n<current_time>2025-03-01 (Sat) 17:30:00 (UTC+09:00)</current_time></system>"
        );

        // Statistics are left out when the prompt is built for counting
        assert!(!parts.render(None).contains("conversations_statistics"));
    }

    #[test]
    fn empty_project_folder_still_listed() {
        let parts = PromptParts {
            project_files: Some(Vec::new()),
            ..PromptParts::default()
        };
        assert_eq!(parts.render(None), "\n\n<system>\n\n<project_files>\n\n</project_files></system>");
    }

    #[tokio::test]
    async fn gather_reads_persona_folder() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PersonaPaths::new(dir.path(), PersonaId(1));
        std::fs::create_dir_all(paths.project_dir()).unwrap();
        std::fs::write(paths.system_prompt(), "You are Mika.").unwrap();
        std::fs::write(paths.project_dir().join("b.txt"), "b").unwrap();
        std::fs::write(paths.project_dir().join("a.md"), "a").unwrap();

        let memory = MemoryStore::new(paths.memory(), PersonaLock::in_process());
        memory
            .upsert(&tokio_util::sync::CancellationToken::new(), 0, "likes tea")
            .await
            .unwrap();

        let features = FeatureConfig::default();
        let parts = PromptParts::gather(&paths, &memory, &features, Utc.fix()).await.unwrap();
        assert_eq!(parts.persona_prompt, "You are Mika.");
        assert_eq!(parts.memories.len(), 1);
        assert_eq!(parts.project_files, Some(vec!["a.md".to_string(), "b.txt".to_string()]));
        // Timestamps are on by default, so no current time
        assert!(parts.current_time.is_none());
    }

    #[tokio::test]
    async fn gather_respects_feature_flags() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PersonaPaths::new(dir.path(), PersonaId(2));
        let memory = MemoryStore::new(paths.memory(), PersonaLock::in_process());

        let features = FeatureConfig {
            memory: false,
            project: false,
            timestamps: false,
            ..FeatureConfig::default()
        };
        let parts = PromptParts::gather(&paths, &memory, &features, Utc.fix()).await.unwrap();
        assert!(parts.persona_prompt.is_empty());
        assert!(parts.project_files.is_none());
        let now = parts.current_time.unwrap();
        assert!(now.ends_with("(UTC+00:00)"));
    }
}
