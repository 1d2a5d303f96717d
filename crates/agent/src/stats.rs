//! Conversation statistics and the history page hash.

use parlor_config::GenerationSnapshot;
use parlor_core::entry::{ConversationEntry, EntryRole};
use parlor_core::token::{estimate_tokens, total_tokens, window_start};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Window over which user activity is counted for the rest reminder.
pub const ACTIVITY_WINDOW_SECS: i64 = 8 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TalkStats {
    /// Entries in the log
    pub total: usize,
    /// Entries that fall outside the trimmed window
    pub archived: usize,
    /// User messages in the last 8 hours
    pub user_last_8h: usize,
    pub need_rest_reminder: bool,
    /// Every entry plus the fixed overhead
    pub total_tokens: usize,
    pub raw_system_prompt_tokens: usize,
    pub built_system_prompt_tokens: usize,
}

impl TalkStats {
    /// Compute the statistics of `entries` against a system prompt.
    ///
    /// `built_prompt` must be rendered without statistics; the numbers then
    /// describe the window the statistics themselves will be added to.
    pub fn compute(
        entries: &[ConversationEntry],
        raw_prompt: &str,
        built_prompt: &str,
        snapshot: &GenerationSnapshot,
        now: i64,
    ) -> Self {
        let built_tokens = estimate_tokens(built_prompt);
        let archived = window_start(
            built_tokens,
            entries,
            snapshot.overhead_tokens,
            snapshot.token_budget,
        );

        let since = now - ACTIVITY_WINDOW_SECS;
        let user_last_8h = entries
            .iter()
            .filter(|e| e.role == EntryRole::User && e.timestamp >= since)
            .count();

        Self {
            total: entries.len(),
            archived,
            user_last_8h,
            need_rest_reminder: user_last_8h >= snapshot.break_reminder_threshold,
            total_tokens: total_tokens(entries) + snapshot.overhead_tokens,
            raw_system_prompt_tokens: estimate_tokens(raw_prompt),
            built_system_prompt_tokens: built_tokens,
        }
    }

    /// The `<conversations_statistics/>` tag embedded in the system prompt.
    pub fn render_tag(&self) -> String {
        let mut tag = format!(
            "<conversations_statistics total='{}' archived='{}' user_messages_last_8h='{}' total_tokens='{}'",
            self.total, self.archived, self.user_last_8h, self.total_tokens
        );
        if self.need_rest_reminder {
            tag.push_str(" need_rest_reminder='true'");
        }
        tag.push_str("/>");
        tag
    }
}

/// Hex SHA-256 of a serialized history page. Consumers compare it to skip
/// redrawing unchanged pages.
pub fn page_hash(entries: &[ConversationEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        // Serializing a plain data struct cannot fail
        let line = serde_json::to_vec(entry).unwrap_or_default();
        hasher.update(&line);
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
