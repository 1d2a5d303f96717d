//! Token estimation and history trimming.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up. The
//! estimate only has to be deterministic and consistent between the cached
//! per-entry counts and the budget check.

use crate::entry::ConversationEntry;

/// Flat surcharge per attached image.
pub const ATTACHMENT_TOKENS: usize = 1024;

/// Default allowance for tool schemas and automatic insertions.
pub const DEFAULT_OVERHEAD_TOKENS: usize = 200;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate the cost of one entry: its text and serialized tool detail,
/// plus [`ATTACHMENT_TOKENS`] per attachment.
pub fn entry_tokens(entry: &ConversationEntry) -> usize {
    let detail = entry
        .tool_detail
        .as_ref()
        .and_then(|d| serde_json::to_string(d).ok())
        .unwrap_or_default();
    let body = format!("{}\n\n{}", entry.text, detail);
    estimate_tokens(&body) + entry.attachment_ids.len() * ATTACHMENT_TOKENS
}

/// Index of the first entry of the longest suffix that fits the budget.
///
/// Starts from `system_prompt_tokens + overhead`, walks newest to oldest and
/// stops at the first entry that would overflow. Returns `entries.len()`
/// when nothing fits.
pub fn window_start(
    system_prompt_tokens: usize,
    entries: &[ConversationEntry],
    overhead: usize,
    budget: usize,
) -> usize {
    let mut running = system_prompt_tokens + overhead;
    if running > budget {
        return entries.len();
    }

    let mut start = entries.len();
    for (i, entry) in entries.iter().enumerate().rev() {
        if running + entry.token_count > budget {
            break;
        }
        running += entry.token_count;
        start = i;
    }
    start
}

/// The longest contiguous tail of `entries` that fits the budget, in
/// chronological order.
pub fn trim_to_budget(
    system_prompt_tokens: usize,
    entries: &[ConversationEntry],
    overhead: usize,
    budget: usize,
) -> &[ConversationEntry] {
    let start = window_start(system_prompt_tokens, entries, overhead, budget);
    &entries[start..]
}

/// Sum of the cached token counts.
pub fn total_tokens(entries: &[ConversationEntry]) -> usize {
    entries.iter().map(|e| e.token_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryFields, EntryId, ToolDetail};

    fn sized(tokens: usize, text: &str) -> ConversationEntry {
        let mut entry = ConversationEntry::from_fields(EntryId::new(), EntryFields::user(text).at(0));
        entry.token_count = tokens;
        entry
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_bytes_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_bytes_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn entry_tokens_counts_separator_and_attachments() {
        // "abcdef" + "\n\n" = 8 bytes → 2 tokens
        let mut entry = sized(0, "abcdef");
        assert_eq!(entry_tokens(&entry), 2);

        entry.attachment_ids = vec![1, 2];
        assert_eq!(entry_tokens(&entry), 2 + 2 * ATTACHMENT_TOKENS);
    }

    #[test]
    fn entry_tokens_includes_tool_detail() {
        let mut entry = sized(0, "");
        let bare = entry_tokens(&entry);
        entry.tool_detail = Some(ToolDetail::pending(
            "call_1",
            "update_memory",
            serde_json::json!({"content": "likes tea"}),
        ));
        assert!(entry_tokens(&entry) > bare + 10);
    }

    #[test]
    fn keeps_last_three_of_five() {
        // base = 300 + 200 = 500; 150 × 3 = 450 fits, a fourth would be 1100
        let entries: Vec<_> = (0..5).map(|i| sized(150, &format!("m{i}"))).collect();
        let kept = trim_to_budget(300, &entries, 200, 1000);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].text, "m2");
        assert_eq!(kept[2].text, "m4");
    }

    #[test]
    fn stops_at_first_overflow_even_if_older_entries_fit() {
        let entries = vec![sized(10, "old"), sized(900, "huge"), sized(10, "new")];
        let kept = trim_to_budget(0, &entries, 0, 100);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "new");
    }

    #[test]
    fn base_over_budget_yields_empty_window() {
        let entries = vec![sized(1, "a")];
        assert!(trim_to_budget(900, &entries, 200, 1000).is_empty());
        assert_eq!(window_start(900, &entries, 200, 1000), 1);
    }

    #[test]
    fn exact_fit_is_included() {
        let entries = vec![sized(500, "a"), sized(500, "b")];
        assert_eq!(trim_to_budget(0, &entries, 0, 1000).len(), 2);
    }

    #[test]
    fn empty_history() {
        assert!(trim_to_budget(0, &[], 0, 10).is_empty());
        assert_eq!(total_tokens(&[]), 0);
    }
}
