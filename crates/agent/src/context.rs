//! Context building: from a trimmed history window to the turns sent to the
//! model.
//!
//! Three passes, in order:
//!
//! 1. **Attachment cutoff** strips attachments from entries more than `N`
//!    positions before the end of the window. Only the outbound copy changes.
//! 2. **Role merge** folds adjacent entries with the same effective role
//!    into one turn (a `SystemNotice` counts as `User`). Texts are joined
//!    with a blank line; tool details and attachments concatenate in order.
//! 3. **Rendering** maps roles to wire roles and appends a `<timestamp>` to
//!    user-side turns when timestamps are enabled.
//!
//! Entries with an unknown role are skipped.

use chrono::{DateTime, FixedOffset};
use parlor_core::entry::{ConversationEntry, EntryRole, ToolDetail};
use parlor_core::message::{ChatTurn, Role};
use tracing::warn;

/// Layout of rendered timestamps, e.g. `2025-01-31 (Fri) 21:04:05`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d (%a) %H:%M:%S";

/// An entry merged with its same-role neighbours.
struct MergedTurn {
    role: EntryRole,
    text: String,
    tool_details: Vec<ToolDetail>,
    attachments: Vec<u32>,
    timestamp: i64,
}

/// Render unix seconds in the given offset.
pub fn format_timestamp(timestamp: i64, offset: FixedOffset) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| utc.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string())
}

/// Build the outbound turns for `window`.
///
/// `attachment_cutoff <= 0` keeps every attachment. `timestamps` carries the
/// display offset when timestamps are enabled.
pub fn build_turns(
    window: &[ConversationEntry],
    attachment_cutoff: i32,
    timestamps: Option<FixedOffset>,
) -> Vec<ChatTurn> {
    let keep_from = if attachment_cutoff > 0 {
        window.len().saturating_sub(attachment_cutoff as usize)
    } else {
        0
    };

    let mut merged: Vec<MergedTurn> = Vec::new();
    for (i, entry) in window.iter().enumerate() {
        if entry.role == EntryRole::Unknown {
            warn!(entry_id = %entry.id, "Skipping entry with unknown role");
            continue;
        }

        let role = entry.role.effective();
        let attachments: &[u32] = if i < keep_from { &[] } else { &entry.attachment_ids };

        match merged.last_mut() {
            Some(last) if last.role == role => {
                last.text.push_str("\n\n");
                last.text.push_str(&entry.text);
                last.tool_details.extend(entry.tool_detail.iter().cloned());
                last.attachments.extend_from_slice(attachments);
            }
            _ => merged.push(MergedTurn {
                role,
                text: entry.text.clone(),
                tool_details: entry.tool_detail.iter().cloned().collect(),
                attachments: attachments.to_vec(),
                timestamp: entry.timestamp,
            }),
        }
    }

    merged
        .into_iter()
        .filter_map(|turn| render(turn, timestamps))
        .collect()
}

fn render(turn: MergedTurn, timestamps: Option<FixedOffset>) -> Option<ChatTurn> {
    let role = Role::from_entry(turn.role)?;
    let mut content = turn.text;

    if let Some(offset) = timestamps
        && turn.role.is_user_side()
        && turn.timestamp > 0
        && let Some(stamp) = format_timestamp(turn.timestamp, offset)
    {
        content.push_str(&format!("\n\n<timestamp>{stamp}</timestamp>"));
    }

    let mut chat = ChatTurn::new(role, content);
    chat.attachments = turn.attachments;
    chat.tool_details = turn.tool_details;
    Some(chat)
}
