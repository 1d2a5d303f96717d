//! `parlor history`: print a page of a persona's conversation.

use chrono::{DateTime, FixedOffset, Utc};
use parlor_agent::HistoryPage;
use parlor_core::PersonaId;
use std::path::Path;

pub async fn run(
    config_path: &Path,
    persona: u32,
    index: i64,
    count: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::build_engine(config_path)?;
    let page = engine.read_history(PersonaId(persona), index, count).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    let offset = FixedOffset::east_opt(engine.config().utc_offset_minutes * 60);
    print!("{}", render_page(&page, offset));
    Ok(())
}

/// One line per entry followed by a summary line.
fn render_page(page: &HistoryPage, offset: Option<FixedOffset>) -> String {
    let mut out = String::new();
    for entry in &page.entries {
        let when = DateTime::<Utc>::from_timestamp(entry.timestamp, 0)
            .zip(offset)
            .map(|(ts, offset)| ts.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let role = serde_json::to_value(entry.role)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        out.push_str(&format!("{when}  {role:<13} {}\n", entry.text.replace('\n', "\n                                ")));
    }
    out.push_str(&format!(
        "-- {} of {} entries, {} tokens, {} user messages in the last 8h\n",
        page.entries.len(),
        page.total,
        page.stats.total_tokens,
        page.stats.user_last_8h,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_agent::TalkStats;
    use parlor_core::entry::{ConversationEntry, EntryFields, EntryId};

    #[test]
    fn renders_entries_in_local_time() {
        let entry = ConversationEntry::from_fields(
            EntryId::from("a"),
            EntryFields::user("hello\nthere").at(1_738_325_045),
        );
        let page = HistoryPage {
            entries: vec![entry],
            total: 7,
            stats: TalkStats::default(),
            hash: String::new(),
        };

        let text = render_page(&page, FixedOffset::east_opt(9 * 3600));
        let mut lines = text.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("2025-01-31 21:04  user"));
        assert!(first.ends_with("hello"));
        assert!(lines.next().unwrap().trim() == "there");
        assert!(text.contains("1 of 7 entries"));
    }
}
