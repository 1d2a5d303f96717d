//! Separating `<think>` blocks from a finished response.

use regex_lite::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("Invalid think regex"));

/// Split a response into its visible text and the reasoning of its first
/// `<think>` block. Every block is removed from the text.
pub fn split_reasoning(text: &str) -> (String, Option<String>) {
    let reasoning = THINK_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    match reasoning {
        Some(reasoning) => {
            let visible = THINK_BLOCK.replace_all(text, "").trim().to_string();
            (visible, Some(reasoning))
        }
        None => (text.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(split_reasoning("  hello  "), ("  hello  ".to_string(), None));
    }

    #[test]
    fn think_block_moves_to_reasoning() {
        let (text, reasoning) = split_reasoning("<think>\n plan the reply \n</think>\n\nHi there!");
        assert_eq!(text, "Hi there!");
        assert_eq!(reasoning.as_deref(), Some("plan the reply"));
    }

    #[test]
    fn every_block_is_stripped_but_first_kept() {
        let (text, reasoning) = split_reasoning("<think>a</think>one <think>b</think>two");
        assert_eq!(text, "one two");
        assert_eq!(reasoning.as_deref(), Some("a"));
    }

    #[test]
    fn unterminated_block_stays_visible() {
        let (text, reasoning) = split_reasoning("<think>still going");
        assert_eq!(text, "<think>still going");
        assert!(reasoning.is_none());
    }
}
