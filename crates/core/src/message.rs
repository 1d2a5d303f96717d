//! Outbound chat turns.
//!
//! A [`ChatTurn`] is one unit of conversation sent to the provider. It may be
//! the merge of several persisted entries, so it carries no entry id.

use serde::{Deserialize, Serialize};
use crate::entry::{EntryRole, ToolDetail};

/// The role of a turn on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (and application notices)
    User,
    /// The persona's model
    Assistant,
    /// System instructions
    System,
    /// Tool invocations and their results
    Tool,
}

impl Role {
    /// Wire role of a persisted entry role. Unknown entries have none.
    pub fn from_entry(role: EntryRole) -> Option<Self> {
        match role.effective() {
            EntryRole::User => Some(Self::User),
            EntryRole::Assistant => Some(Self::Assistant),
            EntryRole::System => Some(Self::System),
            EntryRole::Tool => Some(Self::Tool),
            EntryRole::SystemNotice | EntryRole::Unknown => None,
        }
    }
}

/// One outbound turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,

    pub content: String,

    /// Attachment ids still retained after the cutoff
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<u32>,

    /// Tool invocations carried by a tool turn, in call order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_details: Vec<ToolDetail>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            tool_details: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roles_map_to_wire_roles() {
        assert_eq!(Role::from_entry(EntryRole::SystemNotice), Some(Role::User));
        assert_eq!(Role::from_entry(EntryRole::Tool), Some(Role::Tool));
        assert_eq!(Role::from_entry(EntryRole::Unknown), None);
    }

    #[test]
    fn turn_serialization_skips_empty_lists() {
        let turn = ChatTurn::user("Hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"Hello"}"#);
    }
}
