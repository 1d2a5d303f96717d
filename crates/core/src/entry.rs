//! Conversation entries: the persisted unit of a persona's history.
//!
//! Entries flow: caller builds [`EntryFields`] → store assigns an [`EntryId`]
//! and a token count → the entry is appended to the persona's log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a persisted entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    System,
    User,
    Assistant,
    Tool,
    /// An application-level message (error diagnosis, timer event).
    SystemNotice,
    #[serde(other)]
    Unknown,
}

impl EntryRole {
    /// Role used for merging and rendering: notices travel as user input.
    pub fn effective(self) -> Self {
        match self {
            Self::SystemNotice => Self::User,
            other => other,
        }
    }

    /// Whether the entry is written by the human side of the conversation.
    pub fn is_user_side(self) -> bool {
        matches!(self, Self::User | Self::SystemNotice)
    }
}

/// Structured payload of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDetail {
    /// The model's tool call id
    pub call_id: String,

    /// Tool name
    pub name: String,

    /// Arguments as sent by the model
    pub arguments: serde_json::Value,

    /// Tool output, once the call succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message, once the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolDetail {
    pub fn pending(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
            result: None,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }

    /// Content handed back to the model for this call.
    pub fn outcome_text(&self) -> String {
        match (&self.result, &self.error) {
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => "pending".into(),
        }
    }
}

/// One persisted turn or fragment of a persona's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: EntryId,

    pub role: EntryRole,

    #[serde(default)]
    pub text: String,

    /// Model reasoning, or the raw error for failure notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_detail: Option<ToolDetail>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<u32>,

    /// Unix seconds
    pub timestamp: i64,

    /// Cached estimate, recomputed on every write
    #[serde(default)]
    pub token_count: usize,
}

impl ConversationEntry {
    /// Materialize fields under the given id. The token count is left at 0
    /// for the store to fill in.
    pub fn from_fields(id: EntryId, fields: EntryFields) -> Self {
        Self {
            id,
            role: fields.role,
            text: fields.text,
            reasoning: fields.reasoning,
            tool_detail: fields.tool_detail,
            attachment_ids: fields.attachment_ids,
            timestamp: fields.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
            token_count: 0,
        }
    }
}

/// Caller-supplied content of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFields {
    pub role: EntryRole,
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_detail: Option<ToolDetail>,
    pub attachment_ids: Vec<u32>,
    /// Unix seconds; `None` stamps the write time.
    pub timestamp: Option<i64>,
}

impl EntryFields {
    pub fn new(role: EntryRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            reasoning: None,
            tool_detail: None,
            attachment_ids: Vec::new(),
            timestamp: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(EntryRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(EntryRole::Assistant, text)
    }

    pub fn system_notice(text: impl Into<String>) -> Self {
        Self::new(EntryRole::SystemNotice, text)
    }

    pub fn tool(text: impl Into<String>, detail: ToolDetail) -> Self {
        Self::new(EntryRole::Tool, text).with_tool_detail(detail)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_detail(mut self, detail: ToolDetail) -> Self {
        self.tool_detail = Some(detail);
        self
    }

    pub fn with_attachments(mut self, ids: Vec<u32>) -> Self {
        self.attachment_ids = ids;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A write request against the log.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDraft {
    /// Append a new entry with a fresh id.
    New(EntryFields),
    /// Overwrite `id` in place and discard every later entry.
    Edit { id: EntryId, fields: EntryFields },
}

impl EntryDraft {
    pub fn fields(&self) -> &EntryFields {
        match self {
            Self::New(fields) | Self::Edit { fields, .. } => fields,
        }
    }
}
