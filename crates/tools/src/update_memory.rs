//! `update_memory`: add, change or delete one of the persona's memories.

use async_trait::async_trait;
use parlor_core::error::ToolError;
use parlor_core::tool::{Tool, ToolResult};
use parlor_store::MemoryStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest memory accepted, in characters.
pub const MAX_MEMORY_CHARS: usize = 500;

pub struct UpdateMemoryTool {
    store: Arc<MemoryStore>,
    cancel: CancellationToken,
}

impl UpdateMemoryTool {
    pub fn new(store: Arc<MemoryStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    fn failed(&self, e: impl std::fmt::Display) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "update_memory".into(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn name(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        "Add or update a short memory (500 characters at most). Empty content deletes the memory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "integer",
                    "description": "Memory id (0 for a new memory)"
                },
                "content": {
                    "type": "string",
                    "description": "New content (empty to delete)"
                }
            },
            "required": ["id", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let id = match &arguments["id"] {
            serde_json::Value::Null => 0,
            value => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| ToolError::InvalidArguments(format!("update_memory: invalid id {value}")))?,
        };
        let content = arguments["content"].as_str().unwrap_or_default();

        if content.chars().count() > MAX_MEMORY_CHARS {
            return Err(ToolError::InvalidArguments(format!(
                "content is longer than {MAX_MEMORY_CHARS} characters; consider saving it to the project folder instead"
            )));
        }

        if content.trim().is_empty() {
            let removed = self.store.remove(&self.cancel, id).await.map_err(|e| self.failed(e))?;
            debug!(memory_id = id, removed, "Memory delete requested");
            return if removed {
                Ok(ToolResult::ok("Memory deleted."))
            } else {
                Err(self.failed(format!("no memory with id {id}")))
            };
        }

        let written = self
            .store
            .upsert(&self.cancel, id, content)
            .await
            .map_err(|e| self.failed(e))?;
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("Memory {written} updated."),
            data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_store::PersonaLock;

    fn tool(dir: &tempfile::TempDir) -> (UpdateMemoryTool, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(
            dir.path().join("memory.json"),
            PersonaLock::with_marker(dir.path().join("memory.json.lock")),
        ));
        (UpdateMemoryTool::new(store.clone(), CancellationToken::new()), store)
    }

    #[tokio::test]
    async fn add_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, store) = tool(&dir);

        let result = tool
            .execute(serde_json::json!({"id": 0, "content": "likes green tea"}))
            .await
            .unwrap();
        assert_eq!(result.output, "Memory 1 updated.");

        tool.execute(serde_json::json!({"id": 1, "content": "likes matcha"}))
            .await
            .unwrap();
        let items = store.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "likes matcha");

        let result = tool.execute(serde_json::json!({"id": 1, "content": ""})).await.unwrap();
        assert_eq!(result.output, "Memory deleted.");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn too_long_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, store) = tool(&dir);

        let long = "あ".repeat(MAX_MEMORY_CHARS + 1);
        let err = tool
            .execute(serde_json::json!({"id": 0, "content": long}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(store.list().await.unwrap().is_empty());

        // Exactly at the limit is fine
        let exact = "あ".repeat(MAX_MEMORY_CHARS);
        assert!(tool.execute(serde_json::json!({"content": exact})).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _) = tool(&dir);
        let err = tool
            .execute(serde_json::json!({"id": 9, "content": " "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn negative_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _) = tool(&dir);
        let err = tool
            .execute(serde_json::json!({"id": -1, "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
