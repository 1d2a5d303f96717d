//! Project folder tools: read and write flat files in the persona's
//! `project/` directory.

use async_trait::async_trait;
use parlor_core::error::ToolError;
use parlor_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use tracing::debug;
use crate::path::{resolve_project_file, safe_write_name};

fn file_name_arg(tool_name: &str, arguments: &serde_json::Value) -> Result<String, ToolError> {
    arguments["file_name"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{tool_name}: missing 'file_name' argument")))
}

fn denied(tool_name: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: tool_name.into(),
        reason: e.to_string(),
    }
}

pub struct ReadProjectFileTool {
    project_dir: PathBuf,
}

impl ReadProjectFileTool {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadProjectFileTool {
    fn name(&self) -> &str {
        "read_project_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in your project folder."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "Name of the file to read"
                }
            },
            "required": ["file_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = file_name_arg(self.name(), &arguments)?;

        // No folder yet means no files yet
        if !self.project_dir.exists() {
            return Ok(ToolResult::ok(""));
        }

        let path = resolve_project_file(&self.project_dir, &name).map_err(|e| denied(self.name(), e))?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            // A missing file reads as empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ToolResult::ok("")),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to read {name}: {e}"),
            }),
        }
    }
}

pub struct WriteProjectFileTool {
    project_dir: PathBuf,
}

impl WriteProjectFileTool {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteProjectFileTool {
    fn name(&self) -> &str {
        "write_project_file"
    }

    fn description(&self) -> &str {
        "Save content as a file in your project folder."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "Name of the file to save"
                },
                "content": {
                    "type": "string",
                    "description": "Content to save"
                }
            },
            "required": ["file_name", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = safe_write_name(&file_name_arg(self.name(), &arguments)?);
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("write_project_file: missing 'content' argument".into()))?;

        tokio::fs::create_dir_all(&self.project_dir)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to create project folder: {e}"),
            })?;

        let path = resolve_project_file(&self.project_dir, &name).map_err(|e| denied(self.name(), e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to write {name}: {e}"),
            })?;

        debug!(file = %path.display(), bytes = content.len(), "Project file written");
        Ok(ToolResult::ok(format!("Saved file: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");

        let write = WriteProjectFileTool::new(&project);
        let result = write
            .execute(serde_json::json!({"file_name": "plan.md", "content": "# Plan"}))
            .await
            .unwrap();
        assert_eq!(result.output, "Saved file: plan.md");

        let read = ReadProjectFileTool::new(&project);
        let result = read.execute(serde_json::json!({"file_name": "plan.md"})).await.unwrap();
        assert_eq!(result.output, "# Plan");
    }

    #[tokio::test]
    async fn dangerous_extension_saved_as_txt() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteProjectFileTool::new(dir.path());
        let result = write
            .execute(serde_json::json!({"file_name": "run.sh", "content": "rm -rf /"}))
            .await
            .unwrap();
        assert_eq!(result.output, "Saved file: run.txt");
        assert!(dir.path().join("run.txt").exists());
        assert!(!dir.path().join("run.sh").exists());
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadProjectFileTool::new(dir.path());
        let result = read.execute(serde_json::json!({"file_name": "nope.txt"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "");

        let absent = ReadProjectFileTool::new(dir.path().join("never-created"));
        let result = absent.execute(serde_json::json!({"file_name": "a.txt"})).await.unwrap();
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "hidden").unwrap();

        let read = ReadProjectFileTool::new(&project);
        let err = read
            .execute(serde_json::json!({"file_name": "../secret.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));

        let write = WriteProjectFileTool::new(&project);
        let err = write
            .execute(serde_json::json!({"file_name": "../escape.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn missing_arguments() {
        let write = WriteProjectFileTool::new("/tmp/parlor-never-used");
        let err = write.execute(serde_json::json!({"file_name": "a.txt"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
