//! `howto`: describe the application so the persona can explain it.

use async_trait::async_trait;
use parlor_core::error::ToolError;
use parlor_core::tool::{Tool, ToolResult};

const HOWTO: &str = "Parlor is a self-hosted AI chat application.
Highlights:
- Talk freely with any OpenAI-compatible API service or a local LLM
- Several personas, each with its own system prompt, model and memories
- Timestamps on messages so conversations can take time into account
- Automatic context cutoff: the conversation can go on without a length limit
- Conversation statistics, including a reminder to take a break after many messages
- Old history and images are dropped from requests automatically to save tokens
- Memories keep important facts even when the conversation gets long
- A project folder for reading reference material and writing files
- A webhook that forwards responses to external services such as Discord
- A timer that lets the persona speak up on its own

Notes
- Follow the terms of service of the API provider you use.
- The user is responsible for the generated content.
- Tools run without asking for confirmation.
- Every tool can be switched on or off in the settings.

Explain this to the user in a way that fits your character.";

pub struct HowtoTool;

#[async_trait]
impl Tool for HowtoTool {
    fn name(&self) -> &str {
        "howto"
    }

    fn description(&self) -> &str {
        "Get a description of this application."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(HOWTO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_description() {
        let result = HowtoTool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("Parlor is"));
        assert!(result.output.contains("character"));
    }
}
