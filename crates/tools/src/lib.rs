//! Built-in persona tools.
//!
//! Tools give a persona a little agency over its own surroundings: it can
//! look up how the application works, keep short memories, and read and
//! write files in its project folder. Each tool is gated by a feature flag.

pub mod howto;
pub mod path;
pub mod project;
pub mod update_memory;

use parlor_config::FeatureConfig;
use parlor_core::tool::ToolRegistry;
use parlor_store::{MemoryStore, PersonaPaths};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use howto::HowtoTool;
pub use path::{PathValidationError, resolve_project_file};
pub use project::{ReadProjectFileTool, WriteProjectFileTool};
pub use update_memory::UpdateMemoryTool;

/// The tools enabled for one persona.
///
/// `cancel` aborts lock waits inside tools when the process shuts down.
pub fn persona_registry(
    features: &FeatureConfig,
    paths: &PersonaPaths,
    memory: Arc<MemoryStore>,
    cancel: CancellationToken,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if features.howto {
        registry.register(Box::new(HowtoTool));
    }
    if features.memory {
        registry.register(Box::new(UpdateMemoryTool::new(memory, cancel)));
    }
    if features.project {
        registry.register(Box::new(ReadProjectFileTool::new(paths.project_dir())));
        registry.register(Box::new(WriteProjectFileTool::new(paths.project_dir())));
    }
    registry
}
