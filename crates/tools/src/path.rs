//! Path validation for project files.
//!
//! Project files live directly inside the persona's project folder. A file
//! name is a single path component; anything that could address another
//! directory is rejected before the filesystem is touched, and the resolved
//! path is checked against the canonical folder afterwards.

use std::path::{Path, PathBuf};

/// Error returned when a project file name is unsafe.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("File name is empty")]
    Empty,

    #[error("Path traversal detected in '{name}'")]
    PathTraversal { name: String },

    #[error("Path '{name}' is outside the project folder")]
    OutsideProject { name: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Characters never allowed in a file name on any supported platform.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Extensions written as-is. Anything else is saved as `.txt`.
const SAFE_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "xml", "csv", "log", "yml", "yaml", "html", "htm", "css", "js", "jpg",
    "jpeg", "png", "gif", "bmp", "svg", "webp",
];

/// Strip characters that cannot appear in a file name.
fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !INVALID_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolve `name` to a file directly inside `project_dir`.
///
/// The project folder must exist. The file itself need not.
pub fn resolve_project_file(project_dir: &Path, name: &str) -> Result<PathBuf, PathValidationError> {
    let normalized = name.replace('\\', "/");
    if normalized.contains('/') || normalized == ".." || normalized == "." {
        return Err(PathValidationError::PathTraversal { name: name.into() });
    }

    let name = sanitize(name);
    if name.is_empty() {
        return Err(PathValidationError::Empty);
    }

    let root = project_dir
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: project_dir.display().to_string(),
            reason: e.to_string(),
        })?;
    let candidate = root.join(&name);

    // An existing entry may be a symlink pointing elsewhere
    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: candidate.display().to_string(),
                reason: e.to_string(),
            })?
    } else {
        candidate
    };

    if resolved.parent() != Some(root.as_path()) {
        return Err(PathValidationError::OutsideProject { name });
    }
    Ok(resolved)
}

/// The name a file is written under: unknown extensions become `.txt`.
pub fn safe_write_name(name: &str) -> String {
    let path = Path::new(name);
    let safe = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SAFE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if safe {
        name.to_string()
    } else {
        path.with_extension("txt").to_string_lossy().into_owned()
    }
}
