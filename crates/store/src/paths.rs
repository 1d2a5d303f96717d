//! On-disk layout of a persona folder.

use parlor_core::PersonaId;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PersonaPaths {
    root: PathBuf,
}

impl PersonaPaths {
    pub fn new(data_dir: &Path, persona: PersonaId) -> Self {
        Self {
            root: data_dir.join(persona.dir_name()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn talk_log(&self) -> PathBuf {
        self.root.join("talk.jsonl")
    }

    pub fn memory(&self) -> PathBuf {
        self.root.join("memory.json")
    }

    pub fn system_prompt(&self) -> PathBuf {
        self.root.join("system_prompt.txt")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("persona.toml")
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join("project")
    }

    /// Lock marker guarding `file`.
    pub fn lock_marker(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the persona prompt; a missing file is an empty prompt.
    pub fn read_system_prompt(&self) -> std::io::Result<String> {
        match std::fs::read_to_string(self.system_prompt()) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

/// Personas present under `data_dir`, sorted by id.
pub fn list_personas(data_dir: &Path) -> std::io::Result<Vec<PersonaId>> {
    let mut ids = Vec::new();
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name
            .to_str()
            .filter(|n| n.starts_with("persona_"))
            .and_then(|n| n.parse::<PersonaId>().ok())
        {
            ids.push(id);
        }
    }

    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let paths = PersonaPaths::new(Path::new("/data"), PersonaId(4));
        assert_eq!(paths.talk_log(), PathBuf::from("/data/persona_4/talk.jsonl"));
        assert_eq!(
            PersonaPaths::lock_marker(&paths.talk_log()),
            PathBuf::from("/data/persona_4/talk.jsonl.lock")
        );
        assert_eq!(paths.project_dir(), PathBuf::from("/data/persona_4/project"));
    }

    #[test]
    fn lists_only_persona_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("persona_2")).unwrap();
        std::fs::create_dir(dir.path().join("persona_10")).unwrap();
        std::fs::create_dir(dir.path().join("backups")).unwrap();
        std::fs::write(dir.path().join("persona_3"), "not a dir").unwrap();

        let ids = list_personas(dir.path()).unwrap();
        assert_eq!(ids, vec![PersonaId(2), PersonaId(10)]);
    }

    #[test]
    fn missing_data_dir_lists_nothing() {
        assert!(list_personas(Path::new("/nonexistent/parlor")).unwrap().is_empty());
    }

    #[test]
    fn missing_prompt_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PersonaPaths::new(dir.path(), PersonaId(1));
        assert_eq!(paths.read_system_prompt().unwrap(), "");
    }
}
