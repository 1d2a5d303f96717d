//! Persona identity.

use serde::{Deserialize, Serialize};

/// Identifier of a persona: an isolated conversation context with its own
/// log, settings and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub u32);

impl PersonaId {
    /// Name of the persona's folder under the data directory.
    pub fn dir_name(&self) -> String {
        format!("persona_{}", self.0)
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PersonaId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("persona_").unwrap_or(s);
        raw.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        assert_eq!("7".parse::<PersonaId>().unwrap(), PersonaId(7));
        assert_eq!("persona_12".parse::<PersonaId>().unwrap(), PersonaId(12));
        assert!("persona_x".parse::<PersonaId>().is_err());
    }

    #[test]
    fn dir_name_format() {
        assert_eq!(PersonaId(3).dir_name(), "persona_3");
    }
}
