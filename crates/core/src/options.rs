use crate::document::Name;
use serde::{Deserialize, Serialize};

/// Knobs for one battery run. Deserializes from the `[clean]` table of a
/// config file; missing keys take their defaults, unknown keys are errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanOptions {
    /// Fields that must survive at root scope even if nothing references them.
    pub pinned: Vec<Name>,
    /// Re-check the no-dangling-reference, no-dead-field and minimal-scope
    /// properties after cleaning.
    pub verify_postconditions: bool,
}

impl CleanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(mut self, name: impl Into<Name>) -> Self {
        let name = name.into();
        if !self.pinned.contains(&name) {
            self.pinned.push(name);
        }
        self
    }

    pub fn verify_postconditions(mut self, enabled: bool) -> Self {
        self.verify_postconditions = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_deduplicates() {
        let options = CleanOptions::new().pin("score").pin("score").pin("id");
        let pinned: Vec<&str> = options.pinned.iter().map(|n| n.as_str()).collect();
        assert_eq!(pinned, vec!["score", "id"]);
    }

    #[test]
    fn deserializes_with_defaults() {
        let options: CleanOptions = serde_json::from_str(r#"{"pinned": ["a"]}"#).unwrap();
        assert_eq!(options.pinned, vec![Name::new("a")]);
        assert!(!options.verify_postconditions);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<CleanOptions, _> = serde_json::from_str(r#"{"pin": ["a"]}"#);
        assert!(result.is_err());
    }
}
