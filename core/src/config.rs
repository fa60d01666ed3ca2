//! Presentation configuration attached to a command node.
//!
//! The engine stores this data but never renders it; it is handed to help
//! renderers through [`CommandSnapshot`](crate::CommandSnapshot).

use serde::{Deserialize, Serialize};

/// A worked invocation shown in help output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Command line, e.g. `deploy --env prod`.
    pub command: String,
    /// What the invocation does.
    #[serde(default)]
    pub description: String,
}

/// Usage syntax, examples and notes for one command.
///
/// # Examples
///
/// ```
/// use argtree_core::CommandConfig;
///
/// let config = CommandConfig::default()
///     .with_usage("deploy [flags] <service>")
///     .with_example("deploy --env prod api", "Deploy the api service to prod")
///     .with_note("Deploys are serialized per environment.");
/// assert_eq!(config.examples.len(), 1);
/// assert!(!config.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Usage syntax line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    /// Example invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Example>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl CommandConfig {
    /// Sets the usage line.
    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Appends an example.
    pub fn with_example(mut self, command: impl Into<String>, description: impl Into<String>) -> Self {
        self.examples.push(Example {
            command: command.into(),
            description: description.into(),
        });
        self
    }

    /// Appends a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Returns `true` when nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.usage.is_none() && self.examples.is_empty() && self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_config() {
        let config: CommandConfig = serde_json::from_str(
            r#"{"examples": [{"command": "build --release"}], "notes": ["slow"]}"#,
        )
        .unwrap();
        assert_eq!(config.usage, None);
        assert_eq!(config.examples[0].command, "build --release");
        assert_eq!(config.examples[0].description, "");
        assert_eq!(config.notes, vec!["slow"]);
    }

    #[test]
    fn test_empty_config_serializes_to_empty_object() {
        let json = serde_json::to_string(&CommandConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
