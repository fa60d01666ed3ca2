//! The flag capability consumed by the parser.
//!
//! The engine never looks at a flag's stored value. It only needs the flag's
//! identity, a setter taking the raw token, an is-set predicate and a reset.
//! Concrete value kinds live in [`crate::value`]; any other type can take part
//! by implementing [`Flag`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Type tag describing what kind of value a flag stores.
///
/// Used by help snapshots and by the parser to decide whether a bare
/// introducer (`--verbose`) is acceptable without a value token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Boolean switch; a bare introducer means `true`.
    Bool,
    /// Free-form string (the default).
    #[default]
    String,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Floating point number.
    Float,
    /// Duration such as `1h30m`.
    Duration,
    /// Byte size such as `10MB`.
    Size,
    /// One of a fixed set of choices.
    Enum,
    /// Repeatable list of strings.
    Slice,
    /// Repeatable `key=value` pairs.
    Map,
}

impl ValueKind {
    /// Returns the lowercase tag used in snapshots and manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Uint => "uint",
            ValueKind::Float => "float",
            ValueKind::Duration => "duration",
            ValueKind::Size => "size",
            ValueKind::Enum => "enum",
            ValueKind::Slice => "slice",
            ValueKind::Map => "map",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and metadata of a flag.
///
/// Names are stored without their leading dashes: a flag parsed from
/// `--output`/`-o` has `long = "output"` and `short = "o"`.
///
/// # Examples
///
/// ```
/// use argtree_core::{FlagInfo, ValueKind};
///
/// let info = FlagInfo::new("dry-run", ValueKind::Bool)
///     .with_short("n")
///     .with_description("Print actions without executing them");
/// assert_eq!(info.display_name(), "dry-run");
/// assert_eq!(info.names(), vec!["dry-run", "n"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagInfo {
    /// Long form without dashes, empty when the flag only has a short form.
    pub long: String,
    /// Short form without the dash, empty when absent.
    pub short: String,
    /// One-line description for help output.
    pub description: String,
    /// Kind of value stored.
    pub kind: ValueKind,
    /// Explicit environment variable binding, overriding the prefix convention.
    pub env: Option<String>,
}

impl FlagInfo {
    /// Creates identity for a flag with a long name.
    pub fn new(long: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            long: long.into(),
            short: String::new(),
            description: String::new(),
            kind,
            env: None,
        }
    }

    /// Sets the short name.
    pub fn with_short(mut self, short: impl Into<String>) -> Self {
        self.short = short.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Binds the flag to an explicit environment variable.
    pub fn with_env(mut self, var: impl Into<String>) -> Self {
        self.env = Some(var.into());
        self
    }

    /// Long name if present, otherwise the short name.
    pub fn display_name(&self) -> &str {
        if self.long.is_empty() {
            &self.short
        } else {
            &self.long
        }
    }

    /// All non-empty names, long first.
    pub fn names(&self) -> Vec<&str> {
        [self.long.as_str(), self.short.as_str()]
            .into_iter()
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Returns `true` when `name` is one of this flag's names.
    pub fn matches(&self, name: &str) -> bool {
        !name.is_empty() && (self.long == name || self.short == name)
    }
}

/// Capability every flag exposes to the engine.
///
/// Setters take `&self`: flags are shared between the registry and the code
/// that reads them back after parsing, so implementations keep their value
/// behind interior mutability.
pub trait Flag: Send + Sync {
    /// Identity and metadata.
    fn info(&self) -> &FlagInfo;

    /// Parses `raw` and stores the result, marking the flag as set.
    fn set(&self, raw: &str) -> Result<(), ValueError>;

    /// Whether a value was assigned since construction or the last reset.
    fn is_set(&self) -> bool;

    /// Restores the compiled-in default and clears the is-set mark.
    fn reset(&self);

    /// Current value rendered as text.
    fn value_string(&self) -> String;

    /// Compiled-in default rendered as text.
    fn default_string(&self) -> String;

    /// Whether a bare introducer is accepted as an implicit value.
    fn is_bool(&self) -> bool {
        self.info().kind == ValueKind::Bool
    }
}

/// Shared handle to a registered flag.
pub type FlagRef = Arc<dyn Flag>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_short() {
        let info = FlagInfo::new("", ValueKind::Bool).with_short("v");
        assert_eq!(info.display_name(), "v");
        assert_eq!(info.names(), vec!["v"]);
    }

    #[test]
    fn test_matches_ignores_empty_name() {
        let info = FlagInfo::new("verbose", ValueKind::Bool);
        assert!(info.matches("verbose"));
        assert!(!info.matches(""));
        assert!(!info.matches("v"));
    }

    #[test]
    fn test_value_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ValueKind::Duration).unwrap();
        assert_eq!(json, "\"duration\"");
        assert_eq!(ValueKind::Slice.to_string(), "slice");
    }
}
