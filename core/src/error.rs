//! Error types for command-tree configuration and parsing.
//!
//! Registration-time failures are returned synchronously from the call that
//! caused them. Parse-time failures are detected by the parser and delivered
//! according to the node's [`ErrorPolicy`](crate::ErrorPolicy).

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while configuring or parsing a command tree.
///
/// The type is `Clone` so that a node can cache the outcome of its first
/// parse and hand the same failure back on every later call.
#[derive(Debug, Clone, Error)]
pub enum ArgError {
    /// A registration call received an unusable flag or command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A flag or subcommand name is already taken on this node.
    #[error("name conflict: '{0}' is already registered")]
    NameConflict(String),

    /// A group was created with an empty name or without members.
    #[error("empty group: {0}")]
    EmptyGroup(String),

    /// A group with the same name already exists on this node.
    #[error("group already exists: {0}")]
    GroupExists(String),

    /// No group with this name exists on this node.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// A group references a flag that is not registered on the node.
    #[error("group '{group}' references unknown flag '{flag}'")]
    FlagNotFound { group: String, flag: String },

    /// More than one member of a mutex group is set.
    #[error("flags in group '{group}' are mutually exclusive, got: {}", .set.join(", "))]
    MutexViolation { group: String, set: Vec<String> },

    /// No member of a mutex group is set and the group does not allow none.
    #[error("one of the flags in group '{group}' must be set")]
    GroupEmpty { group: String },

    /// A member of a required group is not set.
    #[error("required group '{group}' is missing flag '{flag}'")]
    GroupUnsatisfied { group: String, flag: String },

    /// A flag's setter rejected its input.
    #[error("invalid value for flag '{flag}': {source}")]
    InvalidValue {
        flag: String,
        #[source]
        source: ValueError,
    },

    /// An option token named a flag that is not registered.
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    /// A value-taking flag appeared as the last token without a value.
    #[error("flag '{0}' requires a value")]
    MissingValue(String),

    /// A configuration call failed unexpectedly (panic or poisoned lock).
    #[error("misuse: {0}")]
    Misuse(String),

    /// The command's run callback failed.
    #[error(transparent)]
    Run(Arc<dyn std::error::Error + Send + Sync>),
}

impl ArgError {
    /// Wraps a run-callback failure.
    pub fn run(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ArgError::Run(Arc::from(err.into()))
    }

    /// Returns `true` for failures detected by the constraint validator.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            ArgError::MutexViolation { .. }
                | ArgError::GroupEmpty { .. }
                | ArgError::GroupUnsatisfied { .. }
        )
    }
}

/// Failure reported by a flag setter when a raw token cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Input does not match the expected syntax.
    #[error("cannot parse '{input}' as {expected}")]
    Syntax { input: String, expected: &'static str },

    /// Input parsed but is outside the accepted range.
    #[error("'{0}' is out of range")]
    OutOfRange(String),

    /// Input is not one of the allowed choices.
    #[error("'{input}' is not one of: {}", .allowed.join(", "))]
    NotAllowed { input: String, allowed: Vec<String> },

    /// Flag construction rejected its parameters.
    #[error("invalid flag definition: {0}")]
    Definition(String),
}

/// Convenience alias for results with [`ArgError`].
pub type Result<T> = std::result::Result<T, ArgError>;
