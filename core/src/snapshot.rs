//! Read-only views of a command node for help renderers.
//!
//! A [`CommandSnapshot`] is an owned copy taken under the node's read lock.
//! Renderers can format it freely without touching the live tree.

use serde::Serialize;

use crate::command::Command;
use crate::config::CommandConfig;
use crate::constraint::{MutexGroup, RequiredGroup};
use crate::env;
use crate::error::Result;
use crate::flag::{Flag, ValueKind};

/// One flag as seen by a help renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagSnapshot {
    pub long: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub kind: ValueKind,
    pub default: String,
    pub value: String,
    pub is_set: bool,
    /// Variable consulted for environment fallback, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl FlagSnapshot {
    fn of(flag: &dyn Flag, prefix: &str) -> Self {
        let info = flag.info();
        Self {
            long: info.long.clone(),
            short: info.short.clone(),
            description: info.description.clone(),
            kind: info.kind,
            default: flag.default_string(),
            value: flag.value_string(),
            is_set: flag.is_set(),
            env: env::env_var_for(flag, prefix),
        }
    }
}

/// Name and description of a direct subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubcommandSummary {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Everything a help renderer needs to describe one command.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use argtree_core::{Command, StringFlag};
///
/// let cmd = Command::new("deploy");
/// cmd.set_description("Deploy a service").unwrap();
/// cmd.set_env_prefix("ship").unwrap();
/// cmd.add_flag(Arc::new(StringFlag::new("env", "staging"))).unwrap();
///
/// let snapshot = cmd.snapshot().unwrap();
/// assert_eq!(snapshot.flags[0].default, "staging");
/// assert_eq!(snapshot.flags[0].env.as_deref(), Some("SHIP_ENV"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub flags: Vec<FlagSnapshot>,
    pub subcommands: Vec<SubcommandSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mutex_groups: Vec<MutexGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_groups: Vec<RequiredGroup>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_prefix: String,
    #[serde(skip_serializing_if = "CommandConfig::is_empty")]
    pub config: CommandConfig,
}

impl CommandSnapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Looks up a flag by long or short name.
    pub fn flag(&self, name: &str) -> Option<&FlagSnapshot> {
        self.flags
            .iter()
            .find(|f| !name.is_empty() && (f.long == name || f.short == name))
    }
}

impl Command {
    /// Takes a snapshot of this node.
    pub fn snapshot(&self) -> Result<CommandSnapshot> {
        let path = self.path();
        let state = self.read_state()?;

        let flags = state
            .flags
            .iter()
            .map(|flag| FlagSnapshot::of(&**flag, &state.env_prefix))
            .collect();
        let subcommands = state
            .commands
            .iter()
            .map(|child| SubcommandSummary {
                name: child.name().to_string(),
                short: child.short_name().to_string(),
                description: child.description(),
            })
            .collect();

        Ok(CommandSnapshot {
            name: self.name().to_string(),
            short: self.short_name().to_string(),
            path,
            description: state.description.clone(),
            flags,
            subcommands,
            mutex_groups: state.constraints.mutex_groups().to_vec(),
            required_groups: state.constraints.required_groups().to_vec(),
            env_prefix: state.env_prefix.clone(),
            config: state.config.clone(),
        })
    }
}
