//! Declarative command-tree manifests.
//!
//! A manifest is a YAML or JSON document describing a command tree. Building
//! it produces a live [`Command`] tree ready to parse.
//!
//! ```yaml
//! root:
//!   name: ship
//!   env_prefix: ship
//!   flags:
//!     - name: verbose
//!       short: v
//!       kind: bool
//!   commands:
//!     - name: deploy
//!       flags:
//!         - { name: env, kind: enum, choices: [dev, prod], default: dev }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use argtree_core::{
    ArgError, Command, CommandConfig, EnumFlag, ErrorPolicy, FlagRef, FlagValue, TypedFlag,
    ValueError, ValueKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or building a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The YAML document is malformed or does not match the manifest schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The JSON document is malformed or does not match the manifest schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A flag's default or choice list was rejected.
    #[error("flag '{flag}' of command '{command}': {source}")]
    Flag {
        command: String,
        flag: String,
        #[source]
        source: ValueError,
    },

    /// The engine rejected a registration.
    #[error("command '{command}': {source}")]
    Engine {
        command: String,
        #[source]
        source: ArgError,
    },
}

/// Top-level manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeManifest {
    pub root: CommandManifest,
}

/// One command and its subtree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandManifest {
    pub name: String,
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ErrorPolicy>,
    #[serde(default)]
    pub config: CommandConfig,
    #[serde(default)]
    pub flags: Vec<FlagManifest>,
    #[serde(default)]
    pub mutex_groups: Vec<MutexGroupManifest>,
    #[serde(default)]
    pub required_groups: Vec<RequiredGroupManifest>,
    #[serde(default)]
    pub commands: Vec<CommandManifest>,
}

/// A flag declaration. `default` is written the way it would be typed on
/// the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagManifest {
    pub name: String,
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Allowed values, only for `kind: enum`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutexGroupManifest {
    pub name: String,
    pub flags: Vec<String>,
    #[serde(default = "default_allow_none")]
    pub allow_none: bool,
}

fn default_allow_none() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredGroupManifest {
    pub name: String,
    pub flags: Vec<String>,
}

impl TreeManifest {
    /// Reads a manifest; `.json` files are parsed as JSON, anything else as
    /// YAML.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the command tree.
    pub fn build(&self) -> Result<Command, ManifestError> {
        self.root.build()
    }

    /// Number of commands and flags in the whole tree.
    pub fn counts(&self) -> (usize, usize) {
        self.root.counts()
    }
}

impl CommandManifest {
    /// Builds this command and its subtree.
    pub fn build(&self) -> Result<Command, ManifestError> {
        let cmd = Command::with_short(&self.name, &self.short);
        let engine = |source: ArgError| ManifestError::Engine {
            command: self.name.clone(),
            source,
        };

        cmd.set_description(&self.description).map_err(engine)?;
        cmd.set_config(self.config.clone()).map_err(engine)?;
        if let Some(prefix) = &self.env_prefix {
            cmd.set_env_prefix(prefix).map_err(engine)?;
        }
        if let Some(policy) = self.policy {
            cmd.set_error_policy(policy).map_err(engine)?;
        }

        for flag in &self.flags {
            let built = flag.build().map_err(|source| ManifestError::Flag {
                command: self.name.clone(),
                flag: flag.name.clone(),
                source,
            })?;
            cmd.add_flag(built).map_err(engine)?;
        }
        for group in &self.mutex_groups {
            cmd.add_mutex_group(&group.name, &as_strs(&group.flags), group.allow_none)
                .map_err(engine)?;
        }
        for group in &self.required_groups {
            cmd.add_required_group(&group.name, &as_strs(&group.flags))
                .map_err(engine)?;
        }
        for child in &self.commands {
            cmd.add_command(child.build()?).map_err(engine)?;
        }

        debug!(command = %self.name, flags = self.flags.len(), subcommands = self.commands.len(), "built command from manifest");
        Ok(cmd)
    }

    fn counts(&self) -> (usize, usize) {
        self.commands
            .iter()
            .map(CommandManifest::counts)
            .fold((1, self.flags.len()), |(c, f), (cc, cf)| (c + cc, f + cf))
    }
}

fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

impl FlagManifest {
    /// Builds the typed flag this declaration describes.
    pub fn build(&self) -> Result<FlagRef, ValueError> {
        if !self.choices.is_empty() && self.kind != ValueKind::Enum {
            return Err(ValueError::Definition(format!(
                "choices are only allowed for enum flags, not {}",
                self.kind
            )));
        }
        let flag: FlagRef = match self.kind {
            ValueKind::Bool => Arc::new(self.typed::<bool>()?),
            ValueKind::String => Arc::new(self.typed::<String>()?),
            ValueKind::Int => Arc::new(self.typed::<i64>()?),
            ValueKind::Uint => Arc::new(self.typed::<u64>()?),
            ValueKind::Float => Arc::new(self.typed::<f64>()?),
            ValueKind::Duration => Arc::new(self.typed::<std::time::Duration>()?),
            ValueKind::Size => Arc::new(self.typed::<argtree_core::ByteSize>()?),
            ValueKind::Slice => Arc::new(self.typed::<Vec<String>>()?),
            ValueKind::Map => {
                Arc::new(self.typed::<std::collections::BTreeMap<String, String>>()?)
            }
            ValueKind::Enum => {
                let default = self.default.as_deref().unwrap_or_default();
                let choice = EnumFlag::choice(self.name.clone(), &as_strs(&self.choices), default)?;
                Arc::new(self.decorate(choice))
            }
        };
        Ok(flag)
    }

    fn typed<T: FlagValue + Default>(&self) -> Result<TypedFlag<T>, ValueError> {
        let mut default = T::default();
        if let Some(raw) = &self.default {
            default.apply(raw, true)?;
        }
        Ok(self.decorate(TypedFlag::new(self.name.clone(), default)))
    }

    fn decorate<T: FlagValue>(&self, flag: TypedFlag<T>) -> TypedFlag<T> {
        let flag = flag
            .with_short(self.short.clone())
            .with_description(self.description.clone());
        match &self.env {
            Some(var) => flag.with_env(var.clone()),
            None => flag,
        }
    }
}

/// Resolves a space-separated subcommand path below `root`.
pub fn find_command(root: &Command, path: &str) -> Option<Command> {
    path.split_whitespace()
        .try_fold(root.clone(), |node, name| node.find_subcommand(name))
}

#[cfg(test)]
mod tests {
    use argtree_core::{ArgError, Flag, ParseStatus};

    use super::*;

    const SHIP: &str = r#"
root:
  name: ship
  description: Ship services
  env_prefix: ship
  flags:
    - name: verbose
      short: v
      kind: bool
  commands:
    - name: deploy
      short: d
      flags:
        - name: env
          kind: enum
          choices: [dev, prod]
          default: dev
        - name: timeout
          kind: duration
          default: 30s
        - name: image
        - name: manifest
      mutex_groups:
        - name: source
          flags: [image, manifest]
          allow_none: false
    - name: status
"#;

    #[test]
    fn test_build_tree_from_yaml() {
        let manifest = TreeManifest::from_yaml(SHIP).unwrap();
        assert_eq!(manifest.counts(), (3, 5));

        let root = manifest.build().unwrap();
        assert_eq!(root.subcommands().len(), 2);
        assert_eq!(root.env_prefix(), "SHIP_");

        let deploy = find_command(&root, "d").unwrap();
        assert_eq!(deploy.path(), "ship deploy");
        assert_eq!(deploy.flag("env").unwrap().default_string(), "dev");
        assert_eq!(deploy.flag("timeout").unwrap().default_string(), "30s");
        assert!(!deploy.mutex_groups()[0].allow_none);
        assert!(find_command(&root, "deploy missing").is_none());
    }

    #[test]
    fn test_built_tree_parses() {
        let root = TreeManifest::from_yaml(SHIP).unwrap().build().unwrap();
        root.parse_and_route(&["-v", "deploy", "--image", "api:1.2", "--env", "prod"])
            .unwrap();

        let deploy = root.executed().unwrap();
        assert_eq!(deploy.name(), "deploy");
        assert_eq!(deploy.flag("env").unwrap().value_string(), "prod");
        assert_eq!(deploy.parse_status(), ParseStatus::Parsed);
    }

    #[test]
    fn test_built_tree_enforces_groups() {
        let root = TreeManifest::from_yaml(SHIP).unwrap().build().unwrap();
        let err = root.parse_and_route(&["deploy"]).unwrap_err();
        assert!(matches!(err, ArgError::GroupEmpty { ref group } if group == "source"));
    }

    #[test]
    fn test_json_manifest() {
        let manifest = TreeManifest::from_json(
            r#"{"root": {"name": "tool", "flags": [{"name": "jobs", "kind": "uint", "default": "4"}]}}"#,
        )
        .unwrap();
        let root = manifest.build().unwrap();
        assert_eq!(root.flag("jobs").unwrap().value_string(), "4");
    }

    #[test]
    fn test_bad_default_is_reported_with_context() {
        let manifest = TreeManifest::from_yaml(
            "root:\n  name: tool\n  flags:\n    - name: jobs\n      kind: int\n      default: many\n",
        )
        .unwrap();
        let err = manifest.build().unwrap_err();
        assert!(matches!(err, ManifestError::Flag { ref flag, .. } if flag == "jobs"));
        assert!(err.to_string().contains("jobs"));
    }

    #[test]
    fn test_unknown_group_member_is_engine_error() {
        let manifest = TreeManifest::from_yaml(
            "root:\n  name: tool\n  required_groups:\n    - name: auth\n      flags: [token]\n",
        )
        .unwrap();
        let err = manifest.build().unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Engine { source: ArgError::FlagNotFound { .. }, .. }
        ));
    }

    #[test]
    fn test_choices_rejected_for_non_enum() {
        let flag = FlagManifest {
            name: "level".to_string(),
            choices: vec!["a".to_string()],
            ..FlagManifest::default()
        };
        assert!(matches!(flag.build(), Err(ValueError::Definition(_))));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = TreeManifest::from_yaml("root:\n  name: tool\n  flagz: []\n").unwrap_err();
        assert!(matches!(err, ManifestError::Yaml(_)));
    }
}
