//! Environment-variable fallback for flags left unset on the command line.
//!
//! A flag resolves to a variable either through its explicit binding
//! ([`FlagInfo::env`](crate::FlagInfo)) or, when the node has a prefix,
//! through the convention `{PREFIX}_{UPPER_SNAKE(long)}`. Values are fed to the
//! flag's setter exactly like a command-line token. A flag that is already set
//! is never touched.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{ArgError, Result};
use crate::flag::{Flag, FlagRef};

/// Source of environment values.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `key`, if present.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory environment.
///
/// # Examples
///
/// ```
/// use argtree_core::{EnvSource, MapEnv};
///
/// let env = MapEnv::new().with("APP_TOKEN", "s3cret");
/// assert_eq!(env.get("APP_TOKEN").as_deref(), Some("s3cret"));
/// assert_eq!(env.get("HOME"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

impl fmt::Debug for dyn EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvSource")
    }
}

/// Normalizes a user-supplied prefix: trimmed, upper-cased, `-` mapped to `_`,
/// and suffixed with `_` unless empty or already terminated by one.
pub fn normalize_prefix(prefix: &str) -> String {
    let mut normalized: String = prefix
        .trim()
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    if !normalized.is_empty() && !normalized.ends_with('_') {
        normalized.push('_');
    }
    normalized
}

/// Converts a flag name to `UPPER_SNAKE` case.
///
/// `dry-run` → `DRY_RUN`, `maxRetries` → `MAX_RETRIES`, `tls.ca-file` →
/// `TLS_CA_FILE`.
pub fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '-' || c == '.' || c == '_' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else {
            if c.is_uppercase() && prev_lower {
                out.push('_');
            }
            out.extend(c.to_uppercase());
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// The variable a flag falls back to, if any.
///
/// `prefix` must already be normalized (see [`normalize_prefix`]).
pub fn env_var_for(flag: &dyn Flag, prefix: &str) -> Option<String> {
    let info = flag.info();
    if let Some(explicit) = info.env.as_deref().filter(|v| !v.is_empty()) {
        return Some(explicit.to_string());
    }
    if prefix.is_empty() || info.long.is_empty() {
        return None;
    }
    Some(format!("{prefix}{}", upper_snake(&info.long)))
}

/// Assigns environment values to every unset flag that has a non-empty
/// variable. Stops at the first setter failure.
pub fn apply_fallback(flags: &[FlagRef], prefix: &str, env: &dyn EnvSource) -> Result<()> {
    for flag in flags {
        if flag.is_set() {
            continue;
        }
        let Some(var) = env_var_for(&**flag, prefix) else {
            continue;
        };
        let Some(value) = env.get(&var).filter(|v| !v.is_empty()) else {
            continue;
        };

        debug!(flag = %flag.info().display_name(), var = %var, "applying environment fallback");
        flag.set(&value).map_err(|source| ArgError::InvalidValue {
            flag: flag.info().display_name().to_string(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::{BoolFlag, IntFlag, StringFlag};

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("myapp"), "MYAPP_");
        assert_eq!(normalize_prefix("MY-APP_"), "MY_APP_");
        assert_eq!(normalize_prefix("  "), "");
    }

    #[test]
    fn test_upper_snake() {
        assert_eq!(upper_snake("dry-run"), "DRY_RUN");
        assert_eq!(upper_snake("maxRetries"), "MAX_RETRIES");
        assert_eq!(upper_snake("tls.ca-file"), "TLS_CA_FILE");
        assert_eq!(upper_snake("http2"), "HTTP2");
        assert_eq!(upper_snake("--weird--"), "WEIRD");
    }

    #[test]
    fn test_env_var_for_prefers_explicit_binding() {
        let bound = StringFlag::new("token", "").with_env("GITHUB_TOKEN");
        assert_eq!(env_var_for(&bound, "APP_").as_deref(), Some("GITHUB_TOKEN"));

        let implicit = StringFlag::new("log-level", "info");
        assert_eq!(
            env_var_for(&implicit, "APP_").as_deref(),
            Some("APP_LOG_LEVEL")
        );
        assert_eq!(env_var_for(&implicit, ""), None);

        let short_only = BoolFlag::new("", false).with_short("q");
        assert_eq!(env_var_for(&short_only, "APP_"), None);
    }

    #[test]
    fn test_fallback_skips_flags_already_set() {
        let from_cli = Arc::new(StringFlag::new("region", "us-east-1"));
        from_cli.set("eu-west-1").unwrap();
        let from_env = Arc::new(StringFlag::new("profile", "default"));
        let flags: Vec<FlagRef> = vec![from_cli.clone(), from_env.clone()];

        let env = MapEnv::new()
            .with("APP_REGION", "ap-south-1")
            .with("APP_PROFILE", "staging");
        apply_fallback(&flags, "APP_", &env).unwrap();

        assert_eq!(from_cli.value(), "eu-west-1");
        assert_eq!(from_env.value(), "staging");
        assert!(from_env.is_set());
    }

    #[test]
    fn test_fallback_ignores_empty_values() {
        let flag = Arc::new(StringFlag::new("region", "us-east-1"));
        let flags: Vec<FlagRef> = vec![flag.clone()];
        let env = MapEnv::new().with("APP_REGION", "");

        apply_fallback(&flags, "APP_", &env).unwrap();
        assert!(!flag.is_set());
        assert_eq!(flag.value(), "us-east-1");
    }

    #[test]
    fn test_fallback_reports_setter_failure() {
        let flag = Arc::new(IntFlag::new("workers", 4));
        let flags: Vec<FlagRef> = vec![flag.clone()];
        let env = MapEnv::new().with("APP_WORKERS", "many");

        let err = apply_fallback(&flags, "APP_", &env).unwrap_err();
        assert!(matches!(err, ArgError::InvalidValue { ref flag, .. } if flag == "workers"));
    }
}
