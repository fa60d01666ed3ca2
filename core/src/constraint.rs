//! Mutex and required flag groups and their validator.
//!
//! Groups are declared against the flags registered on a node at the time of
//! the declaration. Validation runs after command-line and environment values
//! have been assigned and stops at the first violation: mutex groups first,
//! then required groups, each in declaration order.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use argtree_core::{Constraints, Flag, FlagRegistry, StringFlag};
//!
//! let mut flags = FlagRegistry::new();
//! let format = Arc::new(StringFlag::new("format", "json"));
//! let output = Arc::new(StringFlag::new("output", ""));
//! flags.register(format.clone()).unwrap();
//! flags.register(output.clone()).unwrap();
//!
//! let mut constraints = Constraints::default();
//! constraints
//!     .add_mutex_group("destination", &["format", "output"], true, &flags)
//!     .unwrap();
//! assert!(constraints.validate(&flags).is_ok());
//!
//! format.set("yaml").unwrap();
//! output.set("out.txt").unwrap();
//! assert!(constraints.validate(&flags).is_err());
//! ```

use serde::Serialize;
use tracing::trace;

use crate::error::{ArgError, Result};
use crate::flag::{Flag, FlagRef};
use crate::registry::{FlagRegistry, Named};

/// At most one member may be set; with `allow_none == false`, exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutexGroup {
    pub name: String,
    pub flags: Vec<String>,
    pub allow_none: bool,
}

/// Every member must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredGroup {
    pub name: String,
    pub flags: Vec<String>,
}

/// A node's ordered constraint groups.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    mutex: Vec<MutexGroup>,
    required: Vec<RequiredGroup>,
}

/// Checks a group declaration and returns its de-duplicated member list.
fn checked_members(name: &str, flags: &[&str], registry: &FlagRegistry) -> Result<Vec<String>> {
    if name.trim().is_empty() {
        return Err(ArgError::EmptyGroup("group name cannot be empty".to_string()));
    }
    if flags.is_empty() {
        return Err(ArgError::EmptyGroup(format!(
            "group '{name}' must list at least one flag"
        )));
    }

    let mut members: Vec<String> = Vec::with_capacity(flags.len());
    for flag in flags {
        if !registry.contains(flag) {
            return Err(ArgError::FlagNotFound {
                group: name.to_string(),
                flag: flag.to_string(),
            });
        }
        if !members.iter().any(|m| m == flag) {
            members.push(flag.to_string());
        }
    }
    Ok(members)
}

/// Resolves member names to distinct registered flags; stale names are skipped.
fn resolve<'a>(members: &'a [String], registry: &FlagRegistry) -> Vec<(&'a str, FlagRef)> {
    let mut resolved: Vec<(&str, FlagRef)> = Vec::new();
    for name in members {
        match registry.get(name) {
            Some(flag) if !resolved.iter().any(|(_, f)| f.same_entry(flag)) => {
                resolved.push((name.as_str(), flag.clone()));
            }
            Some(_) => {}
            None => trace!(flag = %name, "skipping group member that is no longer registered"),
        }
    }
    resolved
}

impl Constraints {
    /// Declares a mutex group.
    ///
    /// # Errors
    ///
    /// [`ArgError::EmptyGroup`] for an empty name or member list,
    /// [`ArgError::GroupExists`] for a duplicate name, and
    /// [`ArgError::FlagNotFound`] for a member that is not registered.
    pub fn add_mutex_group(
        &mut self,
        name: &str,
        flags: &[&str],
        allow_none: bool,
        registry: &FlagRegistry,
    ) -> Result<()> {
        let members = checked_members(name, flags, registry)?;
        if self.mutex.iter().any(|g| g.name == name) {
            return Err(ArgError::GroupExists(name.to_string()));
        }
        self.mutex.push(MutexGroup {
            name: name.to_string(),
            flags: members,
            allow_none,
        });
        Ok(())
    }

    /// Declares a required group. Errors as for [`Self::add_mutex_group`].
    pub fn add_required_group(
        &mut self,
        name: &str,
        flags: &[&str],
        registry: &FlagRegistry,
    ) -> Result<()> {
        let members = checked_members(name, flags, registry)?;
        if self.required.iter().any(|g| g.name == name) {
            return Err(ArgError::GroupExists(name.to_string()));
        }
        self.required.push(RequiredGroup {
            name: name.to_string(),
            flags: members,
        });
        Ok(())
    }

    /// Removes a mutex group by name.
    pub fn remove_mutex_group(&mut self, name: &str) -> Result<MutexGroup> {
        let position = self
            .mutex
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| ArgError::GroupNotFound(name.to_string()))?;
        Ok(self.mutex.remove(position))
    }

    /// Removes a required group by name.
    pub fn remove_required_group(&mut self, name: &str) -> Result<RequiredGroup> {
        let position = self
            .required
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| ArgError::GroupNotFound(name.to_string()))?;
        Ok(self.required.remove(position))
    }

    /// Mutex groups in declaration order.
    pub fn mutex_groups(&self) -> &[MutexGroup] {
        &self.mutex
    }

    /// Required groups in declaration order.
    pub fn required_groups(&self) -> &[RequiredGroup] {
        &self.required
    }

    /// Returns `true` when no group is declared.
    pub fn is_empty(&self) -> bool {
        self.mutex.is_empty() && self.required.is_empty()
    }

    /// Evaluates every group against the current is-set state of `registry`.
    ///
    /// Returns the first violation found.
    pub fn validate(&self, registry: &FlagRegistry) -> Result<()> {
        for group in &self.mutex {
            let set: Vec<String> = resolve(&group.flags, registry)
                .into_iter()
                .filter(|(_, flag)| flag.is_set())
                .map(|(name, _)| name.to_string())
                .collect();
            if set.len() > 1 {
                return Err(ArgError::MutexViolation {
                    group: group.name.clone(),
                    set,
                });
            }
            if set.is_empty() && !group.allow_none {
                return Err(ArgError::GroupEmpty {
                    group: group.name.clone(),
                });
            }
        }

        for group in &self.required {
            if let Some((missing, _)) = resolve(&group.flags, registry)
                .into_iter()
                .find(|(_, flag)| !flag.is_set())
            {
                return Err(ArgError::GroupUnsatisfied {
                    group: group.name.clone(),
                    flag: missing.to_string(),
                });
            }
        }

        Ok(())
    }
}
