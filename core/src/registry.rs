//! Name-keyed registries for flags and subcommands.
//!
//! A [`Registry`] keeps entries in insertion order and indexes every non-empty
//! name each entry declares. Long and short names share one namespace, so a
//! short name can never shadow another entry's long name.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{ArgError, Result};
use crate::flag::{Flag, FlagRef};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static name pattern compiles")
});

/// Returns `true` if `name` is usable as a flag or command name.
///
/// Names start with an ASCII letter or digit and continue with letters,
/// digits, `.`, `_` or `-`. Dashes, `=` and whitespace are rejected because
/// the tokenizer gives them meaning.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// An entry that can be stored in a [`Registry`].
pub trait Named: Clone {
    /// Every name the entry answers to; empty strings are ignored.
    fn names(&self) -> Vec<String>;

    /// Whether two handles refer to the same entry.
    fn same_entry(&self, other: &Self) -> bool;
}

impl Named for FlagRef {
    fn names(&self) -> Vec<String> {
        self.info().names().into_iter().map(String::from).collect()
    }

    fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// Insertion-ordered registry with lookup by any declared name.
#[derive(Clone)]
pub struct Registry<T: Named> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Named> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry under all of its names.
    ///
    /// # Errors
    ///
    /// - [`ArgError::InvalidArgument`] if the entry declares no usable name.
    /// - [`ArgError::NameConflict`] if any name is already taken, or if the
    ///   entry declares the same name twice. Nothing is inserted in that case.
    pub fn register(&mut self, item: T) -> Result<()> {
        let names: Vec<String> = item.names().into_iter().filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return Err(ArgError::InvalidArgument(
                "entry must declare a long or short name".to_string(),
            ));
        }
        if let Some(bad) = names.iter().find(|n| !is_valid_name(n)) {
            return Err(ArgError::InvalidArgument(format!("invalid name '{bad}'")));
        }
        for (i, name) in names.iter().enumerate() {
            if self.index.contains_key(name) || names[..i].contains(name) {
                return Err(ArgError::NameConflict(name.clone()));
            }
        }

        let position = self.entries.len();
        for name in names {
            self.index.insert(name, position);
        }
        self.entries.push(item);
        Ok(())
    }

    /// Exact-match lookup by long or short name.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Removes the entry answering to `name`, along with all its other names.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let position = *self.index.get(name)?;
        let removed = self.entries.remove(position);
        self.index.retain(|_, i| *i != position);
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }
        Some(removed)
    }

    /// Snapshot of all entries in insertion order.
    pub fn list(&self) -> Vec<T> {
        self.entries.clone()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Number of entries (not names).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry of a node's flags.
pub type FlagRegistry = Registry<FlagRef>;
