//! Command nodes and the command tree.
//!
//! A [`Command`] is a cheap, cloneable handle to one node of the tree. Each
//! node owns its flag registry, its child registry, its constraint groups and
//! its parse state behind a reader-writer lock. Children are owned by their
//! parent; the parent link is weak and only used to rebuild paths and to
//! inherit the error policy and environment source.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use argtree_core::{BoolFlag, Command, StringFlag};
//!
//! let root = Command::new("tool");
//! let verbose = Arc::new(BoolFlag::new("verbose", false).with_short("v"));
//! root.add_flag(verbose.clone()).unwrap();
//!
//! let deploy = Command::with_short("deploy", "d");
//! let target = Arc::new(StringFlag::new("target", "staging"));
//! deploy.add_flag(target.clone()).unwrap();
//! root.add_command(deploy.clone()).unwrap();
//!
//! root.parse_and_route(&["-v", "d", "--target", "prod"]).unwrap();
//! assert!(verbose.value());
//! assert_eq!(target.value(), "prod");
//! assert_eq!(root.executed().unwrap().path(), "tool deploy");
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::debug;

use crate::config::CommandConfig;
use crate::constraint::{Constraints, MutexGroup, RequiredGroup};
use crate::env::{self, EnvSource, ProcessEnv};
use crate::error::{ArgError, Result};
use crate::flag::FlagRef;
use crate::gate::{ParseGate, ParseStatus};
use crate::policy::ErrorPolicy;
use crate::registry::{FlagRegistry, Named, Registry};

/// Error type returned by run callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked after a successful routed parse of the node it is set on.
pub type RunFn = Arc<dyn Fn(&Command) -> std::result::Result<(), BoxError> + Send + Sync>;

pub(crate) struct NodeState {
    pub(crate) description: String,
    pub(crate) flags: FlagRegistry,
    pub(crate) commands: Registry<Command>,
    pub(crate) constraints: Constraints,
    pub(crate) env_prefix: String,
    pub(crate) env: Option<Arc<dyn EnvSource>>,
    pub(crate) policy: Option<ErrorPolicy>,
    pub(crate) config: CommandConfig,
    pub(crate) positionals: Vec<String>,
    pub(crate) run: Option<RunFn>,
    pub(crate) routed: Option<Command>,
    pub(crate) parent: Weak<Node>,
}

pub(crate) struct Node {
    long: String,
    short: String,
    pub(crate) state: RwLock<NodeState>,
    pub(crate) gate: ParseGate,
}

/// Handle to a node of a command tree.
///
/// Cloning the handle does not clone the node; all clones observe the same
/// flags, children and parse state.
#[derive(Clone)]
pub struct Command {
    pub(crate) inner: Arc<Node>,
}

impl Named for Command {
    fn names(&self) -> Vec<String> {
        vec![self.inner.long.clone(), self.inner.short.clone()]
    }

    fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.inner.long)
            .field("short", &self.inner.short)
            .field("status", &self.parse_status())
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> ArgError {
    ArgError::Misuse("command state lock poisoned by an earlier panic".to_string())
}

impl Command {
    /// Creates a node with a long name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_short(name, "")
    }

    /// Creates a node with a long and a short name. Either may be empty, but
    /// a node registered as a subcommand needs at least one.
    pub fn with_short(long: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Node {
                long: long.into(),
                short: short.into(),
                state: RwLock::new(NodeState {
                    description: String::new(),
                    flags: FlagRegistry::new(),
                    commands: Registry::new(),
                    constraints: Constraints::default(),
                    env_prefix: String::new(),
                    env: None,
                    policy: None,
                    config: CommandConfig::default(),
                    positionals: Vec::new(),
                    run: None,
                    routed: None,
                    parent: Weak::new(),
                }),
                gate: ParseGate::default(),
            }),
        }
    }

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, NodeState>> {
        self.inner.state.read().map_err(poisoned)
    }

    pub(crate) fn write_state(&self) -> Result<RwLockWriteGuard<'_, NodeState>> {
        self.inner.state.write().map_err(poisoned)
    }

    /// Write access for configuration calls, refused once parsing started.
    ///
    /// The gate is checked while the write lock is held. A parse scans under
    /// the same lock, so a registration lands either before the scan or not
    /// at all.
    fn configure_state(&self, what: &str) -> Result<RwLockWriteGuard<'_, NodeState>> {
        let state = self.write_state()?;
        if self.inner.gate.has_started() {
            return Err(ArgError::Misuse(format!(
                "cannot {what} on '{}' after parsing has started",
                self.display_name()
            )));
        }
        Ok(state)
    }

    /// Long name.
    pub fn name(&self) -> &str {
        &self.inner.long
    }

    /// Short name, empty when absent.
    pub fn short_name(&self) -> &str {
        &self.inner.short
    }

    /// Long name if present, otherwise the short name.
    pub fn display_name(&self) -> &str {
        if self.inner.long.is_empty() {
            &self.inner.short
        } else {
            &self.inner.long
        }
    }

    /// The parent node, if this node is registered as a subcommand and the
    /// parent is still alive.
    pub fn parent(&self) -> Option<Command> {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.parent.upgrade().map(|inner| Command { inner })
    }

    /// Display names from the root down to this node, space separated.
    pub fn path(&self) -> String {
        let mut segments = vec![self.display_name().to_string()];
        let mut current = self.parent();
        while let Some(node) = current {
            segments.push(node.display_name().to_string());
            current = node.parent();
        }
        segments.reverse();
        segments.join(" ")
    }

    /// Sets the one-line description.
    pub fn set_description(&self, description: impl Into<String>) -> Result<()> {
        self.write_state()?.description = description.into();
        Ok(())
    }

    /// One-line description.
    pub fn description(&self) -> String {
        self.read_state()
            .map(|s| s.description.clone())
            .unwrap_or_default()
    }

    /// Registers a flag.
    ///
    /// # Errors
    ///
    /// [`ArgError::InvalidArgument`] for a flag without a usable name,
    /// [`ArgError::NameConflict`] if any of its names is taken, and
    /// [`ArgError::Misuse`] after parsing has started.
    pub fn add_flag(&self, flag: FlagRef) -> Result<()> {
        let mut state = self.configure_state("add a flag")?;
        state.flags.register(flag)
    }

    /// Registers several flags, stopping at the first failure.
    pub fn add_flags(&self, flags: impl IntoIterator<Item = FlagRef>) -> Result<()> {
        flags.into_iter().try_for_each(|flag| self.add_flag(flag))
    }

    /// Unregisters the flag answering to `name`. Groups that mention it keep
    /// the name and skip it during validation.
    pub fn remove_flag(&self, name: &str) -> Result<Option<FlagRef>> {
        let mut state = self.configure_state("remove a flag")?;
        Ok(state.flags.remove(name))
    }

    /// Looks up a flag by long or short name.
    pub fn flag(&self, name: &str) -> Option<FlagRef> {
        self.read_state().ok()?.flags.get(name).cloned()
    }

    /// All flags in registration order.
    pub fn flags(&self) -> Vec<FlagRef> {
        self.read_state()
            .map(|s| s.flags.list())
            .unwrap_or_default()
    }

    /// Registers `child` as a subcommand.
    ///
    /// # Errors
    ///
    /// - [`ArgError::InvalidArgument`] if `child` is this node or one of its
    ///   ancestors, already has a parent, or has no usable name.
    /// - [`ArgError::NameConflict`] if a sibling already uses one of its names.
    pub fn add_command(&self, child: Command) -> Result<()> {
        let mut ancestor = Some(self.clone());
        while let Some(node) = ancestor {
            if node.same_entry(&child) {
                return Err(ArgError::InvalidArgument(format!(
                    "command '{}' cannot be its own descendant",
                    child.display_name()
                )));
            }
            ancestor = node.parent();
        }
        {
            let mut state = child.write_state()?;
            if state.parent.upgrade().is_some() {
                return Err(ArgError::InvalidArgument(format!(
                    "command '{}' already has a parent",
                    child.display_name()
                )));
            }
            state.parent = Arc::downgrade(&self.inner);
        }

        let registered = self
            .configure_state("add a subcommand")
            .and_then(|mut state| state.commands.register(child.clone()));
        if let Err(err) = registered {
            child.write_state()?.parent = Weak::new();
            return Err(err);
        }
        debug!(parent = %self.display_name(), child = %child.display_name(), "registered subcommand");
        Ok(())
    }

    /// Looks up a direct subcommand by long or short name.
    pub fn find_subcommand(&self, name: &str) -> Option<Command> {
        self.read_state().ok()?.commands.get(name).cloned()
    }

    /// Direct subcommands in registration order.
    pub fn subcommands(&self) -> Vec<Command> {
        self.read_state()
            .map(|s| s.commands.list())
            .unwrap_or_default()
    }

    /// Declares a mutex group over registered flag names.
    pub fn add_mutex_group(&self, name: &str, flags: &[&str], allow_none: bool) -> Result<()> {
        let mut state = self.configure_state("add a mutex group")?;
        let NodeState {
            flags: registry,
            constraints,
            ..
        } = &mut *state;
        constraints.add_mutex_group(name, flags, allow_none, registry)
    }

    /// Removes a mutex group.
    pub fn remove_mutex_group(&self, name: &str) -> Result<MutexGroup> {
        self.configure_state("remove a mutex group")?
            .constraints
            .remove_mutex_group(name)
    }

    /// Declares a required group over registered flag names.
    pub fn add_required_group(&self, name: &str, flags: &[&str]) -> Result<()> {
        let mut state = self.configure_state("add a required group")?;
        let NodeState {
            flags: registry,
            constraints,
            ..
        } = &mut *state;
        constraints.add_required_group(name, flags, registry)
    }

    /// Removes a required group.
    pub fn remove_required_group(&self, name: &str) -> Result<RequiredGroup> {
        self.configure_state("remove a required group")?
            .constraints
            .remove_required_group(name)
    }

    /// Mutex groups in declaration order.
    pub fn mutex_groups(&self) -> Vec<MutexGroup> {
        self.read_state()
            .map(|s| s.constraints.mutex_groups().to_vec())
            .unwrap_or_default()
    }

    /// Required groups in declaration order.
    pub fn required_groups(&self) -> Vec<RequiredGroup> {
        self.read_state()
            .map(|s| s.constraints.required_groups().to_vec())
            .unwrap_or_default()
    }

    /// Sets the environment prefix used for implicit variable names.
    ///
    /// The prefix is upper-cased and suffixed with `_`: `myapp` makes the
    /// flag `log-level` fall back to `MYAPP_LOG_LEVEL`.
    pub fn set_env_prefix(&self, prefix: &str) -> Result<()> {
        self.configure_state("set the environment prefix")?.env_prefix =
            env::normalize_prefix(prefix);
        Ok(())
    }

    /// Normalized environment prefix, empty when unset.
    pub fn env_prefix(&self) -> String {
        self.read_state()
            .map(|s| s.env_prefix.clone())
            .unwrap_or_default()
    }

    /// Replaces the environment source for this node and descendants that
    /// do not set their own.
    pub fn set_env_source(&self, source: Arc<dyn EnvSource>) -> Result<()> {
        self.configure_state("set the environment source")?.env = Some(source);
        Ok(())
    }

    /// The environment source in effect: this node's, the nearest
    /// ancestor's, or the process environment.
    pub fn env_source(&self) -> Arc<dyn EnvSource> {
        self.inherited(|s| s.env.clone())
            .unwrap_or_else(|| Arc::new(ProcessEnv))
    }

    /// Sets how parse failures detected at this node are delivered.
    pub fn set_error_policy(&self, policy: ErrorPolicy) -> Result<()> {
        self.configure_state("set the error policy")?.policy = Some(policy);
        Ok(())
    }

    /// The error policy in effect: this node's, the nearest ancestor's, or
    /// [`ErrorPolicy::Continue`].
    pub fn error_policy(&self) -> ErrorPolicy {
        self.inherited(|s| s.policy).unwrap_or_default()
    }

    fn inherited<T>(&self, pick: impl Fn(&NodeState) -> Option<T>) -> Option<T> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let state = node.inner.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = pick(&state) {
                return Some(value);
            }
            current = state.parent.upgrade().map(|inner| Command { inner });
        }
        None
    }

    /// Replaces the presentation configuration.
    pub fn set_config(&self, config: CommandConfig) -> Result<()> {
        self.write_state()?.config = config;
        Ok(())
    }

    /// Copy of the presentation configuration.
    pub fn config(&self) -> CommandConfig {
        self.read_state()
            .map(|s| s.config.clone())
            .unwrap_or_default()
    }

    /// Sets the callback run after a successful [`Command::parse_and_route`]
    /// that ends at this node.
    pub fn set_run<F>(&self, run: F) -> Result<()>
    where
        F: Fn(&Command) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.configure_state("set the run callback")?.run = Some(Arc::new(run));
        Ok(())
    }

    /// Positional arguments collected by the parse of this node.
    pub fn positionals(&self) -> Vec<String> {
        self.read_state()
            .map(|s| s.positionals.clone())
            .unwrap_or_default()
    }

    /// Tri-state parse status.
    pub fn parse_status(&self) -> ParseStatus {
        self.inner.gate.status()
    }

    /// The failure cached by the first parse, if it failed.
    pub fn parse_error(&self) -> Option<ArgError> {
        self.inner.gate.error()
    }

    /// The node that finished the last routed parse started here: the
    /// deepest subcommand reached, or this node if no subcommand matched.
    /// `None` before any parse.
    pub fn executed(&self) -> Option<Command> {
        if self.parse_status() == ParseStatus::Unparsed {
            return None;
        }
        let routed = self.read_state().ok()?.routed.clone();
        match routed {
            Some(child) => child.executed(),
            None => Some(self.clone()),
        }
    }

    /// Runs a configuration closure, converting a panic inside it into
    /// [`ArgError::Misuse`].
    ///
    /// # Examples
    ///
    /// ```
    /// use argtree_core::{ArgError, Command};
    ///
    /// let cmd = Command::new("tool");
    /// let err = cmd
    ///     .configure(|_| -> argtree_core::Result<()> { panic!("bad table") })
    ///     .unwrap_err();
    /// assert!(matches!(err, ArgError::Misuse(ref m) if m.contains("bad table")));
    /// ```
    pub fn configure<F>(&self, setup: F) -> Result<()>
    where
        F: FnOnce(&Command) -> Result<()>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| setup(self))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ArgError::Misuse(format!(
                    "configuration of '{}' panicked: {message}",
                    self.display_name()
                )))
            }
        }
    }
}
