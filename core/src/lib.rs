//! Command-tree argument parsing engine.
//!
//! This crate parses command-line argument vectors against a tree of
//! commands:
//!
//! - [`Command`]: a node owning its flags, subcommands, constraint groups and
//!   parse state. Nodes are cheap handles; children are owned by parents and
//!   keep only a weak link back.
//! - [`Flag`]: the capability a flag exposes to the parser (identity, setter,
//!   is-set, reset). [`TypedFlag`] implements it for the usual value kinds.
//! - [`Registry`]: insertion-ordered, name-indexed storage for flags and
//!   subcommands with long/short uniqueness.
//! - [`Constraints`]: mutex and required groups, validated after command-line
//!   and environment values are applied.
//! - [`EnvSource`]: where environment fallback values come from.
//!
//! Every node runs its parse at most once. Later calls return the cached
//! outcome, including a cached failure. How a failure reaches the caller is
//! chosen per node with [`ErrorPolicy`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use argtree_core::*;
//!
//! let root = Command::new("report");
//! let format = Arc::new(StringFlag::new("format", "json"));
//! let output = Arc::new(StringFlag::new("output", ""));
//! root.add_flag(format.clone()).unwrap();
//! root.add_flag(output.clone()).unwrap();
//! root.add_mutex_group("destination", &["format", "output"], true)
//!     .unwrap();
//!
//! let err = root
//!     .parse(&["--format", "json", "--output", "result.txt"])
//!     .unwrap_err();
//! assert!(err.is_constraint_violation());
//! assert_eq!(root.parse_status(), ParseStatus::Failed);
//! ```

pub mod command;
pub mod config;
pub mod constraint;
pub mod env;
pub mod error;
pub mod flag;
pub mod gate;
pub mod parser;
pub mod policy;
pub mod registry;
pub mod snapshot;
pub mod value;

pub use command::{BoxError, Command, RunFn};
pub use config::{CommandConfig, Example};
pub use constraint::{Constraints, MutexGroup, RequiredGroup};
pub use env::{
    EnvSource, MapEnv, ProcessEnv, apply_fallback, env_var_for, normalize_prefix, upper_snake,
};
pub use error::{ArgError, Result, ValueError};
pub use flag::{Flag, FlagInfo, FlagRef, ValueKind};
pub use gate::ParseStatus;
pub use policy::{EXIT_STATUS, ErrorPolicy};
pub use registry::{FlagRegistry, Named, Registry, is_valid_name};
pub use snapshot::{CommandSnapshot, FlagSnapshot, SubcommandSummary};
pub use value::{
    BoolFlag, ByteSize, Choice, DurationFlag, EnumFlag, FloatFlag, FlagValue, IntFlag, MapFlag,
    SizeFlag, SliceFlag, StringFlag, TypedFlag, UintFlag, format_duration, parse_duration,
};
