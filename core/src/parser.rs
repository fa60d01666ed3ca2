//! Tokenizer and recursive dispatch.
//!
//! Each node scans its tokens left to right. Option tokens are resolved
//! against the node's flag registry; the first non-option token may name a
//! subcommand, in which case the rest of the list is handed to that child.
//! Everything else is collected as positional arguments. Once scanning stops
//! the node applies environment fallback and validates its constraint groups,
//! and only then recurses or runs its callback.
//!
//! Accepted option forms:
//!
//! | form            | meaning                                        |
//! |-----------------|------------------------------------------------|
//! | `--name`        | bool flag set to true; other kinds read next token |
//! | `--name=value`  | value embedded in the token                    |
//! | `-x`            | as `--name`, by short name                     |
//! | `-x value`      | value in the following token                   |
//! | `-x=value`      | value embedded in the token                    |
//!
//! `--` and a lone `-` are ordinary tokens.

use tracing::{debug, trace};

use crate::command::Command;
use crate::env::{self, EnvSource};
use crate::error::{ArgError, Result};
use crate::flag::{Flag, FlagRef};
use crate::gate::Failure;
use crate::policy;

/// Which parts of the dispatch algorithm an entry point runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Only this node; subcommand names are positionals.
    CurrentOnly,
    /// Recurse into a matched subcommand, run the callback at the leaf.
    Route,
    /// Stop at a matched subcommand and keep the rest as positionals.
    Collect,
}

/// A parsed option token.
#[derive(Debug, PartialEq, Eq)]
struct OptionToken<'a> {
    long: bool,
    name: &'a str,
    value: Option<&'a str>,
}

impl OptionToken<'_> {
    fn introducer(&self) -> String {
        if self.long {
            format!("--{}", self.name)
        } else {
            format!("-{}", self.name)
        }
    }
}

/// Splits an option token; returns `None` for positional tokens.
fn split_option(token: &str) -> Option<OptionToken<'_>> {
    let (long, body) = match token.strip_prefix("--") {
        Some(body) => (true, body),
        None => (false, token.strip_prefix('-')?),
    };
    if body.is_empty() {
        return None;
    }
    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (body, None),
    };
    Some(OptionToken { long, name, value })
}

fn assign(flag: &FlagRef, raw: &str) -> Result<()> {
    debug!(flag = %flag.info().display_name(), value = raw, "assigning flag");
    flag.set(raw).map_err(|source| ArgError::InvalidValue {
        flag: flag.info().display_name().to_string(),
        source,
    })
}

impl Command {
    /// Parses `args` against this node only.
    ///
    /// Subcommand names are not matched; every non-option token is a
    /// positional. Only the first call on a node does any work: later calls
    /// return the first outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use argtree_core::{Command, StringFlag};
    ///
    /// let cmd = Command::new("convert");
    /// let format = Arc::new(StringFlag::new("format", "json").with_short("f"));
    /// cmd.add_flag(format.clone()).unwrap();
    ///
    /// cmd.parse(&["in.csv", "-f", "yaml", "out.yaml"]).unwrap();
    /// assert_eq!(format.value(), "yaml");
    /// assert_eq!(cmd.positionals(), vec!["in.csv", "out.yaml"]);
    /// ```
    pub fn parse(&self, args: &[&str]) -> Result<()> {
        self.parse_with(args, Mode::CurrentOnly)
    }

    /// Parses `args`, routes into the matched subcommand and runs the run
    /// callback of the node where routing ends.
    pub fn parse_and_route(&self, args: &[&str]) -> Result<()> {
        self.parse_with(args, Mode::Route)
    }

    /// Parses `args` against this node without entering subcommands.
    ///
    /// A token naming a subcommand, and everything after it, is recorded as
    /// positionals so the caller can dispatch it later.
    pub fn parse_without_route(&self, args: &[&str]) -> Result<()> {
        self.parse_with(args, Mode::Collect)
    }

    fn parse_with(&self, args: &[&str], mode: Mode) -> Result<()> {
        debug!(command = %self.path(), ?mode, tokens = args.len(), "parse requested");
        self.dispatch(args, mode)
            .map_err(|failure| policy::deliver(failure.policy, failure.error))
    }

    fn dispatch(&self, args: &[&str], mode: Mode) -> std::result::Result<(), Failure> {
        self.inner.gate.run(|| self.dispatch_once(args, mode))
    }

    fn dispatch_once(&self, args: &[&str], mode: Mode) -> std::result::Result<(), Failure> {
        let policy = self.error_policy();
        let fail = move |error: ArgError| Failure { error, policy };
        let env = self.env_source();

        match self.scan(args, mode, env.as_ref()).map_err(fail)? {
            Some((child, rest)) => {
                debug!(parent = %self.display_name(), child = %child.display_name(), "routing to subcommand");
                child.dispatch(rest, mode)
            }
            None if mode == Mode::Route => self.invoke_run().map_err(fail),
            None => Ok(()),
        }
    }

    /// Scans this node's tokens, then applies environment fallback and
    /// validates constraints. Returns the child to route to, if any.
    fn scan<'a>(
        &self,
        args: &'a [&'a str],
        mode: Mode,
        env_source: &dyn EnvSource,
    ) -> Result<Option<(Command, &'a [&'a str])>> {
        let mut state = self.write_state()?;
        let mut next = None;
        let mut i = 0;

        while i < args.len() {
            let token = args[i];
            trace!(index = i, token, "scanning token");

            if let Some(option) = split_option(token) {
                let flag = state
                    .flags
                    .get(option.name)
                    .filter(|flag| {
                        let info = flag.info();
                        if option.long {
                            info.long == option.name
                        } else {
                            info.short == option.name
                        }
                    })
                    .cloned()
                    .ok_or_else(|| ArgError::UnknownFlag(option.introducer()))?;

                let raw = match option.value {
                    Some(value) => value,
                    None if flag.is_bool() => "",
                    None => {
                        i += 1;
                        *args.get(i).ok_or_else(|| {
                            ArgError::MissingValue(flag.info().display_name().to_string())
                        })?
                    }
                };
                assign(&flag, raw)?;
            } else {
                let child = if mode != Mode::CurrentOnly && state.positionals.is_empty() {
                    state.commands.get(token).cloned()
                } else {
                    None
                };
                match child {
                    Some(child) if mode == Mode::Collect => {
                        debug!(child = %child.display_name(), "collecting subcommand tokens as positionals");
                        state
                            .positionals
                            .extend(args[i..].iter().map(|s| s.to_string()));
                        break;
                    }
                    Some(child) => {
                        next = Some((child, &args[i + 1..]));
                        break;
                    }
                    None => state.positionals.push(token.to_string()),
                }
            }
            i += 1;
        }

        let flags = state.flags.list();
        env::apply_fallback(&flags, &state.env_prefix, env_source)?;
        state.constraints.validate(&state.flags)?;

        state.routed = next.as_ref().map(|(child, _)| child.clone());
        Ok(next)
    }

    fn invoke_run(&self) -> Result<()> {
        let run = self.read_state()?.run.clone();
        match run {
            Some(run) => {
                debug!(command = %self.path(), "invoking run callback");
                run(self).map_err(ArgError::run)
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::env::MapEnv;
    use crate::gate::ParseStatus;
    use crate::value::{BoolFlag, IntFlag, SliceFlag, StringFlag};

    #[test]
    fn test_split_option_forms() {
        assert_eq!(
            split_option("--name=value"),
            Some(OptionToken {
                long: true,
                name: "name",
                value: Some("value"),
            })
        );
        assert_eq!(
            split_option("-x"),
            Some(OptionToken {
                long: false,
                name: "x",
                value: None,
            })
        );
        assert_eq!(split_option("--empty=").unwrap().value, Some(""));
        assert_eq!(split_option("--"), None);
        assert_eq!(split_option("-"), None);
        assert_eq!(split_option("plain"), None);
    }

    #[test]
    fn test_option_forms_assign_values() {
        let cmd = Command::new("tool");
        let name = Arc::new(StringFlag::new("name", "").with_short("n"));
        let level = Arc::new(IntFlag::new("level", 0).with_short("l"));
        let force = Arc::new(BoolFlag::new("force", false).with_short("f"));
        let flags: Vec<FlagRef> = vec![name.clone(), level.clone(), force.clone()];
        cmd.add_flags(flags).unwrap();

        cmd.parse(&["--name=alpha", "-l", "3", "-f"]).unwrap();
        assert_eq!(name.value(), "alpha");
        assert_eq!(level.value(), 3);
        assert!(force.value());
    }

    #[test]
    fn test_bool_flag_does_not_consume_next_token() {
        let cmd = Command::new("tool");
        let verbose = Arc::new(BoolFlag::new("verbose", false));
        cmd.add_flag(verbose.clone()).unwrap();

        cmd.parse(&["--verbose", "input.txt"]).unwrap();
        assert!(verbose.value());
        assert_eq!(cmd.positionals(), vec!["input.txt"]);
    }

    #[test]
    fn test_explicit_bool_value() {
        let cmd = Command::new("tool");
        let cache = Arc::new(BoolFlag::new("cache", true));
        cmd.add_flag(cache.clone()).unwrap();

        cmd.parse(&["--cache=false"]).unwrap();
        assert!(!cache.value());
        assert!(cache.is_set());
    }

    #[test]
    fn test_unknown_flag() {
        let cmd = Command::new("tool");
        let err = cmd.parse(&["--bogus"]).unwrap_err();
        assert!(matches!(err, ArgError::UnknownFlag(ref f) if f == "--bogus"));
        assert_eq!(cmd.parse_status(), ParseStatus::Failed);
    }

    #[test]
    fn test_short_and_long_introducers_are_not_interchangeable() {
        let cmd = Command::new("tool");
        cmd.add_flag(Arc::new(BoolFlag::new("verbose", false).with_short("v")))
            .unwrap();
        let err = cmd.parse(&["--v"]).unwrap_err();
        assert!(matches!(err, ArgError::UnknownFlag(ref f) if f == "--v"));

        let other = Command::new("tool");
        other
            .add_flag(Arc::new(BoolFlag::new("verbose", false).with_short("v")))
            .unwrap();
        let err = other.parse(&["-verbose"]).unwrap_err();
        assert!(matches!(err, ArgError::UnknownFlag(ref f) if f == "-verbose"));
    }

    #[test]
    fn test_missing_value_at_end() {
        let cmd = Command::new("tool");
        cmd.add_flag(Arc::new(StringFlag::new("output", "").with_short("o")))
            .unwrap();
        let err = cmd.parse(&["-o"]).unwrap_err();
        assert!(matches!(err, ArgError::MissingValue(ref f) if f == "output"));
    }

    #[test]
    fn test_setter_failure_keeps_earlier_assignments() {
        let cmd = Command::new("tool");
        let name = Arc::new(StringFlag::new("name", ""));
        let port = Arc::new(IntFlag::new("port", 80));
        let flags: Vec<FlagRef> = vec![name.clone(), port.clone()];
        cmd.add_flags(flags).unwrap();

        let err = cmd.parse(&["--name", "api", "--port", "http"]).unwrap_err();
        assert!(matches!(err, ArgError::InvalidValue { ref flag, .. } if flag == "port"));
        assert_eq!(name.value(), "api");
        assert_eq!(port.value(), 80);
    }

    #[test]
    fn test_flags_after_positionals() {
        let cmd = Command::new("sub");
        let opt = Arc::new(StringFlag::new("opt", ""));
        let another = Arc::new(BoolFlag::new("another", false));
        let flags: Vec<FlagRef> = vec![opt.clone(), another.clone()];
        cmd.add_flags(flags).unwrap();

        cmd.parse(&["--opt", "v", "extra1", "extra2", "--another"])
            .unwrap();
        assert_eq!(opt.value(), "v");
        assert!(another.value());
        assert_eq!(cmd.positionals(), vec!["extra1", "extra2"]);
    }

    #[test]
    fn test_double_dash_is_positional() {
        let cmd = Command::new("tool");
        cmd.add_flag(Arc::new(BoolFlag::new("all", false))).unwrap();
        cmd.parse(&["--", "-", "file"]).unwrap();
        assert_eq!(cmd.positionals(), vec!["--", "-", "file"]);
    }

    #[test]
    fn test_repeated_slice_flag() {
        let cmd = Command::new("tool");
        let tags = Arc::new(SliceFlag::new("tag", vec!["default".to_string()]));
        cmd.add_flag(tags.clone()).unwrap();

        cmd.parse(&["--tag", "a,b", "--tag=c"]).unwrap();
        assert_eq!(tags.value(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_only_first_positional_can_name_a_child() {
        let root = Command::new("root");
        let child = Command::new("build");
        root.add_command(child.clone()).unwrap();

        root.parse_and_route(&["file", "build"]).unwrap();
        assert_eq!(root.positionals(), vec!["file", "build"]);
        assert_eq!(child.parse_status(), ParseStatus::Unparsed);
        assert_eq!(root.executed().unwrap().name(), "root");
    }

    #[test]
    fn test_parse_current_only_ignores_children() {
        let root = Command::new("root");
        let child = Command::new("build");
        root.add_command(child.clone()).unwrap();

        root.parse(&["build", "x"]).unwrap();
        assert_eq!(root.positionals(), vec!["build", "x"]);
        assert_eq!(child.parse_status(), ParseStatus::Unparsed);
    }

    #[test]
    fn test_parse_without_route_collects_remainder() {
        let root = Command::new("root");
        let verbose = Arc::new(BoolFlag::new("verbose", false));
        root.add_flag(verbose.clone()).unwrap();
        let child = Command::with_short("build", "b");
        child
            .add_flag(Arc::new(BoolFlag::new("release", false)))
            .unwrap();
        root.add_command(child.clone()).unwrap();

        root.parse_without_route(&["--verbose", "b", "--release", "--verbose"])
            .unwrap();
        assert!(verbose.value());
        assert_eq!(root.positionals(), vec!["b", "--release", "--verbose"]);
        assert_eq!(child.parse_status(), ParseStatus::Unparsed);
    }

    #[test]
    fn test_routing_passes_remaining_tokens() {
        let root = Command::new("root");
        let verbose = Arc::new(BoolFlag::new("verbose", false).with_short("v"));
        root.add_flag(verbose.clone()).unwrap();
        let child = Command::new("run");
        let jobs = Arc::new(IntFlag::new("jobs", 1).with_short("j"));
        child.add_flag(jobs.clone()).unwrap();
        root.add_command(child.clone()).unwrap();

        root.parse_and_route(&["-v", "run", "-j", "8", "target"])
            .unwrap();
        assert!(verbose.value());
        assert_eq!(jobs.value(), 8);
        assert!(root.positionals().is_empty());
        assert_eq!(child.positionals(), vec!["target"]);
        assert_eq!(child.parse_status(), ParseStatus::Parsed);
    }

    #[test]
    fn test_parent_flags_are_unknown_to_child() {
        let root = Command::new("root");
        root.add_flag(Arc::new(BoolFlag::new("verbose", false)))
            .unwrap();
        let child = Command::new("run");
        root.add_command(child.clone()).unwrap();

        let err = root.parse_and_route(&["run", "--verbose"]).unwrap_err();
        assert!(matches!(err, ArgError::UnknownFlag(_)));
        assert_eq!(root.parse_status(), ParseStatus::Failed);
        assert_eq!(child.parse_status(), ParseStatus::Failed);
    }

    #[test]
    fn test_parent_constraints_checked_before_routing() {
        let root = Command::new("root");
        root.add_flag(Arc::new(StringFlag::new("token", ""))).unwrap();
        root.add_required_group("auth", &["token"]).unwrap();
        let child = Command::new("push");
        root.add_command(child.clone()).unwrap();

        let err = root.parse_and_route(&["push"]).unwrap_err();
        assert!(matches!(err, ArgError::GroupUnsatisfied { ref group, .. } if group == "auth"));
        assert_eq!(child.parse_status(), ParseStatus::Unparsed);
    }

    #[test]
    fn test_env_fallback_runs_before_validation() {
        let cmd = Command::new("tool");
        let token = Arc::new(StringFlag::new("api-token", ""));
        cmd.add_flag(token.clone()).unwrap();
        cmd.add_required_group("auth", &["api-token"]).unwrap();
        cmd.set_env_prefix("tool").unwrap();
        cmd.set_env_source(Arc::new(MapEnv::new().with("TOOL_API_TOKEN", "abc")))
            .unwrap();

        cmd.parse(&[]).unwrap();
        assert_eq!(token.value(), "abc");
    }

    #[test]
    fn test_child_inherits_env_source() {
        let root = Command::new("root");
        root.set_env_source(Arc::new(MapEnv::new().with("REGION", "eu-west-1")))
            .unwrap();
        let child = Command::new("deploy");
        let region = Arc::new(StringFlag::new("region", "us-east-1").with_env("REGION"));
        child.add_flag(region.clone()).unwrap();
        root.add_command(child).unwrap();

        root.parse_and_route(&["deploy"]).unwrap();
        assert_eq!(region.value(), "eu-west-1");
    }

    #[test]
    fn test_run_callback_invoked_once_at_leaf() {
        let calls = Arc::new(AtomicUsize::new(0));
        let root = Command::new("root");
        let child = Command::new("serve");
        let seen = calls.clone();
        child
            .set_run(move |cmd| {
                assert_eq!(cmd.path(), "root serve");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        root.set_run(|_| Err("root should not run".into())).unwrap();
        root.add_command(child).unwrap();

        root.parse_and_route(&["serve"]).unwrap();
        root.parse_and_route(&["serve"]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_callback_not_invoked_without_routing() {
        let cmd = Command::new("tool");
        cmd.set_run(|_| Err("should not run".into())).unwrap();
        cmd.parse(&[]).unwrap();
    }

    #[test]
    fn test_run_error_returned_unchanged() {
        let cmd = Command::new("tool");
        cmd.set_run(|_| Err("disk full".into())).unwrap();

        let err = cmd.parse_and_route(&[]).unwrap_err();
        assert!(matches!(err, ArgError::Run(_)));
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(cmd.parse_status(), ParseStatus::Failed);
    }

    #[test]
    fn test_reentrant_parse_from_callback_is_misuse() {
        let cmd = Command::new("tool");
        cmd.set_run(|cmd| {
            match cmd.parse(&[]) {
                Err(ArgError::Misuse(_)) => Ok(()),
                other => Err(format!("unexpected: {other:?}").into()),
            }
        })
        .unwrap();
        cmd.parse_and_route(&[]).unwrap();
    }

    #[test]
    fn test_entry_points_share_one_gate() {
        let cmd = Command::new("tool");
        let name = Arc::new(StringFlag::new("name", ""));
        cmd.add_flag(name.clone()).unwrap();

        cmd.parse_without_route(&["--name", "first"]).unwrap();
        cmd.parse(&["--name", "second"]).unwrap();
        cmd.parse_and_route(&["--bogus"]).unwrap();
        assert_eq!(name.value(), "first");
    }

    #[test]
    fn test_failure_is_resurfaced_on_repeat() {
        let cmd = Command::new("tool");
        cmd.add_flag(Arc::new(IntFlag::new("count", 0))).unwrap();

        let first = cmd.parse(&["--count", "x"]).unwrap_err();
        let second = cmd.parse(&["--count", "2"]).unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert!(cmd.parse_error().is_some());
    }
}
