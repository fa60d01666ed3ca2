mod manifest;

use std::path::{Path, PathBuf};

use argtree_core::{Command, ParseStatus};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::manifest::{TreeManifest, find_command};

/// Output format for `describe` and `parse` reports.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "argtree", version)]
#[command(about = "Inspect and exercise declarative command-tree manifests")]
struct Cli {
    /// Log dispatch decisions to stderr (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Build the tree from a manifest and report its size.
    Check(CheckArgs),
    /// Print the snapshot of one command in the tree.
    Describe(DescribeArgs),
    /// Parse arguments against the tree and print what was resolved.
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Manifest file (YAML, or JSON with a .json extension).
    #[arg(long)]
    tree: PathBuf,
}

#[derive(Debug, Args)]
struct DescribeArgs {
    /// Manifest file (YAML, or JSON with a .json extension).
    #[arg(long)]
    tree: PathBuf,
    /// Space-separated subcommand path below the root, e.g. "remote add".
    #[arg(long, default_value = "")]
    path: String,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Manifest file (YAML, or JSON with a .json extension).
    #[arg(long)]
    tree: PathBuf,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
    /// Arguments handed to the tree, after `--`.
    #[arg(last = true)]
    args: Vec<String>,
}

/// Result of a successful `parse`.
#[derive(Debug, Serialize)]
struct ParseReport {
    command: String,
    positionals: Vec<String>,
    flags: Vec<SetFlag>,
}

#[derive(Debug, Serialize)]
struct SetFlag {
    command: String,
    flag: String,
    value: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        CliCommand::Check(args) => run_check(args),
        CliCommand::Describe(args) => run_describe(args),
        CliCommand::Parse(args) => run_parse(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_tree(path: &Path) -> Result<(TreeManifest, Command), String> {
    let manifest = TreeManifest::load(path).map_err(|e| e.to_string())?;
    let root = manifest
        .build()
        .map_err(|e| format!("Failed to build '{}': {e}", path.display()))?;
    Ok((manifest, root))
}

fn render<T: Serialize>(value: &T, format: CliOutputFormat) -> Result<String, String> {
    match format {
        CliOutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| format!("Failed to serialize output: {e}")),
        CliOutputFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|e| format!("Failed to serialize output: {e}"))
        }
    }
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let (manifest, _root) = load_tree(&args.tree)?;
    let (commands, flags) = manifest.counts();
    println!("ok: {commands} command(s), {flags} flag(s)");
    Ok(())
}

fn run_describe(args: DescribeArgs) -> Result<(), String> {
    let (_, root) = load_tree(&args.tree)?;
    let node = find_command(&root, &args.path)
        .ok_or_else(|| format!("No command at path '{}'", args.path))?;
    let snapshot = node.snapshot().map_err(|e| e.to_string())?;
    println!("{}", render(&snapshot, args.format)?);
    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<(), String> {
    let (_, root) = load_tree(&args.tree)?;
    let tokens: Vec<&str> = args.args.iter().map(String::as_str).collect();
    root.parse_and_route(&tokens).map_err(|e| e.to_string())?;

    let executed = root.executed().unwrap_or_else(|| root.clone());
    let mut flags = Vec::new();
    collect_set_flags(&root, &mut flags);
    let report = ParseReport {
        command: executed.path(),
        positionals: executed.positionals(),
        flags,
    };
    println!("{}", render(&report, args.format)?);
    Ok(())
}

/// Set flags of every parsed node, root first.
fn collect_set_flags(node: &Command, out: &mut Vec<SetFlag>) {
    if node.parse_status() == ParseStatus::Unparsed {
        return;
    }
    let path = node.path();
    for flag in node.flags().iter().filter(|f| f.is_set()) {
        out.push(SetFlag {
            command: path.clone(),
            flag: flag.info().display_name().to_string(),
            value: flag.value_string(),
        });
    }
    for child in node.subcommands() {
        collect_set_flags(&child, out);
    }
}
