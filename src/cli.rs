// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `sitepipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sitepipe",
    version,
    about = "Build, watch and serve a static site through a graph of transform tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). A missing file means built-in
    /// defaults.
    #[arg(long, global = true, value_name = "PATH", default_value = "Sitepipe.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SITEPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print the task graph, run nothing.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve(BuildOptions::default()))
    }
}

/// Options shared by the commands that build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Args)]
pub struct BuildOptions {
    /// Keep the existing output root instead of cleaning it before the
    /// first build.
    #[arg(long)]
    pub no_clean: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run every task once and exit. Fails if any task fails.
    Build(BuildOptions),
    /// Build once, then rebuild on every source change.
    Watch(BuildOptions),
    /// Build, serve the output with live reload, and watch.
    Serve(BuildOptions),
    /// Delete the output root.
    Clean,
}

impl Command {
    pub fn watches(self) -> bool {
        matches!(self, Command::Watch(_) | Command::Serve(_))
    }

    /// Build options, or `None` for commands that do not build.
    pub fn build_options(self) -> Option<BuildOptions> {
        match self {
            Command::Build(opts) | Command::Watch(opts) | Command::Serve(opts) => Some(opts),
            Command::Clean => None,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
