//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::prepare::UiMode;

/// Tarp - Declarative project environments.
#[derive(Debug, Parser)]
#[command(name = "tarp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true, env = "TARP_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Set up everything the project needs
    Prepare(PrepareArgs),

    /// Report which requirements are met without changing anything
    Check,

    /// Prepare the project, then run one of its commands
    Run(RunArgs),

    /// Declare variables and record their values for this project
    SetVariable(SetVariableArgs),

    /// Describe the project
    Info(InfoArgs),

    /// Stop services and remove environments the project created
    Clean,
}

/// How `prepare` resolves unmet requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Ask in a web browser
    Browser,
    /// Only report unmet requirements
    Check,
    /// Use default choices without asking
    Auto,
}

impl From<ModeArg> for UiMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Browser => UiMode::Browser,
            ModeArg::Check => UiMode::Check,
            ModeArg::Auto => UiMode::Auto,
        }
    }
}

/// Arguments for the `prepare` command.
#[derive(Debug, Clone, clap::Args)]
pub struct PrepareArgs {
    /// How to resolve unmet requirements
    #[arg(long, value_enum, default_value = "browser")]
    pub mode: ModeArg,

    /// Keep the browser session open until everything is met
    #[arg(long)]
    pub keep_going: bool,

    /// Stop at the first provider failure (auto mode)
    #[arg(long)]
    pub fail_fast: bool,
}

impl Default for PrepareArgs {
    fn default() -> Self {
        Self {
            mode: ModeArg::Browser,
            keep_going: false,
            fail_fast: false,
        }
    }
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Command to run (defaults to the project's default command)
    #[arg(short, long)]
    pub command: Option<String>,

    /// How to resolve unmet requirements before running
    #[arg(long, value_enum, default_value = "auto")]
    pub mode: ModeArg,

    /// Extra arguments passed to the command
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            command: None,
            mode: ModeArg::Auto,
            args: Vec::new(),
        }
    }
}

/// Arguments for the `set-variable` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SetVariableArgs {
    /// Assignments in NAME=VALUE form
    #[arg(required = true, value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

/// Arguments for the `info` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
