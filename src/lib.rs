//! Tarp - Declarative project requirements and environment preparation.
//!
//! A project directory carries a `tarp.yml` describing what it needs to
//! run: environment variables, Conda package environments, services such
//! as Redis, and files to download. Tarp checks those requirements against
//! the current environment, provides the missing ones automatically or
//! through a browser wizard, and launches project commands in the
//! prepared environment.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`conda`] - Conda package manager integration
//! - [`error`] - Error types and result aliases
//! - [`plugins`] - Requirements, providers and their registry
//! - [`prepare`] - Preparing a project, interactively or not
//! - [`project`] - Project descriptor loading and validation
//! - [`state`] - Per-project local state
//! - [`sys`] - Small platform helpers
//! - [`ui`] - Terminal output
//!
//! # Example
//!
//! ```no_run
//! use tarp::prepare::{prepare, PrepareOptions, UiMode};
//! use tarp::project::Project;
//!
//! let project = Project::load("path/to/project");
//! let environ = std::env::vars().collect();
//! let result = prepare(&project, environ, PrepareOptions::new(UiMode::Check));
//! for error in result.errors() {
//!     eprintln!("{}", error);
//! }
//! ```

use std::collections::BTreeMap;

pub mod cli;
pub mod conda;
pub mod error;
pub mod plugins;
pub mod prepare;
pub mod project;
pub mod state;
pub mod sys;
pub mod ui;

pub use error::{Result, TarpError};

/// A set of environment variables.
pub type Environ = BTreeMap<String, String>;
