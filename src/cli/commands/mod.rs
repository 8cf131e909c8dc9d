//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. This allows:
//! - Single binary with subcommands (`tarp prepare`, `tarp run`)
//! - Shared project loading and problem reporting
//! - Consistent global flag handling

pub mod clean;
pub mod dispatcher;
pub mod display;
pub mod info;
pub mod prepare;
pub mod run;
pub mod set_variable;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
