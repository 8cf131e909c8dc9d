//! Project-scoped persisted state.
//!
//! The descriptor is meant to be checked into version control; choices a
//! user makes while preparing a project (typed variable values, which
//! environment to use, services that were started) live in a separate
//! local state file so re-running preparation does not prompt again.

pub mod local;

pub use local::{LocalStateFile, LOCAL_STATE_DIRECTORY, LOCAL_STATE_FILENAME};
