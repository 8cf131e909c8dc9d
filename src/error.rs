//! Error types for Tarp operations.
//!
//! This module defines [`TarpError`], the primary error type used throughout
//! the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Descriptor problems are collected as strings on the project and never
//!   become errors until someone tries to prepare the project
//! - Provider failures are returned as `TarpError` and downgraded by the
//!   prepare engine into an unsatisfied requirement status
//! - Use `anyhow::Error` (via `TarpError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for Tarp operations.
#[derive(Debug, Error)]
pub enum TarpError {
    /// Project directory does not exist.
    #[error("Project directory '{}' does not exist.", path.display())]
    ProjectNotFound { path: PathBuf },

    /// The project descriptor has structural problems.
    #[error("Unable to load the project: {}", problems.join("; "))]
    ProjectProblems { problems: Vec<String> },

    /// Preparation ended with unmet requirements.
    #[error("{}", errors.join("\n"))]
    PrepareFailed { errors: Vec<String> },

    /// Failed to parse the local state file.
    #[error("Failed to parse local state at {path}: {message}")]
    LocalStateParseError { path: PathBuf, message: String },

    /// A variable required to build a command line is missing.
    #[error("{name} must be set")]
    MissingEnvironmentVariable { name: String },

    /// Two providers were registered under one class name.
    #[error("Provider '{name}' is already registered")]
    DuplicateProvider { name: String },

    /// Referenced provider class is not registered.
    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    /// The package manager failed to create or update an environment.
    #[error("{message}")]
    PackageManager { message: String },

    /// External command failed.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// Downloading a file failed.
    #[error("Failed to download {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// A provider could not satisfy its requirement.
    #[error("{provider}: {message}")]
    ProviderFailed { provider: String, message: String },

    /// The browser session could not serve a request.
    #[error("Browser UI error: {message}")]
    Http { message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Tarp operations.
pub type Result<T> = std::result::Result<T, TarpError>;
