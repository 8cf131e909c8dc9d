//! Requirements, providers, and the registry tying them together.
//!
//! # Architecture
//!
//! - [`requirement`] - What a project needs, and how to tell if it has it
//! - [`status`] - One evaluation of a requirement
//! - [`provider`] - The provider contract and its configuration forms
//! - [`providers`] - Built-in providers
//! - [`registry`] - Provider lookup and injectable collaborators
//! - [`fetch`] - HTTP downloads

pub mod fetch;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod requirement;
pub mod status;

pub use fetch::HttpFetcher;
pub use provider::{
    Choice, ConfigForm, FormField, ProvideContext, Provider, ProviderConfig, SOURCE_FIELD,
    VALUE_FIELD,
};
pub use registry::{PluginRegistry, ProviderFactory, SocketProbe};
pub use requirement::{
    DownloadSpec, PackageEnvironments, Requirement, RequirementKind, ServiceKind,
};
pub use status::RequirementStatus;
