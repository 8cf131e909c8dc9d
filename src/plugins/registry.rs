//! The plugin registry.
//!
//! Maps provider class names to constructors and service keywords to the
//! providers able to satisfy them. It also owns the collaborators providers
//! reach out to (package manager, socket probe, HTTP fetcher) so tests can
//! swap them for fakes. A registry is built once and passed down explicitly.
//!
//! # Example
//!
//! ```
//! use tarp::plugins::PluginRegistry;
//!
//! let registry = PluginRegistry::new().with_socket_probe(|_, _, _| false);
//! assert!(registry.find_provider_by_class_name("RedisProvider").is_some());
//! assert_eq!(registry.find_providers_by_service("redis").len(), 1);
//! ```

use indexmap::IndexMap;
use serde_yaml::Mapping;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::fetch::HttpFetcher;
use super::provider::Provider;
use super::providers::{CondaEnvProvider, DownloadProvider, EnvVarProvider, RedisProvider};
use super::requirement::{Requirement, ServiceKind};
use crate::conda::{CondaCli, PackageManager};
use crate::error::{Result, TarpError};
use crate::sys;

/// Constructs a provider instance.
pub type ProviderFactory = fn() -> Arc<dyn Provider>;

/// Decides whether `host:port` accepts connections within a timeout.
pub type SocketProbe = Arc<dyn Fn(&str, u16, Duration) -> bool + Send + Sync>;

/// Catalog of providers and the collaborators they use.
#[derive(Clone)]
pub struct PluginRegistry {
    providers: IndexMap<String, ProviderFactory>,
    services: IndexMap<String, Vec<String>>,
    package_manager: Arc<dyn PackageManager>,
    socket_probe: SocketProbe,
    fetcher: HttpFetcher,
}

impl PluginRegistry {
    /// A registry with the built-in providers and production collaborators.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, &str, ProviderFactory); 4] = [
            ("env_var", "EnvVarProvider", || Arc::new(EnvVarProvider)),
            ("conda_env", "CondaEnvProvider", || Arc::new(CondaEnvProvider)),
            ("redis", "RedisProvider", || Arc::new(RedisProvider)),
            ("download", "DownloadProvider", || Arc::new(DownloadProvider)),
        ];
        for (service, class_name, factory) in builtins {
            registry.providers.insert(class_name.to_string(), factory);
            registry
                .services
                .entry(service.to_string())
                .or_default()
                .push(class_name.to_string());
        }
        registry
    }

    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            providers: IndexMap::new(),
            services: IndexMap::new(),
            package_manager: Arc::new(CondaCli::new()),
            socket_probe: Arc::new(sys::can_connect_to_socket),
            fetcher: HttpFetcher::new(),
        }
    }

    /// Replace the package manager.
    pub fn with_package_manager(mut self, package_manager: Arc<dyn PackageManager>) -> Self {
        self.package_manager = package_manager;
        self
    }

    /// Replace the socket probe.
    pub fn with_socket_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn(&str, u16, Duration) -> bool + Send + Sync + 'static,
    {
        self.socket_probe = Arc::new(probe);
        self
    }

    /// Replace the HTTP fetcher.
    pub fn with_fetcher(mut self, fetcher: HttpFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Register a provider class. Class names are unique.
    pub fn register_provider(&mut self, class_name: &str, factory: ProviderFactory) -> Result<()> {
        if self.providers.contains_key(class_name) {
            return Err(TarpError::DuplicateProvider {
                name: class_name.to_string(),
            });
        }
        self.providers.insert(class_name.to_string(), factory);
        Ok(())
    }

    /// Offer a registered provider class for a service keyword.
    pub fn register_service(&mut self, service: &str, class_name: &str) -> Result<()> {
        if !self.providers.contains_key(class_name) {
            return Err(TarpError::UnknownProvider {
                name: class_name.to_string(),
            });
        }
        let classes = self.services.entry(service.to_string()).or_default();
        if !classes.iter().any(|c| c == class_name) {
            classes.push(class_name.to_string());
        }
        Ok(())
    }

    /// Registered provider class names, in registration order.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Instantiate a provider by class name.
    pub fn find_provider_by_class_name(&self, class_name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(class_name).map(|factory| factory())
    }

    /// Instantiate every provider offered for a service keyword.
    pub fn find_providers_by_service(&self, service: &str) -> Vec<Arc<dyn Provider>> {
        self.services
            .get(service)
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| self.find_provider_by_class_name(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Providers able to satisfy `requirement`, default first.
    pub fn find_providers(&self, requirement: &Requirement) -> Vec<Arc<dyn Provider>> {
        self.find_providers_by_service(requirement.service_key())
    }

    /// Build the requirement for a `runtime` variable.
    ///
    /// Well-known variable names map to service requirements; everything
    /// else is a plain environment variable.
    pub fn find_requirement_by_env_var(&self, env_var: &str, options: Mapping) -> Requirement {
        match env_var {
            "REDIS_URL" => Requirement::service(ServiceKind::Redis, env_var, options),
            _ => Requirement::variable(env_var, options),
        }
    }

    pub fn package_manager(&self) -> &dyn PackageManager {
        self.package_manager.as_ref()
    }

    /// Probe `host:port` through the configured socket probe.
    pub fn can_connect(&self, host: &str, port: u16, timeout: Duration) -> bool {
        (self.socket_probe)(host, port, timeout)
    }

    pub fn fetcher(&self) -> &HttpFetcher {
        &self.fetcher
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
