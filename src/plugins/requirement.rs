//! Requirements: preconditions for running a project.
//!
//! Each requirement is backed by one environment variable. The kind decides
//! what "provided" means for that variable, and the registry decides which
//! providers can help when it is not.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::providers::conda_env;
use super::registry::PluginRegistry;
use super::status::RequirementStatus;
use crate::conda;
use crate::project::environment::PackageEnvironment;
use crate::state::LocalStateFile;
use crate::sys::{self, UrlError};
use crate::Environ;

/// Suffixes that mark a variable as holding a secret.
const ENCRYPTED_SUFFIXES: [&str; 3] = ["_PASSWORD", "_SECRET_KEY", "_SECRET"];

/// A network service a requirement can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Redis,
}

impl ServiceKind {
    /// Registry service keyword.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
        }
    }

    /// Display name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Redis => "Redis",
        }
    }

    /// URL scheme the variable must use.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
        }
    }

    /// Port assumed when the URL has none.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Redis => 6379,
        }
    }
}

/// Named package environments a project declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEnvironments {
    pub environments: IndexMap<String, PackageEnvironment>,
    pub default_name: String,
}

impl PackageEnvironments {
    /// The environment called `name`, falling back to the default.
    pub fn get_or_default(&self, name: Option<&str>) -> Option<&PackageEnvironment> {
        name.and_then(|n| self.environments.get(n))
            .or_else(|| self.environments.get(&self.default_name))
            .or_else(|| self.environments.values().next())
    }
}

/// A file fetched into the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    pub url: String,
    pub filename: String,
    pub sha256: Option<String>,
}

impl DownloadSpec {
    /// A download whose file name is the last URL path segment.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .unwrap_or("download")
            .to_string();
        Self {
            url,
            filename,
            sha256: None,
        }
    }
}

/// What kind of precondition a requirement is.
#[derive(Debug, Clone, PartialEq)]
pub enum RequirementKind {
    /// The variable must be set to a non-empty value.
    EnvVar,
    /// The variable must point at a package environment with the right packages.
    PackageEnvironment(PackageEnvironments),
    /// The variable must be a reachable URL for a service.
    Service(ServiceKind),
    /// The variable must name a downloaded file.
    Download(DownloadSpec),
}

/// One precondition for running a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    env_var: String,
    options: Mapping,
    kind: RequirementKind,
}

impl Requirement {
    /// A plain environment-variable requirement.
    pub fn variable(env_var: impl Into<String>, options: Mapping) -> Self {
        Self {
            env_var: env_var.into(),
            options,
            kind: RequirementKind::EnvVar,
        }
    }

    /// The package-environment requirement, keyed by the platform variable.
    pub fn package_environments(
        environments: IndexMap<String, PackageEnvironment>,
        default_name: impl Into<String>,
    ) -> Self {
        Self {
            env_var: conda::env_var_name().to_string(),
            options: Mapping::new(),
            kind: RequirementKind::PackageEnvironment(PackageEnvironments {
                environments,
                default_name: default_name.into(),
            }),
        }
    }

    /// A service requirement.
    pub fn service(kind: ServiceKind, env_var: impl Into<String>, options: Mapping) -> Self {
        Self {
            env_var: env_var.into(),
            options,
            kind: RequirementKind::Service(kind),
        }
    }

    /// A download requirement.
    pub fn download(env_var: impl Into<String>, spec: DownloadSpec) -> Self {
        Self {
            env_var: env_var.into(),
            options: Mapping::new(),
            kind: RequirementKind::Download(spec),
        }
    }

    /// The variable carrying this requirement's value.
    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    pub fn options(&self) -> &Mapping {
        &self.options
    }

    pub fn kind(&self) -> &RequirementKind {
        &self.kind
    }

    /// Registry keyword for the providers of this requirement.
    pub fn service_key(&self) -> &'static str {
        match &self.kind {
            RequirementKind::EnvVar => "env_var",
            RequirementKind::PackageEnvironment(_) => "conda_env",
            RequirementKind::Service(kind) => kind.name(),
            RequirementKind::Download(_) => "download",
        }
    }

    /// Human-readable description of what is needed.
    pub fn title(&self) -> String {
        match &self.kind {
            RequirementKind::EnvVar => format!("{} environment variable must be set", self.env_var),
            RequirementKind::PackageEnvironment(_) => "A Conda environment".to_string(),
            RequirementKind::Service(kind) => format!(
                "A running {} server, located by a {}: URL set as {}",
                kind.label(),
                kind.scheme(),
                self.env_var
            ),
            RequirementKind::Download(_) => {
                format!("A downloaded file which is referenced by {}", self.env_var)
            }
        }
    }

    /// Whether the value is a secret that should not be displayed.
    pub fn encrypted(&self) -> bool {
        if let Some(flag) = self.options.get("encrypted").and_then(Value::as_bool) {
            return flag;
        }
        ENCRYPTED_SUFFIXES
            .iter()
            .any(|suffix| self.env_var.ends_with(suffix))
    }

    /// The `default` option as a string.
    pub fn default_value(&self) -> Option<String> {
        match self.options.get("default")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Evaluate this requirement against a snapshot.
    ///
    /// Read-only apart from bounded socket probes.
    pub fn check_status(
        self: &Arc<Self>,
        environ: &Environ,
        local_state: &LocalStateFile,
        registry: &PluginRegistry,
    ) -> RequirementStatus {
        let (provided, description) = match self.why_not_provided(environ, local_state, registry) {
            Some(reason) => (false, reason),
            None => (true, self.provided_description(environ, local_state)),
        };
        RequirementStatus::new(
            Arc::clone(self),
            provided,
            description,
            registry.find_providers(self),
        )
    }

    /// Why the requirement is unmet, or `None` if it is met.
    pub fn why_not_provided(
        &self,
        environ: &Environ,
        local_state: &LocalStateFile,
        registry: &PluginRegistry,
    ) -> Option<String> {
        if let RequirementKind::PackageEnvironment(envs) = &self.kind {
            return conda_env::why_not_provided(self, envs, environ, local_state, registry);
        }
        let Some(value) = self.current_value(environ) else {
            return Some(self.unset_message());
        };

        match &self.kind {
            RequirementKind::EnvVar | RequirementKind::PackageEnvironment(_) => None,
            RequirementKind::Service(kind) => self.why_service_unreachable(*kind, value, registry),
            RequirementKind::Download(_) => {
                let path = resolve_against_project(value, environ);
                (!path.is_file()).then(|| format!("File not found: {}", path.display()))
            }
        }
    }

    /// Adjust `environ` once this requirement is known to be met.
    ///
    /// For the package environment this prepends the executable
    /// directories to `PATH`; other kinds leave `environ` alone.
    pub fn complete_environ(&self, environ: &mut Environ) {
        if let RequirementKind::PackageEnvironment(_) = &self.kind {
            if let Some(prefix) = self.current_value(environ).map(PathBuf::from) {
                conda::activate(environ, &prefix);
            }
        }
    }

    pub(crate) fn current_value<'e>(&self, environ: &'e Environ) -> Option<&'e str> {
        environ
            .get(&self.env_var)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn unset_message(&self) -> String {
        format!("Environment variable {} is not set.", self.env_var)
    }

    fn why_service_unreachable(
        &self,
        kind: ServiceKind,
        url: &str,
        registry: &PluginRegistry,
    ) -> Option<String> {
        let parts = match sys::split_url(url) {
            Ok(parts) if parts.scheme == kind.scheme() => parts,
            Err(UrlError::InvalidPort { scheme, port }) if scheme == kind.scheme() => {
                return Some(format!(
                    "{} value '{}' has an invalid port '{}'.",
                    self.env_var, url, port
                ));
            }
            _ => {
                return Some(format!(
                    "{} value '{}' does not have '{}:' scheme.",
                    self.env_var,
                    url,
                    kind.scheme()
                ))
            }
        };
        let host = parts.host.as_deref().unwrap_or("localhost");
        let port = parts.port.unwrap_or_else(|| kind.default_port());
        if registry.can_connect(host, port, sys::DEFAULT_SOCKET_TIMEOUT) {
            None
        } else {
            Some(format!("Cannot connect to {} at {}.", kind.label(), url))
        }
    }

    fn provided_description(&self, environ: &Environ, _local_state: &LocalStateFile) -> String {
        let value = self.current_value(environ).unwrap_or_default();
        match &self.kind {
            RequirementKind::EnvVar if self.encrypted() => {
                format!("Environment variable {} is set.", self.env_var)
            }
            RequirementKind::EnvVar => {
                format!("Environment variable {} set to '{}'", self.env_var, value)
            }
            RequirementKind::PackageEnvironment(_) => format!("Using Conda environment {}", value),
            RequirementKind::Service(kind) => format!("Using {} server at {}", kind.label(), value),
            RequirementKind::Download(_) => format!(
                "Using downloaded file {}",
                resolve_against_project(value, environ).display()
            ),
        }
    }
}

/// Resolve a possibly relative path against `PROJECT_DIR`.
pub(crate) fn resolve_against_project(value: &str, environ: &Environ) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match environ.get("PROJECT_DIR") {
        Some(dir) if !dir.is_empty() => Path::new(dir).join(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn environ(pairs: &[(&str, &str)]) -> Environ {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn redis() -> Arc<Requirement> {
        Arc::new(Requirement::service(
            ServiceKind::Redis,
            "REDIS_URL",
            Mapping::new(),
        ))
    }

    #[test]
    fn env_var_unset_is_not_provided() {
        let registry = PluginRegistry::new();
        let requirement = Arc::new(Requirement::variable("FOO", Mapping::new()));
        let status = requirement.check_status(&Environ::new(), &LocalStateFile::in_memory(), &registry);
        assert!(!status.has_been_provided());
        assert_eq!(status.status_description(), "Environment variable FOO is not set.");

        let status = requirement.check_status(
            &environ(&[("FOO", "")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert!(!status.has_been_provided());
    }

    #[test]
    fn env_var_set_is_provided() {
        let registry = PluginRegistry::new();
        let requirement = Arc::new(Requirement::variable("FOO", Mapping::new()));
        let status = requirement.check_status(
            &environ(&[("FOO", "bar")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert!(status.has_been_provided());
        assert_eq!(status.status_description(), "Environment variable FOO set to 'bar'");
        assert_eq!(status.possible_providers().len(), 1);
        assert_eq!(status.possible_providers()[0].class_name(), "EnvVarProvider");
    }

    #[test]
    fn redis_unset() {
        let registry = PluginRegistry::new().with_socket_probe(|_, _, _| false);
        let status = redis().check_status(&Environ::new(), &LocalStateFile::in_memory(), &registry);
        assert!(!status.has_been_provided());
        assert_eq!(
            status.status_description(),
            "Environment variable REDIS_URL is not set."
        );
    }

    #[test]
    fn redis_wrong_scheme_short_circuits_probe() {
        let registry = PluginRegistry::new().with_socket_probe(|_, _, _| {
            panic!("must not probe a URL with the wrong scheme")
        });
        let status = redis().check_status(
            &environ(&[("REDIS_URL", "http://example.com/")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert_eq!(
            status.status_description(),
            "REDIS_URL value 'http://example.com/' does not have 'redis:' scheme."
        );
    }

    #[test]
    fn redis_bad_port_is_reported_without_connecting() {
        let registry = PluginRegistry::new().with_socket_probe(|_, _, _| {
            panic!("must not connect when the port is invalid")
        });
        let status = redis().check_status(
            &environ(&[("REDIS_URL", "redis://example.com:abc/")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert!(!status.has_been_provided());
        assert_eq!(
            status.status_description(),
            "REDIS_URL value 'redis://example.com:abc/' has an invalid port 'abc'."
        );
    }

    #[test]
    fn redis_unreachable_probes_host_and_port() {
        let calls: Arc<Mutex<Vec<(String, u16, Duration)>>> = Arc::default();
        let seen = Arc::clone(&calls);
        let registry = PluginRegistry::new().with_socket_probe(move |host, port, timeout| {
            seen.lock().unwrap().push((host.to_string(), port, timeout));
            false
        });
        let status = redis().check_status(
            &environ(&[("REDIS_URL", "redis://example.com:1234/")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert_eq!(
            status.status_description(),
            "Cannot connect to Redis at redis://example.com:1234/."
        );
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[("example.com".to_string(), 1234, Duration::from_millis(500))]
        );
    }

    #[test]
    fn redis_default_port_and_reachable() {
        let calls: Arc<Mutex<Vec<u16>>> = Arc::default();
        let seen = Arc::clone(&calls);
        let registry = PluginRegistry::new().with_socket_probe(move |_, port, _| {
            seen.lock().unwrap().push(port);
            true
        });
        let status = redis().check_status(
            &environ(&[("REDIS_URL", "redis://localhost/")]),
            &LocalStateFile::in_memory(),
            &registry,
        );
        assert!(status.has_been_provided());
        assert_eq!(
            status.status_description(),
            "Using Redis server at redis://localhost/"
        );
        assert_eq!(calls.lock().unwrap().as_slice(), &[6379]);
    }

    #[test]
    fn titles() {
        assert_eq!(
            redis().title(),
            "A running Redis server, located by a redis: URL set as REDIS_URL"
        );
        assert_eq!(
            Requirement::variable("FOO", Mapping::new()).title(),
            "FOO environment variable must be set"
        );
        assert_eq!(
            Requirement::download("FOO", DownloadSpec::from_url("http://x/data.csv")).title(),
            "A downloaded file which is referenced by FOO"
        );
    }

    #[test]
    fn encrypted_by_suffix_or_option() {
        assert!(Requirement::variable("DB_PASSWORD", Mapping::new()).encrypted());
        assert!(Requirement::variable("API_SECRET_KEY", Mapping::new()).encrypted());
        assert!(!Requirement::variable("FOO", Mapping::new()).encrypted());

        let mut options = Mapping::new();
        options.insert("encrypted".into(), true.into());
        assert!(Requirement::variable("FOO", options).encrypted());

        let mut options = Mapping::new();
        options.insert("encrypted".into(), false.into());
        assert!(!Requirement::variable("DB_PASSWORD", options).encrypted());
    }

    #[test]
    fn default_value_stringifies_scalars() {
        let mut options = Mapping::new();
        options.insert("default".into(), 42.into());
        assert_eq!(
            Requirement::variable("FOO", options).default_value().as_deref(),
            Some("42")
        );
        assert_eq!(Requirement::variable("FOO", Mapping::new()).default_value(), None);
    }

    #[test]
    fn download_from_url_picks_filename() {
        assert_eq!(
            DownloadSpec::from_url("http://example.com/data/file.csv?x=1").filename,
            "file.csv"
        );
        assert_eq!(DownloadSpec::from_url("http://example.com/").filename, "download");
    }

    #[test]
    fn download_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let registry = PluginRegistry::new();
        let requirement = Arc::new(Requirement::download(
            "DATA",
            DownloadSpec::from_url("http://example.com/data.csv"),
        ));
        let dir = temp.path().to_string_lossy().into_owned();
        let env = environ(&[("PROJECT_DIR", &dir), ("DATA", "data.csv")]);

        let status = requirement.check_status(&env, &LocalStateFile::in_memory(), &registry);
        assert!(!status.has_been_provided());
        assert!(status.status_description().starts_with("File not found: "));

        std::fs::write(temp.path().join("data.csv"), "a,b").unwrap();
        let status = requirement.check_status(&env, &LocalStateFile::in_memory(), &registry);
        assert!(status.has_been_provided());
        assert!(status.status_description().starts_with("Using downloaded file "));
    }
}
