//! Preparation: driving a project's requirements to a met state.
//!
//! # Architecture
//!
//! - `engine` - Evaluation, provider invocation and run bookkeeping
//! - `browser` - The interactive session over HTTP
//! - `http` - The session's listener
//! - `page` - Form rendering and parsing
//!
//! Three modes are available through [`UiMode`]:
//!
//! - [`UiMode::Check`] never invokes a provider; any unmet requirement
//!   fails the run with its status.
//! - [`UiMode::Auto`] runs each unmet requirement's default provider with
//!   its recorded (or default) configuration.
//! - [`UiMode::Browser`] asks the user through a local web page.
//!
//! # Example
//!
//! ```no_run
//! use tarp::prepare::{prepare, PrepareOptions, UiMode};
//! use tarp::project::Project;
//!
//! let project = Project::load(".");
//! let environ = std::env::vars().collect();
//! let result = prepare(&project, environ, PrepareOptions::new(UiMode::Auto));
//! for error in result.errors() {
//!     eprintln!("{}", error);
//! }
//! ```

mod browser;
mod engine;
mod http;
mod page;

pub use browser::{default_opener, STOPPED_MESSAGE};
pub use http::SessionHandle;

use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, TarpError};
use crate::plugins::RequirementStatus;
use crate::project::Project;
use crate::Environ;
use browser::BrowserSession;
use engine::Preparation;

/// How unmet requirements are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Ask through a local web page.
    #[default]
    Browser,
    /// Report unmet requirements without providing anything.
    Check,
    /// Provide everything with default choices.
    Auto,
}

/// Called with the running session; expected to return promptly.
pub type BrowserOpener = Box<dyn FnOnce(SessionHandle) + Send>;

/// Options for one [`prepare`] run.
pub struct PrepareOptions {
    pub mode: UiMode,
    /// Browser mode: keep the session open after a submission that did
    /// not meet every requirement. When false the first such submission
    /// ends the run.
    pub keep_going_until_success: bool,
    /// Auto mode: stop at the first provider error instead of carrying on
    /// with later requirements.
    pub fail_fast: bool,
    /// Browser mode: how to show the session to the user.
    pub browser_opener: Option<BrowserOpener>,
}

impl PrepareOptions {
    pub fn new(mode: UiMode) -> Self {
        Self {
            mode,
            keep_going_until_success: false,
            fail_fast: false,
            browser_opener: None,
        }
    }

    pub fn keep_going_until_success(mut self, keep_going: bool) -> Self {
        self.keep_going_until_success = keep_going;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_browser_opener<F>(mut self, opener: F) -> Self
    where
        F: FnOnce(SessionHandle) + Send + 'static,
    {
        self.browser_opener = Some(Box::new(opener));
        self
    }
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self::new(UiMode::default())
    }
}

impl fmt::Debug for PrepareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareOptions")
            .field("mode", &self.mode)
            .field("keep_going_until_success", &self.keep_going_until_success)
            .field("fail_fast", &self.fail_fast)
            .field("browser_opener", &self.browser_opener.is_some())
            .finish()
    }
}

/// Outcome of one preparation run.
#[derive(Debug, Clone)]
pub enum PrepareResult {
    /// Every requirement is met; `environ` is ready for running commands.
    Success {
        environ: Environ,
        statuses: Vec<RequirementStatus>,
    },
    /// Something is still unmet. `errors` is never empty.
    Failure {
        errors: Vec<String>,
        statuses: Vec<RequirementStatus>,
        environ: Environ,
    },
}

impl PrepareResult {
    pub(crate) fn failure(errors: Vec<String>) -> Self {
        Self::Failure {
            errors,
            statuses: Vec::new(),
            environ: Environ::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The environment at the end of the run.
    pub fn environ(&self) -> &Environ {
        match self {
            Self::Success { environ, .. } | Self::Failure { environ, .. } => environ,
        }
    }

    /// Statuses observed when the run ended.
    pub fn statuses(&self) -> &[RequirementStatus] {
        match self {
            Self::Success { statuses, .. } | Self::Failure { statuses, .. } => statuses,
        }
    }

    /// Error lines; empty on success.
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { errors, .. } => errors,
        }
    }

    /// The status of the requirement carried by `env_var`.
    pub fn status_for(&self, env_var: &str) -> Option<&RequirementStatus> {
        self.statuses()
            .iter()
            .find(|s| s.requirement().env_var() == env_var)
    }

    /// Convert into the final environment or a [`TarpError`].
    pub fn into_environ(self) -> Result<Environ> {
        match self {
            Self::Success { environ, .. } => Ok(environ),
            Self::Failure { errors, .. } => Err(TarpError::PrepareFailed { errors }),
        }
    }
}

/// Drive `project`'s requirements to a met state.
///
/// `environ` is the starting environment, usually the process
/// environment. `PROJECT_DIR` is always set to the project directory.
pub fn prepare(project: &Project, environ: Environ, options: PrepareOptions) -> PrepareResult {
    let preparation = match Preparation::start(project, environ) {
        Ok(preparation) => preparation,
        Err(failure) => return failure,
    };
    tracing::debug!("Preparing {} in {:?} mode", project.name(), options.mode);

    let statuses = preparation.evaluate();
    if statuses.iter().all(RequirementStatus::has_been_provided) {
        return preparation.succeed(statuses);
    }

    match options.mode {
        UiMode::Check => preparation.fail(Vec::new(), statuses),
        UiMode::Auto => prepare_automatically(preparation, options.fail_fast),
        UiMode::Browser => {
            let opener = options
                .browser_opener
                .unwrap_or_else(|| Box::new(default_opener));
            BrowserSession::new(preparation, options.keep_going_until_success).run(opener)
        }
    }
}

/// Each unmet requirement gets one attempt with its default provider.
fn prepare_automatically(mut preparation: Preparation<'_>, fail_fast: bool) -> PrepareResult {
    let mut attempted: HashSet<String> = HashSet::new();
    loop {
        let statuses = preparation.evaluate();
        if statuses.iter().all(RequirementStatus::has_been_provided) {
            return preparation.succeed(statuses);
        }
        let next = statuses
            .iter()
            .find(|s| !s.has_been_provided() && !attempted.contains(s.requirement().env_var()));
        let Some(status) = next else {
            return preparation.fail(Vec::new(), statuses);
        };
        attempted.insert(status.requirement().env_var().to_string());
        if preparation.provide(status).is_err() && fail_fast {
            let statuses = preparation.evaluate();
            return preparation.fail(Vec::new(), statuses);
        }
    }
}

/// Ask providers to release what they started for this project.
///
/// Every requirement is visited even if one fails; the first error is
/// returned.
pub fn unprepare(project: &Project, result: &PrepareResult) -> Result<()> {
    let mut local_state = project.local_state()?;
    let mut environ = result.environ().clone();
    environ
        .entry("PROJECT_DIR".to_string())
        .or_insert_with(|| project.directory_path().to_string_lossy().into_owned());

    let mut first_error = None;
    for requirement in project.requirements() {
        for provider in project.registry().find_providers(requirement) {
            if let Err(e) = provider.unprovide(requirement, &environ, &mut local_state) {
                tracing::warn!(
                    "{} failed to release {}: {}",
                    provider.class_name(),
                    requirement.env_var(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }
    }
    local_state.save()?;
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::{self, PackageManager};
    use crate::plugins::PluginRegistry;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FakeManager;

    impl PackageManager for FakeManager {
        fn create(&self, prefix: &Path, _packages: &[String], _channels: &[String]) -> Result<()> {
            fs::create_dir_all(prefix.join(conda::CONDA_META_DIRECTORY))?;
            Ok(())
        }

        fn install(&self, _prefix: &Path, _packages: &[String], _channels: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn project_with(descriptor: &str) -> (TempDir, Project) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), descriptor).unwrap();
        let registry = PluginRegistry::new()
            .with_package_manager(Arc::new(FakeManager))
            .with_socket_probe(|_, _, _| false);
        let project = Project::load_with_registry(temp.path(), Arc::new(registry));
        (temp, project)
    }

    #[test]
    fn check_mode_reports_every_unmet_requirement() {
        let (_temp, project) = project_with("runtime:\n  FOO: {}\n");
        let result = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Check));
        assert!(!result.is_success());
        let errors = result.errors().join("\n");
        assert!(errors.contains("Environment variable FOO is not set."));
        assert!(errors.contains("A Conda environment"));
        assert!(!project.directory_path().join("envs").exists());
    }

    #[test]
    fn problems_short_circuit() {
        let (_temp, project) = project_with("runtime: 42\n");
        let result = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Auto));
        assert_eq!(
            result.errors(),
            ["runtime section contains wrong value type 42"]
        );
        assert!(result.statuses().is_empty());
    }

    #[test]
    fn auto_mode_creates_environment_and_uses_defaults() {
        let (_temp, project) = project_with("runtime:\n  FOO:\n    default: bar\n");
        let result = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Auto));
        assert!(result.is_success(), "{:?}", result.errors());
        let environ = result.environ();
        assert_eq!(environ["FOO"], "bar");
        let prefix = project.directory_path().join("envs").join("default");
        assert_eq!(environ[conda::env_var_name()], prefix.to_string_lossy());
        assert_eq!(environ["PROJECT_DIR"], project.directory_path().to_string_lossy());
    }

    #[test]
    fn auto_mode_collects_errors_without_fail_fast() {
        let (_temp, project) = project_with("runtime:\n  - FOO\n  - BAR\n");
        let result = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Auto));
        let errors = result.errors().join("\n");
        assert!(errors.contains("FOO"));
        assert!(errors.contains("BAR"));
        assert!(result.status_for(conda::env_var_name()).unwrap().has_been_provided());
    }

    #[test]
    fn already_met_project_is_untouched() {
        let (_temp, project) = project_with("");
        let first = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Auto));
        assert!(first.is_success());
        let state_file = project.directory_path().join(".tarp").join("local.yml");
        let before = fs::metadata(&state_file).ok().and_then(|m| m.modified().ok());

        let second = prepare(
            &project,
            first.environ().clone(),
            PrepareOptions::new(UiMode::Check),
        );
        assert!(second.is_success());
        let after = fs::metadata(&state_file).ok().and_then(|m| m.modified().ok());
        assert_eq!(before, after);
    }

    #[test]
    fn into_environ_carries_errors() {
        let (_temp, project) = project_with("runtime: [FOO]\n");
        let err = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Check))
            .into_environ()
            .unwrap_err();
        assert!(err.to_string().contains("FOO"));
    }
}
