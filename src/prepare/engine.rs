//! State shared by every preparation mode.

use std::collections::HashMap;
use std::sync::Arc;

use super::PrepareResult;
use crate::plugins::{PluginRegistry, ProvideContext, Provider, ProviderConfig, Requirement, RequirementStatus};
use crate::project::Project;
use crate::state::LocalStateFile;
use crate::Environ;

/// One preparation run in progress.
///
/// Owns the environment being built and the local state for the whole
/// run; providers only ever see them by reference, one at a time.
pub(crate) struct Preparation<'p> {
    pub project: &'p Project,
    pub environ: Environ,
    pub local_state: LocalStateFile,
    provide_errors: HashMap<String, String>,
}

impl<'p> Preparation<'p> {
    /// Start a run, or fail right away on structural problems.
    pub fn start(project: &'p Project, mut environ: Environ) -> Result<Self, PrepareResult> {
        if !project.problems().is_empty() {
            return Err(PrepareResult::Failure {
                errors: project.problems().to_vec(),
                statuses: Vec::new(),
                environ,
            });
        }
        let local_state = match project.local_state() {
            Ok(state) => state,
            Err(e) => {
                return Err(PrepareResult::Failure {
                    errors: vec![e.to_string()],
                    statuses: Vec::new(),
                    environ,
                })
            }
        };
        environ.insert(
            "PROJECT_DIR".to_string(),
            project.directory_path().to_string_lossy().into_owned(),
        );
        Ok(Self {
            project,
            environ,
            local_state,
            provide_errors: HashMap::new(),
        })
    }

    pub fn registry(&self) -> &'p PluginRegistry {
        self.project.registry()
    }

    pub fn requirements(&self) -> &'p [Arc<Requirement>] {
        self.project.requirements()
    }

    /// Evaluate one requirement against the current environment.
    pub fn evaluate_one(&self, requirement: &Arc<Requirement>) -> RequirementStatus {
        let error = self.provide_errors.get(requirement.env_var()).cloned();
        requirement
            .check_status(&self.environ, &self.local_state, self.registry())
            .with_provide_error(error)
    }

    /// Evaluate every requirement in declaration order.
    pub fn evaluate(&self) -> Vec<RequirementStatus> {
        let statuses: Vec<_> = self
            .requirements()
            .iter()
            .map(|r| self.evaluate_one(r))
            .collect();
        tracing::debug!(
            "{} of {} requirements met",
            statuses.iter().filter(|s| s.has_been_provided()).count(),
            statuses.len()
        );
        statuses
    }

    /// The provider used for a status: the first candidate.
    pub fn default_provider(status: &RequirementStatus) -> Option<Arc<dyn Provider>> {
        status.possible_providers().first().cloned()
    }

    /// Record submitted configuration for `requirement`.
    pub fn apply_config(
        &mut self,
        requirement: &Requirement,
        provider: &dyn Provider,
        values: &ProviderConfig,
    ) {
        if let Err(e) =
            provider.set_config_values(requirement, &self.environ, &mut self.local_state, values)
        {
            tracing::warn!("{} rejected configuration: {}", provider.class_name(), e);
            self.provide_errors
                .insert(requirement.env_var().to_string(), e.to_string());
        }
    }

    /// Run the default provider for an unmet status.
    ///
    /// A failure is recorded against the requirement and returned.
    pub fn provide(&mut self, status: &RequirementStatus) -> Result<(), String> {
        let requirement = Arc::clone(status.requirement());
        let Some(provider) = Self::default_provider(status) else {
            return Err(format!("No provider available for {}", requirement.env_var()));
        };
        tracing::info!(
            "Providing {} with {}",
            requirement.env_var(),
            provider.class_name()
        );
        self.provide_errors.remove(requirement.env_var());

        let config = provider.read_config(&requirement, &self.environ, &self.local_state);
        let mut context = ProvideContext {
            environ: &mut self.environ,
            local_state: &mut self.local_state,
            registry: self.project.registry(),
            config,
        };
        match provider.provide(&requirement, &mut context) {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("{} failed: {}", provider.class_name(), message);
                self.provide_errors
                    .insert(requirement.env_var().to_string(), message.clone());
                Err(message)
            }
        }
    }

    /// Finish successfully with `statuses` (all met).
    pub fn succeed(mut self, statuses: Vec<RequirementStatus>) -> PrepareResult {
        for status in &statuses {
            status.requirement().complete_environ(&mut self.environ);
        }
        if let Err(e) = self.local_state.save() {
            return PrepareResult::Failure {
                errors: vec![format!("Failed to save local state: {}", e)],
                statuses,
                environ: self.environ,
            };
        }
        PrepareResult::Success {
            environ: self.environ,
            statuses,
        }
    }

    /// Finish unsuccessfully.
    ///
    /// `errors` is extended with the lines of every unmet status; choices
    /// made so far are kept in local state.
    pub fn fail(self, mut errors: Vec<String>, statuses: Vec<RequirementStatus>) -> PrepareResult {
        for status in statuses.iter().filter(|s| !s.has_been_provided()) {
            errors.extend(status.error_lines());
        }
        if errors.is_empty() {
            errors.push("Unable to prepare the project.".to_string());
        }
        self.abort(errors, statuses)
    }

    /// End the run with exactly `errors`, leaving unmet statuses out of them.
    pub fn abort(mut self, errors: Vec<String>, statuses: Vec<RequirementStatus>) -> PrepareResult {
        if let Err(e) = self.local_state.save() {
            tracing::warn!("Failed to save local state: {}", e);
        }
        PrepareResult::Failure {
            errors,
            statuses,
            environ: self.environ,
        }
    }
}
