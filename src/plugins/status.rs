//! The result of evaluating one requirement.

use std::fmt;
use std::sync::Arc;

use super::provider::Provider;
use super::requirement::Requirement;

/// Immutable evaluation of a [`Requirement`] against one environment snapshot.
#[derive(Clone)]
pub struct RequirementStatus {
    requirement: Arc<Requirement>,
    has_been_provided: bool,
    status_description: String,
    possible_providers: Vec<Arc<dyn Provider>>,
    provide_error: Option<String>,
}

impl RequirementStatus {
    pub(crate) fn new(
        requirement: Arc<Requirement>,
        has_been_provided: bool,
        status_description: String,
        possible_providers: Vec<Arc<dyn Provider>>,
    ) -> Self {
        Self {
            requirement,
            has_been_provided,
            status_description,
            possible_providers,
            provide_error: None,
        }
    }

    /// Attach the reason the last provider attempt failed.
    pub(crate) fn with_provide_error(mut self, error: Option<String>) -> Self {
        self.provide_error = error;
        self
    }

    pub fn requirement(&self) -> &Arc<Requirement> {
        &self.requirement
    }

    pub fn has_been_provided(&self) -> bool {
        self.has_been_provided
    }

    pub fn status_description(&self) -> &str {
        &self.status_description
    }

    /// Providers that could satisfy the requirement, default first.
    pub fn possible_providers(&self) -> &[Arc<dyn Provider>] {
        &self.possible_providers
    }

    /// Why the last provider attempt in this run failed, if it did.
    pub fn provide_error(&self) -> Option<&str> {
        self.provide_error.as_deref()
    }

    /// Error lines for an unmet requirement.
    pub fn error_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "missing requirement to run this project: {}",
                self.requirement.title()
            ),
            format!("  {}", self.status_description),
        ];
        if let Some(error) = &self.provide_error {
            lines.push(format!("  {}", error));
        }
        lines
    }
}

impl fmt::Debug for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self
            .possible_providers
            .iter()
            .map(|p| p.class_name())
            .collect();
        f.debug_struct("RequirementStatus")
            .field("env_var", &self.requirement.env_var())
            .field("has_been_provided", &self.has_been_provided)
            .field("status_description", &self.status_description)
            .field("possible_providers", &providers)
            .field("provide_error", &self.provide_error)
            .finish()
    }
}
