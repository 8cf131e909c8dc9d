//! The provider contract.
//!
//! A [`Provider`] knows how to satisfy one kind of requirement. Providers
//! are stateless: everything they remember between runs goes into the
//! [`LocalStateFile`], keyed by the requirement's environment variable.
//!
//! The interactive flow works with a flat string mapping ([`ProviderConfig`]).
//! [`Provider::read_config`] produces it from local state,
//! [`Provider::config_form`] turns it into a form, and the values the user
//! submits come back through [`Provider::set_config_values`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::registry::PluginRegistry;
use super::requirement::Requirement;
use crate::error::{Result, TarpError};
use crate::state::LocalStateFile;
use crate::Environ;

/// Provider settings keyed by unprefixed field name.
pub type ProviderConfig = BTreeMap<String, String>;

/// Field holding the selected choice in every provider form.
pub const SOURCE_FIELD: &str = "source";

/// Field holding a typed value.
pub const VALUE_FIELD: &str = "value";

/// Everything a provider may touch while providing.
pub struct ProvideContext<'a> {
    pub environ: &'a mut Environ,
    pub local_state: &'a mut LocalStateFile,
    pub registry: &'a PluginRegistry,
    pub config: ProviderConfig,
}

impl ProvideContext<'_> {
    /// The project directory from `PROJECT_DIR`.
    pub fn project_dir(&self) -> Result<PathBuf> {
        project_dir(self.environ)
    }

    /// The configured source, or the empty string.
    pub fn source(&self) -> &str {
        self.config
            .get(SOURCE_FIELD)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// A configured field value, treating empty strings as absent.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.config
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Read `PROJECT_DIR` from an environment.
pub fn project_dir(environ: &Environ) -> Result<PathBuf> {
    environ
        .get("PROJECT_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| TarpError::MissingEnvironmentVariable {
            name: "PROJECT_DIR".to_string(),
        })
}

/// A strategy that can satisfy one requirement kind.
pub trait Provider: Send + Sync {
    /// Registry key for this provider.
    fn class_name(&self) -> &'static str;

    /// Short human-readable name.
    fn title(&self) -> &'static str;

    /// Current settings for `requirement`.
    fn read_config(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> ProviderConfig;

    /// Validate submitted values and record them in local state.
    ///
    /// Unknown fields are ignored. Invalid choices are dropped, leaving the
    /// previous setting in place.
    fn set_config_values(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &mut LocalStateFile,
        values: &ProviderConfig,
    ) -> Result<()>;

    /// The configuration form, or `None` if this provider has no UI.
    fn config_form(
        &self,
        _requirement: &Requirement,
        _environ: &Environ,
        _local_state: &LocalStateFile,
        _config: &ProviderConfig,
    ) -> Option<ConfigForm> {
        None
    }

    /// Try to satisfy `requirement`.
    ///
    /// Returning `Ok` does not mean the requirement is now met; the engine
    /// re-evaluates afterwards. An `Err` is a hard failure that the engine
    /// reports on the requirement.
    fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()>;

    /// Release anything [`provide`](Self::provide) started.
    fn unprovide(
        &self,
        _requirement: &Requirement,
        _environ: &Environ,
        _local_state: &mut LocalStateFile,
    ) -> Result<()> {
        Ok(())
    }
}

/// A provider's configuration form: a set of mutually exclusive choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigForm {
    pub choices: Vec<Choice>,
    pub selected: String,
}

impl ConfigForm {
    /// Build a form, selecting `selected`.
    pub fn new(choices: Vec<Choice>, selected: impl Into<String>) -> Self {
        Self {
            choices,
            selected: selected.into(),
        }
    }

    /// The choice with the given value.
    pub fn choice(&self, value: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.value == value)
    }
}

/// One radio choice, optionally carrying an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub label: String,
    pub field: Option<FormField>,
}

impl Choice {
    /// A choice without an input.
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            field: None,
        }
    }

    /// Attach an input to this choice.
    pub fn with_field(mut self, field: FormField) -> Self {
        self.field = Some(field);
        self
    }
}

/// An input rendered next to a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
        secret: bool,
    },
    Select {
        name: String,
        options: Vec<String>,
        selected: String,
    },
}

impl FormField {
    /// Field name (unprefixed).
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::Select { name, .. } => name,
        }
    }
}

/// Choice keeping the variable's current value, if there is one.
pub(crate) fn keep_environ_choice(requirement: &Requirement, environ: &Environ) -> Option<Choice> {
    let current = environ
        .get(requirement.env_var())
        .filter(|v| !v.is_empty())?;
    let shown = if requirement.encrypted() {
        "(hidden)".to_string()
    } else {
        format!("'{}'", current)
    };
    Some(Choice::new(
        "environ",
        format!("Keep value {}", shown),
    ))
}

/// Choice letting the user type a value.
pub(crate) fn typed_value_choice(requirement: &Requirement, config: &ProviderConfig) -> Choice {
    Choice::new("variables", "Use this value:").with_field(FormField::Text {
        name: VALUE_FIELD.to_string(),
        value: config.get(VALUE_FIELD).cloned().unwrap_or_default(),
        secret: requirement.encrypted(),
    })
}

/// Record `source` (if it is one of `allowed`) and a typed `value`.
pub(crate) fn record_source_and_value(
    requirement: &Requirement,
    local_state: &mut LocalStateFile,
    values: &ProviderConfig,
    allowed: &[&str],
) {
    let env_var = requirement.env_var();
    if let Some(source) = values.get(SOURCE_FIELD) {
        if allowed.contains(&source.as_str()) {
            local_state.set_setting(env_var, SOURCE_FIELD, source);
        } else {
            tracing::warn!("Ignoring unknown source '{}' for {}", source, env_var);
        }
    }
    if let Some(value) = values.get(VALUE_FIELD) {
        let value = value.trim();
        if !value.is_empty() {
            local_state.set_variable(env_var, value);
        }
    }
}

/// Copy a typed value into `environ` when the `variables` source is selected.
pub(crate) fn provide_typed_value(requirement: &Requirement, context: &mut ProvideContext<'_>) {
    if let Some(value) = context.value(VALUE_FIELD).map(str::to_string) {
        context
            .environ
            .insert(requirement.env_var().to_string(), value);
    }
}
