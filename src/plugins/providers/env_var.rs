//! Provider for plain environment variables.

use crate::error::Result;
use crate::plugins::provider::{
    keep_environ_choice, provide_typed_value, record_source_and_value, typed_value_choice, Choice,
    ConfigForm, ProvideContext, Provider, ProviderConfig, SOURCE_FIELD, VALUE_FIELD,
};
use crate::plugins::requirement::Requirement;
use crate::state::LocalStateFile;
use crate::Environ;

const SOURCES: [&str; 3] = ["environ", "variables", "default"];

/// Satisfies a variable from the environment, a typed value, or its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvVarProvider;

impl EnvVarProvider {
    fn source(requirement: &Requirement, environ: &Environ, local_state: &LocalStateFile) -> String {
        let env_var = requirement.env_var();
        let has_environ = environ.get(env_var).is_some_and(|v| !v.is_empty());
        let has_default = requirement.default_value().is_some();

        let recorded = local_state
            .setting(env_var, SOURCE_FIELD)
            .filter(|s| match *s {
                "environ" => has_environ,
                "default" => has_default,
                "variables" => true,
                _ => false,
            });
        if let Some(source) = recorded {
            return source.to_string();
        }

        if has_environ {
            "environ"
        } else if local_state.variable(env_var).is_some() || !has_default {
            "variables"
        } else {
            "default"
        }
        .to_string()
    }
}

impl Provider for EnvVarProvider {
    fn class_name(&self) -> &'static str {
        "EnvVarProvider"
    }

    fn title(&self) -> &'static str {
        "Manually set environment variable"
    }

    fn read_config(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> ProviderConfig {
        let mut config = ProviderConfig::new();
        config.insert(
            SOURCE_FIELD.to_string(),
            Self::source(requirement, environ, local_state),
        );
        config.insert(
            VALUE_FIELD.to_string(),
            local_state
                .variable(requirement.env_var())
                .unwrap_or_default()
                .to_string(),
        );
        config
    }

    fn set_config_values(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        local_state: &mut LocalStateFile,
        values: &ProviderConfig,
    ) -> Result<()> {
        record_source_and_value(requirement, local_state, values, &SOURCES);
        Ok(())
    }

    fn config_form(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        _local_state: &LocalStateFile,
        config: &ProviderConfig,
    ) -> Option<ConfigForm> {
        let mut choices = Vec::new();
        choices.extend(keep_environ_choice(requirement, environ));
        choices.push(typed_value_choice(requirement, config));
        if let Some(default) = requirement.default_value() {
            choices.push(Choice::new(
                "default",
                format!("Use default '{}'", default),
            ));
        }
        let selected = config.get(SOURCE_FIELD).cloned().unwrap_or_default();
        Some(ConfigForm::new(choices, selected))
    }

    fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        match context.source() {
            "variables" => provide_typed_value(requirement, context),
            "default" => {
                if let Some(default) = requirement.default_value() {
                    context
                        .environ
                        .insert(requirement.env_var().to_string(), default);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
