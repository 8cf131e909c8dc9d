//! Provider for the project's package environment.
//!
//! The user picks where the environment comes from:
//!
//! - `project`: a named environment under `<project>/envs/<name>`, created
//!   or updated through the registry's package manager (the default)
//! - `environ`: keep the prefix the variable already points at
//! - `variables`: a prefix typed into the form
//!
//! The same selection drives the requirement's status check, so the two
//! never disagree about which prefix counts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::conda;
use crate::error::{Result, TarpError};
use crate::plugins::provider::{
    project_dir, record_source_and_value, typed_value_choice, Choice, ConfigForm, FormField,
    ProvideContext, Provider, ProviderConfig, SOURCE_FIELD, VALUE_FIELD,
};
use crate::plugins::registry::PluginRegistry;
use crate::plugins::requirement::{PackageEnvironments, Requirement, RequirementKind};
use crate::project::environment::ENVS_DIRECTORY;
use crate::state::LocalStateFile;
use crate::Environ;

const SOURCES: [&str; 3] = ["project", "environ", "variables"];

/// Field holding the selected environment name.
pub const ENV_NAME_FIELD: &str = "env_name";

/// Creates, updates, or selects a package environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CondaEnvProvider;

fn environments(requirement: &Requirement) -> Option<&PackageEnvironments> {
    match requirement.kind() {
        RequirementKind::PackageEnvironment(envs) => Some(envs),
        _ => None,
    }
}

fn project_prefix(env_name: &str, environ: &Environ) -> PathBuf {
    let base = project_dir(environ).unwrap_or_default();
    base.join(ENVS_DIRECTORY).join(env_name)
}

/// The value of the variable, when it points somewhere other than the
/// selected project environment.
fn foreign_prefix<'e>(requirement: &Requirement, environ: &'e Environ, project: &Path) -> Option<&'e str> {
    requirement
        .current_value(environ)
        .filter(|v| Path::new(v) != project)
}

fn read_settings(
    requirement: &Requirement,
    envs: &PackageEnvironments,
    environ: &Environ,
    local_state: &LocalStateFile,
) -> ProviderConfig {
    let env_var = requirement.env_var();
    let env_name = local_state
        .setting(env_var, ENV_NAME_FIELD)
        .filter(|n| envs.environments.contains_key(*n))
        .unwrap_or(envs.default_name.as_str())
        .to_string();
    let project = project_prefix(&env_name, environ);
    let has_foreign = foreign_prefix(requirement, environ, &project).is_some();

    let source = local_state
        .setting(env_var, SOURCE_FIELD)
        .filter(|s| match *s {
            "environ" => has_foreign,
            "project" | "variables" => true,
            _ => false,
        })
        .unwrap_or("project")
        .to_string();

    let mut config = ProviderConfig::new();
    config.insert(SOURCE_FIELD.to_string(), source);
    config.insert(ENV_NAME_FIELD.to_string(), env_name);
    config.insert(
        VALUE_FIELD.to_string(),
        local_state.variable(env_var).unwrap_or_default().to_string(),
    );
    config
}

fn selected_prefix(requirement: &Requirement, config: &ProviderConfig, environ: &Environ) -> Option<PathBuf> {
    let source = config.get(SOURCE_FIELD).map(String::as_str);
    match source.unwrap_or_default() {
        "environ" => requirement.current_value(environ).map(PathBuf::from),
        "variables" => config
            .get(VALUE_FIELD)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
        _ => {
            let env_name = config.get(ENV_NAME_FIELD).map(String::as_str);
            Some(project_prefix(env_name.unwrap_or_default(), environ))
        }
    }
}

/// Why the package environment requirement is unmet.
pub(crate) fn why_not_provided(
    requirement: &Requirement,
    envs: &PackageEnvironments,
    environ: &Environ,
    local_state: &LocalStateFile,
    registry: &PluginRegistry,
) -> Option<String> {
    let config = read_settings(requirement, envs, environ, local_state);
    let Some(prefix) = selected_prefix(requirement, &config, environ) else {
        return Some(requirement.unset_message());
    };

    if !conda::looks_like_env(&prefix) {
        return Some(format!(
            "'{}' doesn't look like it contains a Conda environment yet.",
            prefix.display()
        ));
    }

    if let Some(env) = envs.get_or_default(config.get(ENV_NAME_FIELD).map(String::as_str)) {
        let installed = match registry.package_manager().installed(&prefix) {
            Ok(installed) => installed,
            Err(e) => {
                return Some(format!(
                    "Failed to list packages in '{}': {}",
                    prefix.display(),
                    e
                ))
            }
        };
        let missing: Vec<String> = env.package_names().difference(&installed).cloned().collect();
        if !missing.is_empty() {
            return Some(format!(
                "Conda environment at '{}' is missing packages: {}",
                prefix.display(),
                missing.join(", ")
            ));
        }
    }

    match requirement.current_value(environ) {
        None => Some(requirement.unset_message()),
        Some(current) if Path::new(current) != prefix => Some(format!(
            "{} is set to '{}' but the selected environment is '{}'.",
            requirement.env_var(),
            current,
            prefix.display()
        )),
        Some(_) => None,
    }
}

impl CondaEnvProvider {
    fn provide_project_env(
        envs: &PackageEnvironments,
        context: &mut ProvideContext<'_>,
    ) -> Result<PathBuf> {
        let env = envs
            .get_or_default(context.value(ENV_NAME_FIELD))
            .ok_or_else(|| TarpError::ProviderFailed {
                provider: "CondaEnvProvider".to_string(),
                message: "The project declares no environments.".to_string(),
            })?;
        let prefix = env.prefix(&context.project_dir()?);
        let package_manager = context.registry.package_manager();

        if conda::looks_like_env(&prefix) {
            let installed = package_manager.installed(&prefix)?;
            let missing = env.missing_dependencies(&installed);
            if !missing.is_empty() {
                tracing::info!(
                    "Installing {} into {}",
                    missing.join(", "),
                    prefix.display()
                );
                package_manager.install(&prefix, &missing, &env.channels)?;
            }
        } else {
            tracing::info!("Creating Conda environment {} at {}", env.name, prefix.display());
            if let Some(parent) = prefix.parent() {
                fs::create_dir_all(parent)?;
            }
            package_manager.create(&prefix, &env.dependencies, &env.channels)?;
        }

        if !conda::looks_like_env(&prefix) {
            return Err(TarpError::ProviderFailed {
                provider: "CondaEnvProvider".to_string(),
                message: format!(
                    "'{}' still doesn't look like a Conda environment after creating it.",
                    prefix.display()
                ),
            });
        }
        Ok(prefix)
    }
}

impl Provider for CondaEnvProvider {
    fn class_name(&self) -> &'static str {
        "CondaEnvProvider"
    }

    fn title(&self) -> &'static str {
        "Conda environment"
    }

    fn read_config(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> ProviderConfig {
        match environments(requirement) {
            Some(envs) => read_settings(requirement, envs, environ, local_state),
            None => ProviderConfig::new(),
        }
    }

    fn set_config_values(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        local_state: &mut LocalStateFile,
        values: &ProviderConfig,
    ) -> Result<()> {
        record_source_and_value(requirement, local_state, values, &SOURCES);
        if let (Some(envs), Some(name)) = (environments(requirement), values.get(ENV_NAME_FIELD)) {
            if envs.environments.contains_key(name) {
                local_state.set_setting(requirement.env_var(), ENV_NAME_FIELD, name);
            }
        }
        Ok(())
    }

    fn config_form(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        _local_state: &LocalStateFile,
        config: &ProviderConfig,
    ) -> Option<ConfigForm> {
        let envs = environments(requirement)?;
        let env_name = config.get(ENV_NAME_FIELD).cloned().unwrap_or_default();
        let project = project_prefix(&env_name, environ);

        let own = if envs.environments.len() > 1 {
            Choice::new("project", "Use project-specific environment:").with_field(
                FormField::Select {
                    name: ENV_NAME_FIELD.to_string(),
                    options: envs.environments.keys().cloned().collect(),
                    selected: env_name,
                },
            )
        } else {
            Choice::new(
                "project",
                format!("Use project-specific environment at {}", project.display()),
            )
        };

        let mut choices = vec![own];
        if let Some(current) = foreign_prefix(requirement, environ, &project) {
            choices.push(Choice::new(
                "environ",
                format!("Use the environment at {} ({} is already set)", current, requirement.env_var()),
            ));
        }
        let mut typed = typed_value_choice(requirement, config);
        typed.label = "Use the environment at this prefix:".to_string();
        choices.push(typed);

        let selected = config.get(SOURCE_FIELD).cloned().unwrap_or_default();
        Some(ConfigForm::new(choices, selected))
    }

    fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        let Some(envs) = environments(requirement) else {
            return Ok(());
        };

        let prefix = match context.source() {
            "environ" | "variables" => {
                match selected_prefix(requirement, &context.config, context.environ) {
                    Some(prefix) if conda::looks_like_env(&prefix) => prefix,
                    _ => return Ok(()),
                }
            }
            _ => Self::provide_project_env(envs, context)?,
        };

        conda::activate(context.environ, &prefix);
        Ok(())
    }
}
