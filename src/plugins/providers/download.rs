//! Provider for downloaded files.

use sha2::{Digest, Sha256};
use std::fs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Result, TarpError};
use crate::plugins::provider::{
    keep_environ_choice, provide_typed_value, record_source_and_value, typed_value_choice, Choice,
    ConfigForm, ProvideContext, Provider, ProviderConfig, SOURCE_FIELD, VALUE_FIELD,
};
use crate::plugins::requirement::{DownloadSpec, Requirement, RequirementKind};
use crate::state::LocalStateFile;
use crate::Environ;

const SOURCES: [&str; 3] = ["download", "environ", "variables"];

/// Fetches a file into the project directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadProvider;

fn spec(requirement: &Requirement) -> Option<&DownloadSpec> {
    match requirement.kind() {
        RequirementKind::Download(spec) => Some(spec),
        _ => None,
    }
}

fn file_digest(path: &Path) -> Result<String> {
    let content = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

fn digest_matches(expected: Option<&str>, actual: &str) -> bool {
    expected.is_none_or(|e| e.eq_ignore_ascii_case(actual))
}

impl DownloadProvider {
    fn download(spec: &DownloadSpec, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        let path = context.project_dir()?.join(&spec.filename);
        let expected = spec.sha256.as_deref();

        let up_to_date = path.is_file() && digest_matches(expected, &file_digest(&path)?);
        if up_to_date {
            tracing::debug!("{} already downloaded", path.display());
        } else {
            let response = context.registry.fetcher().fetch(&spec.url)?;
            if !digest_matches(expected, &response.sha256) {
                return Err(TarpError::DownloadFailed {
                    url: spec.url.clone(),
                    message: format!(
                        "sha256 mismatch: expected {}, got {}",
                        expected.unwrap_or_default(),
                        response.sha256
                    ),
                });
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let temp_path = staging_path(&path);
            fs::write(&temp_path, &response.content)?;
            fs::rename(&temp_path, &path)?;
            tracing::info!("Saved {} to {}", spec.url, path.display());
        }

        context.environ.insert(
            requirement.env_var().to_string(),
            path.to_string_lossy().into_owned(),
        );
        Ok(())
    }
}

impl Provider for DownloadProvider {
    fn class_name(&self) -> &'static str {
        "DownloadProvider"
    }

    fn title(&self) -> &'static str {
        "Download a file"
    }

    fn read_config(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> ProviderConfig {
        let env_var = requirement.env_var();
        let has_environ = environ.get(env_var).is_some_and(|v| !v.is_empty());
        let source = local_state
            .setting(env_var, SOURCE_FIELD)
            .filter(|s| SOURCES.contains(s) && (*s != "environ" || has_environ))
            .unwrap_or("download");

        let mut config = ProviderConfig::new();
        config.insert(SOURCE_FIELD.to_string(), source.to_string());
        config.insert(
            VALUE_FIELD.to_string(),
            local_state.variable(env_var).unwrap_or_default().to_string(),
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
        let spec = spec(requirement)?;
        let mut choices = vec![Choice::new(
            "download",
            format!("Download {} to {}", spec.url, spec.filename),
        )];
        choices.extend(keep_environ_choice(requirement, environ));
        let mut typed = typed_value_choice(requirement, config);
        typed.label = "Use this already-downloaded file:".to_string();
        choices.push(typed);
        let selected = config.get(SOURCE_FIELD).cloned().unwrap_or_default();
        Some(ConfigForm::new(choices, selected))
    }

    fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        let Some(spec) = spec(requirement) else {
            return Ok(());
        };
        match context.source() {
            "environ" => Ok(()),
            "variables" => {
                provide_typed_value(requirement, context);
                Ok(())
            }
            _ => Self::download(spec, requirement, context),
        }
    }
}

/// Where a download is written before being renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut staged = OsString::from(path.as_os_str());
    staged.push(".part");
    PathBuf::from(staged)
}
