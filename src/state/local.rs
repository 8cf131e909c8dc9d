//! The local state file.
//!
//! A YAML mapping stored at `.tarp/local.yml` inside the project directory.
//! Layout:
//!
//! ```yaml
//! variables:
//!   FOO: typed value
//! settings:
//!   CONDA_ENV_PATH:
//!     source: project
//!     env_name: default
//! service_run_states:
//!   REDIS_URL:
//!     port: 6380
//!     pidfile: /project/services/REDIS_URL/redis.pid
//! ```
//!
//! Concurrent preparation runs against the same directory are not
//! coordinated here; callers must serialize them.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TarpError};

/// Directory (relative to the project) holding local state.
pub const LOCAL_STATE_DIRECTORY: &str = ".tarp";

/// File name of the local state inside [`LOCAL_STATE_DIRECTORY`].
pub const LOCAL_STATE_FILENAME: &str = "local.yml";

const VARIABLES: &str = "variables";
const SETTINGS: &str = "settings";
const SERVICE_RUN_STATES: &str = "service_run_states";

/// Persisted, non-version-controlled key/value store for one project.
#[derive(Debug, Clone)]
pub struct LocalStateFile {
    path: Option<PathBuf>,
    root: Mapping,
    dirty: bool,
}

impl LocalStateFile {
    /// Load the local state for a project directory.
    ///
    /// A missing file yields an empty state; it is only created on the
    /// first [`save`](Self::save) after a modification.
    pub fn load_for_directory(directory: &Path) -> Result<Self> {
        let path = directory
            .join(LOCAL_STATE_DIRECTORY)
            .join(LOCAL_STATE_FILENAME);
        Self::load(path)
    }

    /// Load local state from an explicit path.
    pub fn load(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path),
                root: Mapping::new(),
                dirty: false,
            });
        }

        let content = fs::read_to_string(&path)?;
        let root = if content.trim().is_empty() {
            Mapping::new()
        } else {
            match serde_yaml::from_str::<Value>(&content) {
                Ok(Value::Mapping(m)) => m,
                Ok(Value::Null) => Mapping::new(),
                Ok(other) => {
                    return Err(TarpError::LocalStateParseError {
                        path,
                        message: format!("expected a mapping, found {}", describe(&other)),
                    })
                }
                Err(e) => {
                    return Err(TarpError::LocalStateParseError {
                        path,
                        message: e.to_string(),
                    })
                }
            }
        };

        Ok(Self {
            path: Some(path),
            root,
            dirty: false,
        })
    }

    /// An empty state that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            root: Mapping::new(),
            dirty: false,
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether there are unsaved modifications.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Look up a nested value.
    pub fn get_value(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?;
        for key in rest {
            current = current.as_mapping()?.get(*key)?;
        }
        Some(current)
    }

    /// Look up a nested string value.
    pub fn get_string(&self, path: &[&str]) -> Option<&str> {
        self.get_value(path).and_then(Value::as_str)
    }

    /// Set a nested value, creating intermediate mappings.
    ///
    /// Non-mapping intermediates are replaced. Setting a value equal to the
    /// current one does not mark the state modified.
    pub fn set_value(&mut self, path: &[&str], value: impl Into<Value>) {
        let value = value.into();
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        if self.get_value(path) == Some(&value) {
            return;
        }

        let mut current = &mut self.root;
        for key in parents {
            let entry = current
                .entry(Value::from(*key))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(next) = entry else {
                unreachable!("entry was just made a mapping");
            };
            current = next;
        }
        current.insert(Value::from(*last), value);
        self.dirty = true;
    }

    /// Remove a nested value, returning it.
    pub fn unset_value(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.root;
        for key in parents {
            current = current.get_mut(*key)?.as_mapping_mut()?;
        }
        let removed = current.remove(*last);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// A value the user typed for a variable.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.get_string(&[VARIABLES, name])
    }

    /// Record a value for a variable.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        self.set_value(&[VARIABLES, name], value);
    }

    /// A provider setting recorded for the requirement keyed by `env_var`.
    pub fn setting(&self, env_var: &str, key: &str) -> Option<&str> {
        self.get_string(&[SETTINGS, env_var, key])
    }

    /// Record a provider setting for the requirement keyed by `env_var`.
    pub fn set_setting(&mut self, env_var: &str, key: &str, value: &str) {
        self.set_value(&[SETTINGS, env_var, key], value);
    }

    /// State recorded by a provider that started a service.
    pub fn service_run_state(&self, env_var: &str) -> Option<&Mapping> {
        self.get_value(&[SERVICE_RUN_STATES, env_var])
            .and_then(Value::as_mapping)
    }

    /// Record (or replace) service state for `env_var`.
    pub fn set_service_run_state(&mut self, env_var: &str, state: Mapping) {
        self.set_value(&[SERVICE_RUN_STATES, env_var], Value::Mapping(state));
    }

    /// Forget service state for `env_var`.
    pub fn clear_service_run_state(&mut self, env_var: &str) {
        self.unset_value(&[SERVICE_RUN_STATES, env_var]);
    }

    /// Write the state to disk if it was modified.
    ///
    /// Returns `true` if a write happened. Uses write-to-temp-then-rename
    /// so a crash never leaves a partially written file.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(false);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.root)
            .map_err(|e| TarpError::Other(anyhow::anyhow!("Failed to serialize local state: {}", e)))?;

        let temp_path = path.with_extension("yml.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        tracing::debug!("Saved local state to {}", path.display());
        self.dirty = false;
        Ok(true)
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}
