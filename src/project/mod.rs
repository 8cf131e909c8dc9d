//! A project directory and everything derived from its descriptor.
//!
//! # Architecture
//!
//! - [`file`] - Lenient YAML files owned by the project
//! - [`descriptor`] - Validation into requirements, environments and commands
//! - [`environment`] - Named package environments
//! - [`command`] - Named commands and how to launch them
//!
//! # Example
//!
//! ```no_run
//! use tarp::project::Project;
//!
//! let project = Project::load("path/to/project");
//! for problem in project.problems() {
//!     eprintln!("{}", problem);
//! }
//! ```

pub mod command;
pub mod descriptor;
pub mod environment;
pub mod file;

pub use command::{ExecInfo, ProjectCommand};
pub use environment::{PackageEnvironment, DEFAULT_ENVIRONMENT_NAME, ENVS_DIRECTORY};
pub use file::{YamlFile, PROJECT_FILENAME};

use indexmap::IndexMap;
use serde_json::json;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conda;
use crate::error::{Result, TarpError};
use crate::plugins::{DownloadSpec, PluginRegistry, Requirement};
use crate::state::LocalStateFile;
use crate::Environ;
use descriptor::Descriptor;

/// A loaded project.
///
/// Loading never fails; structural issues are available from
/// [`Project::problems`] and leave the project without requirements.
#[derive(Debug, Clone)]
pub struct Project {
    directory_path: PathBuf,
    project_file: YamlFile,
    meta_file: YamlFile,
    registry: Arc<PluginRegistry>,
    descriptor: Descriptor,
}

impl Project {
    /// Load the project in `directory` with the built-in providers.
    pub fn load(directory: impl AsRef<Path>) -> Self {
        Self::load_with_registry(directory, Arc::new(PluginRegistry::new()))
    }

    /// Load the project in `directory` with an explicit registry.
    pub fn load_with_registry(directory: impl AsRef<Path>, registry: Arc<PluginRegistry>) -> Self {
        let directory = directory.as_ref();
        let directory_path = directory
            .canonicalize()
            .unwrap_or_else(|_| directory.to_path_buf());
        let project_file = YamlFile::project_file(&directory_path);
        let meta_file = YamlFile::meta_file(&directory_path);
        let descriptor = descriptor::parse(&directory_path, &project_file, &meta_file, &registry);
        tracing::debug!(
            "Loaded project {} with {} requirements and {} problems",
            directory_path.display(),
            descriptor.requirements.len(),
            descriptor.problems.len()
        );
        Self {
            directory_path,
            project_file,
            meta_file,
            registry,
            descriptor,
        }
    }

    fn reload(&mut self) {
        self.project_file = YamlFile::project_file(&self.directory_path);
        self.meta_file = YamlFile::meta_file(&self.directory_path);
        self.descriptor = descriptor::parse(
            &self.directory_path,
            &self.project_file,
            &self.meta_file,
            &self.registry,
        );
    }

    pub fn directory_path(&self) -> &Path {
        &self.directory_path
    }

    pub fn project_file(&self) -> &YamlFile {
        &self.project_file
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Structural problems, in the order they were found.
    pub fn problems(&self) -> &[String] {
        &self.descriptor.problems
    }

    /// Requirements in evaluation order; empty when there are problems.
    pub fn requirements(&self) -> &[Arc<Requirement>] {
        &self.descriptor.requirements
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn icon(&self) -> Option<&Path> {
        self.descriptor.icon.as_deref()
    }

    pub fn environments(&self) -> &IndexMap<String, PackageEnvironment> {
        &self.descriptor.environments
    }

    pub fn default_environment_name(&self) -> &str {
        &self.descriptor.default_environment_name
    }

    pub fn default_environment(&self) -> Option<&PackageEnvironment> {
        self.environments().get(self.default_environment_name())
    }

    pub fn commands(&self) -> &IndexMap<String, ProjectCommand> {
        &self.descriptor.commands
    }

    pub fn downloads(&self) -> &IndexMap<String, DownloadSpec> {
        &self.descriptor.downloads
    }

    /// The command named `default`, else the first declared one.
    pub fn default_command(&self) -> Option<&ProjectCommand> {
        self.commands()
            .get("default")
            .or_else(|| self.commands().values().next())
    }

    /// The local state file for this project.
    pub fn local_state(&self) -> Result<LocalStateFile> {
        LocalStateFile::load_for_directory(&self.directory_path)
    }

    /// Fail with the problem list if the project cannot be used.
    pub fn ensure_no_problems(&self) -> Result<()> {
        if self.problems().is_empty() {
            Ok(())
        } else {
            Err(TarpError::ProjectProblems {
                problems: self.problems().to_vec(),
            })
        }
    }

    /// Declare and record variable values.
    ///
    /// Each name becomes a `runtime` entry (unless it names a download)
    /// and its value is stored in the local state.
    pub fn set_variables(&mut self, pairs: &[(String, String)]) -> Result<()> {
        let mut local_state = self.local_state()?;
        for (name, value) in pairs {
            if !self.downloads().contains_key(name) {
                self.declare_runtime_variable(name);
            }
            local_state.set_variable(name, value);
        }
        self.project_file.save()?;
        local_state.save()?;
        self.reload();
        Ok(())
    }

    fn declare_runtime_variable(&mut self, name: &str) {
        match self.project_file.get_value(&["runtime"]) {
            Some(Value::Sequence(items)) => {
                if !items.iter().any(|item| item.as_str() == Some(name)) {
                    let mut items = items.clone();
                    items.push(Value::from(name));
                    self.project_file
                        .set_value(&["runtime"], Value::Sequence(items));
                }
            }
            Some(Value::Mapping(map)) if map.contains_key(name) => {}
            _ => self
                .project_file
                .set_value(&["runtime", name], Value::Mapping(Mapping::new())),
        }
    }

    /// How to launch the default command in a prepared `environ`.
    ///
    /// `Ok(None)` means there is no command runnable on this platform.
    pub fn exec_info_for_environment(
        &self,
        environ: &Environ,
        extra_args: &[String],
    ) -> Result<Option<ExecInfo>> {
        match self.default_command() {
            Some(command) => command.exec_info_for_environment(environ, extra_args),
            None => Ok(None),
        }
    }

    /// How to launch the command called `name`.
    pub fn exec_info_for_command(
        &self,
        name: &str,
        environ: &Environ,
        extra_args: &[String],
    ) -> Result<Option<ExecInfo>> {
        let command = self
            .commands()
            .get(name)
            .ok_or_else(|| TarpError::Other(anyhow::anyhow!("Unknown command '{}'", name)))?;
        command.exec_info_for_environment(environ, extra_args)
    }

    /// A JSON summary suitable for publishing the project.
    pub fn publication_info(&self) -> serde_json::Value {
        let conda_var = conda::env_var_name();

        let mut commands = serde_json::Map::new();
        for (name, command) in self.commands() {
            commands.insert(
                name.clone(),
                json!({ "description": command.description() }),
            );
        }

        let mut environments = serde_json::Map::new();
        for (name, env) in self.environments() {
            environments.insert(
                name.clone(),
                json!({ "channels": env.channels, "dependencies": env.dependencies }),
            );
        }

        let mut variables = serde_json::Map::new();
        let mut downloads = serde_json::Map::new();
        for requirement in self.requirements() {
            let env_var = requirement.env_var();
            if env_var == conda_var {
                continue;
            }
            let mut entry = json!({
                "encrypted": requirement.encrypted(),
                "title": requirement.title(),
            });
            match self.downloads().get(env_var) {
                Some(spec) => {
                    entry["url"] = json!(spec.url);
                    downloads.insert(env_var.to_string(), entry);
                }
                None => {
                    variables.insert(env_var.to_string(), entry);
                }
            }
        }

        json!({
            "name": self.name(),
            "commands": commands,
            "downloads": downloads,
            "environments": environments,
            "variables": variables,
        })
    }
}
