//! Validation of the project descriptor into requirements, environments
//! and commands.
//!
//! Every structural issue becomes a human-readable problem string. A
//! project with problems has no requirements.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::command::{parse_command, ProjectCommand};
use super::environment::{PackageEnvironment, DEFAULT_ENVIRONMENT_NAME};
use super::file::{display_value, YamlFile};
use crate::conda;
use crate::plugins::{DownloadSpec, PluginRegistry, Requirement};

/// Everything derived from a project's files.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    pub problems: Vec<String>,
    pub name: String,
    pub icon: Option<PathBuf>,
    pub requirements: Vec<Arc<Requirement>>,
    pub environments: IndexMap<String, PackageEnvironment>,
    pub default_environment_name: String,
    pub commands: IndexMap<String, ProjectCommand>,
    pub downloads: IndexMap<String, DownloadSpec>,
}

struct Parser<'a> {
    directory: &'a Path,
    project_file: &'a YamlFile,
    meta_file: &'a YamlFile,
    problems: Vec<String>,
}

/// Derive a [`Descriptor`] from the project's files.
pub fn parse(
    directory: &Path,
    project_file: &YamlFile,
    meta_file: &YamlFile,
    registry: &PluginRegistry,
) -> Descriptor {
    let mut parser = Parser {
        directory,
        project_file,
        meta_file,
        problems: Vec::new(),
    };
    let dir_name = directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !directory.is_dir() {
        return Descriptor {
            problems: vec![format!(
                "Project directory '{}' does not exist.",
                directory.display()
            )],
            name: dir_name,
            default_environment_name: DEFAULT_ENVIRONMENT_NAME.to_string(),
            ..Descriptor::default()
        };
    }

    parser.problems.extend(project_file.corruption_problem());
    parser.problems.extend(meta_file.corruption_problem());

    let name = parser.name().unwrap_or(dir_name);
    let icon = parser.icon();
    let runtime = parser.runtime();
    let (environments, default_environment_name) = parser.environments();
    let downloads = parser.downloads();
    let commands = parser.commands();

    let mut requirements = Vec::new();
    if parser.problems.is_empty() {
        for (env_var, options) in runtime {
            requirements.push(Arc::new(registry.find_requirement_by_env_var(&env_var, options)));
        }
        for (env_var, spec) in &downloads {
            requirements.push(Arc::new(Requirement::download(env_var.clone(), spec.clone())));
        }
        requirements.push(Arc::new(Requirement::package_environments(
            environments.clone(),
            default_environment_name.clone(),
        )));
    }

    Descriptor {
        problems: parser.problems,
        name,
        icon,
        requirements,
        environments,
        default_environment_name,
        commands,
        downloads,
    }
}

impl Parser<'_> {
    fn file_label(&self) -> String {
        self.project_file.path().display().to_string()
    }

    fn string_field(&mut self, file: &YamlFile, path: &[&str]) -> Option<String> {
        match file.get_value(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => {
                self.problems.push(format!(
                    "{}: {}: field should have a string value not {}",
                    file.path().display(),
                    path.join(": "),
                    display_value(other)
                ));
                None
            }
        }
    }

    fn name(&mut self) -> Option<String> {
        let project_file = self.project_file;
        let meta_file = self.meta_file;
        self.string_field(project_file, &["name"])
            .or_else(|| self.string_field(meta_file, &["package", "name"]))
    }

    fn icon(&mut self) -> Option<PathBuf> {
        let project_file = self.project_file;
        let meta_file = self.meta_file;
        let path = match self.string_field(project_file, &["icon"]) {
            Some(icon) => self.directory.join(icon),
            None => {
                let icon = self.string_field(meta_file, &["app", "icon"])?;
                meta_file.path().parent()?.join(icon)
            }
        };
        if path.is_file() {
            Some(path)
        } else {
            self.problems
                .push(format!("Icon file {} does not exist.", path.display()));
            None
        }
    }

    fn runtime(&mut self) -> Vec<(String, Mapping)> {
        let mut entries: Vec<(String, Mapping)> = Vec::new();
        match self.project_file.get_value(&["runtime"]) {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                for item in items {
                    match item {
                        Value::String(name) => entries.push((name.clone(), Mapping::new())),
                        other => self
                            .problems
                            .push(format!("{} is not a string", display_value(other))),
                    }
                }
            }
            Some(Value::Mapping(map)) => {
                for (key, value) in map {
                    let Value::String(name) = key else {
                        self.problems
                            .push(format!("{} is not a string", display_value(key)));
                        continue;
                    };
                    match value {
                        Value::Mapping(options) => entries.push((name.clone(), options.clone())),
                        Value::Null => entries.push((name.clone(), Mapping::new())),
                        other => self.problems.push(format!(
                            "key {} with value {}; the value must be a dict",
                            name,
                            display_value(other)
                        )),
                    }
                }
            }
            Some(other) => self.problems.push(format!(
                "runtime section contains wrong value type {}",
                display_value(other)
            )),
        }

        entries.retain(|(name, _)| {
            if conda::is_reserved_env_var(name) {
                self.problems.push(format!(
                    "Environment variable {} is reserved for Conda's use, so it can't appear in the runtime section.",
                    name
                ));
                false
            } else {
                true
            }
        });
        entries
    }

    fn string_list(&mut self, value: Option<&Value>, section: &str) -> Vec<String> {
        let label = self.file_label();
        match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => self.problems.push(format!(
                            "{}: {}: value should be a string not {}",
                            label,
                            section,
                            display_value(other)
                        )),
                    }
                }
                out
            }
            Some(other) => {
                self.problems.push(format!(
                    "{}: {}: value should be a list of strings, not {}",
                    label,
                    section,
                    display_value(other)
                ));
                Vec::new()
            }
        }
    }

    fn environments(&mut self) -> (IndexMap<String, PackageEnvironment>, String) {
        let project_file = self.project_file;
        let global_deps = self.string_list(project_file.get_value(&["dependencies"]), "dependencies");
        let global_channels = self.string_list(project_file.get_value(&["channels"]), "channels");

        let mut environments = IndexMap::new();
        match project_file.get_value(&["environments"]) {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(map)) => {
                for (key, value) in map {
                    let Value::String(name) = key else {
                        self.problems.push(format!(
                            "{}: environment name {} is not a string",
                            self.file_label(),
                            display_value(key)
                        ));
                        continue;
                    };
                    let attrs = match value {
                        Value::Mapping(attrs) => Some(attrs),
                        Value::Null => None,
                        other => {
                            self.problems.push(format!(
                                "{}: environment '{}' should be a dictionary of attributes not {}",
                                self.file_label(),
                                name,
                                display_value(other)
                            ));
                            continue;
                        }
                    };
                    let section = format!("environments: {}", name);
                    let own_deps = self.string_list(
                        attrs.and_then(|a| a.get("dependencies")),
                        &format!("{}: dependencies", section),
                    );
                    let own_channels = self.string_list(
                        attrs.and_then(|a| a.get("channels")),
                        &format!("{}: channels", section),
                    );
                    let mut dependencies = global_deps.clone();
                    dependencies.extend(own_deps);
                    let mut channels = global_channels.clone();
                    channels.extend(own_channels);
                    environments.insert(
                        name.clone(),
                        PackageEnvironment::new(name.clone(), dependencies, channels),
                    );
                }
            }
            Some(other) => self.problems.push(format!(
                "{}: environments should be a dictionary from environment name to environment attributes, not {}",
                self.file_label(),
                display_value(other)
            )),
        }

        if environments.is_empty() {
            environments.insert(
                DEFAULT_ENVIRONMENT_NAME.to_string(),
                PackageEnvironment::new(DEFAULT_ENVIRONMENT_NAME, global_deps, global_channels),
            );
        }
        let default_name = if environments.contains_key(DEFAULT_ENVIRONMENT_NAME) {
            DEFAULT_ENVIRONMENT_NAME.to_string()
        } else {
            environments
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string())
        };
        (environments, default_name)
    }

    fn downloads(&mut self) -> IndexMap<String, DownloadSpec> {
        let mut downloads = IndexMap::new();
        let label = self.file_label();
        let map = match self.project_file.get_value(&["downloads"]) {
            None | Some(Value::Null) => return downloads,
            Some(Value::Mapping(map)) => map,
            Some(other) => {
                self.problems.push(format!(
                    "{}: 'downloads:' section should be a dictionary, found {}",
                    label,
                    display_value(other)
                ));
                return downloads;
            }
        };

        for (key, value) in map {
            let Value::String(env_var) = key else {
                self.problems
                    .push(format!("{}: download name {} is not a string", label, display_value(key)));
                continue;
            };
            let spec = match value {
                Value::String(url) => DownloadSpec::from_url(url.clone()),
                Value::Mapping(attrs) => {
                    let Some(url) = attrs.get("url").and_then(Value::as_str) else {
                        self.problems.push(format!(
                            "{}: download {} doesn't specify a 'url' field.",
                            label, env_var
                        ));
                        continue;
                    };
                    let mut spec = DownloadSpec::from_url(url);
                    if let Some(filename) = attrs.get("filename").and_then(Value::as_str) {
                        spec.filename = filename.to_string();
                    }
                    spec.sha256 = attrs
                        .get("sha256")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    spec
                }
                other => {
                    self.problems.push(format!(
                        "{}: download {} should be a URL string or a dictionary with a 'url' field, not {}",
                        label,
                        env_var,
                        display_value(other)
                    ));
                    continue;
                }
            };
            if conda::is_reserved_env_var(env_var) {
                self.problems.push(format!(
                    "Environment variable {} is reserved for Conda's use, so it can't appear in the downloads section.",
                    env_var
                ));
                continue;
            }
            downloads.insert(env_var.clone(), spec);
        }
        downloads
    }

    fn app_entry(&mut self) -> Option<String> {
        match self.meta_file.get_value(&["app", "entry"])? {
            Value::String(entry) => Some(entry.clone()),
            Value::Null => None,
            other => {
                self.problems.push(format!(
                    "{}: app: entry: should be a string not '{}'",
                    self.meta_file.path().display(),
                    display_value(other)
                ));
                None
            }
        }
    }

    fn commands(&mut self) -> IndexMap<String, ProjectCommand> {
        let app_entry = self.app_entry();
        let label = self.file_label();
        let mut commands = IndexMap::new();

        match self.project_file.get_value(&["commands"]) {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(map)) => {
                for (key, value) in map {
                    let name = display_value(key);
                    match parse_command(self.project_file.path(), &name, value, app_entry.as_deref()) {
                        Ok(command) => {
                            commands.insert(name, command);
                        }
                        Err(problems) => self.problems.extend(problems),
                    }
                }
            }
            Some(other) => self.problems.push(format!(
                "{}: 'commands:' section should be a dictionary from command names to attributes, not {}",
                label,
                display_value(other)
            )),
        }

        if commands.is_empty() {
            if let Some(entry) = app_entry {
                commands.insert(
                    "default".to_string(),
                    ProjectCommand::new(
                        "default",
                        vec![("conda_app_entry".to_string(), entry)],
                    ),
                );
            }
        }

        for notebook in self.notebooks() {
            let referenced = commands
                .values()
                .any(|c| c.attribute("notebook") == Some(notebook.as_str()));
            if !referenced && !commands.contains_key(&notebook) {
                commands.insert(
                    notebook.clone(),
                    ProjectCommand::new(
                        notebook.clone(),
                        vec![("notebook".to_string(), notebook)],
                    ),
                );
            }
        }
        commands
    }

    fn notebooks(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.directory) else {
            return Vec::new();
        };
        let mut notebooks: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(".ipynb"))
            .collect();
        notebooks.sort();
        notebooks
    }
}
