//! YAML files that belong to a project (`tarp.yml`, `conda.recipe/meta.yaml`).
//!
//! Unlike the local state, these files are hand edited; a syntax error is
//! recorded as a problem instead of failing the load.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TarpError};

/// The project descriptor file name.
pub const PROJECT_FILENAME: &str = "tarp.yml";

/// Package metadata file, relative to the project directory.
pub const META_RELATIVE_PATH: [&str; 2] = ["conda.recipe", "meta.yaml"];

/// A YAML document loaded leniently.
#[derive(Debug, Clone)]
pub struct YamlFile {
    path: PathBuf,
    root: Value,
    corrupted: Option<String>,
    dirty: bool,
}

impl YamlFile {
    /// Load a YAML file; missing files load as empty.
    pub fn load(path: PathBuf) -> Self {
        let mut file = Self {
            path,
            root: Value::Null,
            corrupted: None,
            dirty: false,
        };
        if !file.path.exists() {
            return file;
        }
        match fs::read_to_string(&file.path) {
            Ok(content) => match serde_yaml::from_str::<Value>(&content) {
                Ok(value) => file.root = value,
                Err(e) => {
                    tracing::debug!("Failed to parse {}: {}", file.path.display(), e);
                    file.corrupted = Some(e.to_string());
                }
            },
            Err(e) => file.corrupted = Some(e.to_string()),
        }
        file
    }

    /// The descriptor of the project in `directory`.
    pub fn project_file(directory: &Path) -> Self {
        Self::load(directory.join(PROJECT_FILENAME))
    }

    /// The package metadata file of the project in `directory`.
    pub fn meta_file(directory: &Path) -> Self {
        let path = META_RELATIVE_PATH
            .iter()
            .fold(directory.to_path_buf(), |p, part| p.join(part));
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// A problem string if the file could not be parsed.
    pub fn corruption_problem(&self) -> Option<String> {
        self.corrupted.as_ref().map(|message| {
            format!(
                "{} has a syntax error that needs to be fixed by hand: {}",
                self.path.display(),
                message
            )
        })
    }

    /// Look up a nested value.
    pub fn get_value(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for key in path {
            current = current.as_mapping()?.get(*key)?;
        }
        Some(current)
    }

    /// Set a nested value, creating intermediate mappings.
    pub fn set_value(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        if self.get_value(path) == Some(&value) {
            return;
        }
        if !self.root.is_mapping() {
            self.root = Value::Mapping(Mapping::new());
        }
        let mut current = &mut self.root;
        for key in parents {
            let Value::Mapping(map) = current else {
                return;
            };
            let entry = map
                .entry(Value::from(*key))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            current = entry;
        }
        if let Value::Mapping(map) = current {
            map.insert(Value::from(*last), value);
            self.dirty = true;
        }
    }

    /// Remove a nested value.
    pub fn unset_value(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.root;
        for key in parents {
            current = current.as_mapping_mut()?.get_mut(*key)?;
        }
        let removed = current.as_mapping_mut()?.remove(*last);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Write the file if it was modified.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.corrupted.is_some() {
            return Err(TarpError::Other(anyhow::anyhow!(
                "Refusing to overwrite {} because it has a syntax error",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.root).map_err(|e| {
            TarpError::Other(anyhow::anyhow!(
                "Failed to serialize {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

/// Render a YAML value for a problem message.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let file = YamlFile::project_file(temp.path());
        assert!(file.root().is_null());
        assert!(file.corruption_problem().is_none());
    }

    #[test]
    fn syntax_error_becomes_problem() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PROJECT_FILENAME), "name: [unclosed\n").unwrap();
        let file = YamlFile::project_file(temp.path());
        let problem = file.corruption_problem().unwrap();
        assert!(problem.contains("tarp.yml has a syntax error that needs to be fixed by hand"));
    }

    #[test]
    fn set_value_on_empty_file_and_save() {
        let temp = TempDir::new().unwrap();
        let mut file = YamlFile::project_file(temp.path());
        file.set_value(&["runtime", "FOO"], Value::Mapping(Mapping::new()));
        file.save().unwrap();

        let reloaded = YamlFile::project_file(temp.path());
        assert_eq!(
            reloaded.get_value(&["runtime", "FOO"]),
            Some(&Value::Mapping(Mapping::new()))
        );
    }

    #[test]
    fn meta_file_location() {
        let file = YamlFile::meta_file(Path::new("/proj"));
        assert_eq!(file.path(), Path::new("/proj/conda.recipe/meta.yaml"));
    }

    #[test]
    fn display_value_matches_problem_style() {
        assert_eq!(display_value(&Value::from(42)), "42");
        assert_eq!(display_value(&Value::from("baz")), "baz");
        assert_eq!(display_value(&Value::Sequence(Vec::new())), "[]");
    }
}
