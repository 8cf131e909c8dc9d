//! Named package environments declared by a project.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::conda;

/// Directory (relative to the project) holding project-scoped environments.
pub const ENVS_DIRECTORY: &str = "envs";

/// Name of the environment used when the descriptor declares none.
pub const DEFAULT_ENVIRONMENT_NAME: &str = "default";

/// One isolated installation of packages, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEnvironment {
    pub name: String,
    pub dependencies: Vec<String>,
    pub channels: Vec<String>,
}

impl PackageEnvironment {
    /// Create an environment spec.
    pub fn new(name: impl Into<String>, dependencies: Vec<String>, channels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            channels,
        }
    }

    /// An environment with no packages.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Vec::new())
    }

    /// Package names required by this environment (version constraints stripped).
    pub fn package_names(&self) -> BTreeSet<String> {
        self.dependencies
            .iter()
            .filter_map(|spec| conda::package_name(spec))
            .collect()
    }

    /// Dependency specs whose package is not in `installed`.
    pub fn missing_dependencies(&self, installed: &BTreeSet<String>) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|spec| {
                conda::package_name(spec)
                    .map(|name| !installed.contains(&name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Where this environment lives inside a project.
    pub fn prefix(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(ENVS_DIRECTORY).join(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> PackageEnvironment {
        PackageEnvironment::new(
            "default",
            vec!["foo".into(), "hello >= 1.0".into(), "world".into()],
            vec!["mtv".into()],
        )
    }

    #[test]
    fn package_names_strip_constraints() {
        let names: Vec<String> = env().package_names().into_iter().collect();
        assert_eq!(names, vec!["foo", "hello", "world"]);
    }

    #[test]
    fn missing_dependencies_keeps_original_specs() {
        let installed: BTreeSet<String> = ["foo".to_string()].into_iter().collect();
        assert_eq!(
            env().missing_dependencies(&installed),
            vec!["hello >= 1.0".to_string(), "world".to_string()]
        );
    }

    #[test]
    fn prefix_is_under_envs() {
        assert_eq!(
            env().prefix(Path::new("/proj")),
            Path::new("/proj").join("envs").join("default")
        );
    }
}
