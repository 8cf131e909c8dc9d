//! Package environment plumbing.
//!
//! The engine never solves dependencies itself; it asks a
//! [`PackageManager`] to create or update an environment prefix and reads
//! back what is installed. [`CondaCli`] is the production implementation.

pub mod cli;

pub use cli::CondaCli;

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::Result;
use crate::Environ;

/// Metadata directory every environment prefix contains.
pub const CONDA_META_DIRECTORY: &str = "conda-meta";

/// Variables owned by the package-environment subsystem.
pub const RESERVED_ENV_VARS: [&str; 2] = ["CONDA_ENV_PATH", "CONDA_DEFAULT_ENV"];

/// The variable that points at the active environment prefix.
pub fn env_var_name() -> &'static str {
    if cfg!(windows) {
        "CONDA_DEFAULT_ENV"
    } else {
        "CONDA_ENV_PATH"
    }
}

/// Whether `name` is reserved for the package-environment subsystem.
pub fn is_reserved_env_var(name: &str) -> bool {
    RESERVED_ENV_VARS.contains(&name)
}

/// Creates environments and reports their contents.
pub trait PackageManager: Send + Sync {
    /// Create a new environment at `prefix` containing `packages`.
    fn create(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<()>;

    /// Install `packages` into the existing environment at `prefix`.
    fn install(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<()>;

    /// Names of the packages installed at `prefix`.
    fn installed(&self, prefix: &Path) -> Result<BTreeSet<String>> {
        installed(prefix)
    }
}

/// Whether `prefix` looks like it contains an environment.
pub fn looks_like_env(prefix: &Path) -> bool {
    prefix.join(CONDA_META_DIRECTORY).is_dir()
}

/// Read installed package names from `<prefix>/conda-meta/*.json`.
///
/// File names are `name-version-build.json`; names may contain dashes.
/// A missing prefix yields an empty set.
pub fn installed(prefix: &Path) -> Result<BTreeSet<String>> {
    let meta = prefix.join(CONDA_META_DIRECTORY);
    let mut names = BTreeSet::new();
    if !meta.is_dir() {
        return Ok(names);
    }

    for entry in fs::read_dir(&meta)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
            continue;
        };
        let parts: Vec<&str> = stem.rsplitn(3, '-').collect();
        let name = match parts.as_slice() {
            [_build, _version, name] => *name,
            [_version, name] => *name,
            _ => continue,
        };
        names.insert(name.to_string());
    }
    Ok(names)
}

/// Extract the package name from a spec such as `hello >= 1.0`.
pub fn package_name(spec: &str) -> Option<String> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let re = NAME.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_.][A-Za-z0-9_.\-]*)").expect("package name regex is valid")
    });
    re.captures(spec).map(|c| c[1].to_string())
}

/// Directories of an environment that go on `PATH`, in priority order.
pub fn executable_dirs(prefix: &Path) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![
            prefix.to_path_buf(),
            prefix.join("Scripts"),
            prefix.join("Library").join("bin"),
        ]
    } else {
        vec![prefix.join("bin")]
    }
}

/// Point `environ` at the environment `prefix`.
///
/// Sets the platform variable(s) and prepends the executable directories
/// to `PATH`. The existing `PATH` is kept intact and the directories are
/// not added a second time if `PATH` already starts with them.
pub fn activate(environ: &mut Environ, prefix: &Path) {
    let prefix_str = prefix.to_string_lossy().into_owned();
    if !cfg!(windows) {
        environ.insert("CONDA_ENV_PATH".to_string(), prefix_str.clone());
    }
    environ.insert("CONDA_DEFAULT_ENV".to_string(), prefix_str);

    let bin_dirs = executable_dirs(prefix);
    let existing: Vec<PathBuf> = environ
        .get("PATH")
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();
    if existing.starts_with(&bin_dirs) {
        return;
    }

    let joined = std::env::join_paths(bin_dirs.iter().chain(existing.iter()));
    let new_path = match joined {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => {
            // A directory contains the separator; fall back to textual join
            let sep = if cfg!(windows) { ";" } else { ":" };
            let mut parts: Vec<String> = bin_dirs
                .iter()
                .map(|d| d.to_string_lossy().into_owned())
                .collect();
            if let Some(old) = environ.get("PATH") {
                parts.push(old.clone());
            }
            parts.join(sep)
        }
    };
    environ.insert("PATH".to_string(), new_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_var_name_is_platform_specific() {
        if cfg!(windows) {
            assert_eq!(env_var_name(), "CONDA_DEFAULT_ENV");
        } else {
            assert_eq!(env_var_name(), "CONDA_ENV_PATH");
        }
        assert!(is_reserved_env_var(env_var_name()));
        assert!(!is_reserved_env_var("FOO"));
    }

    #[test]
    fn package_name_strips_version_constraints() {
        assert_eq!(package_name("hello >= 1.0").as_deref(), Some("hello"));
        assert_eq!(package_name("numpy=1.11").as_deref(), Some("numpy"));
        assert_eq!(package_name("ipython-notebook").as_deref(), Some("ipython-notebook"));
        assert_eq!(package_name("  "), None);
    }

    #[test]
    fn installed_reads_meta_file_names() {
        let temp = TempDir::new().unwrap();
        let meta = temp.path().join(CONDA_META_DIRECTORY);
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join("python-3.5.1-0.json"), "{}").unwrap();
        fs::write(meta.join("ipython-notebook-4.0.4-py35_0.json"), "{}").unwrap();
        fs::write(meta.join("numpy-0.1.json"), "{}").unwrap();
        fs::write(meta.join("history"), "").unwrap();

        let names = installed(temp.path()).unwrap();
        let expected: BTreeSet<String> = ["python", "ipython-notebook", "numpy"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn installed_on_missing_prefix_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(installed(&temp.path().join("nope")).unwrap().is_empty());
        assert!(!looks_like_env(&temp.path().join("nope")));
    }

    #[cfg(unix)]
    #[test]
    fn activate_prepends_bin_once() {
        let mut environ = Environ::new();
        environ.insert("PATH".to_string(), "foo:bar".to_string());
        activate(&mut environ, Path::new("/envs/default"));
        assert_eq!(environ["PATH"], "/envs/default/bin:foo:bar");
        assert_eq!(environ["CONDA_ENV_PATH"], "/envs/default");
        assert_eq!(environ["CONDA_DEFAULT_ENV"], "/envs/default");

        activate(&mut environ, Path::new("/envs/default"));
        assert_eq!(environ["PATH"], "/envs/default/bin:foo:bar");
    }

    #[cfg(unix)]
    #[test]
    fn activate_without_existing_path() {
        let mut environ = Environ::new();
        activate(&mut environ, Path::new("/envs/x"));
        assert_eq!(environ["PATH"], "/envs/x/bin");
    }
}
