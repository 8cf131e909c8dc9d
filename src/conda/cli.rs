//! `conda` command-line backend.

use std::path::Path;
use std::process::{Command, Stdio};

use super::PackageManager;
use crate::error::{Result, TarpError};

/// Runs the `conda` executable to manage environments.
#[derive(Debug, Clone)]
pub struct CondaCli {
    executable: String,
}

impl CondaCli {
    /// Use `conda` from `PATH`.
    pub fn new() -> Self {
        Self::with_executable("conda")
    }

    /// Use a specific conda executable.
    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// The executable this backend runs.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    fn build_args(
        subcommand: &str,
        prefix: &Path,
        packages: &[String],
        channels: &[String],
    ) -> Vec<String> {
        let mut args = vec![
            subcommand.to_string(),
            "--yes".to_string(),
            "--quiet".to_string(),
            "--prefix".to_string(),
            prefix.to_string_lossy().into_owned(),
        ];
        for channel in channels {
            args.push("--channel".to_string());
            args.push(channel.clone());
        }
        args.extend(packages.iter().cloned());
        args
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let command_line = format!("{} {}", self.executable, args.join(" "));
        tracing::info!("Running {}", command_line);

        let output = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TarpError::PackageManager {
                message: format!("Failed to run {}: {}", self.executable, e),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        tracing::warn!("{} failed: {}", command_line, detail);
        Err(TarpError::PackageManager {
            message: if detail.is_empty() {
                format!(
                    "{} exited with code {:?}",
                    command_line,
                    output.status.code()
                )
            } else {
                format!("{} failed: {}", command_line, detail)
            },
        })
    }
}

impl Default for CondaCli {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager for CondaCli {
    fn create(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<()> {
        // conda refuses to create an empty environment without at least one package
        let packages = if packages.is_empty() {
            vec!["python".to_string()]
        } else {
            packages.to_vec()
        };
        self.run(&Self::build_args("create", prefix, &packages, channels))
    }

    fn install(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.run(&Self::build_args("install", prefix, packages, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_orders_channels_before_packages() {
        let args = CondaCli::build_args(
            "create",
            Path::new("/p"),
            &["numpy".to_string()],
            &["mtv".to_string()],
        );
        assert_eq!(
            args,
            vec!["create", "--yes", "--quiet", "--prefix", "/p", "--channel", "mtv", "numpy"]
        );
    }

    #[test]
    fn install_nothing_is_a_noop() {
        let cli = CondaCli::with_executable("/definitely/not/conda");
        assert!(cli.install(Path::new("/p"), &[], &[]).is_ok());
    }

    #[test]
    fn missing_executable_is_a_package_manager_error() {
        let cli = CondaCli::with_executable("/definitely/not/conda");
        let err = cli
            .create(Path::new("/p"), &["python".to_string()], &[])
            .unwrap_err();
        assert!(matches!(err, TarpError::PackageManager { .. }));
    }

    #[test]
    fn default_uses_conda_from_path() {
        assert_eq!(CondaCli::default().executable(), "conda");
    }
}
