//! Run command implementation.
//!
//! The `tarp run` command prepares the project and then launches one of
//! its commands in the prepared environment.

use std::path::{Path, PathBuf};

use crate::cli::args::RunArgs;
use crate::error::{Result, TarpError};
use crate::prepare::{prepare, PrepareOptions, UiMode};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{self, PROBLEMS_EXIT_CODE};

/// The run command implementation.
pub struct RunCommand {
    project_root: PathBuf,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(project_root: &Path, args: RunArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            args,
        }
    }

    pub fn args(&self) -> &RunArgs {
        &self.args
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let Some(project) = display::load_project(&self.project_root, ui) else {
            return Ok(CommandResult::failure(PROBLEMS_EXIT_CODE));
        };

        let result = prepare(
            &project,
            display::process_environ(),
            PrepareOptions::new(UiMode::from(self.args.mode)),
        );
        if !result.is_success() {
            display::report_result(ui, &result);
            return Ok(CommandResult::failure(1));
        }
        let environ = result.into_environ()?;

        let exec_info = match &self.args.command {
            Some(name) => {
                if !project.commands().contains_key(name) {
                    ui.error(&format!("Command '{}' is not defined in this project", name));
                    return Ok(CommandResult::failure(1));
                }
                project.exec_info_for_command(name, &environ, &self.args.args)?
            }
            None => project.exec_info_for_environment(&environ, &self.args.args)?,
        };
        let Some(exec_info) = exec_info else {
            ui.error("No command to run on this platform");
            return Ok(CommandResult::failure(1));
        };

        tracing::info!("Running {:?} in {}", exec_info.args, exec_info.cwd.display());
        let status = exec_info.command(&environ).status().map_err(|e| {
            TarpError::Other(anyhow::anyhow!(
                "Failed to start '{}': {}",
                exec_info.args.join(" "),
                e
            ))
        })?;

        Ok(match status.code() {
            Some(0) => CommandResult::success(),
            Some(code) => CommandResult::failure(code),
            None => CommandResult::failure(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unknown_command_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), "").unwrap();
        fs::create_dir_all(temp.path().join("envs/default/conda-meta")).unwrap();
        let args = RunArgs {
            command: Some("nope".into()),
            mode: crate::cli::args::ModeArg::Check,
            args: Vec::new(),
        };
        let mut ui = MockUI::new();
        let result = RunCommand::new(temp.path(), args).execute(&mut ui).unwrap();
        // fails while checking the environment or on the unknown name
        assert_eq!(result.exit_code, 1);
        assert!(!ui.errors().is_empty());
    }
}
