//! Prepare and check command implementations.
//!
//! `tarp prepare` drives the project's requirements to a met state;
//! `tarp check` only reports them.

use std::path::{Path, PathBuf};

use crate::cli::args::{ModeArg, PrepareArgs};
use crate::error::Result;
use crate::prepare::{prepare, PrepareOptions, UiMode};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{self, PROBLEMS_EXIT_CODE};

/// The prepare command implementation.
pub struct PrepareCommand {
    project_root: PathBuf,
    args: PrepareArgs,
}

impl PrepareCommand {
    /// Create a new prepare command.
    pub fn new(project_root: &Path, args: PrepareArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            args,
        }
    }

    /// A `check` is a prepare that never provides anything.
    pub fn check(project_root: &Path) -> Self {
        Self::new(
            project_root,
            PrepareArgs {
                mode: ModeArg::Check,
                ..PrepareArgs::default()
            },
        )
    }

    pub fn args(&self) -> &PrepareArgs {
        &self.args
    }
}

impl Command for PrepareCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let Some(project) = display::load_project(&self.project_root, ui) else {
            return Ok(CommandResult::failure(PROBLEMS_EXIT_CODE));
        };
        ui.show_header(project.name());

        let mode = UiMode::from(self.args.mode);
        let options = PrepareOptions::new(mode)
            .keep_going_until_success(self.args.keep_going)
            .fail_fast(self.args.fail_fast);
        if mode == UiMode::Browser {
            ui.message("Opening a browser to finish setting up the project...");
        }

        let result = prepare(&project, display::process_environ(), options);
        display::report_result(ui, &result);
        Ok(if result.is_success() {
            CommandResult::success()
        } else {
            CommandResult::failure(1)
        })
    }
}
