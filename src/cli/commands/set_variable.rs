//! Set-variable command implementation.
//!
//! `tarp set-variable NAME=VALUE...` declares each variable in the
//! project's `runtime` section and records the value in local state.

use std::path::{Path, PathBuf};

use crate::cli::args::SetVariableArgs;
use crate::error::Result;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{self, PROBLEMS_EXIT_CODE};

/// The set-variable command implementation.
pub struct SetVariableCommand {
    project_root: PathBuf,
    args: SetVariableArgs,
}

impl SetVariableCommand {
    pub fn new(project_root: &Path, args: SetVariableArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            args,
        }
    }
}

/// Split `NAME=VALUE`; the value may itself contain `=`.
fn parse_assignment(assignment: &str) -> Option<(String, String)> {
    let (name, value) = assignment.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

impl Command for SetVariableCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let mut pairs = Vec::new();
        for assignment in &self.args.vars {
            match parse_assignment(assignment) {
                Some(pair) => pairs.push(pair),
                None => {
                    ui.error(&format!(
                        "Variable assignment '{}' should be in NAME=VALUE form",
                        assignment
                    ));
                    return Ok(CommandResult::failure(1));
                }
            }
        }

        let Some(mut project) = display::load_project(&self.project_root, ui) else {
            return Ok(CommandResult::failure(PROBLEMS_EXIT_CODE));
        };
        project.set_variables(&pairs)?;
        for (name, _) in &pairs {
            ui.success(&format!("Set {}", name));
        }
        Ok(CommandResult::success())
    }
}
