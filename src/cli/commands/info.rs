//! Info command implementation.
//!
//! `tarp info` describes the project: its name, environments, commands and
//! variables. `--json` prints the publication summary instead.

use std::path::{Path, PathBuf};

use crate::cli::args::InfoArgs;
use crate::error::{Result, TarpError};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{self, PROBLEMS_EXIT_CODE};

/// The info command implementation.
pub struct InfoCommand {
    project_root: PathBuf,
    args: InfoArgs,
}

impl InfoCommand {
    pub fn new(project_root: &Path, args: InfoArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            args,
        }
    }
}

impl Command for InfoCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let Some(project) = display::load_project(&self.project_root, ui) else {
            return Ok(CommandResult::failure(PROBLEMS_EXIT_CODE));
        };

        if self.args.json {
            let json = serde_json::to_string_pretty(&project.publication_info())
                .map_err(|e| TarpError::Other(e.into()))?;
            ui.message(&json);
            return Ok(CommandResult::success());
        }

        ui.show_key_value("Name", project.name());
        ui.show_key_value("Directory", &project.directory_path().display().to_string());
        if let Some(icon) = project.icon() {
            ui.show_key_value("Icon", &icon.display().to_string());
        }

        ui.message("");
        ui.message("Environments:");
        for (name, env) in project.environments() {
            let marker = if name == project.default_environment_name() {
                " (default)"
            } else {
                ""
            };
            ui.message(&format!("  {}{}", name, marker));
            if !env.dependencies.is_empty() {
                ui.message(&format!("    dependencies: {}", env.dependencies.join(", ")));
            }
            if !env.channels.is_empty() {
                ui.message(&format!("    channels: {}", env.channels.join(", ")));
            }
        }

        ui.message("");
        ui.message("Commands:");
        if project.commands().is_empty() {
            ui.message("  (none)");
        }
        for (name, command) in project.commands() {
            ui.message(&format!("  {}: {}", name, command.description()));
        }

        ui.message("");
        ui.message("Requirements:");
        for requirement in project.requirements() {
            ui.message(&format!("  {}: {}", requirement.env_var(), requirement.title()));
        }
        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    fn project(descriptor: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), descriptor).unwrap();
        temp
    }

    #[test]
    fn shows_name_and_commands() {
        let temp = project("name: demo\ncommands:\n  default:\n    shell: echo hi\n    description: Say hi\n");
        let mut ui = MockUI::new();
        InfoCommand::new(temp.path(), InfoArgs::default())
            .execute(&mut ui)
            .unwrap();
        assert_eq!(ui.key_values()[0], ("Name".to_string(), "demo".to_string()));
        assert!(ui.has_message("default: Say hi"));
        assert!(ui.has_message("default (default)"));
    }

    #[test]
    fn json_output_is_publication_info() {
        let temp = project("name: demo\nruntime: [FOO]\n");
        let mut ui = MockUI::new();
        InfoCommand::new(temp.path(), InfoArgs { json: true })
            .execute(&mut ui)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&ui.messages()[0]).unwrap();
        assert_eq!(value["name"], "demo");
        assert!(value["variables"]["FOO"].is_object());
    }
}
