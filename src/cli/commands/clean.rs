//! Clean command implementation.
//!
//! `tarp clean` asks providers to release what they started, then removes
//! the project-scoped environments and service directories.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::prepare::{prepare, unprepare, PrepareOptions, UiMode};
use crate::project::ENVS_DIRECTORY;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{self, PROBLEMS_EXIT_CODE};

/// Project directories created while providing requirements.
const GENERATED_DIRECTORIES: [&str; 2] = [ENVS_DIRECTORY, "services"];

/// The clean command implementation.
pub struct CleanCommand {
    project_root: PathBuf,
}

impl CleanCommand {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
        }
    }
}

impl Command for CleanCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let Some(project) = display::load_project(&self.project_root, ui) else {
            return Ok(CommandResult::failure(PROBLEMS_EXIT_CODE));
        };

        let status = prepare(
            &project,
            display::process_environ(),
            PrepareOptions::new(UiMode::Check),
        );
        let mut ok = true;
        if let Err(e) = unprepare(&project, &status) {
            ui.error(&e.to_string());
            ok = false;
        }

        for name in GENERATED_DIRECTORIES {
            let path = project.directory_path().join(name);
            if !path.exists() {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => ui.success(&format!("Removed {}", path.display())),
                Err(e) => {
                    ui.error(&format!("Failed to remove {}: {}", path.display(), e));
                    ok = false;
                }
            }
        }

        Ok(if ok {
            CommandResult::success()
        } else {
            CommandResult::failure(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use tempfile::TempDir;

    #[test]
    fn removes_generated_directories() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), "").unwrap();
        fs::create_dir_all(temp.path().join("envs/default/conda-meta")).unwrap();
        fs::create_dir_all(temp.path().join("services")).unwrap();

        let mut ui = MockUI::new();
        let result = CleanCommand::new(temp.path()).execute(&mut ui).unwrap();
        assert!(result.success);
        assert!(!temp.path().join("envs").exists());
        assert!(!temp.path().join("services").exists());
        assert!(temp.path().join("tarp.yml").exists());
    }
}
