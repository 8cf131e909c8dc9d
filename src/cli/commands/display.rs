//! Shared helpers for commands that load and prepare a project.

use std::path::Path;

use crate::plugins::RequirementStatus;
use crate::prepare::PrepareResult;
use crate::project::Project;
use crate::ui::UserInterface;
use crate::Environ;

/// Exit code for a project that cannot be loaded.
pub const PROBLEMS_EXIT_CODE: i32 = 2;

/// The environment of this process.
pub fn process_environ() -> Environ {
    std::env::vars().collect()
}

/// Load a project, reporting its problems.
///
/// Returns `None` if the project has problems.
pub fn load_project(directory: &Path, ui: &mut dyn UserInterface) -> Option<Project> {
    let project = Project::load(directory);
    if project.problems().is_empty() {
        return Some(project);
    }
    ui.error(&format!(
        "Unable to load the project in {}:",
        project.directory_path().display()
    ));
    for problem in project.problems() {
        ui.error(&format!("  {}", problem));
    }
    None
}

/// Print one line per requirement.
///
/// Met requirements are only listed in verbose mode.
pub fn show_statuses(ui: &mut dyn UserInterface, statuses: &[RequirementStatus]) {
    let details = ui.output_mode().shows_details();
    for status in statuses {
        if status.has_been_provided() && !details {
            continue;
        }
        ui.show_requirement(
            status.has_been_provided(),
            &status.requirement().title(),
            status.status_description(),
        );
    }
}

/// Report a preparation outcome.
pub fn report_result(ui: &mut dyn UserInterface, result: &PrepareResult) {
    show_statuses(ui, result.statuses());
    if result.is_success() {
        ui.success("The project is ready to run commands.");
    } else {
        for error in result.errors() {
            ui.error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::{prepare, PrepareOptions, UiMode};
    use crate::ui::{MockUI, OutputMode};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_project_reports_problems() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), "runtime: 42\n").unwrap();
        let mut ui = MockUI::new();
        assert!(load_project(temp.path(), &mut ui).is_none());
        assert!(ui.has_error("runtime section contains wrong value type 42"));
    }

    #[test]
    fn report_failure_lists_errors() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tarp.yml"), "runtime: [FOO]\n").unwrap();
        let project = Project::load(temp.path());
        let result = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Check));

        let mut ui = MockUI::with_mode(OutputMode::Verbose);
        report_result(&mut ui, &result);
        assert!(ui.has_error("missing requirement to run this project: FOO environment variable must be set"));
        assert!(ui
            .requirements()
            .iter()
            .any(|r| r.description == "Environment variable FOO is not set."));
        assert!(ui.successes().is_empty());
    }
}
