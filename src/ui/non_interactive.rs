//! Plain UI for pipes and CI logs.

use super::theme::TarpTheme;
use super::{OutputMode, UserInterface};

/// Unstyled output; errors and warnings go to stderr.
pub struct NonInteractiveUI {
    mode: OutputMode,
    theme: TarpTheme,
}

impl NonInteractiveUI {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            theme: TarpTheme::plain(),
        }
    }
}

impl UserInterface for NonInteractiveUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_status() {
            println!("{}", msg);
        }
    }

    fn success(&mut self, msg: &str) {
        if self.mode.shows_status() {
            println!("{}", self.theme.format_success(msg));
        }
    }

    fn warning(&mut self, msg: &str) {
        if self.mode.shows_status() {
            eprintln!("{}", self.theme.format_warning(msg));
        }
    }

    fn error(&mut self, msg: &str) {
        eprintln!("{}", self.theme.format_error(msg));
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_progress() {
            println!("{}", self.theme.format_header(title));
        }
    }

    fn show_requirement(&mut self, provided: bool, title: &str, description: &str) {
        if self.mode.shows_status() {
            println!(
                "  {}",
                self.theme.format_requirement(provided, title, description)
            );
        }
    }

    fn show_key_value(&mut self, key: &str, value: &str) {
        if self.mode.shows_status() {
            println!("{}", self.theme.format_key_value(key, value));
        }
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
