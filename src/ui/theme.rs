//! Visual theme and styling.

use console::Style;

/// Tarp's visual theme.
#[derive(Debug, Clone)]
pub struct TarpTheme {
    /// Style for success messages (green).
    pub success: Style,
    /// Style for warning messages (orange).
    pub warning: Style,
    /// Style for error messages (red bold).
    pub error: Style,
    /// Style for dim/secondary text.
    pub dim: Style,
    /// Style for highlighted/important text (bold).
    pub highlight: Style,
    /// Style for headers (cyan bold).
    pub header: Style,
    /// Style for key labels in key-value displays (bold).
    pub key: Style,
}

impl Default for TarpTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl TarpTheme {
    /// Create the default theme.
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().bold().cyan(),
            key: Style::new().bold(),
        }
    }

    /// Create a theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            key: Style::new(),
        }
    }

    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    /// Format a header banner.
    pub fn format_header(&self, title: &str) -> String {
        format!("{} {}", self.header.apply_to("▲"), self.highlight.apply_to(title))
    }

    /// Format one requirement: icon and title, description underneath.
    pub fn format_requirement(&self, provided: bool, title: &str, description: &str) -> String {
        let icon = if provided {
            self.success.apply_to("✓")
        } else {
            self.error.apply_to("✗")
        };
        format!(
            "{} {}\n    {}",
            icon,
            self.highlight.apply_to(title),
            self.dim.apply_to(description)
        )
    }

    pub fn format_key_value(&self, key: &str, value: &str) -> String {
        format!("{} {}", self.key.apply_to(format!("{}:", key)), value)
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    console::Term::stdout().is_term()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_formats_status_messages() {
        let theme = TarpTheme::plain();
        assert_eq!(theme.format_success("Complete"), "✓ Complete");
        assert_eq!(theme.format_warning("Caution"), "⚠ Caution");
        assert_eq!(theme.format_error("Failed"), "✗ Failed");
    }

    #[test]
    fn theme_formats_requirement() {
        let theme = TarpTheme::plain();
        let msg = theme.format_requirement(false, "A Conda environment", "not set");
        assert_eq!(msg, "✗ A Conda environment\n    not set");
    }

    #[test]
    fn theme_formats_header_and_key_value() {
        let theme = TarpTheme::plain();
        assert!(theme.format_header("demo").contains("demo"));
        assert_eq!(theme.format_key_value("Name", "demo"), "Name: demo");
    }

    #[test]
    fn default_impl_matches_new() {
        assert_eq!(
            TarpTheme::default().format_success("test"),
            TarpTheme::new().format_success("test")
        );
    }
}
