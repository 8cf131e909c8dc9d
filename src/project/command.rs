//! Named commands and how to launch them.

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::conda;
use crate::error::{Result, TarpError};
use crate::sys;
use crate::Environ;

/// Attributes that carry a command line.
pub const COMMAND_LINE_ATTRIBUTES: [&str; 5] =
    ["shell", "windows", "conda_app_entry", "notebook", "bokeh_app"];

/// Attributes that must be the only command line in a command.
const STANDALONE_ATTRIBUTES: [&str; 2] = ["notebook", "bokeh_app"];

/// A command declared in (or inferred for) a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCommand {
    name: String,
    attributes: Vec<(String, String)>,
}

impl ProjectCommand {
    /// Build a command from validated string attributes.
    pub fn new(name: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// An attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Whether any attribute carries a command line.
    pub fn has_command_line(&self) -> bool {
        COMMAND_LINE_ATTRIBUTES
            .iter()
            .any(|attr| self.attribute(attr).is_some())
    }

    /// The `description` attribute, or the command line itself.
    pub fn description(&self) -> String {
        if let Some(description) = self.attribute("description") {
            return description.to_string();
        }
        COMMAND_LINE_ATTRIBUTES
            .iter()
            .find_map(|attr| self.attribute(attr))
            .unwrap_or(&self.name)
            .to_string()
    }

    /// Build the launch information for this command.
    ///
    /// Returns `None` when the command has no line for this platform.
    /// `environ` must contain `PATH`, the platform package-environment
    /// variable and `PROJECT_DIR`.
    pub fn exec_info_for_environment(
        &self,
        environ: &Environ,
        extra_args: &[String],
    ) -> Result<Option<ExecInfo>> {
        let required = |name: &str| -> Result<String> {
            environ
                .get(name)
                .cloned()
                .ok_or_else(|| TarpError::MissingEnvironmentVariable {
                    name: name.to_string(),
                })
        };
        let path = required("PATH")?;
        let prefix = required(conda::env_var_name())?;
        let project_dir = PathBuf::from(required("PROJECT_DIR")?);

        let resolve = |file: &str| project_dir.join(file).to_string_lossy().into_owned();

        let args = if let Some(notebook) = self.attribute("notebook") {
            let mut args = vec!["jupyter-notebook".to_string(), resolve(notebook)];
            args.extend_from_slice(extra_args);
            args
        } else if let Some(app) = self.attribute("bokeh_app") {
            let mut args = vec!["bokeh".to_string(), "serve".to_string(), resolve(app)];
            args.extend_from_slice(extra_args);
            args
        } else if let Some(entry) = self.attribute("conda_app_entry") {
            let expanded = expand_variables(&entry.replace("${PREFIX}", &prefix), environ);
            let mut args = split_command_line(&expanded);
            if let Some(program) = args.first_mut() {
                let mut search = vec![project_dir.clone()];
                search.extend(std::env::split_paths(&path));
                if let Some(found) = sys::find_executable(program, &search) {
                    *program = found.to_string_lossy().into_owned();
                }
            }
            args.extend_from_slice(extra_args);
            args
        } else {
            let key = if cfg!(windows) { "windows" } else { "shell" };
            let Some(line) = self.attribute(key) else {
                return Ok(None);
            };
            let mut line = line.to_string();
            for arg in extra_args {
                line.push(' ');
                line.push_str(&quote_arg(arg));
            }
            return Ok(Some(ExecInfo {
                cwd: project_dir,
                args: vec![line],
                shell: true,
            }));
        };

        Ok(Some(ExecInfo {
            cwd: project_dir,
            args,
            shell: false,
        }))
    }
}

/// Everything needed to launch a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInfo {
    pub cwd: PathBuf,
    /// Program and arguments, or a single shell command line when `shell`.
    pub args: Vec<String>,
    pub shell: bool,
}

impl ExecInfo {
    /// A process command for this launch.
    pub fn command(&self, environ: &Environ) -> Command {
        let mut command = if self.shell {
            let line = self.args.join(" ");
            if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.args(["/c", &line]);
                c
            } else {
                let mut c = Command::new("/bin/sh");
                c.args(["-c", &line]);
                c
            }
        } else {
            let mut c = Command::new(self.args.first().map(String::as_str).unwrap_or_default());
            c.args(self.args.iter().skip(1));
            c
        };
        command.current_dir(&self.cwd).env_clear().envs(environ);
        command
    }
}

/// Validate one command's attribute mapping.
///
/// Returns the command or the problems found.
pub fn parse_command(
    file: &Path,
    name: &str,
    value: &Value,
    fallback_entry: Option<&str>,
) -> std::result::Result<ProjectCommand, Vec<String>> {
    let Some(attrs) = value.as_mapping() else {
        return Err(vec![format!(
            "{}: command name '{}' should be followed by a dictionary of attributes not {}",
            file.display(),
            name,
            super::file::display_value(value)
        )]);
    };

    let mut problems = Vec::new();
    let mut attributes = Vec::new();
    for key in COMMAND_LINE_ATTRIBUTES.iter().chain(["description"].iter()) {
        match attrs.get(*key) {
            None => {}
            Some(Value::String(s)) => attributes.push((key.to_string(), s.clone())),
            Some(other) => problems.push(format!(
                "{}: command '{}' attribute '{}' should be a string not '{}'",
                file.display(),
                name,
                key,
                super::file::display_value(other)
            )),
        }
    }
    if !problems.is_empty() {
        return Err(problems);
    }

    let mut command = ProjectCommand::new(name, attributes);
    for standalone in STANDALONE_ATTRIBUTES {
        let others = command_line_count(attrs) > 1;
        if command.attribute(standalone).is_some() && others {
            return Err(vec![format!(
                "{}: command '{}' has conflicting statements, '{}' must stand alone",
                file.display(),
                name,
                standalone
            )]);
        }
    }

    if !command.has_command_line() {
        match fallback_entry {
            Some(entry) => command
                .attributes
                .push(("conda_app_entry".to_string(), entry.to_string())),
            None => {
                return Err(vec![format!(
                    "{}: command '{}' does not have a command line in it",
                    file.display(),
                    name
                )])
            }
        }
    }
    Ok(command)
}

fn command_line_count(attrs: &Mapping) -> usize {
    COMMAND_LINE_ATTRIBUTES
        .iter()
        .filter(|attr| attrs.contains_key(**attr))
        .count()
}

/// Replace `${NAME}` with values from `environ`; unknown names are left alone.
fn expand_variables(text: &str, environ: &Environ) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match environ.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Split a command line into words, honoring single and double quotes
/// and backslash escapes outside single quotes.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn quote_arg(arg: &str) -> String {
    if cfg!(windows) {
        return format!("\"{}\"", arg.replace('"', "\\\""));
    }
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environ(dir: &str) -> Environ {
        let mut environ = Environ::new();
        environ.insert("PATH".into(), "/nonexistent/bin".into());
        environ.insert(conda::env_var_name().into(), "/envs/default".into());
        environ.insert("PROJECT_DIR".into(), dir.into());
        environ
    }

    fn parse(yaml: &str) -> std::result::Result<ProjectCommand, Vec<String>> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        parse_command(Path::new("tarp.yml"), "default", &value, None)
    }

    #[test]
    fn split_handles_quotes() {
        assert_eq!(
            split_command_line(r#"echo "a b" 'c d' e\ f"#),
            vec!["echo", "a b", "c d", "e f"]
        );
        assert_eq!(split_command_line("  "), Vec::<String>::new());
        assert_eq!(split_command_line("x ''"), vec!["x", ""]);
    }

    #[test]
    fn expand_leaves_unknown_names() {
        let mut environ = Environ::new();
        environ.insert("A".into(), "1".into());
        assert_eq!(expand_variables("${A}-${B}-${", &environ), "1-${B}-${");
    }

    #[test]
    fn empty_command_is_a_problem() {
        let problems = parse("{}").unwrap_err();
        assert_eq!(
            problems,
            vec!["tarp.yml: command 'default' does not have a command line in it"]
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let command = parse("foobar: boo\nshell: bar\n").unwrap();
        assert_eq!(command.attribute("shell"), Some("bar"));
        assert_eq!(command.attribute("foobar"), None);
    }

    #[test]
    fn non_string_attribute() {
        let problems = parse("shell: 42\n").unwrap_err();
        assert_eq!(
            problems,
            vec!["tarp.yml: command 'default' attribute 'shell' should be a string not '42'"]
        );
    }

    #[test]
    fn notebook_must_stand_alone() {
        let problems = parse("notebook: test.ipynb\nshell: echo 'pass'\n").unwrap_err();
        assert_eq!(
            problems,
            vec!["tarp.yml: command 'default' has conflicting statements, 'notebook' must stand alone"]
        );
    }

    #[test]
    fn fallback_entry_fills_empty_command() {
        let value: Value = serde_yaml::from_str("{}").unwrap();
        let command =
            parse_command(Path::new("tarp.yml"), "foo", &value, Some("foo bar ${PREFIX}")).unwrap();
        assert_eq!(command.attribute("conda_app_entry"), Some("foo bar ${PREFIX}"));
    }

    #[test]
    fn notebook_exec_info() {
        let command = parse("notebook: test.ipynb\n").unwrap();
        let info = command
            .exec_info_for_environment(&environ("/proj"), &[])
            .unwrap()
            .unwrap();
        assert_eq!(
            info.args,
            vec!["jupyter-notebook".to_string(), Path::new("/proj").join("test.ipynb").to_string_lossy().into_owned()]
        );
        assert!(!info.shell);
    }

    #[test]
    fn app_entry_substitutes_prefix() {
        let command = parse("conda_app_entry: foo bar ${PREFIX}\n").unwrap();
        let info = command
            .exec_info_for_environment(&environ("/proj"), &["baz".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(info.args, vec!["foo", "bar", "/envs/default", "baz"]);
        assert_eq!(info.cwd, PathBuf::from("/proj"));
    }

    #[cfg(unix)]
    #[test]
    fn shell_exec_info_quotes_extra_args() {
        let command = parse("shell: echo hi\n").unwrap();
        let info = command
            .exec_info_for_environment(&environ("/proj"), &["a b".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(info.args, vec!["echo hi 'a b'"]);
        assert!(info.shell);
    }

    #[cfg(unix)]
    #[test]
    fn windows_only_command_has_no_exec_info_here() {
        let command = parse("windows: foo\n").unwrap();
        assert!(command
            .exec_info_for_environment(&environ("/proj"), &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_variables_are_named() {
        let command = parse("conda_app_entry: foo\n").unwrap();
        for key in ["PATH", conda::env_var_name(), "PROJECT_DIR"] {
            let mut env = environ("/proj");
            env.remove(key);
            let err = command.exec_info_for_environment(&env, &[]).unwrap_err();
            assert_eq!(err.to_string(), format!("{} must be set", key));
        }
    }

    #[test]
    fn description_falls_back_to_command_line() {
        assert_eq!(parse("shell: echo hi\n").unwrap().description(), "echo hi");
        assert_eq!(
            parse("shell: echo hi\ndescription: Say hi\n").unwrap().description(),
            "Say hi"
        );
    }
}
