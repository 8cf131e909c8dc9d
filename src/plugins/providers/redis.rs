//! Provider for a Redis server.
//!
//! Besides keeping or typing a URL, the provider can locate a system Redis
//! on the default port or start a project-scoped `redis-server`. A started
//! server is recorded in the local state's `service_run_states` so later
//! runs reuse it and [`Provider::unprovide`] can stop it.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{Result, TarpError};
use crate::plugins::provider::{
    keep_environ_choice, provide_typed_value, record_source_and_value, typed_value_choice, Choice,
    ConfigForm, ProvideContext, Provider, ProviderConfig, SOURCE_FIELD, VALUE_FIELD,
};
use crate::plugins::requirement::Requirement;
use crate::state::LocalStateFile;
use crate::sys;
use crate::Environ;

const SOURCES: [&str; 5] = ["environ", "variables", "find_system", "find_project", "find_all"];

/// Ports tried, in order, for a project-scoped server.
pub const PROJECT_PORT_RANGE: RangeInclusive<u16> = 6380..=6449;

const SYSTEM_PORT: u16 = 6379;
const STARTUP_POLLS: u32 = 50;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Locates or starts a Redis server.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisProvider;

fn local_url(port: u16) -> String {
    format!("redis://localhost:{}", port)
}

fn failed(message: String) -> TarpError {
    TarpError::ProviderFailed {
        provider: "RedisProvider".to_string(),
        message,
    }
}

impl RedisProvider {
    fn source(requirement: &Requirement, environ: &Environ, local_state: &LocalStateFile) -> String {
        let env_var = requirement.env_var();
        let has_environ = environ.get(env_var).is_some_and(|v| !v.is_empty());
        local_state
            .setting(env_var, SOURCE_FIELD)
            .filter(|s| SOURCES.contains(s) && (*s != "environ" || has_environ))
            .unwrap_or("find_all")
            .to_string()
    }

    fn use_system(requirement: &Requirement, context: &mut ProvideContext<'_>) -> bool {
        if !context
            .registry
            .can_connect("localhost", SYSTEM_PORT, sys::DEFAULT_SOCKET_TIMEOUT)
        {
            tracing::debug!("No system Redis on port {}", SYSTEM_PORT);
            return false;
        }
        context
            .environ
            .insert(requirement.env_var().to_string(), local_url(SYSTEM_PORT));
        true
    }

    fn use_project(requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        let env_var = requirement.env_var();
        let registry = context.registry;

        let recorded_port = context
            .local_state
            .service_run_state(env_var)
            .and_then(|state| state.get("port"))
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok());
        if let Some(port) = recorded_port {
            if registry.can_connect("localhost", port, sys::DEFAULT_SOCKET_TIMEOUT) {
                tracing::info!("Reusing project Redis on port {}", port);
                context.environ.insert(env_var.to_string(), local_url(port));
                return Ok(());
            }
            context.local_state.clear_service_run_state(env_var);
        }

        let search_path: Vec<PathBuf> = context
            .environ
            .get("PATH")
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default();
        let executable = sys::find_executable("redis-server", &search_path)
            .ok_or_else(|| failed("Could not find redis-server on PATH.".to_string()))?;

        let port = PROJECT_PORT_RANGE
            .clone()
            .find(|p| !registry.can_connect("localhost", *p, sys::DEFAULT_SOCKET_TIMEOUT))
            .ok_or_else(|| {
                failed(format!(
                    "All ports from {} to {} were in use, could not start redis-server.",
                    PROJECT_PORT_RANGE.start(),
                    PROJECT_PORT_RANGE.end()
                ))
            })?;

        let run_dir = context.project_dir()?.join("services").join(env_var);
        fs::create_dir_all(&run_dir)?;
        let pidfile = run_dir.join("redis.pid");
        let logfile = run_dir.join("redis.log");

        let port_arg = port.to_string();
        let args: [&std::ffi::OsStr; 10] = [
            "--port".as_ref(),
            port_arg.as_ref(),
            "--daemonize".as_ref(),
            "yes".as_ref(),
            "--pidfile".as_ref(),
            pidfile.as_os_str(),
            "--logfile".as_ref(),
            logfile.as_os_str(),
            "--dir".as_ref(),
            run_dir.as_os_str(),
        ];
        tracing::info!("Starting {} on port {}", executable.display(), port);
        let status = Command::new(&executable)
            .args(args)
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(TarpError::CommandFailed {
                command: format!("{} --port {}", executable.display(), port),
                code: status.code(),
            });
        }

        let mut state = Mapping::new();
        state.insert("port".into(), u64::from(port).into());
        state.insert("pidfile".into(), pidfile.to_string_lossy().into_owned().into());
        state.insert("logfile".into(), logfile.to_string_lossy().into_owned().into());
        context.local_state.set_service_run_state(env_var, state);

        let ready = (0..STARTUP_POLLS).any(|_| {
            if registry.can_connect("localhost", port, sys::DEFAULT_SOCKET_TIMEOUT) {
                return true;
            }
            thread::sleep(STARTUP_POLL_INTERVAL);
            false
        });
        if !ready {
            return Err(failed(format!(
                "redis-server started on port {} but is not accepting connections; see {}",
                port,
                logfile.display()
            )));
        }

        context.environ.insert(env_var.to_string(), local_url(port));
        Ok(())
    }
}

impl Provider for RedisProvider {
    fn class_name(&self) -> &'static str {
        "RedisProvider"
    }

    fn title(&self) -> &'static str {
        "Run a Redis server"
    }

    fn read_config(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> ProviderConfig {
        let mut config = ProviderConfig::new();
        config.insert(
            SOURCE_FIELD.to_string(),
            Self::source(requirement, environ, local_state),
        );
        config.insert(
            VALUE_FIELD.to_string(),
            local_state
                .variable(requirement.env_var())
                .unwrap_or_default()
                .to_string(),
        );
        config
    }

    fn set_config_values(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        local_state: &mut LocalStateFile,
        values: &ProviderConfig,
    ) -> Result<()> {
        record_source_and_value(requirement, local_state, values, &SOURCES);
        Ok(())
    }

    fn config_form(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        _local_state: &LocalStateFile,
        config: &ProviderConfig,
    ) -> Option<ConfigForm> {
        let mut choices = Vec::new();
        choices.extend(keep_environ_choice(requirement, environ));
        choices.push(typed_value_choice(requirement, config));
        choices.push(Choice::new(
            "find_system",
            format!("Always use a system Redis on port {}", SYSTEM_PORT),
        ));
        choices.push(Choice::new(
            "find_project",
            "Always run a Redis server dedicated to this project",
        ));
        choices.push(Choice::new(
            "find_all",
            "Use a system Redis if available, otherwise run one for this project",
        ));
        let selected = config.get(SOURCE_FIELD).cloned().unwrap_or_default();
        Some(ConfigForm::new(choices, selected))
    }

    fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) -> Result<()> {
        match context.source() {
            "environ" => Ok(()),
            "variables" => {
                provide_typed_value(requirement, context);
                Ok(())
            }
            "find_system" => {
                if Self::use_system(requirement, context) {
                    Ok(())
                } else {
                    Err(failed(format!(
                        "No system Redis server is running on port {}.",
                        SYSTEM_PORT
                    )))
                }
            }
            "find_project" => Self::use_project(requirement, context),
            _ => {
                if Self::use_system(requirement, context) {
                    return Ok(());
                }
                Self::use_project(requirement, context)
            }
        }
    }

    fn unprovide(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        local_state: &mut LocalStateFile,
    ) -> Result<()> {
        let env_var = requirement.env_var();
        let Some(run_state) = local_state.service_run_state(env_var) else {
            return Ok(());
        };
        let Some(pidfile) = run_state
            .get("pidfile")
            .and_then(Value::as_str)
            .map(PathBuf::from)
        else {
            return Ok(());
        };
        let port = run_state
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok());

        stop_server(&pidfile, port)?;
        local_state.clear_service_run_state(env_var);
        Ok(())
    }
}

/// Stop the server recorded in `pidfile`.
///
/// Only a plausible pid is signalled, and only while the recorded port
/// still accepts connections; otherwise the server is taken as gone.
fn stop_server(pidfile: &Path, port: Option<u16>) -> Result<()> {
    let Ok(content) = fs::read_to_string(pidfile) else {
        tracing::debug!("No pidfile at {}; server already stopped", pidfile.display());
        return Ok(());
    };
    let Ok(pid) = content.trim().parse::<i32>() else {
        tracing::warn!("Ignoring unreadable pidfile {}", pidfile.display());
        return Ok(());
    };
    if pid <= 1 {
        return Err(failed(format!(
            "Refusing to stop pid {} read from {}",
            pid,
            pidfile.display()
        )));
    }

    let listening = port.is_some_and(|port| {
        sys::can_connect_to_socket("localhost", port, sys::DEFAULT_SOCKET_TIMEOUT)
    });
    if listening {
        terminate(pid);
    } else {
        tracing::info!(
            "redis-server from {} is no longer listening; not signalling pid {}",
            pidfile.display(),
            pid
        );
    }
    let _ = fs::remove_file(pidfile);
    Ok(())
}

#[cfg(unix)]
fn terminate(pid: i32) {
    tracing::info!("Stopping redis-server (pid {})", pid);
    // SAFETY: kill has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        tracing::warn!(
            "Failed to stop redis-server (pid {}): {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate(pid: i32) {
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(result, Ok(status) if status.success()) {
        tracing::warn!("Failed to stop redis-server (pid {})", pid);
    }
}
