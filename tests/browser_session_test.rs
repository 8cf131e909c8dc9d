//! Integration tests for the browser preparation session.
//!
//! Each test drives the session over real HTTP from a client thread
//! started by the browser opener.

use std::fs;
use std::net::TcpStream;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tarp::conda::{self, PackageManager};
use tarp::plugins::PluginRegistry;
use tarp::prepare::{prepare, PrepareOptions, SessionHandle, UiMode, STOPPED_MESSAGE};
use tarp::project::Project;
use tarp::Environ;
use tempfile::TempDir;

struct FakeManager;

impl PackageManager for FakeManager {
    fn create(&self, prefix: &Path, _packages: &[String], _channels: &[String]) -> tarp::Result<()> {
        fs::create_dir_all(prefix.join(conda::CONDA_META_DIRECTORY))?;
        Ok(())
    }

    fn install(&self, _prefix: &Path, _packages: &[String], _channels: &[String]) -> tarp::Result<()> {
        Ok(())
    }
}

fn project_with(descriptor: &str) -> (TempDir, Project) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("tarp.yml"), descriptor).unwrap();
    let registry = PluginRegistry::new()
        .with_package_manager(Arc::new(FakeManager))
        .with_socket_probe(|_, _, _| false);
    let project = Project::load_with_registry(temp.path(), Arc::new(registry));
    (temp, project)
}

/// One scripted browser action.
enum Action {
    Get(&'static str),
    Post(Vec<(&'static str, &'static str)>),
}

fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// An opener that plays `actions` against the session and reports each
/// response as `(status, body)`.
fn scripted(
    actions: Vec<Action>,
) -> (
    impl FnOnce(SessionHandle) + Send + 'static,
    mpsc::Receiver<(u16, String)>,
) {
    let (tx, rx) = mpsc::channel();
    let opener = move |handle: SessionHandle| {
        let url = handle.url().to_string();
        thread::spawn(move || {
            let client = reqwest::blocking::Client::new();
            for action in actions {
                let response = match action {
                    Action::Get(path) => client.get(format!("{}{}", url.trim_end_matches('/'), path)).send(),
                    Action::Post(fields) => client
                        .post(url.clone())
                        .header("Content-Type", "application/x-www-form-urlencoded")
                        .body(form_body(&fields))
                        .send(),
                };
                let Ok(response) = response else {
                    break;
                };
                let status = response.status().as_u16();
                let body = response.text().unwrap_or_default();
                if tx.send((status, body)).is_err() {
                    break;
                }
            }
        });
    };
    (opener, rx)
}

#[test]
fn get_then_empty_post_uses_defaults() {
    let (_temp, project) = project_with("name: wizard\nruntime:\n  FOO:\n    default: bar\n");
    let (opener, responses) = scripted(vec![Action::Get("/"), Action::Post(Vec::new())]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());
    assert_eq!(result.environ()["FOO"], "bar");

    let (status, form) = responses.recv().unwrap();
    assert_eq!(status, 200);
    assert!(form.contains("FOO"));
    assert!(form.contains("0-EnvVarProvider.source"));

    let (_, done) = responses.recv().unwrap();
    assert!(done.contains("Done!"));
    assert!(done.contains("default"));
}

#[test]
fn submitted_value_is_used() {
    let (temp, project) = project_with("runtime: [FOO]\n");
    let (opener, responses) = scripted(vec![Action::Post(vec![
        ("0-EnvVarProvider.source", "variables"),
        ("0-EnvVarProvider.value", "typed in"),
    ])]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());
    assert_eq!(result.environ()["FOO"], "typed in");
    assert!(responses.recv().unwrap().1.contains("Done!"));

    let state = tarp::state::LocalStateFile::load_for_directory(temp.path()).unwrap();
    assert_eq!(state.variable("FOO"), Some("typed in"));
}

#[test]
fn failed_post_ends_session_without_keep_going() {
    let (_temp, project) = project_with("runtime: [FOO]\n");
    let (opener, responses) = scripted(vec![Action::Post(Vec::new())]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(!result.is_success());
    assert!(result.errors().iter().any(|e| e.contains("FOO")));

    let (status, page) = responses.recv().unwrap();
    assert_eq!(status, 200);
    assert!(page.contains("FOO"));
    assert!(!page.contains("Done!"));
}

#[test]
fn keep_going_rerenders_until_success() {
    let (_temp, project) = project_with("runtime: [FOO]\n");
    let (opener, responses) = scripted(vec![
        Action::Post(Vec::new()),
        Action::Post(vec![
            ("0-EnvVarProvider.source", "variables"),
            ("0-EnvVarProvider.value", "second try"),
        ]),
    ]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser)
            .keep_going_until_success(true)
            .with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());
    assert_eq!(result.environ()["FOO"], "second try");

    let (_, first) = responses.recv().unwrap();
    assert!(first.contains("0-EnvVarProvider.source"));
    assert!(!first.contains("Done!"));
    assert!(responses.recv().unwrap().1.contains("Done!"));
}

#[test]
fn unknown_path_is_not_found() {
    let (_temp, project) = project_with("runtime:\n  FOO:\n    default: bar\n");
    let (opener, responses) = scripted(vec![Action::Get("/favicon.ico"), Action::Post(Vec::new())]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success());
    assert_eq!(responses.recv().unwrap().0, 404);
}

#[test]
fn stopping_the_session_fails() {
    let (_temp, project) = project_with("runtime: [FOO]\n");
    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(|handle: SessionHandle| {
            thread::spawn(move || handle.stop());
        }),
    );
    assert!(!result.is_success());
    assert_eq!(result.errors(), [STOPPED_MESSAGE]);
}

#[test]
fn stopping_reports_only_the_stop() {
    let (_temp, project) = project_with("");
    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(|handle: SessionHandle| {
            thread::spawn(move || handle.stop());
        }),
    );
    assert!(!result.is_success());
    assert_eq!(result.errors(), [STOPPED_MESSAGE]);
    assert!(!result.statuses().is_empty());
}

#[test]
fn met_project_never_opens_a_browser() {
    let (_temp, project) = project_with("");
    let first = prepare(&project, Environ::new(), PrepareOptions::new(UiMode::Auto));
    assert!(first.is_success());

    let result = prepare(
        &project,
        first.environ().clone(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(|_handle: SessionHandle| {
            panic!("browser should not open");
        }),
    );
    assert!(result.is_success());
}

#[test]
fn idle_connection_does_not_delay_the_session() {
    let (_temp, project) = project_with("runtime:\n  FOO:\n    default: bar\n");
    let (tx, rx) = mpsc::channel();
    let opener = move |handle: SessionHandle| {
        thread::spawn(move || {
            let _idle = TcpStream::connect(handle.address()).unwrap();
            let started = Instant::now();
            let response = reqwest::blocking::Client::new()
                .post(handle.url())
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body("")
                .send()
                .and_then(|r| r.text());
            let _ = tx.send((started.elapsed(), response.unwrap_or_default()));
        });
    };

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());
    let (elapsed, body) = rx.recv().unwrap();
    assert!(elapsed < Duration::from_secs(1), "answered after {:?}", elapsed);
    assert!(body.contains("Done!"));
}

#[test]
fn empty_project_offers_its_own_environment() {
    let (_temp, project) = project_with("");
    let (opener, responses) = scripted(vec![Action::Get("/"), Action::Post(Vec::new())]);

    let result = prepare(
        &project,
        Environ::new(),
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());

    let (_, form) = responses.recv().unwrap();
    assert_eq!(form.matches(" checked").count(), 1);
    assert!(form.contains("name=\"0-CondaEnvProvider.source\" value=\"project\" checked"));

    let (_, done) = responses.recv().unwrap();
    assert!(done.contains("Done!"));
    assert!(done.contains("Using Conda environment"));
    assert!(done.contains("default"));
}

#[test]
fn keeping_a_bad_environ_prefix_rerenders_the_same_problem() {
    let (_temp, project) = project_with("");
    let mut environ = Environ::new();
    environ.insert(
        conda::env_var_name().to_string(),
        "not/a/real/environment".to_string(),
    );

    let (tx, rx) = mpsc::channel();
    let opener = move |handle: SessionHandle| {
        thread::spawn(move || {
            let client = reqwest::blocking::Client::new();
            for _ in 0..2 {
                let page = client
                    .post(handle.url())
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(form_body(&[("0-CondaEnvProvider.source", "environ")]))
                    .send()
                    .and_then(|r| r.text())
                    .unwrap_or_default();
                let _ = tx.send(page);
            }
            handle.stop();
        });
    };

    let result = prepare(
        &project,
        environ,
        PrepareOptions::new(UiMode::Browser)
            .keep_going_until_success(true)
            .with_browser_opener(opener),
    );
    assert!(!result.is_success());
    assert_eq!(result.errors(), [STOPPED_MESSAGE]);

    let first = rx.recv().unwrap();
    let second = rx.recv().unwrap();
    for page in [&first, &second] {
        assert!(page.contains("name=\"0-CondaEnvProvider.source\" value=\"environ\" checked"));
        assert!(page.contains("not/a/real/environment&#39; doesn&#39;t look like"));
        assert!(!page.contains("Done!"));
    }
    assert_eq!(first, second);
}

#[test]
fn choosing_a_second_environment_activates_it() {
    let (_temp, project) = project_with(
        "environments:\n  default:\n    dependencies: []\n  second_env:\n    dependencies: []\n",
    );
    let (opener, responses) = scripted(vec![Action::Post(vec![
        ("0-CondaEnvProvider.source", "project"),
        ("0-CondaEnvProvider.env_name", "second_env"),
    ])]);

    let mut environ = Environ::new();
    environ.insert("PATH".to_string(), "/usr/bin".to_string());
    let result = prepare(
        &project,
        environ,
        PrepareOptions::new(UiMode::Browser).with_browser_opener(opener),
    );
    assert!(result.is_success(), "{:?}", result.errors());
    assert!(responses.recv().unwrap().1.contains("Done!"));

    let prefix = Path::new(&result.environ()[conda::env_var_name()]).to_path_buf();
    assert!(prefix.ends_with(Path::new("envs").join("second_env")));
    assert!(std::env::split_paths(&result.environ()["PATH"]).any(|dir| dir.starts_with(&prefix)));
}
