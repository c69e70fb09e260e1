//! Integration tests for the restart loop.

use std::time::Duration;

use devrun::{run_session, AppError};

use super::test_helpers::{eventually, line_count, Project, PORT};

const SESSION_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runtime_failure_points_at_console() {
    let project = Project::new("sleep 1\nexit 3\n");
    let (supervisor, _browser) = project.supervisor();

    let err = tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, false))
        .await
        .expect("session ends")
        .expect_err("non-zero exit fails the session");

    assert!(
        matches!(err, AppError::ServerExit(ref msg)
            if msg.contains("exited with code 3") && msg.contains("console output")),
        "unexpected error: {err}"
    );
    assert!(!supervisor.has_process());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runtime_failure_points_at_log_file() {
    let mut project = Project::new("sleep 1\nexit 3\n");
    project.config.dev.log_to_console = false;
    let (supervisor, _browser) = project.supervisor();

    let err = tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, false))
        .await
        .expect("session ends")
        .expect_err("non-zero exit fails the session");

    let log_path = supervisor.log_path().display().to_string();
    assert!(
        matches!(err, AppError::ServerExit(ref msg) if msg.contains(&log_path)),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_failure_ends_session() {
    let project = Project::new("exit 137\n");
    let (supervisor, _browser) = project.supervisor();

    let err = run_session(&supervisor, false)
        .await
        .expect_err("startup failure is fatal");
    assert!(matches!(err, AppError::Startup(ref msg) if msg.contains("137")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_after_start_ends_on_ready() {
    let project = Project::new(
        "echo booting\necho 'INFO Started ServerConnector@3f1{HTTP/1.1}'\nexec sleep 30\n",
    );
    let (supervisor, browser) = project.supervisor();

    tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, true))
        .await
        .expect("session ends")
        .expect("session succeeds");

    assert!(!supervisor.has_process());
    assert!(browser.opened().is_empty());
    let log = std::fs::read_to_string(supervisor.log_path()).expect("log");
    assert!(log.contains(&format!("jetty is now serving at http://localhost:{PORT}/")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_after_start_tolerates_failure() {
    let project = Project::new("sleep 1\nexit 3\n");
    let (supervisor, _browser) = project.supervisor();

    tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, true))
        .await
        .expect("session ends")
        .expect("failure is swallowed with stop-after-start");
    assert!(!supervisor.has_process());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn natural_exit_stops_reload() {
    let project = Project::with_script(|root| {
        format!(
            "echo run >> '{}'\nsleep 0.5\nexit 0\n",
            root.join("spawns").display()
        )
    });
    let (supervisor, _browser) = project.supervisor();

    tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, false))
        .await
        .expect("session ends")
        .expect("clean exit is not an error");

    assert!(supervisor.has_process());
    assert_eq!(line_count(&project.path("spawns")), 1);
    assert!(supervisor.terminate());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_line_restarts_server() {
    let project = Project::with_script(|root| {
        let marker = root.join("first-run-done");
        let spawns = root.join("spawns");
        format!(
            "if [ -f '{marker}' ]; then\n  echo second >> '{spawns}'\n  sleep 0.5\n  exit 0\nfi\ntouch '{marker}'\necho first >> '{spawns}'\necho 'ERROR boom'\nexec sleep 30\n",
            marker = marker.display(),
            spawns = spawns.display(),
        )
    });
    let (supervisor, _browser) = project.supervisor();

    tokio::time::timeout(SESSION_TIMEOUT, run_session(&supervisor, false))
        .await
        .expect("session ends")
        .expect("soft shutdown is not an error");

    assert_eq!(line_count(&project.path("spawns")), 2);
    let log = std::fs::read_to_string(supervisor.log_path()).expect("log");
    assert!(log.contains("ERROR boom"));
    assert!(supervisor.terminate());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ready_server_opens_browser() {
    let mut project = Project::new("echo 'Started ServerConnector@1'\nexec sleep 30\n");
    project.config.dev.open_in_browser = true;
    project
        .config
        .dev
        .browser_params
        .insert("foo".into(), "bar".into());
    let (supervisor, browser) = project.supervisor();

    assert!(supervisor.start(false).await.expect("start"));
    assert!(
        eventually(Duration::from_secs(5), || !browser.opened().is_empty()).await,
        "browser never opened"
    );
    assert_eq!(
        browser.opened(),
        vec![format!("http://localhost:{PORT}/?foo=bar")]
    );

    supervisor.shutdown().await;
}
