//! Integration tests for starting and terminating the server process.

use std::sync::Arc;
use std::time::Duration;

use devrun::server::ClasspathJarBuilder;
use devrun::supervisor::Collaborators;
use devrun::watch::WatchScheduler;
use devrun::{AppError, ProcessSupervisor};

use super::test_helpers::{line_count, PlaceholderJarBuilder, Project};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_is_refused() {
    let project = Project::with_script(|root| {
        format!("echo spawned >> '{}'\nexec sleep 30\n", root.join("spawns").display())
    });
    let spawns = project.path("spawns");
    let (supervisor, _browser) = project.supervisor();

    assert!(supervisor.start(false).await.expect("first start"));
    assert!(!supervisor.start(false).await.expect("second start"));
    assert!(supervisor.has_process());
    assert_eq!(line_count(&spawns), 1);

    assert!(supervisor.terminate());
    assert!(!supervisor.terminate());
    let exit = tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_exit())
        .await
        .expect("exit")
        .expect("process was started");
    assert!(exit.requested);
    assert!(!supervisor.has_process());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn immediate_death_is_startup_failure() {
    let project = Project::new("exit 137\n");
    let (supervisor, _browser) = project.supervisor();

    let err = supervisor.start(false).await.expect_err("startup must fail");

    assert!(
        matches!(err, AppError::Startup(ref msg) if msg.contains("137")),
        "unexpected error: {err}"
    );
    assert!(!supervisor.has_process());
    let log = std::fs::read_to_string(supervisor.log_path()).expect("log");
    assert!(log.contains("exited immediately with code 137"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_writes_manifest_and_log_header() {
    let project = Project::new("echo hello from runner\nexec sleep 30\n");
    let (supervisor, _browser) = project.supervisor();

    assert!(supervisor.start(false).await.expect("start"));

    let manifest = std::fs::read_to_string(project.path("build/classpath.txt")).expect("manifest");
    assert_eq!(
        manifest,
        format!(
            "{};{}",
            project.path("libs/a.jar").display(),
            project.path("libs/b.jar").display()
        )
    );

    let log_path = supervisor.log_path();
    assert_eq!(log_path, project.path("build/logs/jetty.log"));
    let mut found = false;
    for _ in 0..40 {
        let log = std::fs::read_to_string(&log_path).unwrap_or_default();
        if log.contains("hello from runner") {
            assert!(log.contains("[devrun] jetty started at"));
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "server output never reached the log file");

    supervisor.shutdown().await;
    assert!(!supervisor.has_process());
}

#[tokio::test]
async fn unknown_server_kind_is_rejected() {
    let mut project = Project::new("exit 0\n");
    project.config.server.kind = "tomcat".into();

    let result = ProcessSupervisor::new(
        project.config.clone(),
        Collaborators::default(),
        WatchScheduler::current().expect("runtime"),
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test]
async fn classpath_jar_requires_builder() {
    let mut project = Project::new("exit 0\n");
    project.config.server.use_classpath_jar = true;

    let result = ProcessSupervisor::new(
        project.config.clone(),
        Collaborators::default(),
        WatchScheduler::current().expect("runtime"),
    );
    assert!(matches!(result, Err(AppError::Config(ref msg)) if msg.contains("use_classpath_jar")));
}

#[tokio::test]
async fn classpath_jar_replaces_joined_classpath() {
    let mut project = Project::new("exit 0\n");
    project.config.server.use_classpath_jar = true;

    let supervisor = project.supervisor_with(Collaborators {
        classpath_jar_builder: Some(Arc::new(PlaceholderJarBuilder) as Arc<dyn ClasspathJarBuilder>),
        ..Collaborators::default()
    });

    let descriptor = supervisor.launch_descriptor().expect("descriptor");
    let cp = descriptor
        .args
        .iter()
        .position(|arg| arg == "-cp")
        .expect("-cp");
    assert_eq!(
        descriptor.args[cp + 1],
        project.path("build/classpath.jar").display().to_string()
    );
}

#[tokio::test]
async fn payara_supervisor_identity() {
    let mut project = Project::new("exit 0\n");
    project.config.server.kind = "payara".into();
    let (supervisor, _browser) = project.supervisor();

    assert_eq!(supervisor.server_name(), "payara");
    assert_eq!(supervisor.success_token(), "Payara Micro URLs");
    assert_eq!(supervisor.runner_entry_point(), "devrun.runner.PayaraServerRunner");
    assert_eq!(supervisor.log_path(), project.path("build/logs/payara.log"));
    assert!(supervisor.wait_for_exit().await.is_none());
}
