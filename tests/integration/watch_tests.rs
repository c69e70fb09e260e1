//! Integration tests for class-directory and theme watching.

use std::sync::Arc;
use std::time::Duration;

use devrun::run_session;
use devrun::supervisor::{Collaborators, RestartServer};
use devrun::theme::ThemeCompiler;
use devrun::watch::WatchAction;

use super::test_helpers::{eventually, line_count, CountingCompiler, Project};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn class_change_restarts_server() {
    let project = Project::with_script(|root| {
        let marker = root.join("first-run-done");
        let spawns = root.join("spawns");
        format!(
            "if [ -f '{marker}' ]; then\n  echo second >> '{spawns}'\n  sleep 0.5\n  exit 0\nfi\ntouch '{marker}'\necho first >> '{spawns}'\nexec sleep 30\n",
            marker = marker.display(),
            spawns = spawns.display(),
        )
    });
    let classes = project.path("build/classes");
    std::fs::create_dir_all(&classes).expect("class dir");
    let (supervisor, _browser) = project.supervisor();

    let watched = supervisor
        .watch_class_dirs(Arc::new(RestartServer::new(supervisor.slot())) as Arc<dyn WatchAction>)
        .expect("watch");
    assert_eq!(watched, 1);

    let spawns = project.path("spawns");
    let touch = async {
        assert!(eventually(Duration::from_secs(5), || supervisor.is_running()).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(classes.join("App.class"), b"\xca\xfe\xba\xbe").expect("write class");
    };
    let (session, ()) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(15), run_session(&supervisor, false)),
        touch
    );
    session.expect("session ends").expect("session ok");

    assert_eq!(line_count(&spawns), 2);
    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stylesheet_change_recompiles_theme() {
    let mut project = Project::new("exec sleep 30\n");
    std::fs::create_dir_all(project.path("themes")).expect("theme dir");
    project.config.theme_dir = Some("themes".into());
    project.config.dev.theme_auto_recompile = true;

    let compiler = Arc::new(CountingCompiler::default());
    let supervisor = project.supervisor_with(Collaborators {
        theme_compiler: Some(Arc::clone(&compiler) as Arc<dyn ThemeCompiler>),
        ..Collaborators::default()
    });
    assert!(supervisor.start(false).await.expect("start"));

    std::fs::write(project.path("themes/app.js"), "let x = 1;").expect("write js");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(compiler.compiles(), 0);

    for n in 0..3 {
        std::fs::write(project.path("themes/app.css"), format!("body {{ order: {n}; }}"))
            .expect("write css");
    }
    assert!(
        eventually(Duration::from_secs(5), || compiler.compiles() >= 1).await,
        "theme never recompiled"
    );

    supervisor.shutdown().await;
}
