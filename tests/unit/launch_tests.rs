//! Unit tests for the positional launch descriptor.

use std::path::{Path, MAIN_SEPARATOR};

use devrun::server::launch::{with_trailing_separator, CLASSPATH_SEPARATOR};
use devrun::server::{LaunchDescriptor, ServerKind};
use devrun::SessionConfig;

fn config(project: &Path, extra: &str) -> SessionConfig {
    let raw = format!(
        "project_name = \"shop\"\nproject_dir = '{}'\nclass_dirs = [\"out/a\", \"out/b\"]\njava_executable = \"/opt/jdk/bin/java\"\n{extra}",
        project.display()
    );
    SessionConfig::from_toml_str(&raw).expect("config parses")
}

#[test]
fn runner_positions_follow_contract() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(temp.path(), "[server]\nport = 8081\nlog_level = \"DEBUG\"\n");
    let root = config.project_dir.clone();

    let descriptor = LaunchDescriptor::build(&config, ServerKind::Jetty, "a.jar:b.jar");
    let runner = descriptor.runner_args();

    assert_eq!(descriptor.program, "/opt/jdk/bin/java");
    assert_eq!(descriptor.working_dir, root.join("build"));
    assert_eq!(runner.len(), 8);
    assert_eq!(runner[0], "devrun.runner.JettyServerRunner");
    assert_eq!(runner[1], "8081");
    assert_eq!(runner[2], with_trailing_separator(&root.join("src/main/webapp")));
    assert_eq!(
        runner[3],
        format!(
            "{},{}",
            with_trailing_separator(&root.join("out/a")),
            with_trailing_separator(&root.join("out/b"))
        )
    );
    assert_eq!(runner[4], with_trailing_separator(&root.join("src/main/resources")));
    assert_eq!(runner[5], "DEBUG");
    assert_eq!(runner[6], "shop");
    assert_eq!(runner[7], root.join("build").display().to_string());
}

#[test]
fn classpath_follows_cp_flag() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(temp.path(), "");
    let descriptor = LaunchDescriptor::build(&config, ServerKind::Payara, "deps.jar");

    let cp = descriptor
        .args
        .iter()
        .position(|arg| arg == "-cp")
        .expect("-cp present");
    assert_eq!(descriptor.args[cp + 1], "deps.jar");
    assert_eq!(descriptor.args[cp + 2], "devrun.runner.PayaraServerRunner");
}

#[test]
fn debug_flags_come_first() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(
        temp.path(),
        "[server]\ndebug = true\ndebug_port = 5005\njvm_args = [\"-Xmx512m\"]\nhot_reload_agent = true\n",
    );
    let descriptor = LaunchDescriptor::build(&config, ServerKind::Jetty, "cp");

    assert_eq!(descriptor.args[0], "-Xdebug");
    assert_eq!(
        descriptor.args[1],
        "-Xrunjdwp:transport=dt_socket,server=y,suspend=n,address=5005"
    );
    assert_eq!(descriptor.args[2], "-XX:HotswapAgent=fatjar");
    assert_eq!(descriptor.args[3], "-Xmx512m");
    assert!(descriptor.args[4].starts_with("-Djava.io.tmpdir="));
    assert_eq!(descriptor.args[5], "-cp");
}

#[test]
fn no_debug_flags_by_default() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(temp.path(), "");
    let descriptor = LaunchDescriptor::build(&config, ServerKind::Jetty, "cp");

    assert!(!descriptor.args.iter().any(|arg| arg.starts_with("-Xdebug")));
    assert!(!descriptor.args.iter().any(|arg| arg.contains("HotswapAgent")));
    assert!(descriptor.args[0].starts_with("-Djava.io.tmpdir="));
}

#[test]
fn trailing_separator_is_added_once() {
    let plain = with_trailing_separator(Path::new("/srv/web"));
    assert_eq!(plain, format!("/srv/web{MAIN_SEPARATOR}"));
    assert_eq!(with_trailing_separator(Path::new(&plain)), plain);
}

#[test]
fn classpath_separator_matches_platform() {
    if cfg!(windows) {
        assert_eq!(CLASSPATH_SEPARATOR, ";");
    } else {
        assert_eq!(CLASSPATH_SEPARATOR, ":");
    }
}
