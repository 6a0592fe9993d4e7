//! CLI surface tests.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn concom() -> Command {
    Command::cargo_bin("concom").unwrap()
}

#[test]
fn test_help_names_the_agent_subcommand() {
    concom()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent"));
}

#[test]
fn test_agent_requires_a_config_flag() {
    concom().arg("agent").assert().failure();
}

#[test]
fn test_missing_config_file_exits_with_config_error() {
    concom()
        .args(["agent", "-c", "/nonexistent/agent.yaml"])
        .assert()
        .code(2);
}

#[test]
fn test_config_without_plugins_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("agent.yaml");
    std::fs::write(&config, "api:\n  url: http://localhost\nplugins: {}\n").unwrap();

    concom()
        .args(["agent", "-c", config.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no plugins"));
}

#[test]
fn test_one_shot_run_exits_zero() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(async {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(201))
            .mount(&server)
            .await;
        server
    });

    let dir = tempfile::tempdir().unwrap();
    let plugin = dir.path().join("plugin");
    std::fs::write(
        &plugin,
        r#"#!/bin/sh
echo 'CONCOM|1|1|stdio'
read configure
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
read eval
echo '{"jsonrpc":"2.0","id":2,"result":{"status":"SUCCESS"}}'
read eof
"#,
    )
    .unwrap();
    make_executable(&plugin);

    let policies = dir.path().join("policies");
    std::fs::create_dir_all(&policies).unwrap();
    std::fs::write(policies.join("ssh.yaml"), "package: x.y\n").unwrap();

    let config = dir.path().join("agent.yaml");
    std::fs::write(
        &config,
        format!(
            "api:\n  url: {}\nplugins:\n  ssh:\n    source: {}\n    policies: [\"{}\"]\n",
            server.uri(),
            plugin.display(),
            policies.display(),
        ),
    )
    .unwrap();

    concom()
        .args(["agent", "-c", config.to_str().unwrap(), "-v"])
        .assert()
        .success();
}

fn make_executable(path: &Path) {
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
