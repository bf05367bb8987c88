// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[tokio::test]
async fn local_runner_executes_in_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let runner = LocalRunner::new();
    let output = runner
        .run("pwd", &[], Some(dir.path()), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(output.status.success());
    let pwd = String::from_utf8_lossy(&output.stdout);
    // Compare canonicalized paths (macOS tempdirs live behind /private)
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(pwd.trim()).canonicalize().unwrap(),
        expected
    );
}

#[tokio::test]
async fn local_runner_pipes_stdin_to_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let runner = LocalRunner::new();

    let output = runner
        .run_with_input(
            "sh",
            &["-c".to_string(), format!("cat > {}", target.display())],
            "file content\n",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "file content\n");
}

#[tokio::test]
async fn local_runner_maps_timeout() {
    let runner = LocalRunner::new();
    let err = runner
        .run(
            "sleep",
            &["5".to_string()],
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Timeout(_)));
}

#[parameterized(
    plain = { "simple-arg_1.txt", "simple-arg_1.txt" },
    spaces = { "has space", "'has space'" },
    quote = { "it's", r"'it'\''s'" },
    empty = { "", "''" },
    dollar = { "$HOME", "'$HOME'" },
)]
fn shell_quote_escapes(input: &str, expected: &str) {
    assert_eq!(shell_quote(input), expected);
}

#[test]
fn ssh_remote_command_includes_cwd() {
    let remote = SshRunner::remote_command(
        "git",
        &["fetch".to_string(), "origin".to_string()],
        Some(Path::new("/srv/repo")),
    );
    assert_eq!(remote, "cd /srv/repo && git fetch origin");
}

#[test]
fn ssh_target_names_the_sprite() {
    assert_eq!(SshRunner::new("sprite-7").target(), "sprite:sprite-7");
    assert_eq!(LocalRunner::new().target(), "local");
}

#[tokio::test]
async fn fake_runner_records_and_fails_on_pattern() {
    let fake = FakeRunner::new();
    fake.fail_matching("git fetch");
    fake.respond_matching("has-session", "yes");

    let ok = fake
        .run(
            "tmux",
            &["has-session".to_string()],
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert!(ok.status.success());
    assert_eq!(String::from_utf8_lossy(&ok.stdout), "yes");

    let failed = fake
        .run(
            "git",
            &["fetch".to_string(), "origin".to_string()],
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert!(!failed.status.success());

    assert_eq!(fake.lines(), vec!["tmux has-session", "git fetch origin"]);
}
