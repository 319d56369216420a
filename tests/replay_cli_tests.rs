//! Integration tests for the replay binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Write a capture of two requests against a project rooted at `root`
fn write_capture(dir: &Path, root: &str) -> std::path::PathBuf {
    let call = |path: &str, method: &str, definer: &str, receiver: &str| {
        format!(
            r#"{{"event":"call","path":"{root}{path}","line":3,"method_name":"{method}","call_site":{{"defining_type":"{definer}","receiver_type":"{receiver}"}},"backtrace":["{root}{path}:3","{root}app/controllers/users_controller.rb:9:in `show'"]}}"#,
        )
    };
    let line = |path: &str, n: u32| {
        format!(r#"{{"event":"line","path":"{root}{path}","line":{n},"method_name":"show"}}"#)
    };

    let records = vec![
        "# two requests".to_string(),
        r#"{"event":"request","method":"GET","path":"/users/7","uri":"/users/7?tab=orders"}"#.to_string(),
        call("app/controllers/users_controller.rb", "show", "UsersController", "UsersController"),
        call("app/models/user.rb", "full_name", "User", "User"),
        call("app/models/user.rb", "full_name", "User", "User"),
        call("app/models/application_record.rb", "touch", "ApplicationRecord", "User"),
        call("config/initializers/x.rb", "setup", "Setup", "Setup"),
        line("app/controllers/users_controller.rb", 9),
        r#"{"event":"end"}"#.to_string(),
        String::new(),
        r#"{"event":"request","method":"GET","path":"/orders","uri":"/orders"}"#.to_string(),
        call("lib/pricing.rb", "quote", "Pricing", "Pricing"),
        r#"{"event":"end"}"#.to_string(),
    ];

    let path = dir.join("capture.jsonl");
    std::fs::write(&path, records.join("\n")).unwrap();
    path
}

fn project() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let root = format!("{}/", dir.path().canonicalize().unwrap().display());
    (dir, root)
}

#[test]
fn test_replay_prints_owner_report() {
    let (dir, root) = project();
    let capture = write_capture(dir.path(), &root);

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("--root")
        .arg(dir.path())
        .arg("--output-dir")
        .arg(dir.path().join("data"))
        .arg(&capture);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("=== GET /users/7?tab=orders ==="))
        .stdout(predicate::str::contains("[model] User >> app/models/user.rb"))
        .stdout(predicate::str::contains("User < ApplicationRecord"))
        .stdout(predicate::str::contains("total class or module: 3"))
        .stdout(predicate::str::contains("total method calls: 4"))
        .stdout(predicate::str::contains("[lib] Pricing >> lib/pricing.rb"))
        .stdout(predicate::str::contains("Setup").not())
        .stderr(predicate::str::contains("2 requests"));
}

#[test]
fn test_replay_writes_exports() {
    let (dir, root) = project();
    let capture = write_capture(dir.path(), &root);
    let data = dir.path().join("data");

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-r").arg(dir.path()).arg("-o").arg(&data).arg(&capture);
    cmd.assert().success();

    let calls: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("calls.json")).unwrap()).unwrap();
    assert_eq!(calls["1: /users/7"]["data"].as_array().unwrap().len(), 4);
    assert_eq!(calls["2: /orders"]["data"].as_array().unwrap().len(), 1);

    let lines: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("lines.json")).unwrap()).unwrap();
    assert_eq!(lines["1: /users/7"]["data"][0]["line"], 9);
    assert!(!data.join("returns.json").exists());
}

#[test]
fn test_replay_no_detail_prints_totals_only() {
    let (dir, root) = project();
    let capture = write_capture(dir.path(), &root);

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-r")
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("data"))
        .arg("--no-detail")
        .arg(&capture);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("total method calls: 4"))
        .stdout(predicate::str::contains("User >>").not());
}

#[test]
fn test_replay_with_config_file() {
    let (dir, root) = project();
    let capture = write_capture(dir.path(), &root);
    let config = dir.path().join("callscope.toml");
    std::fs::write(
        &config,
        format!(
            "line = false\nexclude_path_prefixes = [\"{}lib/\"]\noutput_dir = \"{}\"\n",
            root,
            dir.path().join("out").display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-c").arg(&config).arg("-r").arg(dir.path()).arg(&capture);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Pricing").not());

    assert!(dir.path().join("out").join("calls.json").exists());
    assert!(!dir.path().join("out").join("lines.json").exists());
}

#[test]
fn test_replay_missing_root_fails() {
    let (dir, root) = project();
    let capture = write_capture(dir.path(), &root);

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-r").arg(dir.path().join("missing")).arg(&capture);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("project root"));
}

#[test]
fn test_replay_invalid_record_fails() {
    let (dir, _root) = project();
    let capture = dir.path().join("bad.jsonl");
    std::fs::write(&capture, "{\"event\":\"request\",\"method\":\"GET\",\"path\":\"/\"}\n{oops\n").unwrap();

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-r")
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("data"))
        .arg(&capture);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("capture line 2"));
}

#[test]
fn test_replay_skips_record_that_fails_schema() {
    let (dir, root) = project();
    let capture = dir.path().join("mixed.jsonl");
    let call = |method: &str| {
        format!(
            r#"{{"event":"call","path":"{root}app/models/user.rb","line":3,"method_name":"{method}","call_site":{{"defining_type":"User","receiver_type":"User"}}}}"#
        )
    };
    let records = [
        r#"{"event":"request","method":"GET","path":"/a","uri":"/a"}"#.to_string(),
        call("save"),
        r#"{"event":"call","path":"/x","line":"three"}"#.to_string(),
        call("touch"),
        r#"{"event":"end"}"#.to_string(),
        r#"{"event":"request","method":"GET","path":"/b","uri":"/b"}"#.to_string(),
        call("reload"),
    ];
    std::fs::write(&capture, records.join("\n")).unwrap();

    let mut cmd = Command::cargo_bin("callscope").unwrap();
    cmd.arg("-r")
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("data"))
        .arg(&capture);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("=== GET /a ==="))
        .stdout(predicate::str::contains("=== GET /b ==="))
        .stderr(predicate::str::contains("2 requests, 3 events recorded"))
        .stderr(predicate::str::contains("1 rejected records"));
}
