//! CLI Contract Tests
//!
//! Requests the gate would not accept must stop before any backend is built,
//! so these run without an API key.

use std::process::{Command, Output};

use serde_json::Value;

fn run(args: &[&str]) -> (Output, Value) {
    let home = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_addonsmith-cli"))
        .args(args)
        .arg("--store-dir")
        .arg(home.path().join("store"))
        .current_dir(home.path())
        .env_clear()
        .env("HOME", home.path())
        .output()
        .unwrap();
    let json = serde_json::from_slice(&output.stdout).unwrap();
    (output, json)
}

#[test]
fn generate_with_blank_text_reports_empty_verdict() {
    let (output, json) = run(&["generate", "--text", "   "]);

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(json["success"], false);
    assert_eq!(json["verdict"]["verdict"], "empty");
}

#[test]
fn generate_with_short_text_is_rejected_without_backend() {
    let (output, json) = run(&["generate", "--text", "tiny sword"]);

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(json["verdict"]["verdict"], "rejected");
    assert_eq!(json["verdict"]["reason"], "too_short");
}

#[test]
fn validate_accepts_reasonable_request() {
    let (output, json) = run(&[
        "validate",
        "--text",
        "An emerald sword that deals eight damage and lasts long.",
    ]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(json["verdict"]["verdict"], "accepted");
}
