//! CLI arg parsing tests for meshmon (monitor)
use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn test_help_mentions_short_and_long_flags() {
    let output = Command::cargo_bin("meshmon")
        .expect("binary exists")
        .arg("--help")
        .output()
        .expect("run meshmon --help");
    assert!(output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        text.contains("--config") && text.contains("-c") && text.contains("--port") && text.contains("-p"),
        "help text missing expected flags (--config/-c, --port/-p)\n{text}"
    );
}

#[test]
fn test_unknown_flag_prints_usage() {
    let output = Command::cargo_bin("meshmon")
        .expect("binary exists")
        .arg("--frobnicate")
        .output()
        .expect("run meshmon");
    let text = String::from_utf8_lossy(&output.stderr);
    assert!(text.contains("Usage:"), "{text}");
}
