//! Integration tests for the chat-listener binary.
//!
//! These run the binary against a replay script and check the JSON lines it
//! prints and its exit codes.

use std::path::Path;
use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_chat-listener"))
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let config = format!(
        r#"
[general]
log_level = "warn"

[timing]
settle_delay_ms = 0
cycle_interval_ms = 10

[storage]
save_dir = {:?}
"#,
        dir.join("media")
    );
    std::fs::write(&path, config).unwrap();
    path
}

/// The window closes after the second snapshot, which halts the listener
const SCRIPT: &str = r#"{
  "windows": [{
    "title": "Alice",
    "closes_after": 2,
    "frames": [
      [{ "label": "hello", "avatar": { "name": "Alice" },
         "children": [{ "selector": { "Text": "Other" }, "text": "hello" }] }],
      [{ "label": "hello" },
       { "label": "how are you", "avatar": { "name": "Alice" },
         "children": [{ "selector": { "Text": "Other" }, "text": "how are you" }] },
       { "label": "[图片]", "avatar": { "name": "Alice" }, "file_name": "photo.png" }]
    ]
  }]
}"#;

#[test]
fn test_replay_prints_messages_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let script = dir.path().join("session.json");
    std::fs::write(&script, SCRIPT).unwrap();

    let output = binary()
        .arg("--config")
        .arg(&config)
        .arg("--replay")
        .arg(&script)
        .output()
        .expect("Failed to execute chat-listener");

    // The closed window is fatal
    assert_eq!(output.status.code(), Some(2));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("Output should be valid JSON"))
        .collect();

    assert_eq!(lines.len(), 2, "stdout: {}", stdout);
    assert_eq!(lines[0]["kind"], "Text");
    assert_eq!(lines[0]["content"][0], "how are you");
    assert_eq!(lines[0]["sender_kind"], "Friend");
    assert_eq!(lines[1]["kind"], "Image");
    assert!(dir.path().join("media").join("photo.png").exists());
}

#[test]
fn test_unknown_argument_fails() {
    let output = binary().arg("--bogus").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown argument"));
}

#[test]
fn test_missing_replay_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let output = binary().arg("--config").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}
