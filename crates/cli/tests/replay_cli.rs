use agentlens_core::EventKind;
use agentlens_core::jsonl::write_events;
use agentlens_core::testing::{
    assistant, content_delta, delegation_completed, delegation_requested, event, event_in,
    request_end, tool_end, tool_start, user_prompt,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn write_log(dir: &Path) -> PathBuf {
    let events = vec![
        event(1, "main", 1000, user_prompt("fix the build")),
        event(2, "main", 1100, content_delta("m1", "Looking ")),
        event(3, "main", 1200, content_delta("m1", "now")),
        event(4, "main", 1300, tool_start("tc-d", "delegate", json!({"agent_id": "worker"}))),
        event(5, "main", 1400, delegation_requested("d1", "worker")),
        event(
            6,
            "main",
            1500,
            EventKind::SessionForked {
                child_session_id: "child".into(),
                delegation_id: Some("d1".into()),
            },
        ),
        event(7, "main", 4000, delegation_completed("d1")),
        event(8, "main", 4100, tool_end("tc-d", json!({"status": "completed"}))),
        event(9, "main", 5000, request_end("stop")),
        event_in("child", 1, "worker", 2000, assistant("compiling")),
        // duplicate delivery
        event(9, "main", 5000, request_end("stop")),
    ];
    let path = dir.join("session.jsonl");
    let file = fs::File::create(&path).expect("create log");
    write_events(&events, file).expect("write log");
    path
}

fn run(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agentlens"))
        .args(args)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("run agentlens")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn rows_json_nests_and_merges_stream() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let rows = stdout_json(&run(
        home.path(),
        &["rows", log.to_str().unwrap(), "--format", "json"],
    ));
    let rows = rows.as_array().expect("rows array");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["kind"], "user");
    assert_eq!(rows[1]["content"], "Looking now");
    assert_eq!(rows[2]["id"], "tc-d");
    assert_eq!(rows[2]["is_delegate_call"], true);
}

#[test]
fn timers_json_reports_paused_totals() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let timers = stdout_json(&run(
        home.path(),
        &["timers", log.to_str().unwrap(), "--format", "json", "--now", "99999"],
    ));
    assert_eq!(timers["session_id"], "s1");
    assert_eq!(timers["global_elapsed_ms"], 4000);
    assert_eq!(timers["agent_elapsed_ms"]["main"], 400 + 1000);
    assert_eq!(timers["running"], false);
    assert_eq!(timers["is_session_active"], false);
}

#[test]
fn groups_with_tree_hydrate_child_rows() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let groups = stdout_json(&run(
        home.path(),
        &["groups", log.to_str().unwrap(), "--format", "json", "--tree"],
    ));
    let group = &groups[0]["group"];
    assert_eq!(group["status"], "completed");
    assert_eq!(group["child_session_id"], "child");
    assert_eq!(group["hydrated"], true);
    assert_eq!(groups[0]["turn"]["start_time_ms"], 2000);
}

#[test]
fn turns_text_lists_one_turn() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let output = run(home.path(), &["turns", log.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("s1:1 "), "stdout: {stdout}");
    assert!(stdout.contains("1 delegation(s)"));
    assert!(stdout.contains("  > fix the build"));
}

#[test]
fn config_format_default_applies() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let config_dir = home.path().join(".config").join("agentlens");
    fs::create_dir_all(&config_dir).expect("config dir");
    fs::write(
        config_dir.join("agentlens.toml"),
        "[output]\nformat = \"json\"\n",
    )
    .expect("write config");

    let rows = stdout_json(&run(home.path(), &["rows", log.to_str().unwrap()]));
    assert!(rows.is_array());
}

#[test]
fn watch_exits_when_nothing_runs() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let output = run(
        home.path(),
        &["watch", log.to_str().unwrap(), "--interval-ms", "10"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("[paused]"));
}

#[test]
fn missing_file_reports_error() {
    let home = tempfile::tempdir().expect("tempdir");
    let output = run(home.path(), &["rows", "/nonexistent/agentlens.jsonl"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Failed to open"));
}

#[test]
fn malformed_lines_warn_but_replay() {
    let home = tempfile::tempdir().expect("tempdir");
    let log = write_log(home.path());
    let mut body = fs::read_to_string(&log).expect("read log");
    body.push_str("{not json}\n");
    fs::write(&log, body).expect("rewrite log");

    let output = run(home.path(), &["rows", log.to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("skipped 1 malformed line"));
}
