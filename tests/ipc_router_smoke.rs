use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradeboardd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOARD_SETTINGS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradeboardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");

    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_answers_without_settings() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));
    let result = health.get("result").expect("result");
    assert_eq!(result.get("settingsLoaded").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(result.get("teacherUnlocked").and_then(|v| v.as_bool()), Some(false));

    for (i, method) in ["rooms.list", "cycles.list", "student.lookup", "teacher.unlock"]
        .iter()
        .enumerate()
    {
        let id = format!("ns-{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, json!({ "roomId": "213", "studentId": "1", "password": "x" }));
        assert_eq!(error_code(&resp), Some("no_settings"), "{} -> {}", method, resp);
    }

    // Teacher views check the gate before anything else.
    let locked = request(&mut stdin, &mut reader, "2", "class.summary", json!({ "roomId": "213" }));
    assert_eq!(error_code(&locked), Some("locked"));

    let unknown = request(&mut stdin, &mut reader, "3", "grades.delete", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let cleared = request(&mut stdin, &mut reader, "4", "cache.clear", json!({}));
    assert_eq!(
        cleared
            .get("result")
            .and_then(|r| r.get("dropped"))
            .and_then(|v| v.as_u64()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bad_json_line_does_not_stop_the_loop() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let bad = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&bad), Some("bad_json"));

    let health = request(&mut stdin, &mut reader, "after-bad", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let missing = request(&mut stdin, &mut reader, "5", "settings.load", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    let nowhere = request(
        &mut stdin,
        &mut reader,
        "6",
        "settings.load",
        json!({ "path": "/definitely/not/here/gradeboard.toml" }),
    );
    assert_eq!(error_code(&nowhere), Some("settings_load_failed"));

    drop(stdin);
    let _ = child.wait();
}
