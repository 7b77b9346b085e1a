use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn write_fixture(dir: &Path) -> PathBuf {
    std::fs::write(
        dir.join("config.csv"),
        "SheetName,SubjectName,Scale_Pre,Scale_Mid,Scale_Post,Scale_Final\n\
         213,Mathematics,20,30,20,\n\
         214,Science,10,10,10,70\n",
    )
    .expect("write config");
    std::fs::write(
        dir.join("room213.csv"),
        "Timestamp,Email,ชื่อ นามสกุล,ห้อง,Pre_Q1[10],Pre_HW.Q2[10],Mid_Exam[20],Post_Lab\n\
         t1,10001@school.ac.th,Alpha One,213,8,6,15,12\n\
         t2,10002@school.ac.th,Bravo Two,213,2,,5,abc\n",
    )
    .expect("write scores");
    let settings = dir.join("gradeboard.toml");
    std::fs::write(
        &settings,
        r#"
config_url = "config.csv"
teacher_password = "1234"

[rooms]
"213" = "room213.csv"
"999" = "room213.csv"
"#,
    )
    .expect("write settings");
    settings
}

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
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn f64_at(value: &serde_json::Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("missing number {} in {}", key, value))
}

#[test]
fn student_lookup_scores_over_student_cycle() {
    let dir = temp_dir("gradeboard-student-lookup");
    let settings = write_fixture(&dir);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let loaded = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "settings.load",
        json!({ "path": settings.to_string_lossy() }),
    );
    assert_eq!(loaded.get("rooms").and_then(|v| v.as_u64()), Some(2));

    let rooms = request_ok(&mut stdin, &mut reader, "2", "rooms.list", json!({}));
    assert_eq!(rooms.get("rooms"), Some(&json!(["213", "999"])));

    let cycles = request_ok(&mut stdin, &mut reader, "3", "cycles.list", json!({}));
    assert_eq!(cycles.get("studentCycle"), Some(&json!("round2")));
    assert_eq!(
        cycles
            .get("cycles")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(3)
    );

    // Pre 14/20*20 = 14, Mid 15/20*30 = 22.5, Post has no declared max -> 0.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "student.lookup",
        json!({ "roomId": "213", "studentId": "10001" }),
    );
    assert_eq!(view.get("displayName"), Some(&json!("Alpha One")));
    assert_eq!(view.get("subjectName"), Some(&json!("Mathematics")));
    assert_eq!(f64_at(&view, "score"), 37.0);
    assert_eq!(f64_at(&view, "denominator"), 70.0);
    assert!((f64_at(&view, "threshold") - 49.0).abs() < 1e-9);
    assert_eq!(view.get("verdict"), Some(&json!("fail")));
    let periods = view.get("periods").and_then(|v| v.as_array()).expect("periods");
    assert_eq!(periods.len(), 3);
    assert_eq!(periods[2].get("period"), Some(&json!("Post")));
    assert_eq!(periods[2].get("fallbackApplied"), Some(&json!(true)));

    let precise = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "student.lookup",
        json!({
            "roomId": "213",
            "studentId": "10001",
            "cycle": "round1",
            "rounding": "precise",
        }),
    );
    assert!((f64_at(&precise, "score") - 36.5).abs() < 1e-9);
    assert_eq!(f64_at(&precise, "denominator"), 50.0);
    assert_eq!(precise.get("verdict"), Some(&json!("pass")));

    let lenient = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "student.lookup",
        json!({
            "roomId": "213",
            "studentId": "10002",
            "periods": ["pre", "MID"],
            "passRatio": 0.1,
        }),
    );
    // 2 + 7.5 = 9.5 rounds half up to 10.
    assert_eq!(f64_at(&lenient, "score"), 10.0);
    assert_eq!(lenient.get("cycle"), Some(&json!("Pre+Mid")));
    assert_eq!(lenient.get("verdict"), Some(&json!("pass")));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_lookup_reports_distinct_failures() {
    let dir = temp_dir("gradeboard-student-errors");
    let settings = write_fixture(&dir);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "settings.load",
        json!({ "path": settings.to_string_lossy() }),
    );

    let cases = [
        (json!({ "roomId": "404", "studentId": "10001" }), "room_not_found"),
        (json!({ "roomId": "999", "studentId": "10001" }), "config_not_found"),
        (json!({ "roomId": "213", "studentId": "77777" }), "student_not_found"),
        (json!({ "roomId": "213" }), "bad_params"),
        (
            json!({ "roomId": "213", "studentId": "10001", "periods": ["Final"] }),
            "missing_config",
        ),
        (
            json!({ "roomId": "213", "studentId": "10001", "periods": ["Midterm"] }),
            "bad_params",
        ),
        (
            json!({ "roomId": "213", "studentId": "10001", "cycle": "round9" }),
            "bad_params",
        ),
        (
            json!({ "roomId": "213", "studentId": "10001", "passRatio": 2 }),
            "bad_params",
        ),
        (
            json!({ "roomId": "213", "studentId": "10001", "rounding": "banker" }),
            "bad_params",
        ),
    ];
    for (i, (params, expected)) in cases.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "student.lookup",
            params.clone(),
        );
        assert_eq!(resp.get("ok"), Some(&json!(false)), "{}", resp);
        assert_eq!(error_code(&resp), *expected, "{} -> {}", params, resp);
    }

    let missing = request(
        &mut stdin,
        &mut reader,
        "mc",
        "student.lookup",
        json!({ "roomId": "213", "studentId": "10001", "periods": ["Final"] }),
    );
    assert_eq!(
        missing
            .get("error")
            .and_then(|e| e.get("details"))
            .and_then(|d| d.get("scaleKey")),
        Some(&json!("Scale_Final"))
    );

    // An empty selection is a valid, if meaningless, request.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "empty",
        "student.lookup",
        json!({ "roomId": "213", "studentId": "10001", "periods": [] }),
    );
    assert_eq!(f64_at(&empty, "score"), 0.0);
    assert_eq!(f64_at(&empty, "denominator"), 0.0);
    assert_eq!(empty.get("emptySelection"), Some(&json!(true)));
    assert_eq!(empty.get("verdict"), Some(&json!("pass")));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn settings_from_environment_are_loaded_at_startup() {
    let dir = temp_dir("gradeboard-env-settings");
    let settings = write_fixture(&dir);

    let exe = env!("CARGO_BIN_EXE_gradeboardd");
    let mut child = Command::new(exe)
        .env("GRADEBOARD_SETTINGS", &settings)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradeboardd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("settingsLoaded"), Some(&json!(true)));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "student.lookup",
        json!({ "roomId": "213", "studentId": "10002" }),
    );
    assert_eq!(view.get("displayName"), Some(&json!("Bravo Two")));

    drop(stdin);
    let _ = child.wait();
}
