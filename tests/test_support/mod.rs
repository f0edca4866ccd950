use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

/// Opens a fresh workspace and loads the small shared fixture: one cohort
/// with one lesson, one empty cohort, and enough catalog rows to enrich.
pub fn seed_basic(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let workspace = temp_dir("timetabled-test");
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-catalog",
        "import.catalog",
        json!({
            "subjects": [{ "id": "s1", "name": "Mathematics", "short": "MAT" }],
            "teachers": [
                { "id": "t1", "firstName": "Ada", "lastName": "Lovelace", "short": "LOV" },
                { "id": "t2", "firstName": "Alan", "lastName": "Turing", "short": "TUR" }
            ],
            "classrooms": [
                { "id": "r1", "name": "Lab 2", "short": "L2" },
                { "id": "r2", "name": "Gym", "short": "GYM" }
            ],
            "periods": [
                { "id": "p1", "period": 1, "startTime": "08:00", "endTime": "08:45" },
                { "id": "p2", "period": 2, "startTime": "08:55", "endTime": "09:40" }
            ],
            "dayDefinitions": [
                { "id": "d1", "name": "Monday", "short": "Mon" },
                { "id": "d2", "name": "Tuesday", "short": "Tue" }
            ],
            "cohorts": [
                { "id": "k1", "name": "Year 9A", "short": "9A" },
                { "id": "k-empty", "name": "Year 9B", "short": "9B" }
            ]
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-lessons",
        "import.lessons",
        json!({
            "lessons": [
                {
                    "id": "l1",
                    "subjectId": "s1",
                    "dayDefinitionId": "d1",
                    "periodId": "p1",
                    "weeksDefinitionId": "w1",
                    "termId": "term1",
                    "periodsPerWeek": 3,
                    "cohortIds": ["k1"],
                    "teacherIds": ["t1"],
                    "classroomIds": ["r1"]
                },
                {
                    "id": "l2",
                    "subjectId": "s1",
                    "dayDefinitionId": "d2",
                    "periodId": "p2",
                    "weeksDefinitionId": "w1",
                    "termId": "term1",
                    "periodsPerWeek": 2,
                    "cohortIds": ["k1"],
                    "teacherIds": ["t2", "t1"],
                    "classroomIds": ["r2", "r1"]
                },
                {
                    "id": "l3",
                    "subjectId": "s1",
                    "dayDefinitionId": "d1",
                    "periodId": "p2",
                    "weeksDefinitionId": "w1",
                    "termId": "term1",
                    "periodsPerWeek": 1,
                    "cohortIds": [],
                    "teacherIds": [],
                    "classroomIds": []
                }
            ]
        }),
    );
}
