//! Bulk-insert boundary for the import collaborator. Rows arriving here are
//! trusted to satisfy the catalog invariants; references are re-validated
//! only on the override mutation path.

use crate::ipc::error::{err, ok, storage_err};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use rusqlite::Transaction;
use serde_json::{json, Value};
use uuid::Uuid;

struct NamedRow {
    id: String,
    name: String,
    short: String,
}

fn named_rows(req: &Request, key: &str) -> Result<Vec<NamedRow>, Value> {
    let Some(items) = req.params.get(key) else {
        return Ok(Vec::new());
    };
    let Some(items) = items.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an array", key),
            None,
        ));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let (Some(name), Some(short)) = (
            item.get("name").and_then(|v| v.as_str()),
            item.get("short").and_then(|v| v.as_str()),
        ) else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("{} rows need name and short", key),
                None,
            ));
        };
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        out.push(NamedRow {
            id,
            name: name.to_string(),
            short: short.to_string(),
        });
    }
    Ok(out)
}

fn upsert_named(tx: &Transaction<'_>, table: &str, rows: &[NamedRow]) -> rusqlite::Result<usize> {
    let sql = format!(
        "INSERT OR REPLACE INTO {}(id, name, short) VALUES(?, ?, ?)",
        table
    );
    for row in rows {
        tx.execute(&sql, (&row.id, &row.name, &row.short))?;
    }
    Ok(rows.len())
}

fn handle_import_catalog(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let subjects = match named_rows(req, "subjects") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classrooms = match named_rows(req, "classrooms") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day_definitions = match named_rows(req, "dayDefinitions") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cohorts = match named_rows(req, "cohorts") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teachers = req
        .params
        .get("teachers")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let periods = req
        .params
        .get("periods")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let timetables = req
        .params
        .get("timetables")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return storage_err(&req.id, "db_tx_failed", "import.catalog", &e.into()),
    };

    let mut counts = json!({});
    for (table, rows, key) in [
        ("subjects", &subjects, "subjects"),
        ("classrooms", &classrooms, "classrooms"),
        ("day_definitions", &day_definitions, "dayDefinitions"),
        ("cohorts", &cohorts, "cohorts"),
    ] {
        match upsert_named(&tx, table, rows) {
            Ok(n) => counts[key] = json!(n),
            Err(e) => {
                let _ = tx.rollback();
                return storage_err(&req.id, "db_insert_failed", "import.catalog", &e.into());
            }
        }
    }

    for item in &teachers {
        let (Some(first), Some(last), Some(short)) = (
            item.get("firstName").and_then(|v| v.as_str()),
            item.get("lastName").and_then(|v| v.as_str()),
            item.get("short").and_then(|v| v.as_str()),
        ) else {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "teachers rows need firstName, lastName and short",
                None,
            );
        };
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO teachers(id, first_name, last_name, short)
             VALUES(?, ?, ?, ?)",
            (&id, first, last, short),
        ) {
            let _ = tx.rollback();
            return storage_err(&req.id, "db_insert_failed", "import.catalog", &e.into());
        }
    }
    counts["teachers"] = json!(teachers.len());

    for item in &periods {
        let (Some(period), Some(start), Some(end)) = (
            item.get("period").and_then(|v| v.as_i64()),
            item.get("startTime").and_then(|v| v.as_str()),
            item.get("endTime").and_then(|v| v.as_str()),
        ) else {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "periods rows need period, startTime and endTime",
                None,
            );
        };
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO periods(id, period, start_time, end_time)
             VALUES(?, ?, ?, ?)",
            (&id, period, start, end),
        ) {
            let _ = tx.rollback();
            return storage_err(&req.id, "db_insert_failed", "import.catalog", &e.into());
        }
    }
    counts["periods"] = json!(periods.len());

    for item in &timetables {
        let Some(valid_from) = item.get("validFrom").and_then(|v| v.as_str()) else {
            let _ = tx.rollback();
            return err(&req.id, "bad_params", "timetables rows need validFrom", None);
        };
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO timetables(id, valid_from) VALUES(?, ?)",
            (&id, valid_from),
        ) {
            let _ = tx.rollback();
            return storage_err(&req.id, "db_insert_failed", "import.catalog", &e.into());
        }
    }
    counts["timetables"] = json!(timetables.len());

    if let Err(e) = tx.commit() {
        return storage_err(&req.id, "db_commit_failed", "import.catalog", &e.into());
    }
    ok(&req.id, counts)
}

fn handle_import_lessons(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(items) = req.params.get("lessons").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing lessons", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return storage_err(&req.id, "db_tx_failed", "import.lessons", &e.into()),
    };

    let mut lesson_ids: Vec<String> = Vec::new();
    for item in items {
        let required = [
            "subjectId",
            "dayDefinitionId",
            "periodId",
            "weeksDefinitionId",
            "termId",
        ];
        let mut fields: Vec<String> = Vec::with_capacity(required.len());
        for key in required {
            let Some(v) = item.get(key).and_then(|v| v.as_str()) else {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "bad_params",
                    format!("lesson rows need {}", key),
                    None,
                );
            };
            fields.push(v.to_string());
        }
        let Some(periods_per_week) = item.get("periodsPerWeek").and_then(|v| v.as_i64()) else {
            let _ = tx.rollback();
            return err(&req.id, "bad_params", "lesson rows need periodsPerWeek", None);
        };
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO lessons(id, subject_id, day_definition_id, period_id,
                                            weeks_definition_id, term_id, periods_per_week)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &id, &fields[0], &fields[1], &fields[2], &fields[3], &fields[4],
                periods_per_week,
            ),
        ) {
            let _ = tx.rollback();
            return storage_err(&req.id, "db_insert_failed", "import.lessons", &e.into());
        }

        // Re-imports replace the member sets wholesale.
        for table in ["lesson_cohorts", "lesson_teachers", "lesson_classrooms"] {
            let sql = format!("DELETE FROM {} WHERE lesson_id = ?", table);
            if let Err(e) = tx.execute(&sql, [&id]) {
                let _ = tx.rollback();
                return storage_err(&req.id, "db_delete_failed", "import.lessons", &e.into());
            }
        }
        for cohort_id in str_list(item, "cohortIds") {
            if let Err(e) = tx.execute(
                "INSERT INTO lesson_cohorts(lesson_id, cohort_id) VALUES(?, ?)",
                (&id, &cohort_id),
            ) {
                let _ = tx.rollback();
                return storage_err(&req.id, "db_insert_failed", "import.lessons", &e.into());
            }
        }
        for (i, teacher_id) in str_list(item, "teacherIds").into_iter().enumerate() {
            if let Err(e) = tx.execute(
                "INSERT INTO lesson_teachers(lesson_id, sort_order, teacher_id) VALUES(?, ?, ?)",
                (&id, i as i64, &teacher_id),
            ) {
                let _ = tx.rollback();
                return storage_err(&req.id, "db_insert_failed", "import.lessons", &e.into());
            }
        }
        for (i, classroom_id) in str_list(item, "classroomIds").into_iter().enumerate() {
            if let Err(e) = tx.execute(
                "INSERT INTO lesson_classrooms(lesson_id, sort_order, classroom_id) VALUES(?, ?, ?)",
                (&id, i as i64, &classroom_id),
            ) {
                let _ = tx.rollback();
                return storage_err(&req.id, "db_insert_failed", "import.lessons", &e.into());
            }
        }

        lesson_ids.push(id);
    }

    if let Err(e) = tx.commit() {
        return storage_err(&req.id, "db_commit_failed", "import.lessons", &e.into());
    }
    ok(&req.id, json!({ "lessonIds": lesson_ids }))
}

fn str_list(item: &Value, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.catalog" => Some(handle_import_catalog(state, req)),
        "import.lessons" => Some(handle_import_lessons(state, req)),
        _ => None,
    }
}
