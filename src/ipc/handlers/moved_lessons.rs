use crate::ipc::error::{err, ok, op_err, storage_err};
use crate::ipc::helpers::{
    authorize, date_or_today, db_conn, field_patch, optional_str, required_str, string_array,
};
use crate::ipc::types::{AppState, Request};
use crate::overrides::{self, MovedLessonCreate, MovedLessonPatch};
use crate::plan;
use crate::resolve::{self, OverrideQuery};
use serde_json::json;

fn cohort_filter(state: &AppState, req: &Request) -> Result<Option<String>, serde_json::Value> {
    let cohort_id = optional_str(req, "cohortId")?;
    if let Some(cohort_id) = cohort_id.as_deref() {
        let conn = db_conn(state, req)?;
        match plan::cohort_exists(conn, cohort_id) {
            Ok(true) => {}
            Ok(false) => return Err(err(&req.id, "not_found", "cohort not found", None)),
            Err(e) => return Err(storage_err(&req.id, "db_query_failed", &req.method, &e)),
        }
    }
    Ok(cohort_id)
}

fn handle_get_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cohort_id = match cohort_filter(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let q = OverrideQuery {
        relevant_from: None,
        cohort_id: cohort_id.as_deref(),
    };
    match resolve::moved_lessons_view(conn, q) {
        Ok(rows) => ok(&req.id, json!({ "movedLessons": rows })),
        Err(e) => storage_err(&req.id, "db_query_failed", "movedLessons.getAll", &e),
    }
}

fn handle_get_relevant(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = match date_or_today(req, "today") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cohort_id = match cohort_filter(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let q = OverrideQuery {
        relevant_from: Some(today),
        cohort_id: cohort_id.as_deref(),
    };
    match resolve::moved_lessons_view(conn, q) {
        Ok(rows) => ok(&req.id, json!({ "movedLessons": rows })),
        Err(e) => storage_err(&req.id, "db_query_failed", "movedLessons.getRelevant", &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "movedLesson:create") {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let date = match required_str(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match optional_str(req, "newPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day_definition_id = match optional_str(req, "newDayDefinitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classroom_id = match optional_str(req, "newClassroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_ids = match req.params.get("lessonIds") {
        None => None,
        Some(v) => match string_array(req, v, "lessonIds") {
            Ok(ids) => Some(ids),
            Err(e) => return e,
        },
    };

    let input = MovedLessonCreate {
        date,
        period_id,
        day_definition_id,
        classroom_id,
        lesson_ids,
    };
    let id = match overrides::create_moved_lesson(conn, input) {
        Ok(id) => id,
        Err(e) => return op_err(&req.id, "movedLessons.create", e),
    };
    read_back(conn, req, &id)
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "movedLesson:update") {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let mut parsed = MovedLessonPatch::default();
    for (k, v) in patch {
        match k.as_str() {
            "date" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.date must be string", None);
                };
                parsed.date = Some(s.to_string());
            }
            "newPeriodId" => {
                parsed.period_id = match field_patch(req, patch, "newPeriodId") {
                    Ok(p) => p,
                    Err(e) => return e,
                };
            }
            "newDayDefinitionId" => {
                parsed.day_definition_id = match field_patch(req, patch, "newDayDefinitionId") {
                    Ok(p) => p,
                    Err(e) => return e,
                };
            }
            "newClassroomId" => {
                parsed.classroom_id = match field_patch(req, patch, "newClassroomId") {
                    Ok(p) => p,
                    Err(e) => return e,
                };
            }
            "lessonIds" => {
                parsed.lesson_ids = match string_array(req, v, "patch.lessonIds") {
                    Ok(ids) => Some(ids),
                    Err(e) => return e,
                };
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }

    if let Err(e) = overrides::update_moved_lesson(conn, &id, parsed) {
        return op_err(&req.id, "movedLessons.update", e);
    }
    read_back(conn, req, &id)
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "movedLesson:delete") {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Capture the row before the cascade so the caller gets it back.
    let view = match resolve::moved_lesson_by_id(conn, &id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "moved lesson not found", None),
        Err(e) => return storage_err(&req.id, "db_query_failed", "movedLessons.delete", &e),
    };
    if let Err(e) = overrides::delete_moved_lesson(conn, &id) {
        return op_err(&req.id, "movedLessons.delete", e);
    }
    ok(&req.id, json!({ "movedLesson": view }))
}

fn read_back(
    conn: &rusqlite::Connection,
    req: &Request,
    id: &str,
) -> serde_json::Value {
    match resolve::moved_lesson_by_id(conn, id) {
        Ok(Some(view)) => ok(&req.id, json!({ "movedLesson": view })),
        Ok(None) => err(
            &req.id,
            "db_query_failed",
            "written row did not read back",
            None,
        ),
        Err(e) => storage_err(&req.id, "db_query_failed", "movedLessons.readBack", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "movedLessons.getAll" => Some(handle_get_all(state, req)),
        "movedLessons.getRelevant" => Some(handle_get_relevant(state, req)),
        "movedLessons.create" => Some(handle_create(state, req)),
        "movedLessons.update" => Some(handle_update(state, req)),
        "movedLessons.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
