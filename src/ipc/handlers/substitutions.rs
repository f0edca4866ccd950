use crate::ipc::error::{err, ok, op_err, storage_err};
use crate::ipc::helpers::{
    authorize, date_or_today, db_conn, field_patch, optional_str, required_str, string_array,
};
use crate::ipc::types::{AppState, Request};
use crate::overrides::{self, SubstitutionCreate, SubstitutionPatch};
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
    match resolve::substitutions_view(conn, q) {
        Ok(rows) => ok(&req.id, json!({ "substitutions": rows })),
        Err(e) => storage_err(&req.id, "db_query_failed", "substitutions.getAll", &e),
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
    match resolve::substitutions_view(conn, q) {
        Ok(rows) => ok(&req.id, json!({ "substitutions": rows })),
        Err(e) => storage_err(&req.id, "db_query_failed", "substitutions.getRelevant", &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "substitution:create") {
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
    let teacher_id = match optional_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(lesson_ids_raw) = req.params.get("lessonIds") else {
        return err(&req.id, "bad_params", "missing lessonIds", None);
    };
    let lesson_ids = match string_array(req, lesson_ids_raw, "lessonIds") {
        Ok(ids) => ids,
        Err(e) => return e,
    };

    let input = SubstitutionCreate {
        date,
        teacher_id,
        lesson_ids,
    };
    let id = match overrides::create_substitution(conn, input) {
        Ok(id) => id,
        Err(e) => return op_err(&req.id, "substitutions.create", e),
    };
    read_back(conn, req, &id)
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "substitution:update") {
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

    let mut parsed = SubstitutionPatch::default();
    for (k, v) in patch {
        match k.as_str() {
            "date" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.date must be string", None);
                };
                parsed.date = Some(s.to_string());
            }
            "teacherId" => {
                parsed.teacher_id = match field_patch(req, patch, "teacherId") {
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

    if let Err(e) = overrides::update_substitution(conn, &id, parsed) {
        return op_err(&req.id, "substitutions.update", e);
    }
    read_back(conn, req, &id)
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = authorize(state, req, "substitution:delete") {
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

    let view = match resolve::substitution_by_id(conn, &id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "substitution not found", None),
        Err(e) => return storage_err(&req.id, "db_query_failed", "substitutions.delete", &e),
    };
    if let Err(e) = overrides::delete_substitution(conn, &id) {
        return op_err(&req.id, "substitutions.delete", e);
    }
    ok(&req.id, json!({ "substitution": view }))
}

fn read_back(
    conn: &rusqlite::Connection,
    req: &Request,
    id: &str,
) -> serde_json::Value {
    match resolve::substitution_by_id(conn, id) {
        Ok(Some(view)) => ok(&req.id, json!({ "substitution": view })),
        Ok(None) => err(
            &req.id,
            "db_query_failed",
            "written row did not read back",
            None,
        ),
        Err(e) => storage_err(&req.id, "db_query_failed", "substitutions.readBack", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "substitutions.getAll" => Some(handle_get_all(state, req)),
        "substitutions.getRelevant" => Some(handle_get_relevant(state, req)),
        "substitutions.create" => Some(handle_create(state, req)),
        "substitutions.update" => Some(handle_update(state, req)),
        "substitutions.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
