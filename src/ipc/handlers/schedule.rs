use crate::ipc::error::{err, ok, storage_err};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plan;
use crate::resolve;
use serde_json::json;

fn handle_schedule_for_cohort(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let cohort_id = match required_str(req, "cohortId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Checked before the join so "cohort does not exist" and "cohort exists
    // with zero lessons" stay distinguishable.
    match plan::cohort_exists(conn, &cohort_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "cohort not found", None),
        Err(e) => return storage_err(&req.id, "db_query_failed", "schedule.forCohort", &e),
    }

    let lessons = match plan::lessons_for_cohort(conn, &cohort_id) {
        Ok(v) => v,
        Err(e) => return storage_err(&req.id, "db_query_failed", "schedule.forCohort", &e),
    };
    match resolve::enrich_lessons(conn, &lessons) {
        Ok(enriched) => ok(&req.id, json!({ "lessons": enriched })),
        Err(e) => storage_err(&req.id, "db_query_failed", "schedule.forCohort", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.forCohort" => Some(handle_schedule_for_cohort(state, req)),
        _ => None,
    }
}
