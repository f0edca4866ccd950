use crate::ipc::error::{ok, storage_err};
use crate::ipc::helpers::{date_or_today, db_conn};
use crate::ipc::types::{AppState, Request};
use crate::timetable;
use serde_json::json;

fn handle_latest_valid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let date = match date_or_today(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match timetable::latest_valid_as_of(conn, date) {
        Ok(Some(tt)) => ok(
            &req.id,
            json!({ "timetable": { "id": tt.id, "validFrom": tt.valid_from } }),
        ),
        // "No valid timetable" is a successful answer, not an error.
        Ok(None) => ok(&req.id, json!({ "timetable": null })),
        Err(e) => storage_err(&req.id, "db_query_failed", "timetables.latestValid", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetables.latestValid" => Some(handle_latest_valid(state, req)),
        _ => None,
    }
}
