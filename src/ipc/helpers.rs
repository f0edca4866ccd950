use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde_json::Value;

use super::error::err;
use super::types::{AppState, Request};
use crate::auth::Decision;
use crate::overrides::FieldPatch;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Gate for override mutations; runs before any parameter validation.
pub fn authorize(state: &AppState, req: &Request, permission: &str) -> Result<(), Value> {
    let actor = req
        .params
        .get("actor")
        .and_then(|v| v.as_str())
        .unwrap_or("local");
    match state.authorizer.authorize(actor, permission) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(err(
            &req.id,
            "forbidden",
            format!("{} is not permitted to {}", actor, permission),
            None,
        )),
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Optional string parameter; absent and explicit null both read as None.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be string or null", key),
            None,
        )),
    }
}

pub fn string_array(req: &Request, v: &Value, key: &str) -> Result<Vec<String>, Value> {
    let Some(items) = v.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an array of strings", key),
            None,
        ));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("{} must be an array of strings", key),
                None,
            ));
        };
        out.push(s.to_string());
    }
    Ok(out)
}

/// Tri-state patch field: absent leaves the value alone, null clears it.
pub fn field_patch(req: &Request, patch: &serde_json::Map<String, Value>, key: &str) -> Result<FieldPatch, Value> {
    match patch.get(key) {
        None => Ok(FieldPatch::Absent),
        Some(Value::Null) => Ok(FieldPatch::Clear),
        Some(Value::String(s)) => Ok(FieldPatch::Set(s.clone())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("patch.{} must be string or null", key),
            None,
        )),
    }
}

/// Reads an optional ISO date parameter, defaulting to the local calendar
/// date (the "today" of the relevance filter).
pub fn date_or_today(req: &Request, key: &str) -> Result<NaiveDate, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        None => Ok(Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be YYYY-MM-DD", key),
                None,
            )
        }),
    }
}
