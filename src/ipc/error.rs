use serde_json::json;

use crate::overrides::OpError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Storage failures are logged with context here and surfaced with the
/// underlying message only in debug builds; release callers get a generic
/// message so storage internals stay out of the wire envelope.
pub fn storage_err(
    id: &str,
    code: &str,
    context: &str,
    e: &anyhow::Error,
) -> serde_json::Value {
    tracing::error!(context = context, error = %e, "storage failure");
    err(id, code, storage_message(e), None)
}

fn storage_message(e: &anyhow::Error) -> String {
    if cfg!(debug_assertions) {
        e.to_string()
    } else {
        "internal storage error".to_string()
    }
}

pub fn op_err(id: &str, context: &str, e: OpError) -> serde_json::Value {
    match e {
        OpError::BadParams(message) => err(id, "bad_params", message, None),
        OpError::InvalidReference { field, missing_ids } => {
            let details = if missing_ids.is_empty() {
                json!({ "field": field })
            } else {
                json!({ "field": field, "missingIds": missing_ids })
            };
            err(
                id,
                "invalid_reference",
                format!("unresolvable reference in {}", field),
                Some(details),
            )
        }
        OpError::NotFound(message) => err(id, "not_found", message, None),
        OpError::Storage(e) => storage_err(id, "db_tx_failed", context, &e),
    }
}
