use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Entity kinds served by the reference catalog. Rows are owned by the
/// import/admin path and read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Subject,
    Teacher,
    Classroom,
    Period,
    DayDefinition,
    Cohort,
}

impl EntityKind {
    fn table(self) -> &'static str {
        match self {
            EntityKind::Subject => "subjects",
            EntityKind::Teacher => "teachers",
            EntityKind::Classroom => "classrooms",
            EntityKind::Period => "periods",
            EntityKind::DayDefinition => "day_definitions",
            EntityKind::Cohort => "cohorts",
        }
    }
}

/// Batched lookup: one query covering every requested id of one kind.
///
/// An empty id set returns an empty map without touching the database.
/// Unresolvable ids are silently absent from the result; the caller decides
/// whether that is tolerable (enrichment) or fatal (validation).
pub fn lookup_many(
    conn: &Connection,
    kind: EntityKind,
    ids: &[String],
) -> anyhow::Result<HashMap<String, Value>> {
    let mut distinct: Vec<&str> = Vec::new();
    for id in ids {
        if !distinct.contains(&id.as_str()) {
            distinct.push(id);
        }
    }
    if distinct.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; distinct.len()].join(", ");
    let sql = match kind {
        EntityKind::Teacher => format!(
            "SELECT id, first_name, last_name, short FROM teachers WHERE id IN ({})",
            placeholders
        ),
        EntityKind::Period => format!(
            "SELECT id, period, start_time, end_time FROM periods WHERE id IN ({})",
            placeholders
        ),
        _ => format!(
            "SELECT id, name, short FROM {} WHERE id IN ({})",
            kind.table(),
            placeholders
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(distinct.iter()), |r| {
            let id: String = r.get(0)?;
            let projected = match kind {
                EntityKind::Teacher => json!({
                    "id": id,
                    "firstName": r.get::<_, String>(1)?,
                    "lastName": r.get::<_, String>(2)?,
                    "short": r.get::<_, String>(3)?,
                }),
                EntityKind::Period => json!({
                    "id": id,
                    "period": r.get::<_, i64>(1)?,
                    "startTime": r.get::<_, String>(2)?,
                    "endTime": r.get::<_, String>(3)?,
                }),
                _ => json!({
                    "id": id,
                    "name": r.get::<_, String>(1)?,
                    "short": r.get::<_, String>(2)?,
                }),
            };
            Ok((id, projected))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().collect())
}

/// Existence check for a single reference, used by override validation.
pub fn resolves(conn: &Connection, kind: EntityKind, id: &str) -> anyhow::Result<bool> {
    let ids = [id.to_string()];
    let map = lookup_many(conn, kind, &ids)?;
    Ok(map.contains_key(id))
}
