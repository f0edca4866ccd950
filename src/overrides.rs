use chrono::NaiveDate;
use rusqlite::{types::Value as SqlValue, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::catalog::{self, EntityKind};
use crate::plan;

/// Mutation outcomes, mapped to wire error codes by the IPC layer.
#[derive(Debug)]
pub enum OpError {
    BadParams(String),
    /// A supplied id does not resolve. `missing_ids` is populated for
    /// lesson-id set mismatches and empty for simple reference fields.
    InvalidReference {
        field: &'static str,
        missing_ids: Vec<String>,
    },
    NotFound(&'static str),
    Storage(anyhow::Error),
}

impl From<rusqlite::Error> for OpError {
    fn from(e: rusqlite::Error) -> Self {
        OpError::Storage(e.into())
    }
}

impl From<anyhow::Error> for OpError {
    fn from(e: anyhow::Error) -> Self {
        OpError::Storage(e)
    }
}

/// Tri-state for optional reference fields on update: absent leaves the
/// stored value untouched, an explicit null clears it.
#[derive(Debug, Clone, Default)]
pub enum FieldPatch {
    #[default]
    Absent,
    Clear,
    Set(String),
}

#[derive(Debug, Default)]
pub struct MovedLessonCreate {
    pub date: String,
    pub period_id: Option<String>,
    pub day_definition_id: Option<String>,
    pub classroom_id: Option<String>,
    pub lesson_ids: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MovedLessonPatch {
    pub date: Option<String>,
    pub period_id: FieldPatch,
    pub day_definition_id: FieldPatch,
    pub classroom_id: FieldPatch,
    pub lesson_ids: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct SubstitutionCreate {
    pub date: String,
    pub teacher_id: Option<String>,
    pub lesson_ids: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SubstitutionPatch {
    pub date: Option<String>,
    pub teacher_id: FieldPatch,
    pub lesson_ids: Option<Vec<String>>,
}

pub fn create_moved_lesson(
    conn: &Connection,
    input: MovedLessonCreate,
) -> Result<String, OpError> {
    parse_date(&input.date)?;
    check_ref(conn, EntityKind::Period, "newPeriodId", input.period_id.as_deref())?;
    check_ref(
        conn,
        EntityKind::DayDefinition,
        "newDayDefinitionId",
        input.day_definition_id.as_deref(),
    )?;
    check_ref(
        conn,
        EntityKind::Classroom,
        "newClassroomId",
        input.classroom_id.as_deref(),
    )?;
    let lesson_ids = match input.lesson_ids {
        Some(ids) => Some(validated_lesson_ids(conn, &ids)?),
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO moved_lessons(id, date, period_id, day_definition_id, classroom_id)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &input.date,
            &input.period_id,
            &input.day_definition_id,
            &input.classroom_id,
        ),
    )?;
    if let Some(ids) = lesson_ids {
        insert_links(&tx, "moved_lesson_lessons", "moved_lesson_id", &id, &ids)?;
    }
    tx.commit()?;
    Ok(id)
}

pub fn update_moved_lesson(
    conn: &Connection,
    id: &str,
    patch: MovedLessonPatch,
) -> Result<(), OpError> {
    if !row_exists(conn, "moved_lessons", id)? {
        return Err(OpError::NotFound("moved lesson not found"));
    }
    if let Some(date) = patch.date.as_deref() {
        parse_date(date)?;
    }
    check_ref_patch(conn, EntityKind::Period, "newPeriodId", &patch.period_id)?;
    check_ref_patch(
        conn,
        EntityKind::DayDefinition,
        "newDayDefinitionId",
        &patch.day_definition_id,
    )?;
    check_ref_patch(
        conn,
        EntityKind::Classroom,
        "newClassroomId",
        &patch.classroom_id,
    )?;
    let lesson_ids = match patch.lesson_ids {
        Some(ids) => Some(validated_lesson_ids(conn, &ids)?),
        None => None,
    };

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(date) = patch.date {
        fields.push("date = ?");
        values.push(SqlValue::Text(date));
    }
    push_field_patch(&mut fields, &mut values, "period_id = ?", patch.period_id);
    push_field_patch(
        &mut fields,
        &mut values,
        "day_definition_id = ?",
        patch.day_definition_id,
    );
    push_field_patch(
        &mut fields,
        &mut values,
        "classroom_id = ?",
        patch.classroom_id,
    );

    let tx = conn.unchecked_transaction()?;
    if !fields.is_empty() {
        values.push(SqlValue::Text(id.to_string()));
        let sql = format!(
            "UPDATE moved_lessons SET {} WHERE id = ?",
            fields.join(", ")
        );
        tx.execute(&sql, params_from_iter(values))?;
    }
    if let Some(ids) = lesson_ids {
        // Full replace: prior links are gone, only the supplied set remains.
        tx.execute(
            "DELETE FROM moved_lesson_lessons WHERE moved_lesson_id = ?",
            [id],
        )?;
        insert_links(&tx, "moved_lesson_lessons", "moved_lesson_id", id, &ids)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_moved_lesson(conn: &Connection, id: &str) -> Result<(), OpError> {
    if !row_exists(conn, "moved_lessons", id)? {
        return Err(OpError::NotFound("moved lesson not found"));
    }
    let tx = conn.unchecked_transaction()?;
    // Cascade is explicit application behavior, same operation.
    tx.execute(
        "DELETE FROM moved_lesson_lessons WHERE moved_lesson_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM moved_lessons WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(())
}

pub fn create_substitution(
    conn: &Connection,
    input: SubstitutionCreate,
) -> Result<String, OpError> {
    parse_date(&input.date)?;
    if input.lesson_ids.is_empty() {
        return Err(OpError::BadParams(
            "lessonIds must not be empty".to_string(),
        ));
    }
    check_ref(conn, EntityKind::Teacher, "teacherId", input.teacher_id.as_deref())?;
    let lesson_ids = validated_lesson_ids(conn, &input.lesson_ids)?;

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO substitutions(id, date, teacher_id) VALUES(?, ?, ?)",
        (&id, &input.date, &input.teacher_id),
    )?;
    insert_links(&tx, "substitution_lessons", "substitution_id", &id, &lesson_ids)?;
    tx.commit()?;
    Ok(id)
}

pub fn update_substitution(
    conn: &Connection,
    id: &str,
    patch: SubstitutionPatch,
) -> Result<(), OpError> {
    if !row_exists(conn, "substitutions", id)? {
        return Err(OpError::NotFound("substitution not found"));
    }
    if let Some(date) = patch.date.as_deref() {
        parse_date(date)?;
    }
    if let Some(ids) = patch.lesson_ids.as_ref() {
        // The non-empty invariant holds across updates, not just creation.
        if ids.is_empty() {
            return Err(OpError::BadParams(
                "lessonIds must not be empty".to_string(),
            ));
        }
    }
    check_ref_patch(conn, EntityKind::Teacher, "teacherId", &patch.teacher_id)?;
    let lesson_ids = match patch.lesson_ids {
        Some(ids) => Some(validated_lesson_ids(conn, &ids)?),
        None => None,
    };

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(date) = patch.date {
        fields.push("date = ?");
        values.push(SqlValue::Text(date));
    }
    push_field_patch(&mut fields, &mut values, "teacher_id = ?", patch.teacher_id);

    let tx = conn.unchecked_transaction()?;
    if !fields.is_empty() {
        values.push(SqlValue::Text(id.to_string()));
        let sql = format!("UPDATE substitutions SET {} WHERE id = ?", fields.join(", "));
        tx.execute(&sql, params_from_iter(values))?;
    }
    if let Some(ids) = lesson_ids {
        tx.execute(
            "DELETE FROM substitution_lessons WHERE substitution_id = ?",
            [id],
        )?;
        insert_links(&tx, "substitution_lessons", "substitution_id", id, &ids)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_substitution(conn: &Connection, id: &str) -> Result<(), OpError> {
    if !row_exists(conn, "substitutions", id)? {
        return Err(OpError::NotFound("substitution not found"));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM substitution_lessons WHERE substitution_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM substitutions WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(())
}

fn push_field_patch(
    fields: &mut Vec<&'static str>,
    values: &mut Vec<SqlValue>,
    clause: &'static str,
    patch: FieldPatch,
) {
    match patch {
        FieldPatch::Absent => {}
        FieldPatch::Clear => {
            fields.push(clause);
            values.push(SqlValue::Null);
        }
        FieldPatch::Set(v) => {
            fields.push(clause);
            values.push(SqlValue::Text(v));
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, OpError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| OpError::BadParams(format!("date must be YYYY-MM-DD, got {:?}", raw)))
}

fn check_ref(
    conn: &Connection,
    kind: EntityKind,
    field: &'static str,
    id: Option<&str>,
) -> Result<(), OpError> {
    let Some(id) = id else {
        return Ok(());
    };
    if catalog::resolves(conn, kind, id)? {
        Ok(())
    } else {
        Err(OpError::InvalidReference {
            field,
            missing_ids: Vec::new(),
        })
    }
}

fn check_ref_patch(
    conn: &Connection,
    kind: EntityKind,
    field: &'static str,
    patch: &FieldPatch,
) -> Result<(), OpError> {
    match patch {
        FieldPatch::Set(id) => check_ref(conn, kind, field, Some(id)),
        FieldPatch::Absent | FieldPatch::Clear => Ok(()),
    }
}

/// Count-compare existence check for a lesson-id set. Only on mismatch does
/// a second pass fetch the matching lessons to name the offending ids, so
/// the happy path stays at one query. Returns the deduplicated set in
/// request order.
fn validated_lesson_ids(conn: &Connection, ids: &[String]) -> Result<Vec<String>, OpError> {
    let mut distinct: Vec<String> = Vec::new();
    for id in ids {
        if !distinct.contains(id) {
            distinct.push(id.clone());
        }
    }
    let found = plan::count_lessons_by_ids(conn, &distinct)?;
    if found != distinct.len() {
        let present: std::collections::HashSet<String> = plan::lessons_by_ids(conn, &distinct)?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let missing = distinct
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        return Err(OpError::InvalidReference {
            field: "lessonIds",
            missing_ids: missing,
        });
    }
    Ok(distinct)
}

fn insert_links(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    col: &str,
    override_id: &str,
    lesson_ids: &[String],
) -> Result<(), OpError> {
    let sql = format!(
        "INSERT INTO {table}({col}, lesson_id) VALUES(?, ?)",
        table = table,
        col = col
    );
    for lesson_id in lesson_ids {
        tx.execute(&sql, (override_id, lesson_id))?;
    }
    Ok(())
}

fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, OpError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let row = conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::resolve;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO periods(id, period, start_time, end_time) VALUES('p1', 1, '08:00', '08:45');
             INSERT INTO day_definitions(id, name, short) VALUES('d1', 'Monday', 'Mon');
             INSERT INTO classrooms(id, name, short) VALUES('r1', 'Lab 2', 'L2');
             INSERT INTO teachers(id, first_name, last_name, short) VALUES('t2', 'Alan', 'Turing', 'TUR');
             INSERT INTO lessons(id, subject_id, day_definition_id, period_id,
                                 weeks_definition_id, term_id, periods_per_week)
             VALUES('l1', 's1', 'd1', 'p1', 'w1', 'term1', 3);
             INSERT INTO lessons(id, subject_id, day_definition_id, period_id,
                                 weeks_definition_id, term_id, periods_per_week)
             VALUES('l2', 's1', 'd1', 'p1', 'w1', 'term1', 2);
             INSERT INTO lessons(id, subject_id, day_definition_id, period_id,
                                 weeks_definition_id, term_id, periods_per_week)
             VALUES('l3', 's1', 'd1', 'p1', 'w1', 'term1', 1);",
        )
        .expect("seed");
        conn
    }

    fn substitution_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM substitutions", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn malformed_date_is_rejected_before_references() {
        let conn = seeded_conn();
        let err = create_moved_lesson(
            &conn,
            MovedLessonCreate {
                date: "10.03.2025".to_string(),
                period_id: Some("no-such-period".to_string()),
                ..Default::default()
            },
        )
        .expect_err("should fail");
        assert!(matches!(err, OpError::BadParams(_)));
    }

    #[test]
    fn unknown_simple_reference_names_the_field() {
        let conn = seeded_conn();
        let err = create_moved_lesson(
            &conn,
            MovedLessonCreate {
                date: "2025-03-10".to_string(),
                classroom_id: Some("no-such-room".to_string()),
                ..Default::default()
            },
        )
        .expect_err("should fail");
        match err {
            OpError::InvalidReference { field, missing_ids } => {
                assert_eq!(field, "newClassroomId");
                assert!(missing_ids.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn lesson_id_mismatch_enumerates_every_missing_id_and_persists_nothing() {
        let conn = seeded_conn();
        let err = create_substitution(
            &conn,
            SubstitutionCreate {
                date: "2025-03-10".to_string(),
                teacher_id: Some("t2".to_string()),
                lesson_ids: vec![
                    "l1".to_string(),
                    "ghost-a".to_string(),
                    "ghost-b".to_string(),
                ],
            },
        )
        .expect_err("should fail");
        match err {
            OpError::InvalidReference { field, missing_ids } => {
                assert_eq!(field, "lessonIds");
                assert_eq!(missing_ids, vec!["ghost-a".to_string(), "ghost-b".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(substitution_count(&conn), 0);
    }

    #[test]
    fn empty_lesson_id_set_fails_before_reference_checks() {
        let conn = seeded_conn();
        let err = create_substitution(
            &conn,
            SubstitutionCreate {
                date: "2025-03-10".to_string(),
                teacher_id: Some("no-such-teacher".to_string()),
                lesson_ids: Vec::new(),
            },
        )
        .expect_err("should fail");
        assert!(matches!(err, OpError::BadParams(_)));
    }

    #[test]
    fn update_replaces_the_link_set_wholesale() {
        let conn = seeded_conn();
        let id = create_moved_lesson(
            &conn,
            MovedLessonCreate {
                date: "2025-03-10".to_string(),
                period_id: Some("p1".to_string()),
                lesson_ids: Some(vec!["l1".to_string(), "l2".to_string()]),
                ..Default::default()
            },
        )
        .expect("create");

        update_moved_lesson(
            &conn,
            &id,
            MovedLessonPatch {
                lesson_ids: Some(vec!["l3".to_string()]),
                ..Default::default()
            },
        )
        .expect("update");

        let view = resolve::moved_lesson_by_id(&conn, &id)
            .expect("read")
            .expect("row");
        assert_eq!(view["lessons"], serde_json::json!(["l3"]));
    }

    #[test]
    fn update_without_lesson_ids_leaves_links_untouched() {
        let conn = seeded_conn();
        let id = create_moved_lesson(
            &conn,
            MovedLessonCreate {
                date: "2025-03-10".to_string(),
                lesson_ids: Some(vec!["l1".to_string()]),
                ..Default::default()
            },
        )
        .expect("create");

        update_moved_lesson(
            &conn,
            &id,
            MovedLessonPatch {
                date: Some("2025-03-12".to_string()),
                period_id: FieldPatch::Set("p1".to_string()),
                ..Default::default()
            },
        )
        .expect("update");

        let view = resolve::moved_lesson_by_id(&conn, &id)
            .expect("read")
            .expect("row");
        assert_eq!(view["date"], "2025-03-12");
        assert_eq!(view["lessons"], serde_json::json!(["l1"]));
    }

    #[test]
    fn clearing_an_optional_field_nulls_the_stored_value() {
        let conn = seeded_conn();
        let id = create_moved_lesson(
            &conn,
            MovedLessonCreate {
                date: "2025-03-10".to_string(),
                classroom_id: Some("r1".to_string()),
                ..Default::default()
            },
        )
        .expect("create");

        update_moved_lesson(
            &conn,
            &id,
            MovedLessonPatch {
                classroom_id: FieldPatch::Clear,
                ..Default::default()
            },
        )
        .expect("update");

        let view = resolve::moved_lesson_by_id(&conn, &id)
            .expect("read")
            .expect("row");
        assert!(view["classroom"].is_null());
    }

    #[test]
    fn delete_cascades_to_link_rows() {
        let conn = seeded_conn();
        let id = create_substitution(
            &conn,
            SubstitutionCreate {
                date: "2025-03-10".to_string(),
                teacher_id: Some("t2".to_string()),
                lesson_ids: vec!["l1".to_string(), "l2".to_string()],
            },
        )
        .expect("create");

        delete_substitution(&conn, &id).expect("delete");

        let links: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM substitution_lessons WHERE substitution_id = ?",
                [&id],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(links, 0);
        assert_eq!(substitution_count(&conn), 0);
    }

    #[test]
    fn substitution_update_rejects_an_empty_replacement_set() {
        let conn = seeded_conn();
        let id = create_substitution(
            &conn,
            SubstitutionCreate {
                date: "2025-03-10".to_string(),
                teacher_id: None,
                lesson_ids: vec!["l1".to_string()],
            },
        )
        .expect("create");
        let err = update_substitution(
            &conn,
            &id,
            SubstitutionPatch {
                lesson_ids: Some(Vec::new()),
                ..Default::default()
            },
        )
        .expect_err("should fail");
        assert!(matches!(err, OpError::BadParams(_)));
    }

    #[test]
    fn operating_on_a_missing_override_is_not_found() {
        let conn = seeded_conn();
        assert!(matches!(
            delete_moved_lesson(&conn, "ghost"),
            Err(OpError::NotFound(_))
        ));
        assert!(matches!(
            update_substitution(&conn, "ghost", SubstitutionPatch::default()),
            Err(OpError::NotFound(_))
        ));
    }
}
