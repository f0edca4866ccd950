use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use crate::catalog::{self, EntityKind};
use crate::plan::Lesson;

/// Enriches a base-lesson batch: bare ids become catalog projections.
///
/// Lookups are batched per entity kind over the distinct ids of the whole
/// batch, so the number of queries never grows with the number of lessons.
/// Unresolved teachers/classrooms drop out of their lists; an unresolved
/// subject, day or period projects as null rather than failing the record.
pub fn enrich_lessons(conn: &Connection, lessons: &[Lesson]) -> anyhow::Result<Vec<Value>> {
    let mut subject_ids = Vec::new();
    let mut day_ids = Vec::new();
    let mut period_ids = Vec::new();
    let mut teacher_ids = Vec::new();
    let mut classroom_ids = Vec::new();
    for l in lessons {
        subject_ids.push(l.subject_id.clone());
        day_ids.push(l.day_definition_id.clone());
        period_ids.push(l.period_id.clone());
        teacher_ids.extend(l.teacher_ids.iter().cloned());
        classroom_ids.extend(l.classroom_ids.iter().cloned());
    }

    let subjects = catalog::lookup_many(conn, EntityKind::Subject, &subject_ids)?;
    let days = catalog::lookup_many(conn, EntityKind::DayDefinition, &day_ids)?;
    let periods = catalog::lookup_many(conn, EntityKind::Period, &period_ids)?;
    let teachers = catalog::lookup_many(conn, EntityKind::Teacher, &teacher_ids)?;
    let classrooms = catalog::lookup_many(conn, EntityKind::Classroom, &classroom_ids)?;

    let out = lessons
        .iter()
        .map(|l| {
            let teachers_json: Vec<Value> = l
                .teacher_ids
                .iter()
                .filter_map(|id| teachers.get(id).cloned())
                .collect();
            let classrooms_json: Vec<Value> = l
                .classroom_ids
                .iter()
                .filter_map(|id| classrooms.get(id).cloned())
                .collect();
            json!({
                "id": l.id,
                "subject": subjects.get(&l.subject_id).cloned().unwrap_or(Value::Null),
                "day": days.get(&l.day_definition_id).cloned().unwrap_or(Value::Null),
                "period": periods.get(&l.period_id).cloned().unwrap_or(Value::Null),
                "teachers": teachers_json,
                "classrooms": classrooms_json,
                "weeksDefinitionId": l.weeks_definition_id,
                "termId": l.term_id,
                "periodsPerWeek": l.periods_per_week,
            })
        })
        .collect();
    Ok(out)
}

/// Read-side filters for the override aggregation. `relevant_from` keeps
/// rows dated on or after the given calendar date; `cohort_id` keeps rows
/// touching at least one lesson the cohort attends.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverrideQuery<'a> {
    pub relevant_from: Option<NaiveDate>,
    pub cohort_id: Option<&'a str>,
}

#[derive(Debug)]
struct MovedRow {
    id: String,
    date: String,
    period_id: Option<String>,
    day_definition_id: Option<String>,
    classroom_id: Option<String>,
}

#[derive(Debug)]
struct SubstitutionRow {
    id: String,
    date: String,
    teacher_id: Option<String>,
}

pub fn moved_lessons_view(conn: &Connection, q: OverrideQuery<'_>) -> anyhow::Result<Vec<Value>> {
    let (mut sql, params) = filtered_rows_sql(
        "SELECT m.id, m.date, m.period_id, m.day_definition_id, m.classroom_id
         FROM moved_lessons m",
        "moved_lesson_lessons",
        "moved_lesson_id",
        q,
    );
    sql.push_str(" ORDER BY m.date, m.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok(MovedRow {
                id: r.get(0)?,
                date: r.get(1)?,
                period_id: r.get(2)?,
                day_definition_id: r.get(3)?,
                classroom_id: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    moved_rows_to_views(conn, rows)
}

pub fn moved_lesson_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Value>> {
    let row = conn
        .query_row(
            "SELECT id, date, period_id, day_definition_id, classroom_id
             FROM moved_lessons WHERE id = ?",
            [id],
            |r| {
                Ok(MovedRow {
                    id: r.get(0)?,
                    date: r.get(1)?,
                    period_id: r.get(2)?,
                    day_definition_id: r.get(3)?,
                    classroom_id: r.get(4)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(moved_rows_to_views(conn, vec![row])?.into_iter().next())
}

pub fn substitutions_view(conn: &Connection, q: OverrideQuery<'_>) -> anyhow::Result<Vec<Value>> {
    let (mut sql, params) = filtered_rows_sql(
        "SELECT m.id, m.date, m.teacher_id FROM substitutions m",
        "substitution_lessons",
        "substitution_id",
        q,
    );
    sql.push_str(" ORDER BY m.date, m.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok(SubstitutionRow {
                id: r.get(0)?,
                date: r.get(1)?,
                teacher_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    substitution_rows_to_views(conn, rows)
}

pub fn substitution_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Value>> {
    let row = conn
        .query_row(
            "SELECT id, date, teacher_id FROM substitutions WHERE id = ?",
            [id],
            |r| {
                Ok(SubstitutionRow {
                    id: r.get(0)?,
                    date: r.get(1)?,
                    teacher_id: r.get(2)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(substitution_rows_to_views(conn, vec![row])?
        .into_iter()
        .next())
}

/// Appends the relevance/cohort filters shared by both override kinds.
/// Dates are stored as ISO-8601 text, so lexical compare is calendar compare.
fn filtered_rows_sql(
    base: &str,
    link_table: &str,
    link_col: &str,
    q: OverrideQuery<'_>,
) -> (String, Vec<SqlValue>) {
    let mut sql = base.to_string();
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(from) = q.relevant_from {
        clauses.push("m.date >= ?".to_string());
        params.push(SqlValue::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(cohort_id) = q.cohort_id {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM {link} ml
                     JOIN lesson_cohorts lc ON lc.lesson_id = ml.lesson_id
                     WHERE ml.{col} = m.id AND lc.cohort_id = ?)",
            link = link_table,
            col = link_col
        ));
        params.push(SqlValue::Text(cohort_id.to_string()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    (sql, params)
}

/// Two-step rollup: link rows are fetched separately and grouped here, with
/// duplicate (override, lesson) pairs collapsed before they reach a caller.
fn affected_lessons(
    conn: &Connection,
    link_table: &str,
    link_col: &str,
    override_ids: &[&str],
) -> anyhow::Result<HashMap<String, Vec<String>>> {
    if override_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; override_ids.len()].join(", ");
    let sql = format!(
        "SELECT {col}, lesson_id FROM {link} WHERE {col} IN ({ph}) ORDER BY rowid",
        col = link_col,
        link = link_table,
        ph = placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let pairs = stmt
        .query_map(params_from_iter(override_ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (override_id, lesson_id) in pairs {
        if seen.insert((override_id.clone(), lesson_id.clone())) {
            grouped.entry(override_id).or_default().push(lesson_id);
        }
    }
    Ok(grouped)
}

fn moved_rows_to_views(conn: &Connection, rows: Vec<MovedRow>) -> anyhow::Result<Vec<Value>> {
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let mut lessons = affected_lessons(conn, "moved_lesson_lessons", "moved_lesson_id", &ids)?;

    let period_ids: Vec<String> = rows.iter().filter_map(|r| r.period_id.clone()).collect();
    let day_ids: Vec<String> = rows
        .iter()
        .filter_map(|r| r.day_definition_id.clone())
        .collect();
    let classroom_ids: Vec<String> = rows.iter().filter_map(|r| r.classroom_id.clone()).collect();
    let periods = catalog::lookup_many(conn, EntityKind::Period, &period_ids)?;
    let days = catalog::lookup_many(conn, EntityKind::DayDefinition, &day_ids)?;
    let classrooms = catalog::lookup_many(conn, EntityKind::Classroom, &classroom_ids)?;

    // Non-lossy join: a row whose referent no longer resolves keeps its
    // identity and date, with the dependent field null.
    Ok(rows
        .into_iter()
        .map(|r| {
            json!({
                "id": r.id,
                "date": r.date,
                "period": project_optional(&periods, r.period_id.as_deref()),
                "day": project_optional(&days, r.day_definition_id.as_deref()),
                "classroom": project_optional(&classrooms, r.classroom_id.as_deref()),
                "lessons": lessons.remove(&r.id).unwrap_or_default(),
            })
        })
        .collect())
}

fn substitution_rows_to_views(
    conn: &Connection,
    rows: Vec<SubstitutionRow>,
) -> anyhow::Result<Vec<Value>> {
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let mut lessons = affected_lessons(conn, "substitution_lessons", "substitution_id", &ids)?;

    let teacher_ids: Vec<String> = rows.iter().filter_map(|r| r.teacher_id.clone()).collect();
    let teachers = catalog::lookup_many(conn, EntityKind::Teacher, &teacher_ids)?;

    Ok(rows
        .into_iter()
        .map(|r| {
            json!({
                "id": r.id,
                "date": r.date,
                "teacher": project_optional(&teachers, r.teacher_id.as_deref()),
                "lessons": lessons.remove(&r.id).unwrap_or_default(),
            })
        })
        .collect())
}

fn project_optional(projections: &HashMap<String, Value>, id: Option<&str>) -> Value {
    id.and_then(|id| projections.get(id).cloned())
        .unwrap_or(Value::Null)
}
