use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;

/// A base recurring slot as stored. Teacher and classroom sets keep the
/// declared order from import.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: String,
    pub subject_id: String,
    pub day_definition_id: String,
    pub period_id: String,
    pub weeks_definition_id: String,
    pub term_id: String,
    pub periods_per_week: i64,
    pub teacher_ids: Vec<String>,
    pub classroom_ids: Vec<String>,
}

pub fn cohort_exists(conn: &Connection, cohort_id: &str) -> anyhow::Result<bool> {
    let row = conn
        .query_row("SELECT 1 FROM cohorts WHERE id = ?", [cohort_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(row.is_some())
}

/// All base lessons a cohort attends. The caller is responsible for the
/// cohort-exists check; a known cohort with no lessons yields an empty Vec.
pub fn lessons_for_cohort(conn: &Connection, cohort_id: &str) -> anyhow::Result<Vec<Lesson>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.subject_id, l.day_definition_id, l.period_id,
                l.weeks_definition_id, l.term_id, l.periods_per_week
         FROM lessons l
         JOIN lesson_cohorts lc ON lc.lesson_id = l.id
         WHERE lc.cohort_id = ?
         ORDER BY l.id",
    )?;
    let bare = stmt
        .query_map([cohort_id], row_to_bare_lesson)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_member_sets(conn, bare)
}

pub fn lessons_by_ids(conn: &Connection, ids: &[String]) -> anyhow::Result<Vec<Lesson>> {
    let distinct = distinct_ids(ids);
    if distinct.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; distinct.len()].join(", ");
    let sql = format!(
        "SELECT id, subject_id, day_definition_id, period_id,
                weeks_definition_id, term_id, periods_per_week
         FROM lessons WHERE id IN ({}) ORDER BY id",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let bare = stmt
        .query_map(params_from_iter(distinct.iter()), row_to_bare_lesson)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_member_sets(conn, bare)
}

/// Cheap existence proof for a lesson-id set: the matching count equals the
/// distinct requested count exactly when every id resolves.
pub fn count_lessons_by_ids(conn: &Connection, ids: &[String]) -> anyhow::Result<usize> {
    let distinct = distinct_ids(ids);
    if distinct.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; distinct.len()].join(", ");
    let sql = format!(
        "SELECT COUNT(*) FROM lessons WHERE id IN ({})",
        placeholders
    );
    let n: i64 = conn.query_row(&sql, params_from_iter(distinct.iter()), |r| r.get(0))?;
    Ok(n as usize)
}

fn distinct_ids(ids: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for id in ids {
        if !out.contains(&id.as_str()) {
            out.push(id);
        }
    }
    out
}

fn row_to_bare_lesson(r: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: r.get(0)?,
        subject_id: r.get(1)?,
        day_definition_id: r.get(2)?,
        period_id: r.get(3)?,
        weeks_definition_id: r.get(4)?,
        term_id: r.get(5)?,
        periods_per_week: r.get(6)?,
        teacher_ids: Vec::new(),
        classroom_ids: Vec::new(),
    })
}

/// Loads the ordered teacher/classroom sets for a lesson batch with one
/// query per member table.
fn attach_member_sets(conn: &Connection, mut lessons: Vec<Lesson>) -> anyhow::Result<Vec<Lesson>> {
    if lessons.is_empty() {
        return Ok(lessons);
    }
    let ids: Vec<&str> = lessons.iter().map(|l| l.id.as_str()).collect();
    let placeholders = vec!["?"; ids.len()].join(", ");

    let mut teachers: HashMap<String, Vec<String>> = HashMap::new();
    let sql = format!(
        "SELECT lesson_id, teacher_id FROM lesson_teachers
         WHERE lesson_id IN ({}) ORDER BY lesson_id, sort_order",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (lesson_id, teacher_id) in rows {
        teachers.entry(lesson_id).or_default().push(teacher_id);
    }

    let mut classrooms: HashMap<String, Vec<String>> = HashMap::new();
    let sql = format!(
        "SELECT lesson_id, classroom_id FROM lesson_classrooms
         WHERE lesson_id IN ({}) ORDER BY lesson_id, sort_order",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (lesson_id, classroom_id) in rows {
        classrooms.entry(lesson_id).or_default().push(classroom_id);
    }

    for lesson in &mut lessons {
        if let Some(t) = teachers.remove(&lesson.id) {
            lesson.teacher_ids = t;
        }
        if let Some(c) = classrooms.remove(&lesson.id) {
            lesson.classroom_ids = c;
        }
    }
    Ok(lessons)
}
