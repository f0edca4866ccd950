use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Idempotent schema setup, shared by the workspace path and in-memory tests.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            short TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            period INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS day_definitions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cohorts(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short TEXT NOT NULL
        )",
        [],
    )?;

    // Base recurring plan. weeks_definition_id and term_id are opaque
    // pass-through tokens owned by the import pipeline.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            day_definition_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            weeks_definition_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            periods_per_week INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_cohorts(
            lesson_id TEXT NOT NULL,
            cohort_id TEXT NOT NULL,
            PRIMARY KEY(lesson_id, cohort_id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_cohorts_cohort ON lesson_cohorts(cohort_id)",
        [],
    )?;

    // Teacher/classroom sets are ordered child rows owned by the lesson;
    // sort_order is the declared order and is what projection emits.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_teachers(
            lesson_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            teacher_id TEXT NOT NULL,
            PRIMARY KEY(lesson_id, sort_order),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_classrooms(
            lesson_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            classroom_id TEXT NOT NULL,
            PRIMARY KEY(lesson_id, sort_order),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;

    // Override layers. Positional fields are nullable: null means
    // "unchanged from the base lesson's own value".
    conn.execute(
        "CREATE TABLE IF NOT EXISTS moved_lessons(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            period_id TEXT,
            day_definition_id TEXT,
            classroom_id TEXT
        )",
        [],
    )?;
    // No uniqueness constraint on the link pairs: duplicates must not corrupt
    // aggregation output, which deduplicates at read time.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS moved_lesson_lessons(
            moved_lesson_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            FOREIGN KEY(moved_lesson_id) REFERENCES moved_lessons(id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_moved_lesson_lessons_override
         ON moved_lesson_lessons(moved_lesson_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_moved_lesson_lessons_lesson
         ON moved_lesson_lessons(lesson_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS substitutions(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            teacher_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS substitution_lessons(
            substitution_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            FOREIGN KEY(substitution_id) REFERENCES substitutions(id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_substitution_lessons_override
         ON substitution_lessons(substitution_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_substitution_lessons_lesson
         ON substitution_lessons(lesson_id)",
        [],
    )?;

    // Plan-version selector rows, not an override layer.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetables(
            id TEXT PRIMARY KEY,
            valid_from TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetables_valid_from ON timetables(valid_from)",
        [],
    )?;

    Ok(())
}
