use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    pub id: String,
    pub valid_from: String,
}

/// Picks the plan version effective on the given date: the row with the
/// greatest valid_from not exceeding it. No matching row is a successful
/// "no valid timetable", not an error.
pub fn latest_valid_as_of(conn: &Connection, date: NaiveDate) -> anyhow::Result<Option<Timetable>> {
    let row = conn
        .query_row(
            "SELECT id, valid_from FROM timetables
             WHERE valid_from <= ?
             ORDER BY valid_from DESC, id DESC
             LIMIT 1",
            [date.format("%Y-%m-%d").to_string()],
            |r| {
                Ok(Timetable {
                    id: r.get(0)?,
                    valid_from: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
