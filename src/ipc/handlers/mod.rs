pub mod core;
pub mod import;
pub mod moved_lessons;
pub mod schedule;
pub mod substitutions;
pub mod timetables;
