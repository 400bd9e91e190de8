//! Timetable model decoded from generated workbooks.
//!
//! A generated workbook holds one sheet per teacher and one per class. Each
//! sheet is decoded into a [`ScheduleSheet`]: one [`DayRecord`] per weekday
//! row, each with a fixed number of period slots.

pub mod classifier;


use serde::{Deserialize, Serialize};

pub use classifier::{classify, classify_sheet, ClassifiedSheet};

/// Number of period slots per day.
pub const PERIODS_PER_DAY: usize = 8;

/// Day names recognized as the first cell of a day-record row.
pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Sheet that summarizes teacher loads rather than holding a timetable.
pub const SUMMARY_SHEET: &str = "Summary";

/// Whether a sheet lists class codes (a teacher's timetable) or teachers
/// (a class's timetable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetClassification {
    Teacher,
    Class,
}

/// Period assignments for one day. An empty string means no assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub day: String,
    pub periods: Vec<String>,
}

/// Ordered day-records of one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSheet {
    pub days: Vec<DayRecord>,
}

impl ScheduleSheet {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day(&self, name: &str) -> Option<&DayRecord> {
        self.days.iter().find(|d| d.day == name)
    }
}
