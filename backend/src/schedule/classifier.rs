//! Sheet classification and normalization.

use super::{
    DayRecord, ScheduleSheet, SheetClassification, DAY_NAMES, PERIODS_PER_DAY, SUMMARY_SHEET,
};
use crate::workbook::{Sheet, Workbook};

/// A sheet decoded into a timetable together with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSheet {
    pub name: String,
    pub classification: SheetClassification,
    pub schedule: ScheduleSheet,
}

/// Classify every timetable sheet of a workbook, in workbook order.
///
/// Summary sheets, sheets without a data row and sheets without any
/// recognized day-record are left out.
pub fn classify(workbook: &Workbook) -> Vec<ClassifiedSheet> {
    workbook.sheets.iter().filter_map(classify_sheet).collect()
}

/// Classify a single sheet, or `None` when it holds no timetable.
pub fn classify_sheet(sheet: &Sheet) -> Option<ClassifiedSheet> {
    if sheet.name == SUMMARY_SHEET || sheet.rows.len() < 2 {
        return None;
    }

    let schedule = normalize(sheet);
    if schedule.is_empty() {
        return None;
    }

    let classification = if contains_class_code(sheet) {
        SheetClassification::Teacher
    } else {
        SheetClassification::Class
    };

    Some(ClassifiedSheet {
        name: sheet.name.clone(),
        classification,
        schedule,
    })
}

/// Collect the day-records below the header row.
fn normalize(sheet: &Sheet) -> ScheduleSheet {
    let days = sheet
        .rows
        .iter()
        .skip(1)
        .filter_map(|row| {
            let day = row.first()?;
            if !DAY_NAMES.contains(&day.as_str()) {
                return None;
            }
            let periods = (1..=PERIODS_PER_DAY)
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect();
            Some(DayRecord {
                day: day.clone(),
                periods,
            })
        })
        .collect();

    ScheduleSheet { days }
}

/// True when any cell holds a class code such as `10a` or `9C`.
///
/// Teacher timetables list the classes taught; class timetables list
/// teacher names, which never carry a digit followed by `a`-`f`.
fn contains_class_code(sheet: &Sheet) -> bool {
    sheet.non_empty_cells().any(|cell| {
        let lowered = cell.to_lowercase();
        lowered
            .as_bytes()
            .windows(2)
            .any(|pair| pair[0].is_ascii_digit() && (b'a'..=b'f').contains(&pair[1]))
    })
}
