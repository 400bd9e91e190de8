//! Workbook codec.
//!
//! Reads and writes the row-oriented `.xlsx` workbooks used both for the
//! uploaded datasets and for the generated timetables. Every cell is carried
//! as a string; the empty string stands for an absent cell.

mod codec;


pub use codec::{decode, decode_bytes, encode, write};

/// Maximum sheet name length accepted by Excel.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Content type of an `.xlsx` workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// One row of cell values.
pub type Row = Vec<String>;

/// Result type for codec operations.
pub type WorkbookResult<T> = Result<T, WorkbookError>;

/// Errors raised while decoding or encoding a workbook.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    /// The file could not be read from disk.
    #[error("Failed to read workbook: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not a readable workbook.
    #[error("Malformed workbook: {0}")]
    MalformedInput(String),

    /// The in-memory grid could not be serialized.
    #[error("Failed to encode workbook: {0}")]
    Encode(String),
}

/// A named grid of rows within a workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Iterate over every non-empty cell of the sheet.
    pub fn non_empty_cells(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(String::as_str)
            .filter(|cell| !cell.is_empty())
    }
}

/// An ordered collection of sheets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}
