//! `.xlsx` decoding (calamine) and encoding (rust_xlsxwriter).

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};

use super::{Row, Sheet, Workbook, WorkbookError, WorkbookResult, MAX_SHEET_NAME_LEN};

/// Decode the workbook stored at `path`.
///
/// An empty file decodes to an empty workbook; anything else that is not a
/// readable `.xlsx` container fails with [`WorkbookError::MalformedInput`].
pub fn decode(path: &Path) -> WorkbookResult<Workbook> {
    let bytes = std::fs::read(path)?;
    decode_bytes(&bytes)
}

/// Decode an in-memory workbook.
pub fn decode_bytes(bytes: &[u8]) -> WorkbookResult<Workbook> {
    if bytes.is_empty() {
        return Ok(Workbook::default());
    }

    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| WorkbookError::MalformedInput(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|e| WorkbookError::MalformedInput(format!("sheet '{}': {}", name, e)))?;

        let mut rows: Vec<Row> = Vec::new();
        if let Some((first_row, first_col)) = range.start() {
            rows.resize(first_row as usize, Row::new());
            for cells in range.rows() {
                let mut row: Row = vec![String::new(); first_col as usize];
                row.extend(cells.iter().map(cell_text));
                trim_trailing_empty(&mut row);
                rows.push(row);
            }
        }
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }

        sheets.push(Sheet { name, rows });
    }

    Ok(Workbook { sheets })
}

/// Encode a workbook into `.xlsx` bytes.
///
/// Empty cells are not written, so they decode back as empty strings.
pub fn encode(workbook: &Workbook) -> WorkbookResult<Vec<u8>> {
    let mut book = rust_xlsxwriter::Workbook::new();

    for sheet in &workbook.sheets {
        if sheet.name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(WorkbookError::MalformedInput(format!(
                "sheet name '{}' exceeds {} characters",
                sheet.name, MAX_SHEET_NAME_LEN
            )));
        }

        let worksheet = book.add_worksheet();
        worksheet
            .set_name(sheet.name.as_str())
            .map_err(|e| WorkbookError::MalformedInput(e.to_string()))?;

        for (r, row) in sheet.rows.iter().enumerate() {
            let r = u32::try_from(r)
                .map_err(|_| WorkbookError::Encode(format!("too many rows in '{}'", sheet.name)))?;
            for (c, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let c = u16::try_from(c).map_err(|_| {
                    WorkbookError::Encode(format!("too many columns in '{}'", sheet.name))
                })?;
                worksheet
                    .write_string(r, c, cell.as_str())
                    .map_err(|e| WorkbookError::Encode(e.to_string()))?;
            }
        }
    }

    book.save_to_buffer()
        .map_err(|e| WorkbookError::Encode(e.to_string()))
}

/// Encode `workbook` and write it to `path`.
pub fn write(path: &Path, workbook: &Workbook) -> WorkbookResult<()> {
    let bytes = encode(workbook)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => unescape_ooxml(s),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn trim_trailing_empty(row: &mut Row) {
    while row.last().is_some_and(|c| c.is_empty()) {
        row.pop();
    }
}

/// Undo the `_xHHHH_` escaping OOXML applies to control characters and to
/// literal text shaped like an escape (`_x005F_` stands for `_`).
fn unescape_ooxml(text: &str) -> String {
    if !text.contains("_x") {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut start = 0;
    let mut i = 0;
    while i + 7 <= bytes.len() {
        let escaped = bytes[i] == b'_'
            && bytes[i + 1] == b'x'
            && bytes[i + 6] == b'_'
            && bytes[i + 2..i + 6].iter().all(u8::is_ascii_hexdigit);
        let decoded = escaped
            .then(|| u32::from_str_radix(&text[i + 2..i + 6], 16).ok())
            .flatten()
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push_str(&text[start..i]);
                out.push(c);
                i += 7;
                start = i;
            }
            None => i += 1,
        }
    }
    out.push_str(&text[start..]);
    out
}
