//! CSV normalization into the workbook representation.
//!
//! Delimited text is rewritten as a single-sheet xlsx so that CSV and native workbooks go
//! through the same reader and row mapper.

use std::io::Read;

use rust_xlsxwriter::Workbook;

use crate::error::{IngestionError, IngestionResult};

/// Name of the single sheet produced by [`normalize_csv`].
pub const DEFAULT_SHEET_NAME: &str = "default";

/// Last row index (zero-based) a workbook sheet can hold.
const MAX_ROW_INDEX: u64 = 1_048_575;

/// Options for reading delimited text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter (default `,`).
    pub delimiter: u8,
    /// Name of the sheet the rows are written to.
    pub sheet_name: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

/// Convert comma-delimited text into xlsx bytes with default options.
pub fn normalize_csv<R: Read>(input: R) -> IngestionResult<Vec<u8>> {
    normalize_csv_with_options(input, &CsvOptions::default())
}

/// Convert delimited text into xlsx bytes.
///
/// Rules:
///
/// - Every record (the first one included) becomes one sheet row, starting at column `A`.
/// - All records must have the same number of fields.
/// - Quotes are strict: a quote may only open a field, and a quoted field must close
///   right before a delimiter, a line break or the end of input.
/// - Values are written as text; nothing is inferred.
/// - The conversion is all-or-nothing: on error no bytes are returned.
pub fn normalize_csv_with_options<R: Read>(mut input: R, options: &CsvOptions) -> IngestionResult<Vec<u8>> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    check_quoting(&raw, options.delimiter)?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .delimiter(options.delimiter)
        .from_reader(raw.as_slice());

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(options.sheet_name.as_str())?;

    let mut rows = 0usize;
    for (row_idx0, result) in rdr.records().enumerate() {
        let record = result?;
        if row_idx0 as u64 > MAX_ROW_INDEX {
            return Err(IngestionError::Format {
                message: format!("csv has more than {} rows", MAX_ROW_INDEX + 1),
            });
        }
        let row = row_idx0 as u32;

        for (col_idx0, value) in record.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = u16::try_from(col_idx0)
                .ok()
                .filter(|c| u32::from(*c) < crate::types::MAX_COLUMNS)
                .ok_or_else(|| IngestionError::Format {
                    message: format!(
                        "csv row {} has more than {} columns",
                        row_idx0 + 1,
                        crate::types::MAX_COLUMNS
                    ),
                })?;
            worksheet.write_string(row, col, value)?;
        }
        rows += 1;
    }

    tracing::debug!(rows, sheet = %options.sheet_name, "normalized delimited text");
    Ok(workbook.save_to_buffer()?)
}

#[derive(Clone, Copy)]
enum Quoting {
    FieldStart,
    Bare,
    Quoted,
    /// A quote seen inside a quoted field: either an escape or the closing quote.
    QuoteInQuoted,
}

/// Reject the quoting the `csv` reader would otherwise tolerate.
fn check_quoting(raw: &[u8], delimiter: u8) -> IngestionResult<()> {
    let malformed = |line: usize, what: &str| IngestionError::Format {
        message: format!("csv line {line}: {what}"),
    };
    let ends_field = |b: u8| b == delimiter || b == b'\n' || b == b'\r';

    let mut state = Quoting::FieldStart;
    let mut line = 1usize;
    let mut opened_at = 1usize;
    for &b in raw {
        state = match state {
            Quoting::FieldStart if b == b'"' => {
                opened_at = line;
                Quoting::Quoted
            }
            Quoting::FieldStart | Quoting::Bare if b == b'"' => {
                return Err(malformed(line, "bare \" in non-quoted field"));
            }
            Quoting::FieldStart | Quoting::Bare if ends_field(b) => Quoting::FieldStart,
            Quoting::FieldStart | Quoting::Bare => Quoting::Bare,
            Quoting::Quoted if b == b'"' => Quoting::QuoteInQuoted,
            Quoting::Quoted => Quoting::Quoted,
            Quoting::QuoteInQuoted if b == b'"' => Quoting::Quoted,
            Quoting::QuoteInQuoted if ends_field(b) => Quoting::FieldStart,
            Quoting::QuoteInQuoted => {
                return Err(malformed(line, "extraneous or missing \" in quoted field"));
            }
        };
        if b == b'\n' {
            line += 1;
        }
    }

    match state {
        Quoting::Quoted => Err(malformed(opened_at, "quoted field is never closed")),
        _ => Ok(()),
    }
}
