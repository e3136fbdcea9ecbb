//! Workbook reader.
//!
//! Opens workbook bytes (`.xlsx`, `.xls`, `.xlsb`, `.ods`) and walks sheets in storage
//! order. Each [`Sheet`] yields [`RowView`]s, 1-indexed, from row 1 up to the last used row.

use std::borrow::Cow;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Range, Reader, Sheets};

use crate::error::IngestionResult;

/// Read access to the text of one row's cells.
pub trait CellSource {
    /// Text of the cell at the zero-based `column`; empty when the cell is absent.
    fn cell_text(&self, column: u32) -> Cow<'_, str>;
}

/// Forward-only cursor over the sheets of a workbook.
///
/// Iterating the reader loads one sheet at a time, in the order the sheets are stored in
/// the file.
pub struct WorkbookReader {
    workbook: Sheets<Cursor<Vec<u8>>>,
    sheet_names: Vec<String>,
    next_sheet: usize,
    skip_header: bool,
}

impl WorkbookReader {
    /// Open workbook bytes. `skip_header` drops row 1 of every sheet.
    pub fn from_bytes(bytes: Vec<u8>, skip_header: bool) -> IngestionResult<Self> {
        let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let sheet_names = workbook.sheet_names();
        Ok(Self {
            workbook,
            sheet_names,
            next_sheet: 0,
            skip_header,
        })
    }

    /// Sheet names in storage order.
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }
}

impl Iterator for WorkbookReader {
    type Item = IngestionResult<Sheet>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.sheet_names.get(self.next_sheet)?.clone();
        self.next_sheet += 1;

        Some(
            self.workbook
                .worksheet_range(&name)
                .map(|range| Sheet {
                    name,
                    range,
                    skip_header: self.skip_header,
                })
                .map_err(Into::into),
        )
    }
}

/// One loaded sheet.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    range: Range<Data>,
    skip_header: bool,
}

impl Sheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of the last used row (1-based), or 0 for an empty sheet.
    pub fn last_row(&self) -> u32 {
        self.range.end().map(|(row, _)| row + 1).unwrap_or(0)
    }

    /// Rows in order, starting at row 1 (row 2 when the header is skipped).
    pub fn rows(&self) -> SheetRows<'_> {
        SheetRows {
            sheet: self,
            next_row: if self.skip_header { 2 } else { 1 },
            last_row: self.last_row(),
        }
    }
}

/// Iterator over the rows of a [`Sheet`].
pub struct SheetRows<'a> {
    sheet: &'a Sheet,
    next_row: u32,
    last_row: u32,
}

impl<'a> Iterator for SheetRows<'a> {
    type Item = RowView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row > self.last_row {
            return None;
        }
        let index = self.next_row;
        self.next_row += 1;
        Some(RowView {
            sheet: self.sheet,
            index,
        })
    }
}

/// Cell lookup for one (sheet, row) pair.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    sheet: &'a Sheet,
    index: u32,
}

impl<'a> RowView<'a> {
    /// 1-based row number.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn sheet_name(&self) -> &'a str {
        &self.sheet.name
    }

    /// Text of the cell at a column reference such as `"C"`.
    pub fn cell(&self, column: &str) -> Option<Cow<'a, str>> {
        crate::types::column_index(column)
            .ok()
            .map(|col| self.text_at(col))
    }

    fn text_at(&self, column: u32) -> Cow<'a, str> {
        match self.sheet.range.get_value((self.index - 1, column)) {
            Some(data) => cell_to_text(data),
            None => Cow::Borrowed(""),
        }
    }
}

impl CellSource for RowView<'_> {
    fn cell_text(&self, column: u32) -> Cow<'_, str> {
        self.text_at(column)
    }
}

/// Render a cell the way it reads in a spreadsheet UI.
///
/// Whole floats lose their fraction (`9.0` reads as `9`) and booleans read as
/// `TRUE`/`FALSE`.
fn cell_to_text(c: &Data) -> Cow<'_, str> {
    match c {
        Data::Empty => Cow::Borrowed(""),
        Data::String(s) => Cow::Borrowed(s.as_str()),
        Data::Int(i) => Cow::Owned(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Cow::Owned((*f as i64).to_string())
            } else {
                Cow::Owned(f.to_string())
            }
        }
        Data::Bool(true) => Cow::Borrowed("TRUE"),
        Data::Bool(false) => Cow::Borrowed("FALSE"),
        Data::DateTime(dt) if dt.is_datetime() => Cow::Owned(datetime_text(dt)),
        other => Cow::Owned(other.to_string()),
    }
}

/// ISO text for a date-formatted cell: `2022-10-01`, `13:30:00` or `2022-10-01 13:30:00`.
fn datetime_text(dt: &ExcelDateTime) -> String {
    let serial = dt.as_f64();
    let (year, month, day, hour, min, sec, milli) = dt.to_ymd_hms_milli();
    let date = format!("{year:04}-{month:02}-{day:02}");
    let mut time = format!("{hour:02}:{min:02}:{sec:02}");
    if milli != 0 {
        time.push_str(&format!(".{milli:03}"));
    }

    if serial.fract() == 0.0 {
        date
    } else if serial.trunc() == 0.0 {
        time
    } else {
        format!("{date} {time}")
    }
}

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    use super::{CellSource, WorkbookReader};

    fn two_sheet_workbook() -> Vec<u8> {
        let mut wb = Workbook::new();

        let ws1 = wb.add_worksheet();
        ws1.set_name("First").unwrap();
        ws1.write_string(0, 0, "name").unwrap();
        ws1.write_string(1, 0, "Ada").unwrap();
        ws1.write_number(1, 1, 9).unwrap();
        ws1.write_number(1, 2, 98.5).unwrap();
        ws1.write_boolean(1, 3, true).unwrap();

        let ws2 = wb.add_worksheet();
        ws2.set_name("Second").unwrap();
        ws2.write_string(0, 0, "name").unwrap();
        ws2.write_string(3, 0, "Grace").unwrap();

        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn reader_walks_sheets_in_storage_order() {
        let reader = WorkbookReader::from_bytes(two_sheet_workbook(), false).unwrap();
        assert_eq!(reader.sheet_names(), ["First".to_string(), "Second".to_string()]);

        let names: Vec<String> = reader
            .map(|sheet| sheet.unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn rows_are_one_indexed_and_include_gaps() {
        let mut reader = WorkbookReader::from_bytes(two_sheet_workbook(), false).unwrap();
        let _first = reader.next().unwrap().unwrap();
        let second = reader.next().unwrap().unwrap();

        let rows: Vec<(u32, String)> = second
            .rows()
            .map(|row| (row.index(), row.cell_text(0).into_owned()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, "name".to_string()),
                (2, String::new()),
                (3, String::new()),
                (4, "Grace".to_string()),
            ]
        );
    }

    #[test]
    fn header_row_is_skipped_per_sheet() {
        let reader = WorkbookReader::from_bytes(two_sheet_workbook(), true).unwrap();
        let first_rows: Vec<Vec<u32>> = reader
            .map(|sheet| sheet.unwrap().rows().map(|r| r.index()).collect())
            .collect();
        assert_eq!(first_rows, vec![vec![2], vec![2, 3, 4]]);
    }

    #[test]
    fn cells_read_as_text() {
        let mut reader = WorkbookReader::from_bytes(two_sheet_workbook(), true).unwrap();
        let sheet = reader.next().unwrap().unwrap();
        let row = sheet.rows().next().unwrap();

        assert_eq!(row.sheet_name(), "First");
        assert_eq!(row.cell("A").as_deref(), Some("Ada"));
        assert_eq!(row.cell("B").as_deref(), Some("9"));
        assert_eq!(row.cell("C").as_deref(), Some("98.5"));
        assert_eq!(row.cell("D").as_deref(), Some("TRUE"));
        assert_eq!(row.cell("Z").as_deref(), Some(""));
        assert_eq!(row.cell("1"), None);
    }

    #[test]
    fn date_cells_read_as_iso_text() {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        let date = Format::new().set_num_format("yyyy-mm-dd");
        let stamp = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let clock = Format::new().set_num_format("hh:mm");
        ws.write_datetime_with_format(0, 0, ExcelDateTime::from_ymd(2022, 10, 1).unwrap(), &date)
            .unwrap();
        ws.write_datetime_with_format(
            0,
            1,
            ExcelDateTime::from_ymd(2022, 11, 1).unwrap().and_hms(13, 30, 0).unwrap(),
            &stamp,
        )
        .unwrap();
        ws.write_datetime_with_format(0, 2, ExcelDateTime::from_hms(9, 15, 0).unwrap(), &clock)
            .unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let sheet = WorkbookReader::from_bytes(bytes, false).unwrap().next().unwrap().unwrap();
        let row = sheet.rows().next().unwrap();
        assert_eq!(row.cell("A").as_deref(), Some("2022-10-01"));
        assert_eq!(row.cell("B").as_deref(), Some("2022-11-01 13:30:00"));
        assert_eq!(row.cell("C").as_deref(), Some("09:15:00"));
    }

    #[test]
    fn invalid_bytes_are_a_format_error() {
        let err = WorkbookReader::from_bytes(b"not a workbook".to_vec(), false)
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }
}
