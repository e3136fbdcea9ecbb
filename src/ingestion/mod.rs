//! Parse pipeline and entry points.
//!
//! Most callers should use [`parse_delimited_text`] or [`parse_workbook`]. Both run the
//! same pipeline:
//!
//! - [`csv`] normalizes delimited text into a single-sheet workbook
//! - [`excel`] walks sheets in storage order and yields row views
//! - [`mapper`] applies the compiled schema to one row
//! - [`decode`] weakly decodes the mapped row into the caller's type
//!
//! [`parse_source`] adds format inference, parallel decoding and observer reporting via
//! [`IngestionOptions`].

pub mod csv;
pub mod decode;
pub mod excel;
pub mod mapper;
pub mod observability;
pub mod unified;

pub use csv::CsvOptions;
pub use decode::{decode_row, DecodeError};
pub use mapper::{map_row, MappedRow};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use unified::{
    parse_delimited_text, parse_path, parse_source, parse_workbook, IngestionFormat, IngestionOptions,
    IngestionRequest,
};
