//! `rust-sheet-ingest` extracts typed records from comma-delimited text and multi-sheet
//! workbooks, driven by a declarative [`types::Schema`] that maps column letters to field
//! names.
//!
//! The primary entrypoints are [`ingestion::parse_delimited_text`] and
//! [`ingestion::parse_workbook`]. Both append one record per data row to a caller-owned
//! `Vec<T>`, where `T` is any `serde::Deserialize` type.
//!
//! ## Schema
//!
//! Each [`types::FieldSpec`] names a column (`"A"`, `"F"`, `"AA"`) and a destination field:
//!
//! - plain fields write a single value
//! - `is_multiple` fields accumulate into a list, in column order
//! - `is_map` fields named `group.key` write into a nested object
//! - `is_map` + `is_multiple` fields build a list of objects; `map_start` opens a new one
//!
//! With `headers = true`, row 1 of **every** sheet is skipped. Empty cells are skipped: the
//! destination field keeps its default.
//!
//! Schemas can also be loaded from JSON:
//!
//! ```rust
//! use rust_sheet_ingest::types::Schema;
//!
//! # fn main() -> Result<(), rust_sheet_ingest::IngestionError> {
//! let schema = Schema::from_json_str(
//!     r#"{"version": "1.0", "schema_type": "coords", "headers": true,
//!         "fields": [{"col": "A", "name": "first_name"}, {"col": "B", "name": "last_name"}]}"#,
//! )?;
//! assert_eq!(schema.fields.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Decoding
//!
//! Cell text is coerced weakly: `"9"` decodes into integer fields, `"true"`/`"1"`/`"t"`
//! into booleans, and a single value into a one-element list. Give destination types
//! `#[serde(default)]` so absent fields fall back to zero values.
//!
//! ```rust
//! use rust_sheet_ingest::ingestion::parse_delimited_text;
//! use rust_sheet_ingest::types::{FieldSpec, Schema};
//!
//! #[derive(Debug, Default, serde::Deserialize)]
//! #[serde(default)]
//! struct Project {
//!     name: String,
//!     score: i64,
//! }
//!
//! #[derive(Debug, Default, serde::Deserialize)]
//! #[serde(default)]
//! struct Student {
//!     email: String,
//!     projects: Vec<Project>,
//! }
//!
//! # fn main() -> Result<(), rust_sheet_ingest::IngestionError> {
//! let schema = Schema::new(
//!     true,
//!     vec![
//!         FieldSpec::new("A", "email"),
//!         FieldSpec::new("B", "projects.name").map().multiple().map_start(),
//!         FieldSpec::new("C", "projects.score").map().multiple(),
//!         FieldSpec::new("D", "projects.name").map().multiple().map_start(),
//!         FieldSpec::new("E", "projects.score").map().multiple(),
//!     ],
//! );
//! let csv = "Email,P1,S1,P2,S2\nanakin@x,Songbird,95,Tetris,80\n";
//!
//! let mut students: Vec<Student> = Vec::new();
//! parse_delimited_text(&mut students, csv.as_bytes(), &schema)?;
//! assert_eq!(students[0].projects.len(), 2);
//! assert_eq!(students[0].projects[1].score, 80);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every entry point returns [`IngestionError`]. Format and column-address failures happen
//! before any row is decoded and leave the output untouched. A decode failure stops the
//! parse; records decoded before the failing row stay in the output.
//!
//! ## Service layer
//!
//! [`service::Aggregator`] resolves a stored schema, reads an uploaded file and saves every
//! student through pluggable storage traits.

pub mod error;
pub mod execution;
pub mod ingestion;
pub mod service;
pub mod types;

pub use error::{ErrorKind, IngestionError, IngestionResult};
pub use ingestion::{parse_delimited_text, parse_workbook};
