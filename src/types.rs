//! Core data model: the mapping [`Schema`] and the per-row [`FieldValueMap`].
//!
//! A [`Schema`] is the declarative wire shape supplied by callers. Before a parse it is
//! compiled into a list of [`CompiledField`]s so the row mapper never re-parses column
//! letters or dotted names per row.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// Number of columns in a workbook grid (`A` through `XFD`).
pub const MAX_COLUMNS: u32 = 16_384;

/// One schema entry: column address, target name and multiplicity/nesting flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Spreadsheet column letter(s), e.g. `"A"` or `"AB"`.
    #[serde(rename = "col")]
    pub column: String,
    /// Target name; `"group.key"` when `is_map` is set.
    pub name: String,
    #[serde(default)]
    pub is_multiple: bool,
    #[serde(default)]
    pub is_map: bool,
    /// Marks the first column of a new sub-record in a repeated map group.
    #[serde(default)]
    pub map_start: bool,
}

impl FieldSpec {
    /// A scalar field.
    pub fn new(column: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            name: name.into(),
            is_multiple: false,
            is_map: false,
            map_start: false,
        }
    }

    /// Mark this field as multi-valued.
    pub fn multiple(mut self) -> Self {
        self.is_multiple = true;
        self
    }

    /// Mark this field as a `group.key` map entry.
    pub fn map(mut self) -> Self {
        self.is_map = true;
        self
    }

    /// Mark this field as the first column of a repeated map group block.
    pub fn map_start(mut self) -> Self {
        self.map_start = true;
        self
    }
}

/// Declarative description of how spreadsheet columns map to output fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub schema_type: String,
    /// When set, row 1 of every sheet is a header row and is skipped.
    #[serde(default)]
    pub headers: bool,
    /// Ordered field list; evaluated left to right for every row.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// Create a schema from fields, with empty version/type metadata.
    pub fn new(headers: bool, fields: Vec<FieldSpec>) -> Self {
        Self {
            version: String::new(),
            schema_type: String::new(),
            headers,
            fields,
        }
    }

    /// Parse a schema from its JSON wire shape.
    pub fn from_json_str(input: &str) -> IngestionResult<Self> {
        serde_json::from_str(input).map_err(|e| IngestionError::SchemaMismatch {
            message: format!("invalid schema json: {e}"),
        })
    }

    /// Parse a schema from a JSON reader.
    pub fn from_json_reader<R: Read>(reader: R) -> IngestionResult<Self> {
        serde_json::from_reader(reader).map_err(|e| IngestionError::SchemaMismatch {
            message: format!("invalid schema json: {e}"),
        })
    }

    /// Load a schema from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }

    /// Resolve every field into a [`CompiledField`].
    ///
    /// Column references are checked here, so a bad address fails the call before any
    /// row is read. Map fields with a malformed name compile to [`FieldKind::Malformed`]
    /// and are skipped by the row mapper.
    pub fn compile(&self) -> IngestionResult<Vec<CompiledField>> {
        self.fields.iter().map(CompiledField::from_spec).collect()
    }

    /// Strict validation of the schema shape.
    ///
    /// Reports column problems plus two shapes that [`Schema::compile`] tolerates:
    /// map names that are not exactly `group.key`, and a repeated map group whose first
    /// column lacks `map_start`.
    pub fn validate(&self) -> IngestionResult<()> {
        let compiled = self.compile()?;

        let mut problems = Vec::new();
        let mut started_groups: Vec<&str> = Vec::new();
        for (spec, field) in self.fields.iter().zip(compiled.iter()) {
            match &field.kind {
                FieldKind::Malformed { name } => problems.push(format!(
                    "map field '{name}' (column {}) must be named 'group.key'",
                    spec.column
                )),
                FieldKind::ListOfMapEntries { group, .. } => {
                    if !started_groups.contains(&group.as_str()) {
                        if !spec.map_start {
                            problems.push(format!(
                                "first column {} of repeated group '{group}' must set map_start",
                                spec.column
                            ));
                        }
                        started_groups.push(group.as_str());
                    }
                }
                _ => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(IngestionError::SchemaMismatch {
                message: problems.join("; "),
            })
        }
    }
}

/// How a single field contributes to the row's [`FieldValueMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// `map[name] = value`.
    Scalar { name: String },
    /// Appended to the list at `map[name]`.
    ListElement { name: String },
    /// `map[group][key] = value`.
    MapEntry { group: String, key: String },
    /// Sets `key` on the last object of the list at `map[group]`.
    ListOfMapEntries {
        group: String,
        key: String,
        map_start: bool,
    },
    /// A map field whose name is not `group.key`; never written.
    Malformed { name: String },
}

/// A [`FieldSpec`] with its column resolved and its name parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledField {
    /// Zero-based column index.
    pub column: u32,
    /// Original column reference, kept for messages.
    pub column_ref: String,
    pub kind: FieldKind,
}

impl CompiledField {
    fn from_spec(spec: &FieldSpec) -> IngestionResult<Self> {
        let column = column_index(&spec.column).map_err(|message| IngestionError::CellAccess {
            column: spec.column.clone(),
            field: spec.name.clone(),
            message,
        })?;

        let kind = if spec.is_map {
            match split_group_key(&spec.name) {
                Some((group, key)) if spec.is_multiple => FieldKind::ListOfMapEntries {
                    group,
                    key,
                    map_start: spec.map_start,
                },
                Some((group, key)) => FieldKind::MapEntry { group, key },
                None => FieldKind::Malformed {
                    name: spec.name.clone(),
                },
            }
        } else if spec.is_multiple {
            FieldKind::ListElement {
                name: spec.name.clone(),
            }
        } else {
            FieldKind::Scalar {
                name: spec.name.clone(),
            }
        };

        Ok(Self {
            column,
            column_ref: spec.column.clone(),
            kind,
        })
    }
}

fn split_group_key(name: &str) -> Option<(String, String)> {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(group), Some(key), None) => Some((group.to_string(), key.to_string())),
        _ => None,
    }
}

/// Convert a column reference (`"A"`, `"ab"`, `"XFD"`) into a zero-based column index.
pub fn column_index(column: &str) -> Result<u32, String> {
    if column.is_empty() {
        return Err("empty column reference".to_string());
    }

    let mut index: u32 = 0;
    for ch in column.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(format!("'{ch}' is not a column letter"));
        }
        let digit = (ch.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index * 26 + digit;
        if index > MAX_COLUMNS {
            return Err(format!("column is beyond the last workbook column (max {MAX_COLUMNS})"));
        }
    }
    Ok(index - 1)
}

/// One value of a [`FieldValueMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Scalar field.
    Text(String),
    /// Multiple, non-map field.
    List(Vec<String>),
    /// Map, non-multiple field group.
    Map(BTreeMap<String, String>),
    /// Map and multiple field group: one object per started block.
    MapList(Vec<BTreeMap<String, String>>),
}

/// Per-row intermediate result of the row mapper.
pub type FieldValueMap = BTreeMap<String, FieldValue>;

#[cfg(test)]
mod tests {
    use super::{column_index, FieldKind, FieldSpec, Schema};

    #[test]
    fn column_index_handles_single_and_multi_letter_columns() {
        assert_eq!(column_index("A"), Ok(0));
        assert_eq!(column_index("z"), Ok(25));
        assert_eq!(column_index("AA"), Ok(26));
        assert_eq!(column_index("XFD"), Ok(16_383));
        assert!(column_index("XFE").is_err());
        assert!(column_index("").is_err());
        assert!(column_index("A1").is_err());
    }

    #[test]
    fn schema_loads_from_json_file() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("rust-sheet-ingest-schema-{nanos}.json"));
        std::fs::write(&path, r#"{"headers": true, "fields": [{"col": "B", "name": "email"}]}"#).unwrap();

        let schema = Schema::from_json_path(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(schema.headers);
        assert_eq!(schema.fields, vec![FieldSpec::new("B", "email")]);

        let err = Schema::from_json_reader("{not json".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid schema json"));
    }

    #[test]
    fn schema_parses_wire_shape_with_defaulted_flags() {
        let schema = Schema::from_json_str(
            r#"{
                "version": "1.0",
                "schema_type": "coords",
                "headers": true,
                "fields": [
                    {"col": "A", "name": "first_name"},
                    {"col": "D", "name": "projects.name", "is_multiple": true, "is_map": true, "map_start": true}
                ]
            }"#,
        )
        .unwrap();

        assert!(schema.headers);
        assert_eq!(schema.fields[0], FieldSpec::new("A", "first_name"));
        assert!(schema.fields[1].map_start);
    }

    #[test]
    fn compile_parses_dotted_names_once() {
        let schema = Schema::new(
            false,
            vec![
                FieldSpec::new("A", "email"),
                FieldSpec::new("B", "languages").multiple(),
                FieldSpec::new("C", "address.city").map(),
                FieldSpec::new("D", "projects.name").map().multiple().map_start(),
                FieldSpec::new("E", "broken").map(),
            ],
        );

        let compiled = schema.compile().unwrap();
        assert_eq!(compiled[1].column, 1);
        assert_eq!(
            compiled[2].kind,
            FieldKind::MapEntry {
                group: "address".to_string(),
                key: "city".to_string()
            }
        );
        assert!(matches!(
            compiled[3].kind,
            FieldKind::ListOfMapEntries { map_start: true, .. }
        ));
        assert!(matches!(compiled[4].kind, FieldKind::Malformed { .. }));
    }

    #[test]
    fn compile_rejects_bad_column_with_cell_access_error() {
        let schema = Schema::new(false, vec![FieldSpec::new("1", "email")]);
        let err = schema.compile().unwrap_err();
        assert!(err.to_string().contains("cannot access column '1'"));
    }

    #[test]
    fn validate_reports_malformed_names_and_missing_map_start() {
        let schema = Schema::new(
            false,
            vec![
                FieldSpec::new("A", "a.b.c").map(),
                FieldSpec::new("B", "projects.name").map().multiple(),
                FieldSpec::new("C", "projects.score").map().multiple(),
            ],
        );

        let msg = schema.validate().unwrap_err().to_string();
        assert!(msg.contains("'a.b.c'"));
        assert!(msg.contains("repeated group 'projects' must set map_start"));
    }

    #[test]
    fn validate_accepts_well_formed_groups() {
        let schema = Schema::new(
            true,
            vec![
                FieldSpec::new("D", "projects.name").map().multiple().map_start(),
                FieldSpec::new("E", "projects.score").map().multiple(),
                FieldSpec::new("G", "projects.name").map().multiple().map_start(),
            ],
        );
        assert!(schema.validate().is_ok());
    }
}
