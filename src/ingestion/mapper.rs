//! Row mapping: one row's cells plus the compiled field list → [`FieldValueMap`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{CompiledField, FieldKind, FieldValue, FieldValueMap};

use super::excel::CellSource;

/// A mapped row together with its location, ready for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRow {
    pub sheet: Arc<str>,
    /// 1-based row number within the sheet.
    pub row: u32,
    pub values: FieldValueMap,
}

/// Apply `fields`, in order, to one row.
///
/// Empty cells are skipped entirely: no key is written and no map-group object is
/// started. For repeated map groups, a field with `map_start` opens a new object and every
/// field writes into the most recently opened one. A repeated group field met before any
/// object was opened in this row opens the first object itself.
pub fn map_row<C>(row: &C, fields: &[CompiledField]) -> FieldValueMap
where
    C: CellSource + ?Sized,
{
    let mut out = FieldValueMap::new();

    for field in fields {
        let value = row.cell_text(field.column);
        if value.is_empty() {
            continue;
        }
        let value = value.into_owned();

        match &field.kind {
            FieldKind::Scalar { name } => {
                out.insert(name.clone(), FieldValue::Text(value));
            }
            FieldKind::ListElement { name } => match out.get_mut(name) {
                Some(FieldValue::List(values)) => values.push(value),
                _ => {
                    out.insert(name.clone(), FieldValue::List(vec![value]));
                }
            },
            FieldKind::MapEntry { group, key } => match out.get_mut(group) {
                Some(FieldValue::Map(entries)) => {
                    entries.insert(key.clone(), value);
                }
                _ => {
                    let mut entries = BTreeMap::new();
                    entries.insert(key.clone(), value);
                    out.insert(group.clone(), FieldValue::Map(entries));
                }
            },
            FieldKind::ListOfMapEntries {
                group,
                key,
                map_start,
            } => {
                let slot = out
                    .entry(group.clone())
                    .or_insert_with(|| FieldValue::MapList(Vec::new()));
                if !matches!(slot, FieldValue::MapList(_)) {
                    *slot = FieldValue::MapList(Vec::new());
                }
                if let FieldValue::MapList(objects) = slot {
                    if *map_start || objects.is_empty() {
                        objects.push(BTreeMap::new());
                    }
                    if let Some(current) = objects.last_mut() {
                        current.insert(key.clone(), value);
                    }
                }
            }
            FieldKind::Malformed { .. } => {}
        }
    }

    out
}
