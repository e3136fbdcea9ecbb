//! Student aggregation on top of the parse entry points.
//!
//! An [`Aggregator`] resolves a stored schema, fetches an uploaded file and persists every
//! decoded row through a [`StudentSink`]. Storage is abstracted behind three traits so the
//! service can run against any backend; [`memory`] has in-process implementations.

pub mod domain;
pub mod memory;

use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

use crate::error::IngestionError;
use crate::ingestion::{parse_source, IngestionFormat, IngestionOptions};

use domain::{SchemaKind, StoredSchema, StudentRecord, StudentRss, StudentWac};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("unsupported schema '{name}'")]
    UnsupportedSchema { name: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

pub trait SchemaStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> ServiceResult<StoredSchema>;
}

pub trait BlobStore: Send + Sync {
    fn get_file(&self, name: &str) -> ServiceResult<Box<dyn Read + Send>>;
}

/// Persists decoded students. Implementations upsert by email.
pub trait StudentSink: Send + Sync {
    fn save_rss(&self, file_name: &str, student: StudentRss) -> ServiceResult<StudentRecord>;
    fn save_wac(&self, file_name: &str, student: StudentWac) -> ServiceResult<StudentRecord>;
}

pub struct Aggregator {
    schemas: Arc<dyn SchemaStore>,
    files: Arc<dyn BlobStore>,
    students: Arc<dyn StudentSink>,
    options: IngestionOptions,
}

impl Aggregator {
    pub fn new(
        schemas: Arc<dyn SchemaStore>,
        files: Arc<dyn BlobStore>,
        students: Arc<dyn StudentSink>,
    ) -> Self {
        Self {
            schemas,
            files,
            students,
            options: IngestionOptions::default(),
        }
    }

    /// Options used for every parse. `format` is always overridden per file.
    pub fn with_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse `file_name` with the schema stored under `schema_id` and save every row.
    ///
    /// Rows are saved one by one. A failed save stops the run and earlier saves are kept.
    /// Returns the number of students saved.
    pub fn parse_file(&self, file_name: &str, schema_id: &str) -> ServiceResult<usize> {
        let stored = self.schemas.get_by_id(schema_id)?;
        let kind = SchemaKind::from_name(&stored.name).ok_or_else(|| ServiceError::UnsupportedSchema {
            name: stored.name.clone(),
        })?;

        let input = self.files.get_file(file_name)?;

        let mut options = self.options.clone();
        options.format = Some(match IngestionFormat::from_source_name(file_name) {
            Some(IngestionFormat::DelimitedText) => IngestionFormat::DelimitedText,
            _ => IngestionFormat::Workbook,
        });

        let saved = match kind {
            SchemaKind::Rss => {
                let mut rows: Vec<StudentRss> = Vec::new();
                parse_source(&mut rows, file_name, input, &stored.schema, &options)?;
                save_all(rows, |student| self.students.save_rss(file_name, student))?
            }
            SchemaKind::Wac => {
                let mut rows: Vec<StudentWac> = Vec::new();
                parse_source(&mut rows, file_name, input, &stored.schema, &options)?;
                save_all(rows, |student| self.students.save_wac(file_name, student))?
            }
        };

        tracing::info!(
            file_name,
            schema_id,
            schema = kind.as_str(),
            saved,
            "students saved"
        );
        Ok(saved)
    }
}

fn save_all<S, F>(rows: Vec<S>, mut save: F) -> ServiceResult<usize>
where
    F: FnMut(S) -> ServiceResult<StudentRecord>,
{
    let mut saved = 0;
    for row in rows {
        save(row)?;
        saved += 1;
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_xlsxwriter::Workbook;

    use super::domain::{StoredSchema, StudentRecord, StudentRss, StudentWac};
    use super::memory::{InMemoryBlobStore, InMemorySchemaStore, InMemoryStudentStore};
    use super::{Aggregator, ServiceError, ServiceResult, StudentSink};
    use crate::error::IngestionError;
    use crate::types::{FieldSpec, Schema};

    fn rss_schema() -> StoredSchema {
        StoredSchema {
            id: "rss-1".to_string(),
            name: "RSS".to_string(),
            schema: Schema::new(
                true,
                vec![
                    FieldSpec::new("A", "email"),
                    FieldSpec::new("B", "first_name"),
                    FieldSpec::new("C", "status_items").multiple(),
                    FieldSpec::new("D", "status_items").multiple(),
                    FieldSpec::new("E", "projects.name").map().multiple().map_start(),
                    FieldSpec::new("F", "projects.score").map().multiple(),
                ],
            ),
        }
    }

    fn wac_schema() -> StoredSchema {
        StoredSchema {
            id: "wac-1".to_string(),
            name: "WAC".to_string(),
            schema: Schema::new(
                true,
                vec![
                    FieldSpec::new("A", "email"),
                    FieldSpec::new("B", "full_name"),
                    FieldSpec::new("C", "receives_community_updates"),
                    FieldSpec::new("D", "attended_events"),
                ],
            ),
        }
    }

    struct Fixture {
        schemas: Arc<InMemorySchemaStore>,
        files: Arc<InMemoryBlobStore>,
        students: Arc<InMemoryStudentStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let schemas = Arc::new(InMemorySchemaStore::new());
            schemas.insert(rss_schema());
            schemas.insert(wac_schema());
            Self {
                schemas,
                files: Arc::new(InMemoryBlobStore::new()),
                students: Arc::new(InMemoryStudentStore::new()),
            }
        }

        fn aggregator(&self) -> Aggregator {
            Aggregator::new(self.schemas.clone(), self.files.clone(), self.students.clone())
        }
    }

    #[test]
    fn rss_csv_rows_are_saved() {
        let fx = Fixture::new();
        fx.files.put(
            "rss.csv",
            "Email,Name,S1,S2,Project,Score\n\
             anakin@x,Anakin,active,,Songbird,95\n\
             obiwan@x,Obi-Wan,,,,\n",
        );

        let saved = fx.aggregator().parse_file("rss.csv", "rss-1").unwrap();
        assert_eq!(saved, 2);

        let anakin = fx.students.get("anakin@x").unwrap();
        assert_eq!(anakin.source, "RSS");
        let rss = anakin.rss.unwrap();
        assert_eq!(rss.status_items, vec!["active".to_string()]);
        assert_eq!(rss.projects.len(), 1);
        assert_eq!(rss.projects[0].score, 95);

        let obiwan = fx.students.get("obiwan@x").unwrap().rss.unwrap();
        assert!(obiwan.status_items.is_empty());
        assert!(obiwan.projects.is_empty());
    }

    #[test]
    fn wac_workbook_rows_are_saved() {
        let fx = Fixture::new();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, text) in ["Email", "Name", "Updates", "Events"].iter().enumerate() {
            sheet.write_string(0, col as u16, *text).unwrap();
        }
        for (col, text) in ["anakin@x", "Anakin Skywalker", "true", "3"].iter().enumerate() {
            sheet.write_string(1, col as u16, *text).unwrap();
        }
        fx.files.put("members", workbook.save_to_buffer().unwrap());

        let saved = fx.aggregator().parse_file("members", "wac-1").unwrap();
        assert_eq!(saved, 1);

        let wac = fx.students.get("anakin@x").unwrap().wac.unwrap();
        assert_eq!(wac.full_name, "Anakin Skywalker");
        assert!(wac.receives_community_updates);
        assert_eq!(wac.attended_events, 3);
    }

    #[test]
    fn unknown_schema_name_is_unsupported() {
        let fx = Fixture::new();
        fx.schemas.insert(StoredSchema {
            id: "other".to_string(),
            name: "Alumni".to_string(),
            schema: Schema::default(),
        });
        fx.files.put("a.csv", "x\n");

        let err = fx.aggregator().parse_file("a.csv", "other").unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedSchema { ref name } if name == "Alumni"));
        assert!(fx.students.is_empty());
    }

    #[test]
    fn missing_schema_and_file_are_not_found() {
        let fx = Fixture::new();
        let err = fx.aggregator().parse_file("a.csv", "nope").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { what: "schema", .. }));

        let err = fx.aggregator().parse_file("missing.csv", "rss-1").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { what: "file", .. }));
    }

    #[test]
    fn decode_failure_saves_nothing() {
        let fx = Fixture::new();
        fx.files.put(
            "rss.csv",
            "Email,Name,S1,S2,Project,Score\n\
             anakin@x,Anakin,,,Songbird,95\n\
             obiwan@x,Obi-Wan,,,Tetris,high\n",
        );

        let err = fx.aggregator().parse_file("rss.csv", "rss-1").unwrap_err();
        assert!(matches!(err, ServiceError::Ingestion(IngestionError::Decode { row: 3, .. })));
        assert!(fx.students.is_empty());
    }

    struct FailingSink {
        inner: InMemoryStudentStore,
        fail_on: &'static str,
    }

    impl StudentSink for FailingSink {
        fn save_rss(&self, file_name: &str, student: StudentRss) -> ServiceResult<StudentRecord> {
            if student.email == self.fail_on {
                return Err(ServiceError::Storage {
                    message: "write rejected".to_string(),
                });
            }
            self.inner.save_rss(file_name, student)
        }

        fn save_wac(&self, file_name: &str, student: StudentWac) -> ServiceResult<StudentRecord> {
            self.inner.save_wac(file_name, student)
        }
    }

    #[test]
    fn failed_save_keeps_earlier_saves() {
        let fx = Fixture::new();
        fx.files.put(
            "rss.csv",
            "Email,Name,S1,S2,Project,Score\n\
             anakin@x,Anakin,,,,\n\
             obiwan@x,Obi-Wan,,,,\n\
             ahsoka@x,Ahsoka,,,,\n",
        );
        let sink = Arc::new(FailingSink {
            inner: InMemoryStudentStore::new(),
            fail_on: "obiwan@x",
        });

        let aggregator = Aggregator::new(fx.schemas.clone(), fx.files.clone(), sink.clone());
        let err = aggregator.parse_file("rss.csv", "rss-1").unwrap_err();

        assert!(matches!(err, ServiceError::Storage { .. }));
        assert_eq!(sink.inner.len(), 1);
        assert!(sink.inner.get("anakin@x").is_some());
    }
}
