//! In-memory collaborators for tests and embedding.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::domain::{SchemaKind, StoredSchema, StudentRecord, StudentRss, StudentWac};
use super::{BlobStore, SchemaStore, ServiceError, ServiceResult, StudentSink};

#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    schemas: RwLock<BTreeMap<String, StoredSchema>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a schema under its `id`.
    pub fn insert(&self, schema: StoredSchema) {
        let mut guard = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(schema.id.clone(), schema);
    }
}

impl SchemaStore for InMemorySchemaStore {
    fn get_by_id(&self, id: &str) -> ServiceResult<StoredSchema> {
        let guard = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned().ok_or_else(|| ServiceError::NotFound {
            what: "schema",
            id: id.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    files: RwLock<BTreeMap<String, Arc<[u8]>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut guard = self.files.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(name.into(), Arc::from(bytes.into()));
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get_file(&self, name: &str) -> ServiceResult<Box<dyn Read + Send>> {
        let guard = self.files.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = guard.get(name).cloned().ok_or_else(|| ServiceError::NotFound {
            what: "file",
            id: name.to_string(),
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Upserts students by email.
#[derive(Debug, Default)]
pub struct InMemoryStudentStore {
    inner: Mutex<StudentTable>,
}

#[derive(Debug, Default)]
struct StudentTable {
    next_id: u64,
    by_email: BTreeMap<String, StudentRecord>,
}

impl StudentTable {
    fn upsert(&mut self, email: &str, kind: SchemaKind, file_name: &str) -> &mut StudentRecord {
        let next_id = &mut self.next_id;
        let record = self.by_email.entry(email.to_string()).or_insert_with(|| {
            *next_id += 1;
            StudentRecord {
                id: next_id.to_string(),
                email: email.to_string(),
                ..Default::default()
            }
        });
        record.source = kind.as_str().to_string();
        record.file_name = file_name.to_string();
        record
    }
}

impl InMemoryStudentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, email: &str) -> Option<StudentRecord> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.by_email.get(email).cloned()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records ordered by email.
    pub fn all(&self) -> Vec<StudentRecord> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.by_email.values().cloned().collect()
    }
}

impl StudentSink for InMemoryStudentStore {
    fn save_rss(&self, file_name: &str, student: StudentRss) -> ServiceResult<StudentRecord> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let record = guard.upsert(&student.email, SchemaKind::Rss, file_name);
        record.rss = Some(student);
        Ok(record.clone())
    }

    fn save_wac(&self, file_name: &str, student: StudentWac) -> ServiceResult<StudentRecord> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let record = guard.upsert(&student.email, SchemaKind::Wac, file_name);
        record.wac = Some(student);
        Ok(record.clone())
    }
}
