//! Student records produced by the aggregation service.

use serde::{Deserialize, Serialize};

use crate::types::Schema;

/// Schema names the aggregator knows how to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaKind {
    #[serde(rename = "RSS")]
    Rss,
    #[serde(rename = "WAC")]
    Wac,
}

impl SchemaKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RSS" => Some(Self::Rss),
            "WAC" => Some(Self::Wac),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rss => "RSS",
            Self::Wac => "WAC",
        }
    }
}

/// A schema as kept by a [`super::SchemaStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub id: String,
    /// `"RSS"` or `"WAC"` for schemas the aggregator accepts.
    pub name: String,
    #[serde(flatten)]
    pub schema: Schema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub score: i64,
    pub finished_at: String,
    pub deadline: String,
}

/// One row of an RSS export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRss {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status_items: Vec<String>,
    pub application_date: String,
    pub projects: Vec<Project>,
}

/// One row of a WAC export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentWac {
    pub email: String,
    pub join_date: String,
    pub full_name: String,
    pub location: String,
    pub position: String,
    pub company: String,
    pub preferred_language: Vec<String>,
    pub receives_community_updates: bool,
    pub membership_type: String,
    pub attended_events: i64,
    pub registered_not_visited: i64,
    pub registered: i64,
}

/// A persisted student, keyed by email.
///
/// RSS and WAC saves for the same email land in the same record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: String,
    /// Schema name of the most recent save.
    pub source: String,
    /// File the most recent save came from.
    pub file_name: String,
    pub email: String,
    pub rss: Option<StudentRss>,
    pub wac: Option<StudentWac>,
}
