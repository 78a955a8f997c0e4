use serde_json::{Map, Value};
use std::fmt;

use crate::storage::{ObjectId, StoredObjectMetadata};

/// Selects metadata records. Every field that is set must match; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub id: Option<ObjectId>,
    pub filename: Option<String>,
    /// Equality matches against the object's custom metadata map
    pub metadata: Map<String, Value>,
}

/// What a read or delete addresses once a filter has been normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(ObjectId),
    Filename(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "id {}", id),
            Target::Filename(name) => write!(f, "filename '{}'", name),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: ObjectId) -> Self {
        Self::new().id(id)
    }

    pub fn by_filename(filename: impl Into<String>) -> Self {
        Self::new().filename(filename)
    }

    pub fn id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.filename.is_none() && self.metadata.is_empty()
    }

    /// Explicit id wins over filename.
    pub fn target(&self) -> Option<Target> {
        match (&self.id, &self.filename) {
            (Some(id), _) => Some(Target::Id(*id)),
            (None, Some(name)) => Some(Target::Filename(name.clone())),
            (None, None) => None,
        }
    }

    pub fn matches(&self, record: &StoredObjectMetadata) -> bool {
        if self.id.is_some_and(|id| id != record.id) {
            return false;
        }
        if self.filename.as_ref().is_some_and(|name| *name != record.filename) {
            return false;
        }
        if self.metadata.is_empty() {
            return true;
        }

        let Some(custom) = &record.metadata else {
            return false;
        };
        self.metadata
            .iter()
            .all(|(key, expected)| custom.get(key) == Some(expected))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest upload first
    #[default]
    Ascending,
    Descending,
}

/// Query options forwarded to the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// `None` and `Some(0)` both mean no limit
    pub limit: Option<usize>,
    pub skip: usize,
    pub sort: SortOrder,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Sort by upload date, then apply skip and limit.
    pub fn apply(&self, mut records: Vec<StoredObjectMetadata>) -> Vec<StoredObjectMetadata> {
        records.sort_by_key(|r| r.revision_key());
        if self.sort == SortOrder::Descending {
            records.reverse();
        }

        let limit = match self.limit {
            Some(0) | None => usize::MAX,
            Some(n) => n,
        };
        records.into_iter().skip(self.skip).take(limit).collect()
    }
}
