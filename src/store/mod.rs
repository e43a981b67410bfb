//! Row store contract and implementations.

pub mod memory_store;

pub use memory_store::MemoryStore;

use serde_json::Value as JsonValue;

use crate::error::EtlResult;

/// A persisted record: a mapping of field name to value.
pub type Document = serde_json::Map<String, JsonValue>;

/// Outcome of a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted_count: u64,
    pub inserted_ids: Vec<String>,
}

/// Outcome of a single update-or-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Number of pre-existing documents the filter matched
    pub matched_count: u64,
}

/// How an update rewrites a matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateDoc {
    /// Swap the whole stored document for this one
    Replace(Document),
    /// Overwrite only the fields present in this one
    Set(Document),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Read query: equality filter, single-field sort, row cap.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Option<Document>,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Document) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

/// Narrow interface over a document-style persistent store.
///
/// Implementations are expected to support concurrent independent write
/// operations without additional coordination.
pub trait RowStore: Send + Sync {
    /// Inserts all documents in one call.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> EtlResult<InsertSummary>;

    /// Updates the first document matching `filter`, inserting the update
    /// body as a new document when nothing matches and `upsert` is set.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateDoc,
        upsert: bool,
    ) -> EtlResult<UpdateSummary>;

    /// Drops a collection and everything in it.
    async fn drop_collection(&self, collection: &str) -> EtlResult<()>;

    /// Reads documents matching a query.
    async fn find(&self, collection: &str, query: FindQuery) -> EtlResult<Vec<Document>>;
}
