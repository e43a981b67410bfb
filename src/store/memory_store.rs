use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::EtlResult;
use crate::store::{
    Document, FindQuery, InsertSummary, RowStore, SortOrder, UpdateDoc, UpdateSummary,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    document: Document,
}

/// In-memory row store.
///
/// Backs tests and local runs; collections live in a shared map behind an
/// async mutex, one generated id per inserted document.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<StoredDocument>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("creating in-memory row store");
        Self::default()
    }

    /// Number of documents currently in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().await;
        collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }
}

fn filter_matches(filter: &Document, document: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn compare_fields(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

impl RowStore for MemoryStore {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> EtlResult<InsertSummary> {
        let mut collections = self.collections.lock().await;
        let stored = collections.entry(collection.to_string()).or_default();

        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            let id = Uuid::new_v4().to_string();
            inserted_ids.push(id.clone());
            stored.push(StoredDocument { id, document });
        }

        Ok(InsertSummary {
            inserted_count: inserted_ids.len() as u64,
            inserted_ids,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateDoc,
        upsert: bool,
    ) -> EtlResult<UpdateSummary> {
        let mut collections = self.collections.lock().await;
        let stored = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = stored
            .iter_mut()
            .find(|entry| filter_matches(&filter, &entry.document))
        {
            match update {
                UpdateDoc::Replace(document) => existing.document = document,
                UpdateDoc::Set(fields) => {
                    for (field, value) in fields {
                        existing.document.insert(field, value);
                    }
                }
            }
            return Ok(UpdateSummary { matched_count: 1 });
        }

        if upsert {
            let document = match update {
                UpdateDoc::Replace(document) | UpdateDoc::Set(document) => document,
            };
            stored.push(StoredDocument {
                id: Uuid::new_v4().to_string(),
                document,
            });
        }

        Ok(UpdateSummary { matched_count: 0 })
    }

    async fn drop_collection(&self, collection: &str) -> EtlResult<()> {
        let mut collections = self.collections.lock().await;
        collections.remove(collection);
        Ok(())
    }

    async fn find(&self, collection: &str, query: FindQuery) -> EtlResult<Vec<Document>> {
        let collections = self.collections.lock().await;
        let mut results: Vec<Document> = collections
            .get(collection)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|entry| {
                        query
                            .filter
                            .as_ref()
                            .map(|f| filter_matches(f, &entry.document))
                            .unwrap_or(true)
                    })
                    .map(|entry| entry.document.clone())
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, order)) = &query.sort {
            results.sort_by(|a, b| {
                let ordering = compare_fields(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}
