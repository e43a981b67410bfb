use tracing::{error, info};

use crate::error::{EtlError, EtlResult};
use crate::metrics;
use crate::store::{Document, RowStore, UpdateDoc};
use crate::table::Table;

/// How upsert mode writes a matched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// Swap the whole stored document for the new record
    Replace,
    /// Overwrite only the fields present in the new record
    Merge,
}

/// Load strategy for a target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    /// Bulk-insert every row
    Insert,
    /// Per-row update-or-insert keyed on identity columns
    Upsert {
        identity_columns: Vec<String>,
        style: UpsertStyle,
    },
}

/// Outcome of a load step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    Inserted { count: u64, ids: Vec<String> },
    Upserted { updated: u64, inserted: u64 },
}

/// Writes typed tables into a row store collection.
#[derive(Debug)]
pub struct StoreLoader<R: RowStore> {
    store: R,
    collection: String,
    mode: LoadMode,
}

impl<R: RowStore> StoreLoader<R> {
    /// Loader that bulk-inserts every row.
    pub fn insert(store: R, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            mode: LoadMode::Insert,
        }
    }

    /// Loader that upserts each row, matching on the identity columns.
    ///
    /// The identity column set must be non-empty; it is also required to be a
    /// subset of the columns of any table handed to [`StoreLoader::load`].
    pub fn upsert(
        store: R,
        collection: impl Into<String>,
        identity_columns: Vec<String>,
        style: UpsertStyle,
    ) -> EtlResult<Self> {
        if identity_columns.is_empty() {
            return Err(EtlError::invalid_params(
                "upsert mode requires at least one identity column",
            ));
        }
        Ok(Self {
            store,
            collection: collection.into(),
            mode: LoadMode::Upsert {
                identity_columns,
                style,
            },
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mode(&self) -> &LoadMode {
        &self.mode
    }

    /// Loads a table into the target collection.
    ///
    /// An empty table is reported as no data, never as an empty write.
    pub async fn load(&self, table: &Table) -> EtlResult<Option<LoadReport>> {
        if table.is_empty() {
            info!("no rows to load into collection {}", self.collection);
            return Ok(None);
        }

        match &self.mode {
            LoadMode::Insert => self.load_insert(table).await.map(Some),
            LoadMode::Upsert {
                identity_columns,
                style,
            } => self
                .load_upsert(table, identity_columns, *style)
                .await
                .map(Some),
        }
    }

    async fn load_insert(&self, table: &Table) -> EtlResult<LoadReport> {
        let documents: Vec<Document> = table.rows().map(row_to_document).collect();

        info!(
            "now inserting {} rows into collection {}...",
            documents.len(),
            self.collection
        );
        let summary = self.store.insert_many(&self.collection, documents).await?;
        info!(
            "insert complete, inserted {} rows into collection {}",
            summary.inserted_count, self.collection
        );
        metrics::rows_inserted(&self.collection, summary.inserted_count);

        Ok(LoadReport::Inserted {
            count: summary.inserted_count,
            ids: summary.inserted_ids,
        })
    }

    async fn load_upsert(
        &self,
        table: &Table,
        identity_columns: &[String],
        style: UpsertStyle,
    ) -> EtlResult<LoadReport> {
        // Identity columns must exist in this table before any write happens.
        let missing: Vec<&String> = identity_columns
            .iter()
            .filter(|name| table.column(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::invalid_params(format!(
                "identity columns {:?} not present in table columns {:?}",
                missing,
                table.column_names()
            )));
        }

        info!(
            "now upserting {} rows into collection {}...",
            table.num_rows(),
            self.collection
        );

        let mut updated: u64 = 0;
        let mut inserted: u64 = 0;
        for row in table.rows() {
            let document = row_to_document(row);
            let filter: Document = identity_columns
                .iter()
                .map(|name| {
                    let value = document.get(name).cloned().unwrap_or(serde_json::Value::Null);
                    (name.clone(), value)
                })
                .collect();
            let update = match style {
                UpsertStyle::Replace => UpdateDoc::Replace(document),
                UpsertStyle::Merge => UpdateDoc::Set(document),
            };

            // Per-row upserts are independent; fail fast on the first store
            // error after recording progress made so far.
            let summary = match self
                .store
                .update_one(&self.collection, filter, update, true)
                .await
            {
                Ok(summary) => summary,
                Err(e) => {
                    error!(
                        "upsert into collection {} failed after {} updated, {} inserted: {}",
                        self.collection, updated, inserted, e
                    );
                    return Err(e);
                }
            };
            if summary.matched_count > 0 {
                updated += summary.matched_count;
            } else {
                inserted += 1;
            }
        }

        info!(
            "upsert into collection {} complete: {} updated, {} inserted",
            self.collection, updated, inserted
        );
        metrics::rows_upserted(&self.collection, updated, inserted);

        Ok(LoadReport::Upserted { updated, inserted })
    }
}

fn row_to_document(row: Vec<(&str, &crate::table::Cell)>) -> Document {
    row.into_iter()
        .map(|(name, cell)| (name.to_string(), cell.to_json()))
        .collect()
}
