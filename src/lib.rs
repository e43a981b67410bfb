//! ETL Batch - batch ETL from an asynchronous query warehouse to a
//! document-style row store.
//!
//! A pipeline renders a named query template with keyword parameters, runs
//! the query as a remote job, polls until the job completes, decodes the
//! columnar result into a typed table, applies declared column transforms,
//! and loads the rows into a store collection by bulk insert or per-row
//! upsert keyed on identity columns.
//!
//! The remote service, the row store, and the alert sink are narrow traits;
//! transport, authentication, and scheduling live outside this crate and are
//! injected at pipeline construction.

pub mod alert;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod table;
pub mod template;

pub use alert::{AlertSink, NoopAlert, WebhookAlerter};
pub use client::{
    CreateDisposition, DestinationTable, Job, JobClient, JobHandle, JobOutput, JobState,
    JobStatistics, JobStatus, QueryService, WriteDisposition,
};
pub use config::{AlertSettings, ClientSettings};
pub use error::{ErrorKind, EtlError, EtlResult};
pub use loader::{LoadMode, LoadReport, StoreLoader, UpsertStyle};
pub use pipeline::{
    exit_code, run, ColumnTransform, PipelineStages, RunOutcome, StagingPipeline, TimeWindow,
    WarehousePipeline,
};
pub use schema::{build_table, Field, FieldType, Schema, WireRow};
pub use store::{
    Document, FindQuery, InsertSummary, MemoryStore, RowStore, SortOrder, UpdateDoc, UpdateSummary,
};
pub use table::{Cell, Column, ColumnType, Table};
pub use template::{ParamValue, QueryParams, TemplateStore};
