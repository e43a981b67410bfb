//! The extract-transform-load stage machine.
//!
//! Pipelines implement the three stages behind [`PipelineStages`]; the
//! non-overridable [`run`] driver composes them and short-circuits the whole
//! run when extraction yields no data, so transform and load never see an
//! empty batch.

use chrono::{DateTime, Duration as TimeDelta, NaiveDateTime, TimeZone, Utc};
use tracing::{error, info};

use crate::alert::{AlertSink, NoopAlert};
use crate::client::{DestinationTable, JobClient, QueryService};
use crate::error::{EtlError, EtlResult};
use crate::loader::{LoadReport, StoreLoader};
use crate::metrics;
use crate::schema::{self, Schema};
use crate::store::RowStore;
use crate::table::{Cell, Column, ColumnType, Table};
use crate::template::{QueryParams, TemplateStore};

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Extraction found zero rows; later stages were not invoked
    NoData,
    Completed(LoadReport),
}

impl RunOutcome {
    pub fn is_no_data(&self) -> bool {
        matches!(self, RunOutcome::NoData)
    }
}

/// The three pipeline stages.
///
/// `extract` returns `None` when the query produced no rows; `load` returns
/// `None` when handed nothing worth writing. Retries are not a pipeline
/// concern; an external invoker re-runs the whole pipeline if it wants them.
pub trait PipelineStages {
    /// Pipeline name used in logs and metrics.
    fn name(&self) -> &str;

    async fn extract(&self, params: &QueryParams) -> EtlResult<Option<Table>>;

    fn transform(&self, table: Table) -> EtlResult<Table>;

    async fn load(&self, table: Table) -> EtlResult<Option<LoadReport>>;
}

/// Drives extract → transform → load.
///
/// If extraction yields no data the run returns [`RunOutcome::NoData`]
/// immediately without invoking transform or load.
pub async fn run<P: PipelineStages>(pipeline: &P, params: &QueryParams) -> EtlResult<RunOutcome> {
    let name = pipeline.name().to_string();
    metrics::pipeline_run_started(&name);
    let timer = metrics::Timer::start();
    info!("beginning {} run ({})", name, params);

    let result = drive(pipeline, params).await;
    match &result {
        Ok(RunOutcome::NoData) => {
            metrics::pipeline_no_data(&name);
            info!("{} run complete, no data", name);
        }
        Ok(RunOutcome::Completed(report)) => {
            info!("{} run complete: {:?}", name, report);
        }
        Err(e) => {
            metrics::pipeline_error(&name, &format!("{:?}", e.kind));
            error!("{} run failed ({}): {}", name, params, e);
        }
    }
    metrics::pipeline_run_duration(&name, timer.elapsed_secs());

    result
}

async fn drive<P: PipelineStages>(pipeline: &P, params: &QueryParams) -> EtlResult<RunOutcome> {
    let Some(table) = pipeline.extract(params).await? else {
        return Ok(RunOutcome::NoData);
    };
    let table = pipeline.transform(table)?;
    match pipeline.load(table).await? {
        Some(report) => Ok(RunOutcome::Completed(report)),
        None => Ok(RunOutcome::NoData),
    }
}

/// Process exit code for a standalone pipeline invocation: zero on success
/// or no data, non-zero otherwise.
pub fn exit_code(result: &EtlResult<RunOutcome>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// A declared reshaping of one column, applied during the transform stage.
///
/// Transforms are configured per pipeline at construction; nothing is ever
/// inferred from column naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTransform {
    /// Split delimiter-joined text into a string array
    SplitText { delimiter: char },
    /// Cast epoch seconds or `YYYY-MM-DDTHH:MM:SS` text to a UTC instant
    ToTimestamp,
}

impl ColumnTransform {
    pub fn apply(&self, column: &Column) -> EtlResult<Column> {
        let mut cells = Vec::with_capacity(column.cells.len());
        let column_type = match self {
            ColumnTransform::SplitText { .. } => ColumnType::StringArray,
            ColumnTransform::ToTimestamp => ColumnType::Timestamp,
        };
        for cell in &column.cells {
            cells.push(self.apply_cell(cell, &column.name)?);
        }
        Ok(Column::new(column.name.clone(), column_type, cells))
    }

    fn apply_cell(&self, cell: &Cell, column: &str) -> EtlResult<Cell> {
        if cell.is_null() {
            return Ok(Cell::Null);
        }
        match self {
            ColumnTransform::SplitText { delimiter } => match cell {
                Cell::String(text) => Ok(Cell::StringArray(
                    text.split(*delimiter).map(str::to_string).collect(),
                )),
                other => Err(EtlError::invalid_data(format!(
                    "column '{}': cannot split non-text cell {:?}",
                    column, other
                ))),
            },
            ColumnTransform::ToTimestamp => match cell {
                Cell::Timestamp(ts) => Ok(Cell::Timestamp(*ts)),
                Cell::I64(epoch) => Ok(Cell::Timestamp(schema::epoch_to_instant(
                    *epoch as f64,
                    column,
                )?)),
                Cell::F64(epoch) => Ok(Cell::Timestamp(schema::epoch_to_instant(*epoch, column)?)),
                Cell::String(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                    .map(|naive| Cell::Timestamp(Utc.from_utc_datetime(&naive)))
                    .map_err(|_| {
                        EtlError::invalid_data(format!(
                            "column '{}': cannot parse '{}' as a timestamp",
                            column, text
                        ))
                    }),
                other => Err(EtlError::invalid_data(format!(
                    "column '{}': cannot cast cell {:?} to a timestamp",
                    column, other
                ))),
            },
        }
    }
}

/// A validated UTC extraction window, inclusive of start and exclusive of
/// end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Rejects windows whose start lies after their end, before any remote
    /// call is made.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> EtlResult<Self> {
        if start > end {
            return Err(EtlError::invalid_params(format!(
                "window start {} cannot be after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole hour preceding `now`.
    pub fn previous_hour(now: DateTime<Utc>) -> Self {
        let secs = now.timestamp();
        let end = DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(now);
        Self {
            start: end - TimeDelta::hours(1),
            end,
        }
    }

    /// The window as `start`/`end` query parameters.
    pub fn params(&self) -> QueryParams {
        QueryParams::new().set("start", self.start).set("end", self.end)
    }
}

/// Pipeline that extracts from the remote warehouse and loads into a row
/// store collection.
pub struct WarehousePipeline<S: QueryService, R: RowStore, A: AlertSink = NoopAlert> {
    name: String,
    template_name: String,
    templates: TemplateStore,
    client: JobClient<S, A>,
    loader: StoreLoader<R>,
    transforms: Vec<(String, ColumnTransform)>,
}

impl<S: QueryService, R: RowStore, A: AlertSink> WarehousePipeline<S, R, A> {
    pub fn new(
        name: impl Into<String>,
        template_name: impl Into<String>,
        templates: TemplateStore,
        client: JobClient<S, A>,
        loader: StoreLoader<R>,
    ) -> Self {
        Self {
            name: name.into(),
            template_name: template_name.into(),
            templates,
            client,
            loader,
            transforms: Vec::new(),
        }
    }

    /// Declares a transform for one result column. Transforms run in
    /// declaration order during the transform stage.
    pub fn with_transform(
        mut self,
        column: impl Into<String>,
        transform: ColumnTransform,
    ) -> Self {
        self.transforms.push((column.into(), transform));
        self
    }
}

impl<S: QueryService, R: RowStore, A: AlertSink> PipelineStages for WarehousePipeline<S, R, A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, params: &QueryParams) -> EtlResult<Option<Table>> {
        let query = self.templates.render(&self.template_name, params)?;
        let job = self.client.run_to_completion(&query, None).await?;
        if let Some(payload) = job.error() {
            // Already logged and alerted by the client; a failed job means
            // there is no usable data for this run.
            return Err(EtlError::remote_job(format!(
                "job {} for template '{}' ({}) completed with errors: {}",
                job.id(),
                self.template_name,
                params,
                payload
            )));
        }

        let output = self.client.fetch_result(&job).await?;
        if output.total_rows == 0 {
            info!(
                "template '{}' returned no rows, skipping remaining steps",
                self.template_name
            );
            return Ok(None);
        }

        let schema = Schema::from_declared(&output.fields)?;
        let table = schema::build_table(&schema, &output.rows)?;
        info!(
            "built table from job {}: {} rows, {} columns",
            job.id(),
            table.num_rows(),
            table.num_columns()
        );
        Ok(Some(table))
    }

    fn transform(&self, mut table: Table) -> EtlResult<Table> {
        for (column_name, transform) in &self.transforms {
            let column = table.column(column_name).ok_or_else(|| {
                EtlError::invalid_params(format!(
                    "transform declared for column '{}' absent from result columns {:?}",
                    column_name,
                    table.column_names()
                ))
            })?;
            let replaced = transform.apply(column)?;
            table.replace_column(column_name, replaced)?;
        }
        Ok(table)
    }

    async fn load(&self, table: Table) -> EtlResult<Option<LoadReport>> {
        self.loader.load(&table).await
    }
}

/// Pipeline that materializes query results into a warehouse-side staging
/// table and never reads rows back.
///
/// Its runs always finish as no-data: the destination table is the outcome.
pub struct StagingPipeline<S: QueryService, A: AlertSink = NoopAlert> {
    name: String,
    template_name: String,
    templates: TemplateStore,
    client: JobClient<S, A>,
    destination: DestinationTable,
}

impl<S: QueryService, A: AlertSink> StagingPipeline<S, A> {
    pub fn new(
        name: impl Into<String>,
        template_name: impl Into<String>,
        templates: TemplateStore,
        client: JobClient<S, A>,
        destination: DestinationTable,
    ) -> Self {
        Self {
            name: name.into(),
            template_name: template_name.into(),
            templates,
            client,
            destination,
        }
    }
}

impl<S: QueryService, A: AlertSink> PipelineStages for StagingPipeline<S, A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, params: &QueryParams) -> EtlResult<Option<Table>> {
        let query = self.templates.render(&self.template_name, params)?;
        let job = self
            .client
            .run_to_completion(&query, Some(&self.destination))
            .await?;
        if let Some(payload) = job.error() {
            return Err(EtlError::remote_job(format!(
                "job {} for template '{}' ({}) completed with errors: {}",
                job.id(),
                self.template_name,
                params,
                payload
            )));
        }
        info!(
            "job {} materialized into {}.{}",
            job.id(),
            self.destination.dataset,
            self.destination.table
        );
        Ok(None)
    }

    fn transform(&self, table: Table) -> EtlResult<Table> {
        Ok(table)
    }

    async fn load(&self, _table: Table) -> EtlResult<Option<LoadReport>> {
        Ok(None)
    }
}
