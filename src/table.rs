use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};

use crate::error::{EtlError, EtlResult};

/// A single value in a table column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    StringArray(Vec<String>),
}

impl Cell {
    /// Whether this cell holds no value.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Converts this cell to its document representation.
    ///
    /// Timestamps become RFC 3339 UTC strings, the store's temporal
    /// representation.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Cell::Null => JsonValue::Null,
            Cell::Bool(b) => json!(b),
            Cell::I64(n) => json!(n),
            Cell::F64(n) => json!(n),
            Cell::String(s) => json!(s),
            Cell::Timestamp(ts) => json!(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Cell::StringArray(items) => json!(items),
        }
    }
}

/// Semantic type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    /// Produced only by column transforms, never by the wire schema
    StringArray,
}

/// A named, typed column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            column_type,
            cells,
        }
    }
}

/// An in-memory columnar result set.
///
/// Column count and per-column length are fixed at construction; every
/// timestamp-typed column holds native UTC instants by the time later
/// pipeline stages see the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table from columns, validating that all columns have the
    /// same length.
    pub fn new(columns: Vec<Column>) -> EtlResult<Self> {
        if let Some(first) = columns.first() {
            let expected = first.cells.len();
            for column in &columns {
                if column.cells.len() != expected {
                    return Err(EtlError::invalid_data(format!(
                        "column '{}' has {} rows, expected {}",
                        column.name,
                        column.cells.len(),
                        expected
                    )));
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns one row as (column name, cell) pairs in column order.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, &Cell)>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), &c.cells[index]))
                .collect(),
        )
    }

    /// Iterates over all rows as (column name, cell) pairs.
    pub fn rows(&self) -> impl Iterator<Item = Vec<(&str, &Cell)>> {
        (0..self.num_rows()).map(move |i| {
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), &c.cells[i]))
                .collect()
        })
    }

    /// Replaces a column in place, preserving the table's length invariant.
    pub fn replace_column(&mut self, name: &str, column: Column) -> EtlResult<()> {
        if column.cells.len() != self.num_rows() {
            return Err(EtlError::invalid_data(format!(
                "replacement for column '{}' has {} rows, expected {}",
                name,
                column.cells.len(),
                self.num_rows()
            )));
        }
        let slot = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| EtlError::invalid_data(format!("no column named '{}'", name)))?;
        *slot = column;
        Ok(())
    }
}
