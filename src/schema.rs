//! Schema-driven decoding of wire result sets into typed tables.
//!
//! The remote service returns every cell as an optional string alongside a
//! schema of declared column types. Decoding maps each declared type to a
//! native cell type; TIMESTAMP columns are decoded as numeric seconds since
//! the epoch first, then converted column-wise to native UTC instants in a
//! dedicated second pass.

use chrono::DateTime;

use crate::error::{EtlError, EtlResult};
use crate::table::{Cell, Column, ColumnType, Table};

/// One row of a wire result set: a string-encoded value or null per column.
pub type WireRow = Vec<Option<String>>;

/// Column type as declared by the remote query service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl FieldType {
    /// Maps a declared type name to a field type, if recognized.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared {
            "STRING" => Some(FieldType::String),
            "INTEGER" => Some(FieldType::Integer),
            "FLOAT" => Some(FieldType::Float),
            "BOOLEAN" => Some(FieldType::Boolean),
            "TIMESTAMP" => Some(FieldType::Timestamp),
            _ => None,
        }
    }

    /// The native column type this field decodes to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            FieldType::String => ColumnType::String,
            FieldType::Integer => ColumnType::Integer,
            FieldType::Float => ColumnType::Float,
            FieldType::Boolean => ColumnType::Boolean,
            FieldType::Timestamp => ColumnType::Timestamp,
        }
    }
}

/// A named, typed column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

/// Ordered column declarations for a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema from (name, declared type) pairs as reported by the
    /// remote service.
    ///
    /// Fails on any declared type the mapper does not know; a column is never
    /// silently dropped or misread.
    pub fn from_declared(pairs: &[(String, String)]) -> EtlResult<Self> {
        let mut fields = Vec::with_capacity(pairs.len());
        for (name, declared) in pairs {
            let field_type = FieldType::from_declared(declared)
                .ok_or_else(|| EtlError::unsupported_column_type(name, declared))?;
            fields.push(Field {
                name: name.clone(),
                field_type,
            });
        }
        Ok(Self { fields })
    }
}

/// Decodes wire rows against a schema into a typed table.
pub fn build_table(schema: &Schema, rows: &[WireRow]) -> EtlResult<Table> {
    let mut columns = Vec::with_capacity(schema.fields.len());
    let mut timestamp_columns = Vec::new();

    for (index, field) in schema.fields.iter().enumerate() {
        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let raw = row.get(index).ok_or_else(|| {
                EtlError::invalid_data(format!(
                    "row has {} cells, expected {}",
                    row.len(),
                    schema.fields.len()
                ))
            })?;
            cells.push(decode_cell(field, raw.as_deref())?);
        }
        if field.field_type == FieldType::Timestamp {
            timestamp_columns.push(field.name.clone());
        }
        columns.push(Column::new(
            field.name.clone(),
            field.field_type.column_type(),
            cells,
        ));
    }

    let mut table = Table::new(columns)?;

    // Second pass: convert the temporary epoch-second cells of every
    // timestamp column into native UTC instants.
    for name in timestamp_columns {
        convert_timestamp_column(&mut table, &name)?;
    }

    Ok(table)
}

fn decode_cell(field: &Field, raw: Option<&str>) -> EtlResult<Cell> {
    let Some(value) = raw else {
        return Ok(Cell::Null);
    };
    match field.field_type {
        FieldType::String => Ok(Cell::String(value.to_string())),
        FieldType::Integer => value
            .parse::<i64>()
            .map(Cell::I64)
            .map_err(|_| malformed(field, value)),
        FieldType::Float => value
            .parse::<f64>()
            .map(Cell::F64)
            .map_err(|_| malformed(field, value)),
        FieldType::Boolean => value
            .parse::<bool>()
            .map(Cell::Bool)
            .map_err(|_| malformed(field, value)),
        // Epoch seconds until the dedicated conversion pass
        FieldType::Timestamp => value
            .parse::<f64>()
            .map(Cell::F64)
            .map_err(|_| malformed(field, value)),
    }
}

fn malformed(field: &Field, value: &str) -> EtlError {
    EtlError::invalid_data(format!(
        "column '{}': cannot decode '{}' as {:?}",
        field.name, value, field.field_type
    ))
}

fn convert_timestamp_column(table: &mut Table, name: &str) -> EtlResult<()> {
    let column = table
        .column(name)
        .ok_or_else(|| EtlError::invalid_data(format!("no column named '{}'", name)))?;

    let mut cells = Vec::with_capacity(column.cells.len());
    for cell in &column.cells {
        cells.push(match cell {
            Cell::Null => Cell::Null,
            Cell::F64(epoch) => Cell::Timestamp(epoch_to_instant(*epoch, name)?),
            other => {
                return Err(EtlError::invalid_data(format!(
                    "column '{}': unexpected intermediate cell {:?}",
                    name, other
                )))
            }
        });
    }

    table.replace_column(name, Column::new(name, ColumnType::Timestamp, cells))
}

pub(crate) fn epoch_to_instant(epoch: f64, column: &str) -> EtlResult<chrono::DateTime<chrono::Utc>> {
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).ok_or_else(|| {
        EtlError::invalid_data(format!(
            "column '{}': epoch value {} out of range",
            column, epoch
        ))
    })
}
