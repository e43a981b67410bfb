//! Crate-wide error type.

use std::fmt;

/// Result alias used throughout the crate.
pub type EtlResult<T> = Result<T, EtlError>;

/// ETL error with a category, a message, and an optional source.
#[derive(Debug)]
pub struct EtlError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Categories of ETL errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No template registered under the requested name
    TemplateNotFound,
    /// A template placeholder could not be resolved
    TemplateRender,
    /// A remote job completed with an error payload
    RemoteJob,
    /// The remote schema declared a column type the mapper does not know
    UnsupportedColumnType,
    /// A wire cell could not be coerced to its declared type
    InvalidData,
    /// Caller-supplied parameters rejected before any remote call
    InvalidParams,
    /// The row store rejected an insert or upsert
    StoreWrite,
}

impl EtlError {
    /// Creates a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error with a source.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a template-not-found error.
    pub fn template_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::TemplateNotFound,
            format!("no template registered under '{}'", name),
        )
    }

    /// Creates a template render error.
    pub fn template_render(template: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::TemplateRender,
            format!("template '{}': {}", template, message.into()),
        )
    }

    /// Creates a remote job error.
    pub fn remote_job(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteJob, message)
    }

    /// Creates an unsupported column type error.
    pub fn unsupported_column_type(column: &str, declared: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedColumnType,
            format!("column '{}' has unsupported declared type '{}'", column, declared),
        )
    }

    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, message)
    }

    /// Creates an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Creates a store write error.
    pub fn store_write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreWrite, message)
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for EtlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
