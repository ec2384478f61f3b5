//! Error types for hexdedup.

use thiserror::Error;

/// Result type alias for hexdedup operations.
pub type Result<T> = std::result::Result<T, DedupError>;

/// Errors that can occur while detecting or resolving duplicates.
#[derive(Error, Debug)]
pub enum DedupError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not reach the data source.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The data source failed mid-query.
    #[error("Data source error: {0}")]
    Source(String),

    /// Malformed line in a persisted artifact.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// An id token that cannot be written without quoting.
    #[error("Invalid id token {token:?}: {reason}")]
    InvalidToken { token: String, reason: &'static str },

    /// A required column is absent from a row batch or file.
    #[error("Column '{column}' not found")]
    MissingColumn { column: String },

    /// Column list changed between fetch batches.
    #[error("Schema mismatch in batch {batch}: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        batch: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A column holds a type this tool cannot carry through.
    #[error("Unsupported type for column '{column}': {data_type}")]
    UnsupportedType { column: String, data_type: String },

    /// Malformed or missing geometry payload.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Not a valid H3 cell index.
    #[error("Invalid cell id {hex_id:?}: {message}")]
    InvalidCell { hex_id: String, message: String },

    /// Unknown or unparsable coordinate reference system.
    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    /// Coordinate transform failure.
    #[error("Projection error: {0}")]
    Projection(String),

    /// A duplicate group with no members.
    #[error("Empty duplicate group for hex id {0:?}")]
    EmptyGroup(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),
}
