//! Data source abstraction.
//!
//! Provides a unified interface over the tabular store holding the dataset:
//! - In-memory tables (always available, used by tests and benches)
//! - PostgreSQL / PostGIS (with the `postgres` feature)
//!
//! Both support the two access patterns detection needs: a forward-only
//! scan of every id, and set-membership retrieval of full rows.

mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemorySource;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresSource;

use hexdedup_core::{Column, ColumnValue, Result};

/// Lazy, fallible stream of id tokens.
pub type IdStream<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// Rows returned by a set-membership query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Ordered column list, stable across batches of one table.
    pub columns: Vec<Column>,
    /// Row values, in column order.
    pub rows: Vec<Vec<ColumnValue>>,
}

impl RowBatch {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Trait for dataset sources.
///
/// Borrowing `&mut self` for the life of a scan keeps one cursor open at a
/// time on a shared connection.
pub trait RecordSource {
    /// Stream every id in the dataset, pulling `batch_size` rows per round trip.
    fn scan_hex_ids(&mut self, batch_size: usize) -> Result<IdStream<'_>>;

    /// Fetch every row whose id is one of `hex_ids`.
    ///
    /// Ids are opaque literals; implementations must never interpret them as
    /// query syntax.
    fn fetch_by_hex_ids(&mut self, hex_ids: &[String]) -> Result<RowBatch>;
}
