//! In-memory data source.

use super::{IdStream, RecordSource, RowBatch};
use hexdedup_core::{column_index, Column, ColumnValue, DedupError, Result};
use std::collections::HashSet;

/// A table held in memory.
pub struct MemorySource {
    table: RowBatch,
    id_index: usize,
    fetch_calls: usize,
}

impl MemorySource {
    /// Create a source over `columns` and `rows`, keyed by `id_column`.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<ColumnValue>>, id_column: &str) -> Result<Self> {
        let id_index = column_index(&columns, id_column).ok_or_else(|| DedupError::MissingColumn {
            column: id_column.to_string(),
        })?;
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(DedupError::Config(format!(
                "row {bad} has {} values for {} columns",
                rows[bad].len(),
                columns.len()
            )));
        }
        Ok(Self {
            table: RowBatch { columns, rows },
            id_index,
            fetch_calls: 0,
        })
    }

    /// Number of set-membership queries served so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn id_token(value: &ColumnValue, row: usize) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| DedupError::Source(format!(
        "row {row}: id is not a string ({value})"
    )))
}

impl RecordSource for MemorySource {
    fn scan_hex_ids(&mut self, _batch_size: usize) -> Result<IdStream<'_>> {
        let idx = self.id_index;
        Ok(Box::new(
            self.table
                .rows
                .iter()
                .enumerate()
                .map(move |(row, values)| id_token(&values[idx], row)),
        ))
    }

    fn fetch_by_hex_ids(&mut self, hex_ids: &[String]) -> Result<RowBatch> {
        self.fetch_calls += 1;
        let wanted: HashSet<&str> = hex_ids.iter().map(String::as_str).collect();

        let mut batch = RowBatch::new(self.table.columns.clone());
        for values in &self.table.rows {
            if values[self.id_index]
                .as_str()
                .is_some_and(|id| wanted.contains(id))
            {
                batch.rows.push(values.clone());
            }
        }
        Ok(batch)
    }
}
