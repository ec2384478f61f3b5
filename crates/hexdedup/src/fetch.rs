//! Batched set-membership retrieval of full rows.

use crate::config::DedupConfig;
use crate::source::{RecordSource, RowBatch};
use hexdedup_core::{DedupError, Result};
use indexmap::IndexSet;

/// Fetches every row for a list of ids, a bounded chunk at a time.
pub struct BatchedRecordFetcher {
    batch_size: usize,
}

impl BatchedRecordFetcher {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            batch_size: config.fetch_batch_size.max(1),
        }
    }

    /// Fetch rows for `hex_ids`, concatenated in batch order.
    ///
    /// Repeated ids are requested once, at their first position. The column list comes from the first batch; every later batch must
    /// match it exactly.
    pub fn fetch<S>(&self, source: &mut S, hex_ids: &[String]) -> Result<RowBatch>
    where
        S: RecordSource + ?Sized,
    {
        let unique: Vec<String> = hex_ids
            .iter()
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        if unique.len() < hex_ids.len() {
            tracing::warn!(
                requested = hex_ids.len(),
                unique = unique.len(),
                "ignoring repeated ids in fetch list"
            );
        }

        let total = unique.len().div_ceil(self.batch_size);
        let mut out: Option<RowBatch> = None;

        for (i, chunk) in unique.chunks(self.batch_size).enumerate() {
            let batch = source.fetch_by_hex_ids(chunk)?;

            match out.as_mut() {
                None => out = Some(batch),
                Some(acc) => {
                    if acc.columns != batch.columns {
                        return Err(DedupError::SchemaMismatch {
                            batch: i,
                            expected: acc.column_names(),
                            actual: batch.column_names(),
                        });
                    }
                    acc.rows.extend(batch.rows);
                }
            }

            tracing::info!(
                batch = i + 1,
                batches = total,
                rows = out.as_ref().map_or(0, RowBatch::len),
                "fetching duplicate rows"
            );
        }

        Ok(out.unwrap_or_default())
    }
}
