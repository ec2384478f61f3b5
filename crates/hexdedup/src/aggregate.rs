//! Streaming occurrence counting.
//!
//! Consumes the id stream once and keeps only a map from id to count, so
//! memory grows with the number of distinct ids rather than the number of
//! rows.
//!
//! ## Usage
//!
//! ```rust
//! use hexdedup::aggregate::StreamingAggregator;
//! use hexdedup::config::DedupConfig;
//!
//! let mut agg = StreamingAggregator::new(&DedupConfig::default());
//! let ids = ["a", "b", "a"].iter().map(|s| Ok(s.to_string()));
//! let stats = agg.consume(ids).unwrap();
//! assert_eq!(stats.rows, 3);
//! assert_eq!(agg.counts().get("a"), 2);
//! ```

use crate::config::DedupConfig;
use hexdedup_core::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Instant;

/// Occurrence count per id, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdCounts(IndexMap<String, u64>);

impl IdCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence.
    pub fn increment(&mut self, hex_id: &str) {
        if let Some(n) = self.0.get_mut(hex_id) {
            *n += 1;
        } else {
            self.0.insert(hex_id.to_string(), 1);
        }
    }

    /// Count for `hex_id`, zero when never seen.
    #[must_use]
    pub fn get(&self, hex_id: &str) -> u64 {
        self.0.get(hex_id).copied().unwrap_or(0)
    }

    /// Number of distinct ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for IdCounts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Statistics from one counting pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    /// Ids consumed.
    pub rows: u64,
    /// Distinct ids seen.
    pub distinct: usize,
    /// Wall time in seconds.
    pub elapsed_secs: f64,
}

impl AggregateStats {
    /// Throughput in rows per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.rows as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Single-pass id counter.
pub struct StreamingAggregator {
    counts: IdCounts,
    rows: u64,
    report_interval: u64,
}

impl StreamingAggregator {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            counts: IdCounts::new(),
            rows: 0,
            report_interval: config.report_interval.max(1) as u64,
        }
    }

    /// Count one id.
    pub fn observe(&mut self, hex_id: &str) {
        self.counts.increment(hex_id);
        self.rows += 1;
    }

    /// Count every id in `ids`, stopping at the first stream error.
    pub fn consume<I>(&mut self, ids: I) -> Result<AggregateStats>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        let start = Instant::now();
        let rows_before = self.rows;

        for id in ids {
            self.observe(&id?);

            if self.rows % self.report_interval == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                tracing::info!(
                    rows = self.rows,
                    distinct = self.counts.len(),
                    rate = format!("{:.0}", (self.rows - rows_before) as f64 / elapsed.max(1e-9)),
                    "counting ids"
                );
            }
        }

        let stats = AggregateStats {
            rows: self.rows - rows_before,
            distinct: self.counts.len(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        tracing::debug!(rows = stats.rows, distinct = stats.distinct, "id scan finished");
        Ok(stats)
    }

    #[must_use]
    pub fn counts(&self) -> &IdCounts {
        &self.counts
    }

    #[must_use]
    pub fn into_counts(self) -> IdCounts {
        self.counts
    }
}
