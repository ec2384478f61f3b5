//! The two pipeline phases.
//!
//! Detection and resolution share nothing but the files named in
//! [`ArtifactPaths`], so either can be re-run on its own.

use crate::aggregate::StreamingAggregator;
use crate::artifact::{read_feature_table, write_feature_table};
use crate::config::{ArtifactPaths, DedupConfig};
use crate::duplicates::{
    read_duplicates_file, write_entries_file, write_pairs_file, DuplicateSetBuilder,
};
use crate::feature::FeatureTable;
use crate::fetch::BatchedRecordFetcher;
use crate::resolve::DuplicateResolver;
use crate::source::RecordSource;
use hexdedup_core::Result;
use serde::Serialize;
use std::time::Instant;

/// Options for [`Pipeline::detect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
    /// Reload the duplicate-id artifact instead of scanning the source.
    pub reuse_cached_duplicates: bool,
}

/// Summary of a detection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectReport {
    /// Ids scanned; `None` when the cached id artifact was reused.
    pub rows_scanned: Option<u64>,
    /// Distinct ids seen; `None` when the cached id artifact was reused.
    pub distinct_ids: Option<usize>,
    pub duplicate_ids: usize,
    /// Sum of counts over duplicate ids.
    pub expected_rows: u64,
    pub rows_fetched: usize,
    pub elapsed_secs: f64,
}

/// Summary of a resolution run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    pub rows_read: usize,
    pub groups_resolved: usize,
    pub null_quality_skipped: usize,
    pub elapsed_secs: f64,
}

/// Drives detection and resolution over one set of artifacts.
pub struct Pipeline {
    config: DedupConfig,
    paths: ArtifactPaths,
}

impl Pipeline {
    /// Create a pipeline, validating `config`.
    pub fn new(config: DedupConfig, paths: ArtifactPaths) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, paths })
    }

    #[must_use]
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    #[must_use]
    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Find duplicate ids and persist their rows.
    pub fn detect<S>(&self, source: &mut S, options: DetectOptions) -> Result<DetectReport>
    where
        S: RecordSource + ?Sized,
    {
        let start = Instant::now();
        let mut report = DetectReport::default();

        let entries = if options.reuse_cached_duplicates {
            let entries = read_duplicates_file(&self.paths.duplicate_ids)?;
            tracing::info!(
                path = %self.paths.duplicate_ids.display(),
                duplicates = entries.len(),
                "reusing cached duplicate ids"
            );
            entries
        } else {
            let mut aggregator = StreamingAggregator::new(&self.config);
            let stats = {
                let ids = source.scan_hex_ids(self.config.scan_batch_size)?;
                aggregator.consume(ids)?
            };
            tracing::info!(
                rows = stats.rows,
                distinct = stats.distinct,
                rate = format!("{:.0}", stats.throughput()),
                "id scan complete"
            );
            report.rows_scanned = Some(stats.rows);
            report.distinct_ids = Some(stats.distinct);

            let counts = aggregator.into_counts();
            write_pairs_file(&self.paths.all_counts, counts.iter())?;

            let entries = DuplicateSetBuilder::new(self.config.report_interval).build(&counts);
            write_entries_file(&self.paths.duplicate_ids, &entries)?;
            entries
        };

        report.duplicate_ids = entries.len();
        report.expected_rows = entries.iter().map(|e| e.count).sum();
        tracing::info!(duplicates = entries.len(), "duplicate ids found");

        let ids: Vec<String> = entries.into_iter().map(|e| e.hex_id).collect();
        let rows = if ids.is_empty() {
            // Nothing to fetch, but the artifact still needs the table's columns.
            source.fetch_by_hex_ids(&[])?
        } else {
            BatchedRecordFetcher::new(&self.config).fetch(source, &ids)?
        };
        report.rows_fetched = rows.len();
        if report.rows_fetched as u64 != report.expected_rows {
            tracing::warn!(
                fetched = report.rows_fetched,
                expected = report.expected_rows,
                "fetched row count differs from duplicate counts"
            );
        }

        let table = FeatureTable::from_rows(rows, &self.config)?;
        write_feature_table(&self.paths.duplicate_rows, &table)?;
        tracing::info!(
            path = %self.paths.duplicate_rows.display(),
            rows = table.len(),
            "duplicate rows written"
        );

        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Collapse each persisted duplicate group to one canonical row.
    pub fn resolve(&self) -> Result<ResolveReport> {
        let start = Instant::now();
        let table = read_feature_table(&self.paths.duplicate_rows, &self.config)?;
        let rows_read = table.len();

        let config = if table.crs == self.config.working_crs {
            self.config.clone()
        } else {
            tracing::warn!(
                artifact = %table.crs,
                configured = %self.config.working_crs,
                "artifact CRS differs from working CRS, resolving in the artifact CRS"
            );
            self.config.clone().with_working_crs(table.crs.clone())
        };

        let resolver = DuplicateResolver::new(&config, &table.columns)?;
        let resolved = resolver.resolve_table(table)?;
        write_feature_table(&self.paths.deduplicated, &resolved.table)?;
        tracing::info!(
            path = %self.paths.deduplicated.display(),
            groups = resolved.groups,
            skipped = resolved.null_quality_members,
            "deduplicated rows written"
        );

        Ok(ResolveReport {
            rows_read,
            groups_resolved: resolved.groups,
            null_quality_skipped: resolved.null_quality_members,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }
}
