//! # hexdedup
//!
//! Duplicate `hex_id` detection and resolution for H3-indexed geospatial
//! datasets.
//!
//! A dataset row is keyed by an H3 cell id that should be unique but is
//! not. Detection scans every id once, counts occurrences, and persists
//! the rows of every id seen more than once. Resolution collapses each of
//! those groups to one canonical row whose geometry is the cell's own
//! boundary in the working CRS.
//!
//! ## Modules
//!
//! - [`source`]: data source trait with PostgreSQL and in-memory backends
//! - [`aggregate`]: single-pass id counting
//! - [`duplicates`]: duplicate selection and the id/count artifact
//! - [`fetch`]: batched row retrieval
//! - [`feature`] / [`artifact`]: decoded rows and their GeoParquet files
//! - [`resolve`]: per-group canonical row selection
//! - [`pipeline`]: the detect and resolve phases
//!
//! ## Example
//!
//! ```rust,no_run
//! use hexdedup::{ArtifactPaths, DedupConfig, DetectOptions, MemorySource, Pipeline};
//! # fn run(mut source: MemorySource) -> hexdedup::Result<()> {
//! let pipeline = Pipeline::new(DedupConfig::default(), ArtifactPaths::in_dir("out"))?;
//! let detected = pipeline.detect(&mut source, DetectOptions::default())?;
//! let resolved = pipeline.resolve()?;
//! println!("{} duplicate ids, {} groups resolved", detected.duplicate_ids, resolved.groups_resolved);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod artifact;
pub mod config;
pub mod duplicates;
pub mod feature;
pub mod fetch;
pub mod pipeline;
pub mod resolve;
pub mod source;

pub use aggregate::{AggregateStats, IdCounts, StreamingAggregator};
pub use artifact::{read_feature_table, write_feature_table};
pub use config::{ArtifactPaths, DedupConfig};
pub use duplicates::{
    find_duplicates, read_duplicates_file, read_pairs_file, write_pairs_file, DuplicateEntry,
    DuplicateSetBuilder,
};
pub use feature::{Feature, FeatureTable};
pub use fetch::BatchedRecordFetcher;
pub use hexdedup_core::{Crs, DedupError, Result};
pub use pipeline::{DetectOptions, DetectReport, Pipeline, ResolveReport};
pub use resolve::{group_by_hex_id, DuplicateResolver, ResolvedGroup};
pub use source::{MemorySource, RecordSource, RowBatch};

#[cfg(feature = "postgres")]
pub use source::PostgresSource;
