//! Run configuration.
//!
//! Built once at startup and passed by reference to every component.

use hexdedup_core::{Crs, DedupError, Result, BRITISH_NATIONAL_GRID, WGS84};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for detection and resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Rows pulled per round trip during the full id scan.
    pub scan_batch_size: usize,
    /// Ids per set-membership query during the fetch.
    pub fetch_batch_size: usize,
    /// Rows between progress log lines.
    pub report_interval: usize,
    /// Source table, optionally schema-qualified.
    pub table: String,
    /// Column holding the H3 cell id.
    pub id_column: String,
    /// Column holding the encoded source geometry.
    pub geometry_column: String,
    /// Optional quality attribute used to gate resolution.
    pub quality_column: String,
    /// CRS of H3 boundaries.
    pub geodetic_crs: Crs,
    /// CRS of stored and output geometries.
    pub working_crs: Crs,
    /// Reduce fetched geometries to their polygonal parts.
    pub sanitize_geometries: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: 100_000,
            fetch_batch_size: 10_000,
            report_interval: 100_000,
            table: "national_dataset".to_string(),
            id_column: "hex_id".to_string(),
            geometry_column: "geom".to_string(),
            quality_column: "evi".to_string(),
            geodetic_crs: WGS84,
            working_crs: BRITISH_NATIONAL_GRID,
            sanitize_geometries: false,
        }
    }
}

impl DedupConfig {
    /// Set the source table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the scan batch size.
    #[must_use]
    pub fn with_scan_batch_size(mut self, n: usize) -> Self {
        self.scan_batch_size = n;
        self
    }

    /// Set the fetch batch size.
    #[must_use]
    pub fn with_fetch_batch_size(mut self, n: usize) -> Self {
        self.fetch_batch_size = n;
        self
    }

    /// Set the progress interval.
    #[must_use]
    pub fn with_report_interval(mut self, n: usize) -> Self {
        self.report_interval = n;
        self
    }

    /// Set the working CRS.
    #[must_use]
    pub fn with_working_crs(mut self, crs: Crs) -> Self {
        self.working_crs = crs;
        self
    }

    /// Enable or disable polygon-only sanitizing.
    #[must_use]
    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize_geometries = sanitize;
        self
    }

    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(DedupError::Config("scan batch size must be > 0".into()));
        }
        if self.fetch_batch_size == 0 {
            return Err(DedupError::Config("fetch batch size must be > 0".into()));
        }
        if self.report_interval == 0 {
            return Err(DedupError::Config("report interval must be > 0".into()));
        }
        if i32::try_from(self.scan_batch_size).is_err() {
            return Err(DedupError::Config(format!(
                "scan batch size {} exceeds {}",
                self.scan_batch_size,
                i32::MAX
            )));
        }
        for (what, name) in [
            ("table", &self.table),
            ("id column", &self.id_column),
            ("geometry column", &self.geometry_column),
        ] {
            if name.is_empty() {
                return Err(DedupError::Config(format!("{what} name is empty")));
            }
        }
        self.geodetic_crs.proj_string()?;
        self.working_crs.proj_string()?;
        Ok(())
    }
}

/// Locations of the persisted artifacts shared between phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Every id with its count (`hex_id,count`).
    pub all_counts: PathBuf,
    /// Ids with count > 1 (`hex_id,count`).
    pub duplicate_ids: PathBuf,
    /// Fetched duplicate rows with decoded geometry.
    pub duplicate_rows: PathBuf,
    /// One resolved row per duplicate id.
    pub deduplicated: PathBuf,
}

impl ArtifactPaths {
    /// Default file names under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            all_counts: dir.join("hex_ids.csv"),
            duplicate_ids: dir.join("duplicate_hex_ids.csv"),
            duplicate_rows: dir.join("duplicates.parquet"),
            deduplicated: dir.join("deduplicated.parquet"),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}
