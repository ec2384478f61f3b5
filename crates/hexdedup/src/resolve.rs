//! Duplicate group resolution.
//!
//! Each group of rows sharing a `hex_id` collapses to one canonical row.
//! The canonical row copies its attributes from one member and takes the H3
//! cell boundary, reprojected into the working CRS, as its geometry.
//!
//! Member selection:
//! 1. The first member is the initial candidate, whatever its quality value.
//! 2. Each later member without a quality value is skipped and reported.
//! 3. Any other later member replaces the candidate when its stored
//!    geometry has a strictly larger area.

use crate::config::DedupConfig;
use crate::feature::{Feature, FeatureTable};
use geo_types::Geometry;
use hexdedup_core::geometry::{area, cell_to_polygon};
use hexdedup_core::{column_index, Column, DedupError, Reprojector, Result};
use std::collections::BTreeMap;

/// Outcome of resolving one group.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGroup {
    /// The canonical row.
    pub record: Feature,
    /// Position of the member whose attributes were kept.
    pub chosen: usize,
    /// Positions of members skipped for a missing quality value.
    pub null_quality_positions: Vec<usize>,
}

/// A resolved table with per-run counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    pub table: FeatureTable,
    /// Groups resolved (one output row each).
    pub groups: usize,
    /// Members skipped across all groups for a missing quality value.
    pub null_quality_members: usize,
}

/// Group features by id, sorted by id, keeping file order within a group.
#[must_use]
pub fn group_by_hex_id(features: Vec<Feature>) -> BTreeMap<String, Vec<Feature>> {
    let mut groups: BTreeMap<String, Vec<Feature>> = BTreeMap::new();
    for feature in features {
        groups.entry(feature.hex_id.clone()).or_default().push(feature);
    }
    groups
}

/// Chooses the canonical row for each duplicate group.
pub struct DuplicateResolver {
    reprojector: Reprojector,
    quality_index: Option<usize>,
}

impl DuplicateResolver {
    /// Build a resolver for tables with the given attribute `columns`.
    pub fn new(config: &DedupConfig, columns: &[Column]) -> Result<Self> {
        let quality_index = column_index(columns, &config.quality_column);
        if quality_index.is_none() {
            tracing::warn!(
                column = %config.quality_column,
                "quality column absent; first member of each group will be kept"
            );
        }
        Ok(Self {
            reprojector: Reprojector::new(&config.geodetic_crs, &config.working_crs)?,
            quality_index,
        })
    }

    fn has_quality(&self, feature: &Feature) -> bool {
        self.quality_index
            .and_then(|i| feature.attributes.get(i))
            .is_some_and(|v| !v.is_missing())
    }

    /// Canonical geometry for `hex_id` in the working CRS.
    pub fn cell_geometry(&self, hex_id: &str) -> Result<Geometry<f64>> {
        let boundary = Geometry::Polygon(cell_to_polygon(hex_id)?);
        self.reprojector.reproject(&boundary)
    }

    /// Resolve one group to its canonical row.
    pub fn resolve_group(&self, hex_id: &str, mut members: Vec<Feature>) -> Result<ResolvedGroup> {
        if members.is_empty() {
            return Err(DedupError::EmptyGroup(hex_id.to_string()));
        }
        let geometry = self.cell_geometry(hex_id)?;

        let mut chosen = 0;
        let mut chosen_area = area(&members[0].geometry);
        let mut null_quality_positions = Vec::new();

        for (position, member) in members.iter().enumerate().skip(1) {
            if !self.has_quality(member) {
                tracing::info!(hex_id, position, "member has no quality value, skipping");
                null_quality_positions.push(position);
                continue;
            }
            let member_area = area(&member.geometry);
            if member_area > chosen_area {
                chosen = position;
                chosen_area = member_area;
            }
        }

        let attributes = members.swap_remove(chosen).attributes;
        Ok(ResolvedGroup {
            record: Feature {
                hex_id: hex_id.to_string(),
                attributes,
                geometry,
            },
            chosen,
            null_quality_positions,
        })
    }

    /// Resolve every group in `table`, one output row per distinct id.
    pub fn resolve_table(&self, table: FeatureTable) -> Result<ResolvedTable> {
        let FeatureTable {
            columns,
            features,
            crs,
        } = table;

        let groups = group_by_hex_id(features);
        let mut out = FeatureTable::new(columns, crs);
        out.features.reserve(groups.len());
        let mut null_quality_members = 0;

        for (hex_id, members) in groups {
            let resolved = self.resolve_group(&hex_id, members)?;
            null_quality_members += resolved.null_quality_positions.len();
            out.features.push(resolved.record);
        }

        Ok(ResolvedTable {
            groups: out.len(),
            table: out,
            null_quality_members,
        })
    }
}
