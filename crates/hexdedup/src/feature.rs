//! Rows with decoded geometry.

use crate::config::DedupConfig;
use crate::source::RowBatch;
use geo_types::Geometry;
use hexdedup_core::geometry::{decode_value, flatten_to_polygonal};
use hexdedup_core::{column_index, Column, ColumnValue, Crs, DedupError, Result};

/// One dataset row: id, attributes in column order, and geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub hex_id: String,
    pub attributes: Vec<ColumnValue>,
    pub geometry: Geometry<f64>,
}

/// Features sharing one attribute schema and one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Attribute columns; the geometry is held separately.
    pub columns: Vec<Column>,
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl FeatureTable {
    pub fn new(columns: Vec<Column>, crs: Crs) -> Self {
        Self {
            columns,
            features: Vec::new(),
            crs,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_index(&self.columns, name)
    }

    /// Build from fetched rows, decoding the raw geometry column.
    ///
    /// The raw column is dropped from the attributes. Geometries are
    /// labelled with the working CRS.
    pub fn from_rows(batch: RowBatch, config: &DedupConfig) -> Result<Self> {
        let id_idx = column_index(&batch.columns, &config.id_column).ok_or_else(|| {
            DedupError::MissingColumn {
                column: config.id_column.clone(),
            }
        })?;
        let geom_idx = column_index(&batch.columns, &config.geometry_column).ok_or_else(|| {
            DedupError::MissingColumn {
                column: config.geometry_column.clone(),
            }
        })?;

        let mut columns = batch.columns;
        columns.remove(geom_idx);
        let mut table = FeatureTable::new(columns, config.working_crs.clone());
        table.features.reserve(batch.rows.len());

        for (i, mut row) in batch.rows.into_iter().enumerate() {
            let hex_id = row[id_idx]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| DedupError::Source(format!("row {i}: {} is not a string", config.id_column)))?;

            let raw = row.remove(geom_idx);
            let mut geometry = decode_value(&raw)
                .map_err(|e| DedupError::Geometry(format!("{hex_id} (row {i}): {e}")))?;
            if config.sanitize_geometries {
                geometry = flatten_to_polygonal(&geometry);
            }

            table.features.push(Feature {
                hex_id,
                attributes: row,
                geometry,
            });
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, polygon, GeometryCollection};
    use hexdedup_core::geometry::encode;
    use hexdedup_core::ValueKind;

    fn square() -> Geometry<f64> {
        Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)])
    }

    fn batch(geom: &Geometry<f64>) -> RowBatch {
        RowBatch {
            columns: vec![
                Column::new("hex_id", ValueKind::Utf8),
                Column::new("geom", ValueKind::Binary),
                Column::new("evi", ValueKind::Float64),
            ],
            rows: vec![vec![
                ColumnValue::String("A".into()),
                ColumnValue::Binary(encode(geom).unwrap()),
                ColumnValue::Float64(0.4),
            ]],
        }
    }

    #[test]
    fn test_from_rows_drops_raw_geometry() {
        let table = FeatureTable::from_rows(batch(&square()), &DedupConfig::default()).unwrap();

        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.column_index("evi"), Some(1));
        assert_eq!(table.column_index("geom"), None);
        assert_eq!(table.features[0].hex_id, "A");
        assert_eq!(table.features[0].attributes[1], ColumnValue::Float64(0.4));
        assert_eq!(table.features[0].geometry, square());
        assert_eq!(table.crs, hexdedup_core::BRITISH_NATIONAL_GRID);
    }

    #[test]
    fn test_from_rows_missing_geometry_column() {
        let mut b = batch(&square());
        b.columns[1].name = "shape".into();
        assert!(matches!(
            FeatureTable::from_rows(b, &DedupConfig::default()),
            Err(DedupError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_from_rows_bad_geometry() {
        let mut b = batch(&square());
        b.rows[0][1] = ColumnValue::Binary(vec![0x01, 0x03]);
        assert!(matches!(
            FeatureTable::from_rows(b, &DedupConfig::default()),
            Err(DedupError::Geometry(_))
        ));
    }

    #[test]
    fn test_sanitize_is_opt_in() {
        let gc = Geometry::GeometryCollection(GeometryCollection::new_from(vec![
            square(),
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]),
        ]));

        let kept = FeatureTable::from_rows(batch(&gc), &DedupConfig::default()).unwrap();
        assert!(matches!(kept.features[0].geometry, Geometry::GeometryCollection(_)));

        let config = DedupConfig::default().with_sanitize(true);
        let flat = FeatureTable::from_rows(batch(&gc), &config).unwrap();
        assert!(matches!(flat.features[0].geometry, Geometry::MultiPolygon(_)));
    }
}
