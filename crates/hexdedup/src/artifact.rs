//! Feature table artifacts as GeoParquet.
//!
//! Attribute columns are written in table order, followed by a WKB
//! `geometry` column. The file's key/value metadata carries a `geo` entry
//! naming the geometry column, its encoding and its CRS.

use crate::config::DedupConfig;
use crate::feature::{Feature, FeatureTable};
use arrow::array::{ArrayRef, BinaryArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use geo_types::Geometry;
use hexdedup_core::geometry::{decode_value, encode};
use hexdedup_core::value::build_array;
use hexdedup_core::{Column, ColumnValue, Crs, DedupError, Result, ValueKind};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Name of the geometry column in written artifacts.
pub const GEOMETRY_COLUMN: &str = "geometry";

const GEO_METADATA_KEY: &str = "geo";
const BATCH_SIZE: usize = 10_000;

#[derive(Debug, Serialize, Deserialize)]
struct GeoMetadata {
    version: String,
    primary_column: String,
    columns: BTreeMap<String, GeoColumn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoColumn {
    encoding: String,
    #[serde(default)]
    geometry_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<serde_json::Value>,
}

fn crs_to_json(crs: &Crs) -> serde_json::Value {
    match crs {
        Crs::Epsg(code) => serde_json::json!({
            "id": { "authority": "EPSG", "code": code }
        }),
        Crs::Proj(definition) => serde_json::Value::String(definition.clone()),
    }
}

fn crs_from_json(value: &serde_json::Value) -> Result<Crs> {
    if let Some(text) = value.as_str() {
        return text.parse();
    }
    let id = value.get("id");
    let authority = id.and_then(|v| v.get("authority")).and_then(|v| v.as_str());
    let code = id.and_then(|v| v.get("code")).and_then(serde_json::Value::as_u64);
    match (authority, code) {
        (Some(a), Some(code)) if a.eq_ignore_ascii_case("EPSG") => u32::try_from(code)
            .map(Crs::Epsg)
            .map_err(|_| DedupError::InvalidCrs(format!("EPSG code {code} out of range"))),
        _ => Err(DedupError::InvalidCrs(format!("unrecognised crs metadata: {value}"))),
    }
}

fn geometry_type_name(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

fn geo_metadata(table: &FeatureTable) -> Result<String> {
    let geometry_types: BTreeSet<&str> = table
        .features
        .iter()
        .map(|f| geometry_type_name(&f.geometry))
        .collect();

    let mut columns = BTreeMap::new();
    columns.insert(
        GEOMETRY_COLUMN.to_string(),
        GeoColumn {
            encoding: "WKB".to_string(),
            geometry_types: geometry_types.into_iter().map(str::to_string).collect(),
            crs: Some(crs_to_json(&table.crs)),
        },
    );
    let meta = GeoMetadata {
        version: "1.0.0".to_string(),
        primary_column: GEOMETRY_COLUMN.to_string(),
        columns,
    };
    Ok(serde_json::to_string(&meta)?)
}

/// Write a feature table, replacing any existing file.
pub fn write_feature_table<P: AsRef<Path>>(path: P, table: &FeatureTable) -> Result<()> {
    if table.columns.iter().any(|c| c.name == GEOMETRY_COLUMN) {
        return Err(DedupError::Config(format!(
            "attribute column '{GEOMETRY_COLUMN}' collides with the geometry column"
        )));
    }

    let mut fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(c.name.clone(), c.kind.data_type(), true))
        .collect();
    fields.push(Field::new(GEOMETRY_COLUMN, ValueKind::Binary.data_type(), false));
    let schema = Arc::new(Schema::new(fields));

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            GEO_METADATA_KEY.to_string(),
            geo_metadata(table)?,
        )]))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    for chunk in table.features.chunks(BATCH_SIZE) {
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len() + 1);
        for (i, column) in table.columns.iter().enumerate() {
            arrays.push(build_array(column.kind, chunk.iter().map(|f| &f.attributes[i])));
        }

        let wkb = chunk
            .iter()
            .map(|f| encode(&f.geometry))
            .collect::<Result<Vec<_>>>()?;
        arrays.push(Arc::new(BinaryArray::from_iter_values(wkb.iter())));

        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        writer.write(&batch)?;
    }

    writer.close()?;
    Ok(())
}

/// Read a feature table written by [`write_feature_table`].
///
/// Files without `geo` metadata are read with a `geometry` column and
/// labelled with the configured working CRS.
pub fn read_feature_table<P: AsRef<Path>>(path: P, config: &DedupConfig) -> Result<FeatureTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let geo = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|e| e.key == GEO_METADATA_KEY))
        .and_then(|e| e.value.as_deref())
        .map(serde_json::from_str::<GeoMetadata>)
        .transpose()?;

    let (primary, crs) = match &geo {
        Some(meta) => {
            let crs = match meta.columns.get(&meta.primary_column).and_then(|c| c.crs.as_ref()) {
                Some(value) => crs_from_json(value)?,
                None => {
                    tracing::warn!(crs = %config.working_crs, "artifact has no CRS, assuming working CRS");
                    config.working_crs.clone()
                }
            };
            (meta.primary_column.clone(), crs)
        }
        None => {
            tracing::warn!("artifact has no geo metadata");
            (GEOMETRY_COLUMN.to_string(), config.working_crs.clone())
        }
    };

    let schema = builder.schema().clone();
    let geom_idx = schema
        .index_of(&primary)
        .map_err(|_| DedupError::MissingColumn { column: primary.clone() })?;

    let mut columns = Vec::with_capacity(schema.fields().len().saturating_sub(1));
    let mut source_indices = Vec::with_capacity(columns.capacity());
    for (i, field) in schema.fields().iter().enumerate() {
        if i == geom_idx {
            continue;
        }
        columns.push(Column::new(
            field.name().clone(),
            ValueKind::from_data_type(field.name(), field.data_type())?,
        ));
        source_indices.push(i);
    }

    let id_idx = hexdedup_core::column_index(&columns, &config.id_column).ok_or_else(|| {
        DedupError::MissingColumn {
            column: config.id_column.clone(),
        }
    })?;

    let mut table = FeatureTable::new(columns, crs);
    let reader = builder.build()?;
    let mut row_num = 0;

    for batch in reader {
        let batch = batch?;
        let geom_array = batch.column(geom_idx);

        for row in 0..batch.num_rows() {
            row_num += 1;
            let attributes: Vec<ColumnValue> = source_indices
                .iter()
                .map(|&i| ColumnValue::from_array(batch.column(i).as_ref(), row))
                .collect();

            let hex_id = attributes[id_idx]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| DedupError::Parse {
                    line: row_num,
                    message: format!("{} is null", config.id_column),
                })?;
            let geometry = decode_value(&ColumnValue::from_array(geom_array.as_ref(), row))
                .map_err(|e| DedupError::Parse {
                    line: row_num,
                    message: e.to_string(),
                })?;

            table.features.push(Feature {
                hex_id,
                attributes,
                geometry,
            });
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};
    use hexdedup_core::BRITISH_NATIONAL_GRID;
    use tempfile::TempDir;

    fn sample_table() -> FeatureTable {
        let columns = vec![
            Column::new("hex_id", ValueKind::Utf8),
            Column::new("evi", ValueKind::Float64),
            Column::new("year", ValueKind::Int32),
            Column::new("tags", ValueKind::Binary),
        ];
        let square = polygon![(x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 3.0), (x: 0.0, y: 3.0), (x: 0.0, y: 0.0)];
        let mut table = FeatureTable::new(columns, BRITISH_NATIONAL_GRID);
        table.features.push(Feature {
            hex_id: "A".into(),
            attributes: vec![
                ColumnValue::String("A".into()),
                ColumnValue::Null,
                ColumnValue::Int32(2021),
                ColumnValue::Binary(vec![1, 2, 3]),
            ],
            geometry: Geometry::Polygon(square.clone()),
        });
        table.features.push(Feature {
            hex_id: "A".into(),
            attributes: vec![
                ColumnValue::String("A".into()),
                ColumnValue::Float64(0.7),
                ColumnValue::Null,
                ColumnValue::Null,
            ],
            geometry: Geometry::MultiPolygon(MultiPolygon::new(vec![square])),
        });
        table
    }

    #[test]
    fn test_feature_table_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("duplicates.parquet");
        let table = sample_table();

        write_feature_table(&path, &table).unwrap();
        let back = read_feature_table(&path, &DedupConfig::default()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_geo_metadata_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        write_feature_table(&path, &sample_table()).unwrap();

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        let kv = builder.metadata().file_metadata().key_value_metadata().unwrap();
        let geo = kv.iter().find(|e| e.key == "geo").unwrap();
        let json: serde_json::Value = serde_json::from_str(geo.value.as_deref().unwrap()).unwrap();

        assert_eq!(json["primary_column"], "geometry");
        assert_eq!(json["columns"]["geometry"]["encoding"], "WKB");
        assert_eq!(json["columns"]["geometry"]["crs"]["id"]["code"], 27700);
        assert_eq!(
            json["columns"]["geometry"]["geometry_types"],
            serde_json::json!(["MultiPolygon", "Polygon"])
        );
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.parquet");
        let mut table = sample_table();
        table.features.clear();

        write_feature_table(&path, &table).unwrap();
        let back = read_feature_table(&path, &DedupConfig::default()).unwrap();
        assert!(back.is_empty());
        assert_eq!(back.columns, table.columns);
    }

    #[test]
    fn test_missing_id_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        write_feature_table(&path, &sample_table()).unwrap();

        let mut config = DedupConfig::default();
        config.id_column = "cell".into();
        assert!(matches!(
            read_feature_table(&path, &config),
            Err(DedupError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_crs_json() {
        assert_eq!(crs_from_json(&crs_to_json(&BRITISH_NATIONAL_GRID)).unwrap(), BRITISH_NATIONAL_GRID);
        let proj = Crs::Proj("+proj=longlat +datum=WGS84 +no_defs".into());
        assert_eq!(crs_from_json(&crs_to_json(&proj)).unwrap(), proj);
        assert!(crs_from_json(&serde_json::json!({"name": "x"})).is_err());
    }
}
