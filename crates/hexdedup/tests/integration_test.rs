//! Integration tests for hexdedup.
//!
//! Runs both pipeline phases end to end against an in-memory table, with
//! real artifact files in a temporary directory.

use geo_types::{Coord, Geometry, Rect};
use h3o::{LatLng, Resolution};
use hexdedup::{
    read_feature_table, read_pairs_file, ArtifactPaths, DedupConfig, DetectOptions,
    DuplicateEntry, DuplicateResolver, MemorySource, Pipeline,
};
use hexdedup_core::geometry::encode;
use hexdedup_core::{Column, ColumnValue, ValueKind};
use std::fs;
use tempfile::TempDir;

fn cell(lat: f64, lng: f64) -> String {
    LatLng::new(lat, lng)
        .unwrap()
        .to_cell(Resolution::Nine)
        .to_string()
}

/// Stored geometry: a 1 m tall strip of the given area near central London.
fn strip(area: f64) -> ColumnValue {
    let rect = Rect::new(
        Coord { x: 530_000.0, y: 180_000.0 },
        Coord { x: 530_000.0 + area, y: 180_001.0 },
    );
    ColumnValue::Binary(encode(&Geometry::Polygon(rect.to_polygon())).unwrap())
}

fn row(hex_id: &str, evi: Option<f64>, area: f64, tag: &str) -> Vec<ColumnValue> {
    vec![
        ColumnValue::String(hex_id.to_string()),
        evi.map_or(ColumnValue::Null, ColumnValue::Float64),
        ColumnValue::String(tag.to_string()),
        strip(area),
    ]
}

fn columns() -> Vec<Column> {
    vec![
        Column::new("hex_id", ValueKind::Utf8),
        Column::new("evi", ValueKind::Float64),
        Column::new("tag", ValueKind::Utf8),
        Column::new("geom", ValueKind::Binary),
    ]
}

struct Dataset {
    source: MemorySource,
    a: String,
    b: String,
    c: String,
    d: String,
}

/// Ids a, b, c, d with 3, 1, 2 and 3 rows.
fn dataset() -> Dataset {
    let a = cell(51.5074, -0.1278);
    let b = cell(52.2053, 0.1218);
    let c = cell(53.4808, -2.2426);
    let d = cell(55.9533, -3.1883);

    let rows = vec![
        row(&a, Some(0.3), 20.0, "a1"),
        row(&c, None, 50.0, "c1"),
        row(&a, Some(0.4), 60.0, "a2"),
        row(&b, Some(0.9), 10.0, "b1"),
        row(&d, Some(0.2), 10.0, "d1"),
        row(&c, Some(0.7), 30.0, "c2"),
        row(&a, None, 90.0, "a3"),
        row(&d, Some(0.5), 40.0, "d2"),
        row(&d, Some(0.5), 40.0, "d3"),
    ];
    let source = MemorySource::new(columns(), rows, "hex_id").unwrap();
    Dataset { source, a, b, c, d }
}

fn tag_of(features: &[hexdedup::Feature], hex_id: &str) -> String {
    features
        .iter()
        .find(|f| f.hex_id == hex_id)
        .map(|f| f.attributes[2].to_string())
        .unwrap()
}

#[test]
fn test_detect_then_resolve() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let config = DedupConfig::default().with_fetch_batch_size(2);
    let pipeline = Pipeline::new(config.clone(), paths.clone()).unwrap();
    let mut data = dataset();

    let detected = pipeline.detect(&mut data.source, DetectOptions::default()).unwrap();
    assert_eq!(detected.rows_scanned, Some(9));
    assert_eq!(detected.distinct_ids, Some(4));
    assert_eq!(detected.duplicate_ids, 3);
    assert_eq!(detected.expected_rows, 8);
    assert_eq!(detected.rows_fetched, 8);
    // Three duplicate ids in batches of two.
    assert_eq!(data.source.fetch_calls(), 2);

    // All-ids artifact, first-seen order.
    let all = fs::read_to_string(&paths.all_counts).unwrap();
    assert_eq!(
        all,
        format!("{},3\n{},2\n{},1\n{},3\n", data.a, data.c, data.b, data.d)
    );
    assert_eq!(
        read_pairs_file(&paths.duplicate_ids).unwrap(),
        vec![
            DuplicateEntry::new(data.a.clone(), 3),
            DuplicateEntry::new(data.c.clone(), 2),
            DuplicateEntry::new(data.d.clone(), 3),
        ]
    );

    let duplicates = read_feature_table(&paths.duplicate_rows, &config).unwrap();
    assert_eq!(duplicates.len(), 8);
    assert_eq!(duplicates.column_index("geom"), None);
    assert_eq!(duplicates.columns.len(), 3);

    let resolved = pipeline.resolve().unwrap();
    assert_eq!(resolved.rows_read, 8);
    assert_eq!(resolved.groups_resolved, 3);
    // Only a3 is skipped; c1 leads its group.
    assert_eq!(resolved.null_quality_skipped, 1);

    let output = read_feature_table(&paths.deduplicated, &config).unwrap();
    assert_eq!(output.len(), 3);
    assert_eq!(output.columns, duplicates.columns);
    assert_eq!(output.crs, duplicates.crs);

    let ids: Vec<&str> = output.features.iter().map(|f| f.hex_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    assert_eq!(tag_of(&output.features, &data.a), "a2");
    assert_eq!(tag_of(&output.features, &data.c), "c1");
    assert_eq!(tag_of(&output.features, &data.d), "d2");

    let resolver = DuplicateResolver::new(&config, &output.columns).unwrap();
    for feature in &output.features {
        let expected = resolver.cell_geometry(&feature.hex_id).unwrap();
        assert_eq!(feature.geometry, expected);
    }
}

#[test]
fn test_detect_reuses_cached_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let pipeline = Pipeline::new(DedupConfig::default(), paths.clone()).unwrap();
    let mut data = dataset();

    fs::write(&paths.duplicate_ids, format!("{},2\n", data.c)).unwrap();

    let detected = pipeline
        .detect(
            &mut data.source,
            DetectOptions {
                reuse_cached_duplicates: true,
            },
        )
        .unwrap();
    assert_eq!(detected.rows_scanned, None);
    assert_eq!(detected.duplicate_ids, 1);
    assert_eq!(detected.rows_fetched, 2);
    assert!(!paths.all_counts.exists());

    let resolved = pipeline.resolve().unwrap();
    assert_eq!(resolved.groups_resolved, 1);
}

#[test]
fn test_cached_repeated_id_fetched_once() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let config = DedupConfig::default().with_fetch_batch_size(1);
    let pipeline = Pipeline::new(config, paths.clone()).unwrap();
    let mut data = dataset();

    fs::write(
        &paths.duplicate_ids,
        format!("{a},3\n{c},2\n{a},3\n", a = data.a, c = data.c),
    )
    .unwrap();

    let detected = pipeline
        .detect(
            &mut data.source,
            DetectOptions {
                reuse_cached_duplicates: true,
            },
        )
        .unwrap();
    assert_eq!(detected.rows_fetched, 5);
    assert_eq!(data.source.fetch_calls(), 2);

    let resolved = pipeline.resolve().unwrap();
    assert_eq!(resolved.rows_read, 5);
    assert_eq!(resolved.groups_resolved, 2);
}

#[test]
fn test_cached_singleton_count_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let pipeline = Pipeline::new(DedupConfig::default(), paths.clone()).unwrap();
    let mut data = dataset();

    fs::write(&paths.duplicate_ids, format!("{},2\n{},1\n", data.c, data.b)).unwrap();
    let result = pipeline.detect(
        &mut data.source,
        DetectOptions {
            reuse_cached_duplicates: true,
        },
    );
    assert!(matches!(result, Err(hexdedup::DedupError::Parse { line: 2, .. })));
    assert_eq!(data.source.fetch_calls(), 0);
}

#[test]
fn test_cached_artifact_parse_error_aborts() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let pipeline = Pipeline::new(DedupConfig::default(), paths.clone()).unwrap();
    let mut data = dataset();

    fs::write(&paths.duplicate_ids, "not a pair\n").unwrap();
    let result = pipeline.detect(
        &mut data.source,
        DetectOptions {
            reuse_cached_duplicates: true,
        },
    );
    assert!(matches!(result, Err(hexdedup::DedupError::Parse { line: 1, .. })));
    assert!(!paths.duplicate_rows.exists());
}

#[test]
fn test_no_duplicates_writes_empty_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let pipeline = Pipeline::new(DedupConfig::default(), paths.clone()).unwrap();

    let rows = vec![
        row(&cell(51.5074, -0.1278), Some(0.1), 1.0, "x"),
        row(&cell(52.2053, 0.1218), Some(0.1), 1.0, "y"),
    ];
    let mut source = MemorySource::new(columns(), rows, "hex_id").unwrap();

    let detected = pipeline.detect(&mut source, DetectOptions::default()).unwrap();
    assert_eq!(detected.duplicate_ids, 0);
    assert_eq!(detected.rows_fetched, 0);
    assert_eq!(fs::read_to_string(&paths.duplicate_ids).unwrap(), "");

    let resolved = pipeline.resolve().unwrap();
    assert_eq!(resolved.groups_resolved, 0);
    let output = read_feature_table(&paths.deduplicated, pipeline.config()).unwrap();
    assert!(output.is_empty());
    assert_eq!(output.columns.len(), 3);
}

#[test]
fn test_malformed_geometry_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(temp_dir.path());
    let pipeline = Pipeline::new(DedupConfig::default(), paths.clone()).unwrap();

    let id = cell(51.5074, -0.1278);
    let mut bad = row(&id, Some(0.1), 1.0, "bad");
    bad[3] = ColumnValue::Binary(vec![0xde, 0xad]);
    let rows = vec![row(&id, Some(0.1), 1.0, "ok"), bad];
    let mut source = MemorySource::new(columns(), rows, "hex_id").unwrap();

    let result = pipeline.detect(&mut source, DetectOptions::default());
    assert!(matches!(result, Err(hexdedup::DedupError::Geometry(_))));
}
