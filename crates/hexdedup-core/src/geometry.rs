//! Geometry operations.
//!
//! Stateless helpers used by detection and resolution:
//! - WKB / EWKB decoding and WKB encoding
//! - H3 cell id to boundary polygon
//! - Reprojection between coordinate reference systems
//! - Polygon-only sanitizing of heterogeneous geometries
//!
//! All functions are pure; [`Reprojector`] only caches the parsed PROJ
//! definitions for a CRS pair.

use crate::crs::Crs;
use crate::error::{DedupError, Result};
use crate::value::ColumnValue;
use geo::{Area, MapCoords};
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use geozero::wkb::Ewkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use h3o::CellIndex;
use proj4rs::proj::Proj;

/// Decode a WKB or PostGIS EWKB payload.
pub fn decode(raw: &[u8]) -> Result<Geometry<f64>> {
    if raw.is_empty() {
        return Err(DedupError::Geometry("empty geometry payload".to_string()));
    }
    Ewkb(raw.to_vec())
        .to_geo()
        .map_err(|e| DedupError::Geometry(format!("malformed WKB: {e}")))
}

/// Decode a geometry column value.
///
/// Binary values are WKB/EWKB; text values are hex-encoded WKB, which is
/// how PostGIS renders geometries as text.
pub fn decode_value(value: &ColumnValue) -> Result<Geometry<f64>> {
    match value {
        ColumnValue::Binary(raw) => decode(raw),
        ColumnValue::String(text) => {
            let raw = hex::decode(text.trim())
                .map_err(|e| DedupError::Geometry(format!("invalid hex WKB: {e}")))?;
            decode(&raw)
        }
        ColumnValue::Null => Err(DedupError::Geometry("missing geometry".to_string())),
        other => Err(DedupError::Geometry(format!(
            "geometry column holds a non-geometry value: {other}"
        ))),
    }
}

/// Encode a geometry as 2D WKB.
pub fn encode(geom: &Geometry<f64>) -> Result<Vec<u8>> {
    geom.to_wkb(CoordDimensions::xy())
        .map_err(|e| DedupError::Geometry(format!("WKB encoding failed: {e}")))
}

/// Boundary polygon of an H3 cell, in WGS 84 longitude/latitude degrees.
pub fn cell_to_polygon(hex_id: &str) -> Result<Polygon<f64>> {
    let cell = hex_id
        .parse::<CellIndex>()
        .map_err(|e| DedupError::InvalidCell {
            hex_id: hex_id.to_string(),
            message: e.to_string(),
        })?;

    let mut ring: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|ll| Coord {
            x: ll.lng(),
            y: ll.lat(),
        })
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }

    Ok(Polygon::new(LineString::from(ring), vec![]))
}

/// Coordinate transform between two CRSs.
///
/// Geographic CRSs take and return degrees.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    identity: bool,
}

impl Reprojector {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        Ok(Self {
            source: parse_proj(source)?,
            target: parse_proj(target)?,
            identity: source == target,
        })
    }

    /// Transform one coordinate.
    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        if self.identity {
            return Ok(coord);
        }

        let mut point = if self.source.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| DedupError::Projection(e.to_string()))?;

        let (x, y) = if self.target.is_latlong() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(DedupError::Projection(format!(
                "({}, {}) has no finite image in the target CRS",
                coord.x, coord.y
            )));
        }
        Ok(Coord { x, y })
    }

    /// Transform every coordinate of a geometry.
    pub fn reproject(&self, geom: &Geometry<f64>) -> Result<Geometry<f64>> {
        if self.identity {
            return Ok(geom.clone());
        }
        geom.try_map_coords(|c| self.transform_coord(c))
    }
}

fn parse_proj(crs: &Crs) -> Result<Proj> {
    let definition = crs.proj_string()?;
    Proj::from_proj_string(&definition)
        .map_err(|e| DedupError::InvalidCrs(format!("{crs}: {e}")))
}

/// Reproject a geometry from `source` to `target`.
///
/// Builds a [`Reprojector`] per call; use one directly when transforming
/// many geometries between the same pair.
pub fn reproject(geom: &Geometry<f64>, source: &Crs, target: &Crs) -> Result<Geometry<f64>> {
    Reprojector::new(source, target)?.reproject(geom)
}

/// Keep only the polygonal parts of a geometry.
///
/// Polygons and multipolygons pass through unchanged. Rects and triangles
/// become polygons. A geometry collection becomes a multipolygon of its
/// non-empty polygonal members, flattened recursively. Anything else
/// becomes an empty polygon.
#[must_use]
pub fn flatten_to_polygonal(geom: &Geometry<f64>) -> Geometry<f64> {
    match geom {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => geom.clone(),
        Geometry::Rect(r) => Geometry::Polygon(r.to_polygon()),
        Geometry::Triangle(t) => Geometry::Polygon(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for member in gc {
                collect_polygons(member, &mut polygons);
            }
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        _ => Geometry::Polygon(empty_polygon()),
    }
}

fn collect_polygons(geom: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geom {
        Geometry::Polygon(p) => {
            if !is_empty_polygon(p) {
                out.push(p.clone());
            }
        }
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                collect_polygons(&Geometry::Polygon(p.clone()), out);
            }
        }
        Geometry::GeometryCollection(gc) => {
            for member in gc {
                collect_polygons(member, out);
            }
        }
        _ => {}
    }
}

fn empty_polygon() -> Polygon<f64> {
    Polygon::new(LineString::new(vec![]), vec![])
}

fn is_empty_polygon(p: &Polygon<f64>) -> bool {
    p.exterior().0.is_empty()
}

/// Unsigned planar area in CRS units.
#[must_use]
pub fn area(geom: &Geometry<f64>) -> f64 {
    geom.unsigned_area()
}
