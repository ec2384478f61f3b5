//! # hexdedup-core
//!
//! Shared building blocks for hexdedup:
//! - Error types
//! - Typed column values and their Arrow mapping
//! - Coordinate reference systems
//! - Geometry operations (WKB, H3 boundaries, reprojection, sanitizing)

pub mod crs;
pub mod error;
pub mod geometry;
pub mod value;

pub use crs::{Crs, BRITISH_NATIONAL_GRID, WGS84};
pub use error::{DedupError, Result};
pub use geometry::Reprojector;
pub use value::{column_index, Column, ColumnValue, ValueKind};
