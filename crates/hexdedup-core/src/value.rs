//! Scalar attribute values carried through detection and resolution.
//!
//! Rows arrive from the data source as typed columns and leave as Parquet
//! columns. [`ColumnValue`] is the common currency between the two, and
//! [`ValueKind`] pins the column type so an all-null column still has one.

use crate::error::{DedupError, Result};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int32Array,
    Int64Array, LargeBinaryArray, LargeStringArray, StringArray,
};
use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
}

impl ValueKind {
    /// Arrow type used when writing this column.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            ValueKind::Bool => DataType::Boolean,
            ValueKind::Int32 => DataType::Int32,
            ValueKind::Int64 => DataType::Int64,
            ValueKind::Float32 => DataType::Float32,
            ValueKind::Float64 => DataType::Float64,
            ValueKind::Utf8 => DataType::Utf8,
            ValueKind::Binary => DataType::Binary,
        }
    }

    /// Map an Arrow type read from a file.
    pub fn from_data_type(column: &str, data_type: &DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Boolean => ValueKind::Bool,
            DataType::Int8 | DataType::Int16 | DataType::Int32 => ValueKind::Int32,
            DataType::Int64 => ValueKind::Int64,
            DataType::Float32 => ValueKind::Float32,
            DataType::Float64 => ValueKind::Float64,
            DataType::Utf8 | DataType::LargeUtf8 => ValueKind::Utf8,
            DataType::Binary | DataType::LargeBinary => ValueKind::Binary,
            other => {
                return Err(DedupError::UnsupportedType {
                    column: column.to_string(),
                    data_type: format!("{other:?}"),
                })
            }
        })
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Find a column by name.
#[must_use]
pub fn column_index(columns: &[Column], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name == name)
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
}

impl ColumnValue {
    /// True for SQL/Arrow null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// True when the value is null or a floating-point NaN.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            ColumnValue::Null => true,
            ColumnValue::Float32(v) => v.is_nan(),
            ColumnValue::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a value from an Arrow array at the given row.
    ///
    /// Returns [`ColumnValue::Null`] when the array type does not match a
    /// supported kind; callers validate the schema up front with
    /// [`ValueKind::from_data_type`].
    #[must_use]
    pub fn from_array(array: &dyn Array, row: usize) -> Self {
        if array.is_null(row) {
            return ColumnValue::Null;
        }

        let any = array.as_any();
        match array.data_type() {
            DataType::Boolean => any
                .downcast_ref::<BooleanArray>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Bool(a.value(row))),
            DataType::Int8 => any
                .downcast_ref::<arrow::array::Int8Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Int32(a.value(row).into())),
            DataType::Int16 => any
                .downcast_ref::<arrow::array::Int16Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Int32(a.value(row).into())),
            DataType::Int32 => any
                .downcast_ref::<Int32Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Int32(a.value(row))),
            DataType::Int64 => any
                .downcast_ref::<Int64Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Int64(a.value(row))),
            DataType::Float32 => any
                .downcast_ref::<Float32Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Float32(a.value(row))),
            DataType::Float64 => any
                .downcast_ref::<Float64Array>()
                .map_or(ColumnValue::Null, |a| ColumnValue::Float64(a.value(row))),
            DataType::Utf8 => any.downcast_ref::<StringArray>().map_or(ColumnValue::Null, |a| {
                ColumnValue::String(a.value(row).to_string())
            }),
            DataType::LargeUtf8 => any
                .downcast_ref::<LargeStringArray>()
                .map_or(ColumnValue::Null, |a| {
                    ColumnValue::String(a.value(row).to_string())
                }),
            DataType::Binary => any.downcast_ref::<BinaryArray>().map_or(ColumnValue::Null, |a| {
                ColumnValue::Binary(a.value(row).to_vec())
            }),
            DataType::LargeBinary => any
                .downcast_ref::<LargeBinaryArray>()
                .map_or(ColumnValue::Null, |a| {
                    ColumnValue::Binary(a.value(row).to_vec())
                }),
            _ => ColumnValue::Null,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => f.write_str("NULL"),
            ColumnValue::Bool(v) => write!(f, "{v}"),
            ColumnValue::Int32(v) => write!(f, "{v}"),
            ColumnValue::Int64(v) => write!(f, "{v}"),
            ColumnValue::Float32(v) => write!(f, "{v}"),
            ColumnValue::Float64(v) => write!(f, "{v}"),
            ColumnValue::String(v) => f.write_str(v),
            ColumnValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Build an Arrow array for one column from a slice of rows.
///
/// Values whose kind does not match the column kind are written as null.
pub fn build_array<'a, I>(kind: ValueKind, values: I) -> ArrayRef
where
    I: Iterator<Item = &'a ColumnValue>,
{
    match kind {
        ValueKind::Bool => {
            let v: Vec<Option<bool>> = values
                .map(|v| match v {
                    ColumnValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Arc::new(BooleanArray::from(v))
        }
        ValueKind::Int32 => {
            let v: Vec<Option<i32>> = values
                .map(|v| match v {
                    ColumnValue::Int32(n) => Some(*n),
                    _ => None,
                })
                .collect();
            Arc::new(Int32Array::from(v))
        }
        ValueKind::Int64 => {
            let v: Vec<Option<i64>> = values
                .map(|v| match v {
                    ColumnValue::Int64(n) => Some(*n),
                    ColumnValue::Int32(n) => Some(i64::from(*n)),
                    _ => None,
                })
                .collect();
            Arc::new(Int64Array::from(v))
        }
        ValueKind::Float32 => {
            let v: Vec<Option<f32>> = values
                .map(|v| match v {
                    ColumnValue::Float32(n) => Some(*n),
                    _ => None,
                })
                .collect();
            Arc::new(Float32Array::from(v))
        }
        ValueKind::Float64 => {
            let v: Vec<Option<f64>> = values
                .map(|v| match v {
                    ColumnValue::Float64(n) => Some(*n),
                    ColumnValue::Float32(n) => Some(f64::from(*n)),
                    _ => None,
                })
                .collect();
            Arc::new(Float64Array::from(v))
        }
        ValueKind::Utf8 => {
            let v: Vec<Option<&str>> = values.map(ColumnValue::as_str).collect();
            Arc::new(StringArray::from(v))
        }
        ValueKind::Binary => {
            let v: Vec<Option<&[u8]>> = values
                .map(|v| match v {
                    ColumnValue::Binary(b) => Some(b.as_slice()),
                    _ => None,
                })
                .collect();
            Arc::new(BinaryArray::from_opt_vec(v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_includes_nan() {
        assert!(ColumnValue::Null.is_missing());
        assert!(ColumnValue::Float64(f64::NAN).is_missing());
        assert!(ColumnValue::Float32(f32::NAN).is_missing());
        assert!(!ColumnValue::Float64(0.0).is_missing());
        assert!(!ColumnValue::String(String::new()).is_missing());
    }

    #[test]
    fn test_array_values_and_nulls() {
        let values = vec![
            ColumnValue::Float64(0.5),
            ColumnValue::Null,
            ColumnValue::String("wrong kind".into()),
        ];
        let array = build_array(ValueKind::Float64, values.iter());

        assert_eq!(array.len(), 3);
        assert_eq!(
            ColumnValue::from_array(array.as_ref(), 0),
            ColumnValue::Float64(0.5)
        );
        assert!(ColumnValue::from_array(array.as_ref(), 1).is_null());
        assert!(ColumnValue::from_array(array.as_ref(), 2).is_null());
    }

    #[test]
    fn test_kind_from_data_type() {
        assert_eq!(
            ValueKind::from_data_type("a", &DataType::Int16).unwrap(),
            ValueKind::Int32
        );
        assert_eq!(
            ValueKind::from_data_type("b", &DataType::LargeUtf8).unwrap(),
            ValueKind::Utf8
        );
        assert!(matches!(
            ValueKind::from_data_type("c", &DataType::Date32),
            Err(DedupError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_column_index() {
        let columns = vec![
            Column::new("hex_id", ValueKind::Utf8),
            Column::new("evi", ValueKind::Float64),
        ];
        assert_eq!(column_index(&columns, "evi"), Some(1));
        assert_eq!(column_index(&columns, "geom"), None);
    }
}
