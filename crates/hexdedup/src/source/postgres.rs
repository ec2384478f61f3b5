//! PostgreSQL / PostGIS data source.

use super::{IdStream, RecordSource, RowBatch};
use crate::config::DedupConfig;
use hexdedup_core::{Column, ColumnValue, DedupError, Result, ValueKind};
use postgres::types::{FromSql, Type};
use postgres::{Client, NoTls, Portal, Row, Statement, Transaction};
use std::error::Error as StdError;

/// Dataset stored in a PostgreSQL table.
pub struct PostgresSource {
    client: Client,
    scan_sql: String,
    fetch_sql: String,
    fetch_cast_sql: String,
    fetch_statement: Option<(Statement, Vec<Column>)>,
}

impl PostgresSource {
    /// Connect to `url` and target the table named in `config`.
    pub fn connect(url: &str, config: &DedupConfig) -> Result<Self> {
        let client =
            Client::connect(url, NoTls).map_err(|e| DedupError::Connection(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing connection.
    pub fn with_client(client: Client, config: &DedupConfig) -> Self {
        let table = quote_qualified(&config.table);
        let id = quote_ident(&config.id_column);
        Self {
            client,
            scan_sql: format!("SELECT {id}::text FROM {table} WHERE {id} IS NOT NULL"),
            fetch_sql: fetch_sql(&table, &id, false),
            fetch_cast_sql: fetch_sql(&table, &id, true),
            fetch_statement: None,
        }
    }

    fn prepare_fetch(&mut self) -> Result<(Statement, Vec<Column>)> {
        if let Some(prepared) = &self.fetch_statement {
            return Ok(prepared.clone());
        }

        // Bare column comparison when the id binds as text. Other id types
        // are matched on their text form.
        let statement = match self.client.prepare(&self.fetch_sql) {
            Ok(statement) if statement.params().first().is_some_and(binds_as_text_array) => {
                statement
            }
            Ok(statement) => {
                tracing::warn!(
                    param_type = ?statement.params().first().map(Type::name),
                    "id column is not text typed, matching on its text form without an index"
                );
                self.client.prepare(&self.fetch_cast_sql)?
            }
            Err(e) => {
                tracing::debug!(error = %e, "bare id comparison rejected, casting to text");
                self.client.prepare(&self.fetch_cast_sql)?
            }
        };
        let columns: Vec<Column> = statement
            .columns()
            .iter()
            .map(|c| {
                let kind = kind_for_type(c.type_());
                if kind == ValueKind::Binary && *c.type_() != Type::BYTEA {
                    tracing::debug!(
                        column = c.name(),
                        pg_type = %c.type_(),
                        "carrying column as raw bytes"
                    );
                }
                Column::new(c.name(), kind)
            })
            .collect();

        self.fetch_statement = Some((statement.clone(), columns.clone()));
        Ok((statement, columns))
    }
}

impl RecordSource for PostgresSource {
    fn scan_hex_ids(&mut self, batch_size: usize) -> Result<IdStream<'_>> {
        let batch_size = i32::try_from(batch_size)
            .map_err(|_| DedupError::Config(format!("scan batch size {batch_size} too large")))?;

        let mut txn = self.client.transaction()?;
        let portal = txn.bind(self.scan_sql.as_str(), &[])?;
        Ok(Box::new(HexIdCursor {
            txn,
            portal,
            batch_size,
            buffer: Vec::new().into_iter(),
            done: false,
        }))
    }

    fn fetch_by_hex_ids(&mut self, hex_ids: &[String]) -> Result<RowBatch> {
        let (statement, columns) = self.prepare_fetch()?;
        let rows = self.client.query(&statement, &[&hex_ids])?;

        let mut batch = RowBatch::new(columns);
        batch.rows.reserve(rows.len());
        for row in &rows {
            batch.rows.push(read_row(row)?);
        }
        Ok(batch)
    }
}

/// Server-side cursor over the id column.
struct HexIdCursor<'a> {
    txn: Transaction<'a>,
    portal: Portal,
    batch_size: i32,
    buffer: std::vec::IntoIter<String>,
    done: bool,
}

impl HexIdCursor<'_> {
    fn refill(&mut self) -> Result<()> {
        let rows = self.txn.query_portal(&self.portal, self.batch_size)?;
        if rows.len() < self.batch_size as usize {
            self.done = true;
        }
        let ids = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.buffer = ids.into_iter();
        Ok(())
    }
}

impl Iterator for HexIdCursor<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.buffer.next() {
                return Some(Ok(id));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// Any column payload, uninterpreted.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn fetch_sql(table: &str, id: &str, cast_to_text: bool) -> String {
    let cast = if cast_to_text { "::text" } else { "" };
    format!("SELECT * FROM {table} WHERE {id}{cast} = ANY($1)")
}

/// Whether a `&[String]` parameter can bind to `ty` directly.
fn binds_as_text_array(ty: &Type) -> bool {
    [Type::TEXT_ARRAY, Type::VARCHAR_ARRAY, Type::BPCHAR_ARRAY, Type::NAME_ARRAY].contains(ty)
}

fn kind_for_type(ty: &Type) -> ValueKind {
    if *ty == Type::BOOL {
        ValueKind::Bool
    } else if *ty == Type::INT2 || *ty == Type::INT4 {
        ValueKind::Int32
    } else if *ty == Type::INT8 {
        ValueKind::Int64
    } else if *ty == Type::FLOAT4 {
        ValueKind::Float32
    } else if *ty == Type::FLOAT8 {
        ValueKind::Float64
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        ValueKind::Utf8
    } else {
        ValueKind::Binary
    }
}

fn read_row(row: &Row) -> Result<Vec<ColumnValue>> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = match kind_for_type(ty) {
            ValueKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(ColumnValue::Bool),
            ValueKind::Int32 if *ty == Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| ColumnValue::Int32(v.into())),
            ValueKind::Int32 => row.try_get::<_, Option<i32>>(idx)?.map(ColumnValue::Int32),
            ValueKind::Int64 => row.try_get::<_, Option<i64>>(idx)?.map(ColumnValue::Int64),
            ValueKind::Float32 => row.try_get::<_, Option<f32>>(idx)?.map(ColumnValue::Float32),
            ValueKind::Float64 => row.try_get::<_, Option<f64>>(idx)?.map(ColumnValue::Float64),
            ValueKind::Utf8 => row.try_get::<_, Option<String>>(idx)?.map(ColumnValue::String),
            ValueKind::Binary => row
                .try_get::<_, Option<RawBytes>>(idx)?
                .map(|raw| ColumnValue::Binary(raw.0)),
        };
        values.push(value.unwrap_or(ColumnValue::Null));
    }
    Ok(values)
}

/// Quote a single SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name, one part per `.`.
fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("hex_id"), "\"hex_id\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_qualified("public.national_dataset"), "\"public\".\"national_dataset\"");
    }

    #[test]
    fn test_kind_for_type() {
        assert_eq!(kind_for_type(&Type::INT2), ValueKind::Int32);
        assert_eq!(kind_for_type(&Type::FLOAT8), ValueKind::Float64);
        assert_eq!(kind_for_type(&Type::VARCHAR), ValueKind::Utf8);
        assert_eq!(kind_for_type(&Type::BYTEA), ValueKind::Binary);
        assert_eq!(kind_for_type(&Type::NUMERIC), ValueKind::Binary);
    }

    #[test]
    fn test_text_array_binding() {
        assert!(binds_as_text_array(&Type::TEXT_ARRAY));
        assert!(binds_as_text_array(&Type::VARCHAR_ARRAY));
        assert!(!binds_as_text_array(&Type::INT8_ARRAY));
        assert!(!binds_as_text_array(&Type::TEXT));
    }

    #[test]
    fn test_fetch_sql() {
        let table = quote_qualified("public.national_dataset");
        let id = quote_ident("hex_id");
        assert_eq!(
            fetch_sql(&table, &id, false),
            "SELECT * FROM \"public\".\"national_dataset\" WHERE \"hex_id\" = ANY($1)"
        );
        assert!(fetch_sql(&table, &id, true).ends_with("\"hex_id\"::text = ANY($1)"));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let config = DedupConfig::default();
        let result = PostgresSource::connect("postgres://hexdedup@127.0.0.1:1/none", &config);
        assert!(matches!(result, Err(DedupError::Connection(_))));
    }
}
