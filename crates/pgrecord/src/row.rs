//! Row mapping traits and utilities

use crate::error::{DbError, DbResult};
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

/// Maps a database row to a Rust struct.
///
/// Mapping is explicit: each field names the column it reads, either through
/// a hand-written impl or `#[derive(FromRow)]`. Columns the statement returns
/// that the struct does not name are ignored; a named column that is missing
/// or fails to decode surfaces as [`DbError::Decode`] with the column name.
pub trait FromRow: Sized {
    /// Convert a database row into this type
    fn from_row(row: &Row) -> DbResult<Self>;
}

/// Extension trait for `tokio_postgres::Row` with error-mapped getters
pub trait RowExt {
    /// Get a column value by name, mapping failures to [`DbError::Decode`]
    fn try_get_column<'a, T: FromSql<'a>>(&'a self, column: &str) -> DbResult<T>;
}

impl RowExt for Row {
    fn try_get_column<'a, T: FromSql<'a>>(&'a self, column: &str) -> DbResult<T> {
        self.try_get(column)
            .map_err(|e| DbError::decode(column, e.to_string()))
    }
}
