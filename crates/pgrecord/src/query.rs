//! Lightweight query type for hand-written SQL.
//!
//! Raw statements skip identifier validation entirely; the caller owns the
//! SQL text. Parameters still bind by name (`:param`) or position (`?`),
//! and a statement with no bound parameters runs exactly as written.

use crate::client::GenericClient;
use crate::error::DbResult;
use crate::exec::{self, Statement};
use crate::row::FromRow;
use crate::value::{Params, Value};
use tokio_postgres::Row;

/// A hand-written SQL statement with type-safe parameter binding.
///
/// # Example
///
/// ```ignore
/// use pgrecord::query;
///
/// let user: Option<User> = query("SELECT * FROM users WHERE id = :id")
///     .bind("id", user_id)
///     .fetch_opt_as(&conn)
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct Query {
    sql: String,
    params: Params,
}

/// Create a new query with the given SQL.
pub fn query(sql: impl Into<String>) -> Query {
    Query {
        sql: sql.into(),
        params: Params::new(),
    }
}

impl Query {
    /// Bind a named parameter. A leading `:` on the name is accepted.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Bind the next positional (`?`) parameter.
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value);
        self
    }

    fn statement(&self) -> Statement {
        Statement::new(self.sql.clone(), self.params.clone())
    }

    /// Execute the query and return all rows.
    pub async fn fetch_all(&self, conn: &impl GenericClient) -> DbResult<Vec<Row>> {
        exec::fetch(conn, &self.statement()).await
    }

    /// Execute the query and return all rows mapped to type T.
    pub async fn fetch_all_as<T: FromRow>(&self, conn: &impl GenericClient) -> DbResult<Vec<T>> {
        let rows = self.fetch_all(conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Execute the query and return at most one row.
    pub async fn fetch_opt(&self, conn: &impl GenericClient) -> DbResult<Option<Row>> {
        exec::fetch_opt(conn, &self.statement()).await
    }

    /// Execute the query and return at most one row mapped to type T.
    pub async fn fetch_opt_as<T: FromRow>(
        &self,
        conn: &impl GenericClient,
    ) -> DbResult<Option<T>> {
        let row = self.fetch_opt(conn).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, conn: &impl GenericClient) -> DbResult<u64> {
        exec::execute(conn, &self.statement()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_named_params() {
        let q = query("SELECT * FROM users WHERE id = :id").bind("id", 7);
        let stmt = q.statement();
        assert_eq!(stmt.params.get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn bind_accepts_colon_prefix() {
        let q = query("SELECT * FROM users WHERE id = :id").bind(":id", 7);
        assert_eq!(q.statement().params.get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn keeps_sql_untouched() {
        let q = query("SELECT * FROM sessions WHERE expires_at < NOW()");
        assert_eq!(
            q.statement().sql,
            "SELECT * FROM sessions WHERE expires_at < NOW()"
        );
        assert!(q.statement().params.is_empty());
    }
}
