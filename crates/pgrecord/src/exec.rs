//! Statement execution.
//!
//! The assembler renders SQL with named `:param` placeholders; the wire
//! protocol wants `$n` positions. This module owns that translation plus the
//! bind/execute cycle:
//!
//! - Named placeholders are numbered in first-occurrence order; repeated
//!   names share one position. Colons inside string literals, quoted
//!   identifiers, comments, and `::` casts are left alone.
//! - Positional statements use `?` markers, rebased to one-based `$n`.
//! - A statement with no parameters runs as-is.
//!
//! Every statement is logged at DEBUG under the `pgrecord.sql` target before
//! it touches the wire.

use crate::client::GenericClient;
use crate::error::{DbError, DbResult};
use crate::value::{Params, Value};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// An assembled statement: SQL text plus its parameter set.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A statement with no bound parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Params::new())
    }
}

/// Wire-ready SQL plus the values in `$n` order.
#[derive(Debug)]
struct Prepared<'a> {
    sql: String,
    values: Vec<&'a Value>,
}

impl Prepared<'_> {
    fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| *v as &(dyn ToSql + Sync))
            .collect()
    }
}

fn prepare(stmt: &Statement) -> DbResult<Prepared<'_>> {
    let named = stmt.params.named();
    let positional = stmt.params.positional();
    if !named.is_empty() && !positional.is_empty() {
        return Err(DbError::build(
            "statement mixes named and positional parameters",
        ));
    }
    if !named.is_empty() {
        rewrite_named(&stmt.sql, named)
    } else if !positional.is_empty() {
        rewrite_positional(&stmt.sql, positional)
    } else {
        Ok(Prepared {
            sql: stmt.sql.clone(),
            values: Vec::new(),
        })
    }
}

/// Returns the index just past an inert region (string literal, quoted
/// identifier, or comment) starting at `i`, or `None` if none starts here.
fn skip_inert(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        quote @ (b'\'' | b'"') => {
            let mut j = i + 1;
            while j < bytes.len() {
                if bytes[j] == quote {
                    // Doubled quote is an escape, not a terminator.
                    if j + 1 < bytes.len() && bytes[j + 1] == quote {
                        j += 2;
                        continue;
                    }
                    return Some(j + 1);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        b'-' if bytes.get(i + 1) == Some(&b'-') => {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j] != b'\n' {
                j += 1;
            }
            Some(j)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let mut j = i + 2;
            while j + 1 < bytes.len() {
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    return Some(j + 2);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        _ => None,
    }
}

fn rewrite_named<'a>(sql: &str, named: &'a [(String, Value)]) -> DbResult<Prepared<'a>> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut values: Vec<&'a Value> = Vec::new();
    let mut order: Vec<&'a str> = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_inert(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] != b':' {
            i += 1;
            continue;
        }
        // `::` cast
        if bytes.get(i + 1) == Some(&b':') {
            i += 2;
            continue;
        }
        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
            j += 1;
        }
        if j == start {
            i += 1;
            continue;
        }
        let name = &sql[start..j];
        let idx = match order.iter().position(|n| *n == name) {
            Some(pos) => pos + 1,
            None => {
                let (stored, value) = named
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(n, v)| (n.as_str(), v))
                    .ok_or_else(|| {
                        DbError::build(format!("no value bound for placeholder :{name}"))
                    })?;
                order.push(stored);
                values.push(value);
                order.len()
            }
        };
        out.push_str(&sql[last..i]);
        out.push('$');
        out.push_str(&idx.to_string());
        i = j;
        last = j;
    }
    out.push_str(&sql[last..]);

    let unused: Vec<&str> = named
        .iter()
        .map(|(n, _)| n.as_str())
        .filter(|n| !order.contains(n))
        .collect();
    if !unused.is_empty() {
        return Err(DbError::build(format!(
            "bound parameter(s) not used in statement: {}",
            unused.join(", ")
        )));
    }

    Ok(Prepared { sql: out, values })
}

fn rewrite_positional<'a>(sql: &str, positional: &'a [Value]) -> DbResult<Prepared<'a>> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut last = 0;
    let mut i = 0;
    let mut count = 0usize;

    while i < bytes.len() {
        if let Some(end) = skip_inert(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] != b'?' {
            i += 1;
            continue;
        }
        count += 1;
        out.push_str(&sql[last..i]);
        out.push('$');
        out.push_str(&count.to_string());
        i += 1;
        last = i;
    }
    out.push_str(&sql[last..]);

    if count != positional.len() {
        return Err(DbError::build(format!(
            "statement has {} positional marker(s) but {} bound value(s)",
            count,
            positional.len()
        )));
    }

    Ok(Prepared {
        sql: out,
        values: positional.iter().collect(),
    })
}

fn log_statement(sql: &str, param_count: usize) {
    tracing::debug!(target: "pgrecord.sql", param_count, sql = %sql);
}

/// Run a row-returning statement.
pub async fn fetch(conn: &impl GenericClient, stmt: &Statement) -> DbResult<Vec<Row>> {
    let prepared = prepare(stmt)?;
    log_statement(&prepared.sql, prepared.values.len());
    let refs = prepared.param_refs();
    conn.query(&prepared.sql, &refs).await
}

/// Run a row-returning statement and keep the first row, if any.
pub async fn fetch_opt(conn: &impl GenericClient, stmt: &Statement) -> DbResult<Option<Row>> {
    let prepared = prepare(stmt)?;
    log_statement(&prepared.sql, prepared.values.len());
    let refs = prepared.param_refs();
    conn.query_opt(&prepared.sql, &refs).await
}

/// Run a mutation, returning the affected-row count.
pub async fn execute(conn: &impl GenericClient, stmt: &Statement) -> DbResult<u64> {
    let prepared = prepare(stmt)?;
    log_statement(&prepared.sql, prepared.values.len());
    let refs = prepared.param_refs();
    conn.execute(&prepared.sql, &refs).await
}

/// Run an INSERT and report the generated key of the last inserted row.
///
/// The key lookup runs on the same connection as the insert; `None` means no
/// rows were inserted or no sequence was touched.
pub async fn insert(conn: &impl GenericClient, stmt: &Statement) -> DbResult<Option<i64>> {
    let affected = execute(conn, stmt).await?;
    if affected == 0 {
        return Ok(None);
    }
    last_insert_id(conn).await
}

async fn last_insert_id(conn: &impl GenericClient) -> DbResult<Option<i64>> {
    match conn.query_opt("SELECT lastval()", &[]).await {
        Ok(Some(row)) => Ok(Some(row.try_get(0)?)),
        Ok(None) => Ok(None),
        // 55000: lastval is not yet defined in this session, so the insert
        // touched no sequence.
        Err(DbError::Execution(e))
            if e.as_db_error().map(|db| db.code().code()) == Some("55000") =>
        {
            tracing::debug!(target: "pgrecord.sql", "no generated key available");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
