//! Dynamic query builder with validated identifiers and named parameters.
//!
//! Every table name, column name, and operator that reaches the builder is
//! checked against the rules in [`crate::ident`]; values never appear in the
//! SQL text, they bind through named `:param` placeholders. Construction
//! never fails mid-chain: rejected input is recorded and reported together,
//! as one error, when the query is rendered or executed.

use crate::client::GenericClient;
use crate::error::{DbError, DbResult};
use crate::exec::{self, Statement};
use crate::ident::{self, CmpOp, Sort};
use crate::row::FromRow;
use crate::value::{Params, Value};
use tokio_postgres::Row;

/// One WHERE predicate plus the connector linking it to the previous one.
#[derive(Clone, Debug)]
struct WherePart {
    connector: &'static str,
    sql: String,
}

/// One entry in a batch WHERE call: column, comparison, value.
///
/// Converts from a `(column, value)` pair, which compares with `=`, and
/// from a `(column, operator, value)` triple.
#[derive(Clone, Debug)]
pub struct Cond {
    column: String,
    op: String,
    value: Value,
}

impl<C: Into<String>, V: Into<Value>> From<(C, V)> for Cond {
    fn from((column, value): (C, V)) -> Self {
        Self {
            column: column.into(),
            op: "=".to_string(),
            value: value.into(),
        }
    }
}

impl<C: Into<String>, O: Into<String>, V: Into<Value>> From<(C, O, V)> for Cond {
    fn from((column, op, value): (C, O, V)) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// Dynamic query builder.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    /// Target table
    table: String,
    /// SELECT columns (default ["*"])
    select_cols: Vec<String>,
    /// JOIN clauses
    join_clauses: Vec<String>,
    /// WHERE predicates
    where_parts: Vec<WherePart>,
    /// ORDER BY clauses
    order_clauses: Vec<String>,
    /// LIMIT
    limit: Option<i64>,
    /// OFFSET
    offset: Option<i64>,
    /// Bound values, keyed by placeholder name
    params: Params,
    /// Rejected identifiers and operators, reported at render time
    issues: Vec<String>,
}

impl QueryBuilder {
    /// Start a query against `table`.
    ///
    /// An invalid table name poisons the builder; the error surfaces when
    /// the query is rendered or executed.
    pub fn table(table: &str) -> Self {
        let mut qb = Self {
            table: table.to_string(),
            select_cols: vec!["*".to_string()],
            join_clauses: Vec::new(),
            where_parts: Vec::new(),
            order_clauses: Vec::new(),
            limit: None,
            offset: None,
            params: Params::new(),
            issues: Vec::new(),
        };
        if !ident::is_valid_table(table) {
            qb.issues.push(format!("invalid table name: `{table}`"));
        }
        qb
    }

    // ==================== SELECT columns ====================

    /// Set the SELECT column list.
    ///
    /// Spaces are stripped from each entry. If any entry fails validation
    /// the projection stays `*` and the rejects are reported at render time.
    pub fn select(mut self, cols: &[&str]) -> Self {
        if cols.is_empty() {
            return self;
        }
        let cleaned: Vec<String> = cols.iter().map(|c| c.replace(' ', "")).collect();
        let mut ok = true;
        for col in &cleaned {
            if !ident::is_valid_column(col) {
                self.issues.push(format!("invalid column name: `{col}`"));
                ok = false;
            }
        }
        if ok {
            self.select_cols = cleaned;
        }
        self
    }

    // ==================== WHERE ====================

    /// Add an AND predicate: `column <op> value`.
    ///
    /// The operator must parse as a [`CmpOp`]; anything else is rejected.
    /// For the valueless null tests the value argument is ignored.
    pub fn where_(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_predicate("AND", column, op, Some(value.into()))
    }

    /// Add an OR predicate: `column <op> value`.
    pub fn or_where(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_predicate("OR", column, op, Some(value.into()))
    }

    /// Add an AND equality predicate.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_predicate("AND", column, "=", Some(value.into()))
    }

    /// Add an OR equality predicate.
    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_predicate("OR", column, "=", Some(value.into()))
    }

    /// Add `column IS NULL`.
    pub fn where_null(self, column: &str) -> Self {
        self.push_predicate("AND", column, "IS NULL", None)
    }

    /// Add `column IS NOT NULL`.
    pub fn where_not_null(self, column: &str) -> Self {
        self.push_predicate("AND", column, "IS NOT NULL", None)
    }

    /// Add one AND predicate per entry.
    ///
    /// Entries convert from `(column, value)` pairs, compared with `=`, and
    /// from `(column, operator, value)` triples; see [`Cond`].
    pub fn where_all<C: Into<Cond>>(self, conds: impl IntoIterator<Item = C>) -> Self {
        self.push_conds("AND", conds)
    }

    /// Add one OR predicate per entry.
    pub fn or_where_all<C: Into<Cond>>(self, conds: impl IntoIterator<Item = C>) -> Self {
        self.push_conds("OR", conds)
    }

    fn push_conds<C: Into<Cond>>(
        mut self,
        connector: &'static str,
        conds: impl IntoIterator<Item = C>,
    ) -> Self {
        for cond in conds {
            let Cond { column, op, value } = cond.into();
            self = self.push_predicate(connector, &column, &op, Some(value));
        }
        self
    }

    fn push_predicate(
        mut self,
        connector: &'static str,
        column: &str,
        op: &str,
        value: Option<Value>,
    ) -> Self {
        let op_parsed = self.check_op(op);
        let column_ok = self.check_column(column);
        let (Some(op), true) = (op_parsed, column_ok) else {
            return self;
        };
        let sql = if op.takes_value() {
            let name = uniq_param_name(&self.params, column);
            self.params.insert(&name, value.unwrap_or(Value::Null));
            format!("{} {} :{}", column, op.to_sql(), name)
        } else {
            format!("{} {}", column, op.to_sql())
        };
        self.where_parts.push(WherePart { connector, sql });
        self
    }

    // ==================== JOIN ====================

    /// Add an INNER JOIN with a single-comparison ON clause.
    pub fn join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join("INNER", table, left, op, right)
    }

    /// Add a LEFT JOIN.
    pub fn left_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join("LEFT", table, left, op, right)
    }

    /// Add a RIGHT JOIN.
    pub fn right_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join("RIGHT", table, left, op, right)
    }

    fn push_join(
        mut self,
        kind: &'static str,
        table: &str,
        left: &str,
        op: &str,
        right: &str,
    ) -> Self {
        let mut op_parsed = self.check_op(op);
        if let Some(parsed) = op_parsed {
            // Null tests compare nothing and make no sense in an ON clause.
            if !parsed.takes_value() {
                self.issues
                    .push(format!("unsupported operator in join: `{op}`"));
                op_parsed = None;
            }
        }
        let table_ok = if ident::is_valid_table(table) {
            true
        } else {
            self.issues.push(format!("invalid table name: `{table}`"));
            false
        };
        let left_ok = self.check_column(left);
        let right_ok = self.check_column(right);
        if let (Some(op), true, true, true) = (op_parsed, table_ok, left_ok, right_ok) {
            self.join_clauses.push(format!(
                "{} JOIN {} ON {} {} {}",
                kind,
                table,
                left,
                op.to_sql(),
                right
            ));
        }
        self
    }

    // ==================== Ordering & pagination ====================

    /// Add an ORDER BY clause.
    pub fn order_by(mut self, column: &str, direction: Sort) -> Self {
        if self.check_column(column) {
            self.order_clauses
                .push(format!("{} {}", column, direction.to_sql()));
        }
        self
    }

    /// Add `ORDER BY column ASC`.
    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, Sort::Asc)
    }

    /// Add `ORDER BY column DESC`.
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Sort::Desc)
    }

    /// Set LIMIT. Binds as `:limit` rather than rendering the number inline.
    /// Negative input clamps to zero.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n.max(0));
        self
    }

    /// Set OFFSET. Binds as `:offset`. Negative input clamps to zero.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n.max(0));
        self
    }

    // ==================== Validation ====================

    fn check_column(&mut self, column: &str) -> bool {
        if ident::is_valid_column(column) {
            true
        } else {
            self.issues.push(format!("invalid column name: `{column}`"));
            false
        }
    }

    fn check_op(&mut self, op: &str) -> Option<CmpOp> {
        let parsed = CmpOp::parse(op);
        if parsed.is_none() {
            self.issues.push(format!("unsupported operator: `{op}`"));
        }
        parsed
    }

    fn check_issues(&self) -> DbResult<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(DbError::identifier(&self.issues))
        }
    }

    // ==================== Rendering ====================

    fn where_sql(&self) -> String {
        if self.where_parts.is_empty() {
            return String::new();
        }
        let mut out = String::from(" WHERE ");
        for (i, part) in self.where_parts.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push_str(part.connector);
                out.push(' ');
            }
            out.push_str(&part.sql);
        }
        out
    }

    fn bounds_sql(&self, params: &mut Params) -> String {
        let mut out = String::new();
        if let Some(n) = self.limit {
            out.push_str(" LIMIT :limit");
            params.insert("limit", Value::Int(n));
        }
        if let Some(n) = self.offset {
            out.push_str(" OFFSET :offset");
            params.insert("offset", Value::Int(n));
        }
        out
    }

    /// Row scoping for a mutation.
    ///
    /// Postgres has no LIMIT on UPDATE/DELETE, so bounded mutations target
    /// their rows by ctid through a subquery.
    fn mutation_scope_sql(&self, params: &mut Params) -> String {
        if self.limit.is_none() && self.offset.is_none() {
            return self.where_sql();
        }
        let mut inner = format!("SELECT ctid FROM {}", self.table);
        inner.push_str(&self.where_sql());
        inner.push_str(&self.bounds_sql(params));
        format!(" WHERE ctid IN ({})", inner)
    }

    fn render_select(&self) -> DbResult<Statement> {
        self.check_issues()?;
        let mut params = self.params.clone();
        let mut sql = format!("SELECT {} FROM {}", self.select_cols.join(", "), self.table);
        for join in &self.join_clauses {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.where_sql());
        if !self.order_clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_clauses.join(", "));
        }
        sql.push_str(&self.bounds_sql(&mut params));
        Ok(Statement::new(sql, params))
    }

    fn render_count(&self) -> DbResult<Statement> {
        self.check_issues()?;
        let mut params = self.params.clone();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        for join in &self.join_clauses {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.where_sql());
        sql.push_str(&self.bounds_sql(&mut params));
        Ok(Statement::new(sql, params))
    }

    fn render_insert(&self, rows: &[Vec<(String, Value)>]) -> DbResult<Statement> {
        self.check_issues()?;
        if rows.is_empty() {
            return Err(DbError::build("insert requires at least one row"));
        }
        let columns: Vec<&str> = rows[0].iter().map(|(c, _)| c.as_str()).collect();
        let bad: Vec<String> = columns
            .iter()
            .filter(|c| !ident::is_valid_column(c))
            .map(|c| format!("invalid column name: `{c}`"))
            .collect();
        if !bad.is_empty() {
            return Err(DbError::identifier(&bad));
        }
        let mut params = Params::new();
        let mut groups = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let matches_first = row.len() == columns.len()
                && columns
                    .iter()
                    .all(|c| row.iter().any(|(rc, _)| rc.as_str() == *c));
            if !matches_first {
                return Err(DbError::build(format!(
                    "insert row {} does not match the column set of row 1",
                    i + 1
                )));
            }
            let mut names = Vec::with_capacity(columns.len());
            for col in &columns {
                let value = row
                    .iter()
                    .find(|(rc, _)| rc.as_str() == *col)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null);
                let name = format!("{}{}", col.replace('.', "_"), i);
                params.insert(&name, value);
                names.push(format!(":{name}"));
            }
            groups.push(format!("({})", names.join(", ")));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            groups.join(", ")
        );
        Ok(Statement::new(sql, params))
    }

    fn render_update(&self, changes: &[(String, Value)]) -> DbResult<Statement> {
        self.check_issues()?;
        if changes.is_empty() {
            return Err(DbError::build("update requires at least one column"));
        }
        let bad: Vec<String> = changes
            .iter()
            .filter(|(c, _)| !ident::is_valid_column(c))
            .map(|(c, _)| format!("invalid column name: `{c}`"))
            .collect();
        if !bad.is_empty() {
            return Err(DbError::identifier(&bad));
        }
        let mut params = self.params.clone();
        let mut sets = Vec::with_capacity(changes.len());
        for (col, value) in changes {
            let name = uniq_param_name(&params, col);
            params.insert(&name, value.clone());
            sets.push(format!("{col} = :{name}"));
        }
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        sql.push_str(&self.mutation_scope_sql(&mut params));
        Ok(Statement::new(sql, params))
    }

    fn render_delete(&self) -> DbResult<Statement> {
        self.check_issues()?;
        let mut params = self.params.clone();
        let mut sql = format!("DELETE FROM {}", self.table);
        sql.push_str(&self.mutation_scope_sql(&mut params));
        Ok(Statement::new(sql, params))
    }

    /// Render the SELECT statement text (for inspection and tests).
    pub fn to_sql(&self) -> DbResult<String> {
        Ok(self.render_select()?.sql)
    }

    /// Render the COUNT statement text.
    pub fn to_count_sql(&self) -> DbResult<String> {
        Ok(self.render_count()?.sql)
    }

    // ==================== Execution ====================

    /// Run the SELECT and return all rows.
    pub async fn get(&self, conn: &impl GenericClient) -> DbResult<Vec<Row>> {
        exec::fetch(conn, &self.render_select()?).await
    }

    /// Run the SELECT and map every row.
    pub async fn fetch_all<T: FromRow>(&self, conn: &impl GenericClient) -> DbResult<Vec<T>> {
        let rows = self.get(conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Run the SELECT capped at one row. No match is `None`, not an error.
    pub async fn first(&self, conn: &impl GenericClient) -> DbResult<Option<Row>> {
        let capped = self.clone().limit(1);
        exec::fetch_opt(conn, &capped.render_select()?).await
    }

    /// Run the SELECT capped at one row and map it.
    pub async fn fetch_first<T: FromRow>(&self, conn: &impl GenericClient) -> DbResult<Option<T>> {
        let row = self.first(conn).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Run `SELECT COUNT(*)` with the current filters.
    pub async fn count(&self, conn: &impl GenericClient) -> DbResult<i64> {
        let rows = exec::fetch(conn, &self.render_count()?).await?;
        match rows.first() {
            Some(row) => row.try_get(0).map_err(DbError::from),
            None => Ok(0),
        }
    }

    /// Insert one or more rows, returning the last generated key, if any.
    ///
    /// Every row must carry the same column set as the first.
    pub async fn insert(
        &self,
        conn: &impl GenericClient,
        rows: &[Vec<(String, Value)>],
    ) -> DbResult<Option<i64>> {
        exec::insert(conn, &self.render_insert(rows)?).await
    }

    /// Update the matched rows, returning the affected-row count.
    pub async fn update(
        &self,
        conn: &impl GenericClient,
        changes: &[(String, Value)],
    ) -> DbResult<u64> {
        exec::execute(conn, &self.render_update(changes)?).await
    }

    /// Delete the matched rows, returning the affected-row count.
    pub async fn delete(&self, conn: &impl GenericClient) -> DbResult<u64> {
        exec::execute(conn, &self.render_delete()?).await
    }
}

/// Derive a placeholder name from a column, renaming on collision.
///
/// Dots become underscores so `u.email` binds as `:u_email`. A second
/// predicate on the same column gets `:u_email1`, then `:u_email2`, and so
/// on. `limit` and `offset` stay reserved for pagination.
fn uniq_param_name(params: &Params, column: &str) -> String {
    let base = column.replace('.', "_");
    if !param_taken(params, &base) {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}{n}");
        if !param_taken(params, &candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn param_taken(params: &Params, name: &str) -> bool {
    name == "limit" || name == "offset" || params.contains(name)
}
