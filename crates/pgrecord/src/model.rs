//! Thin active-record layer over [`QueryBuilder`].
//!
//! A type implements [`Model`] (usually through `#[derive(Model)]`) by naming
//! its table, its primary key, and the fields that may be written through
//! mass assignment. Everything else is provided: finders, create, save,
//! destroy, and bounded single-row updates and deletes.
//!
//! Mutations through a record are always scoped to its primary key and
//! bounded to one row; `destroy_many` is bounded to the number of keys it
//! was given.

use crate::builder::QueryBuilder;
use crate::client::GenericClient;
use crate::error::{DbError, DbResult};
use crate::row::FromRow;
use crate::value::Value;

/// An active-record style database model.
pub trait Model: FromRow + Send + Sync {
    /// Table backing this model.
    const TABLE: &'static str;

    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Fields writable through mass assignment (`create`, `update_attrs`).
    const FILLABLE: &'static [&'static str] = &[];

    /// Primary key type.
    type Key: Into<Value> + Clone + Send + Sync;

    /// The record's key, if it has been persisted or assigned.
    fn key(&self) -> Option<Self::Key>;

    /// Adopt a key, typically after an insert reports the generated one.
    fn set_key(&mut self, key: Self::Key);

    /// The record's fillable fields as `(column, value)` pairs.
    fn fillable_values(&self) -> Vec<(String, Value)>;

    /// Set one field from a [`Value`].
    ///
    /// Unknown field names and unconvertible values are ignored.
    fn assign(&mut self, field: &str, value: Value);

    // ==================== Query entry points ====================

    /// Start a query builder scoped to this model's table.
    fn query() -> QueryBuilder {
        QueryBuilder::table(Self::TABLE)
    }

    /// Start a query with one predicate applied.
    fn where_(column: &str, op: &str, value: impl Into<Value>) -> QueryBuilder {
        Self::query().where_(column, op, value)
    }

    /// Fetch one record by primary key.
    fn find(
        conn: &impl GenericClient,
        key: Self::Key,
    ) -> impl std::future::Future<Output = DbResult<Option<Self>>> + Send {
        async move {
            Self::query()
                .where_eq(Self::PRIMARY_KEY, key)
                .fetch_first(conn)
                .await
        }
    }

    /// Fetch the records whose primary key is in `keys`.
    ///
    /// An empty key list returns an empty vec without touching the database.
    fn find_many(
        conn: &impl GenericClient,
        keys: &[Self::Key],
    ) -> impl std::future::Future<Output = DbResult<Vec<Self>>> + Send {
        async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut qb = Self::query();
            for key in keys {
                qb = qb.or_where_eq(Self::PRIMARY_KEY, key.clone());
            }
            qb.fetch_all(conn).await
        }
    }

    /// Fetch every record in the table.
    fn all(
        conn: &impl GenericClient,
    ) -> impl std::future::Future<Output = DbResult<Vec<Self>>> + Send {
        async move { Self::query().fetch_all(conn).await }
    }

    // ==================== Mass assignment ====================

    /// Insert a record built from `attrs` and fetch it back by its generated
    /// key.
    ///
    /// Only fillable fields make it into the INSERT; everything else in
    /// `attrs` is dropped. `Ok(None)` means the insert reported no generated
    /// key to re-fetch by.
    fn create(
        conn: &impl GenericClient,
        attrs: &[(String, Value)],
    ) -> impl std::future::Future<Output = DbResult<Option<Self>>> + Send
    where
        Self::Key: From<i64>,
    {
        async move {
            let row: Vec<(String, Value)> = attrs
                .iter()
                .filter(|(field, _)| Self::FILLABLE.contains(&field.as_str()))
                .cloned()
                .collect();
            if row.is_empty() {
                return Err(DbError::build("no fillable fields in create attributes"));
            }
            let key = Self::query()
                .insert(conn, std::slice::from_ref(&row))
                .await?;
            match key {
                Some(id) => Self::find(conn, Self::Key::from(id)).await,
                None => Ok(None),
            }
        }
    }

    // ==================== Destroy ====================

    /// Delete one record by primary key. Returns the deleted-row count.
    fn destroy(
        conn: &impl GenericClient,
        key: Self::Key,
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        async move {
            Self::query()
                .where_eq(Self::PRIMARY_KEY, key)
                .limit(1)
                .delete(conn)
                .await
        }
    }

    /// Delete the records matching `keys`, bounded to at most `keys.len()`
    /// rows.
    fn destroy_many(
        conn: &impl GenericClient,
        keys: &[Self::Key],
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        async move {
            if keys.is_empty() {
                return Ok(0);
            }
            let mut qb = Self::query();
            for key in keys {
                qb = qb.or_where_eq(Self::PRIMARY_KEY, key.clone());
            }
            qb.limit(keys.len() as i64).delete(conn).await
        }
    }

    // ==================== Instance persistence ====================

    /// Insert this record if its key is unset, otherwise update it in place.
    ///
    /// The update is scoped to the primary key and bounded to one row. A
    /// fresh insert adopts the generated key when one is reported.
    fn save(
        &mut self,
        conn: &impl GenericClient,
    ) -> impl std::future::Future<Output = DbResult<()>> + Send
    where
        Self::Key: From<i64>,
    {
        async move {
            let values = self.fillable_values();
            match self.key() {
                Some(key) => {
                    Self::query()
                        .where_eq(Self::PRIMARY_KEY, key)
                        .limit(1)
                        .update(conn, &values)
                        .await?;
                }
                None => {
                    let key = Self::query()
                        .insert(conn, std::slice::from_ref(&values))
                        .await?;
                    if let Some(id) = key {
                        self.set_key(Self::Key::from(id));
                    }
                }
            }
            Ok(())
        }
    }

    /// Assign `attrs` to this record, then persist its fillable fields.
    ///
    /// Returns the affected-row count. The key must be set.
    fn update_attrs(
        &mut self,
        conn: &impl GenericClient,
        attrs: &[(String, Value)],
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        async move {
            let Some(key) = self.key() else {
                return Err(DbError::build("primary key is not set"));
            };
            for (field, value) in attrs {
                if Self::FILLABLE.contains(&field.as_str()) {
                    self.assign(field, value.clone());
                }
            }
            let values = self.fillable_values();
            Self::query()
                .where_eq(Self::PRIMARY_KEY, key)
                .limit(1)
                .update(conn, &values)
                .await
        }
    }

    /// Delete this record by its key. Returns the deleted-row count.
    fn delete(
        &self,
        conn: &impl GenericClient,
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        async move {
            let Some(key) = self.key() else {
                return Err(DbError::build("primary key is not set"));
            };
            Self::destroy(conn, key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowExt;
    use crate::value::FromValue;
    use std::sync::Mutex;
    use tokio_postgres::Row;
    use tokio_postgres::types::ToSql;

    #[derive(Debug, Default)]
    struct User {
        id: Option<i64>,
        name: String,
        email: String,
    }

    impl FromRow for User {
        fn from_row(row: &Row) -> DbResult<Self> {
            Ok(Self {
                id: row.try_get_column("id")?,
                name: row.try_get_column("name")?,
                email: row.try_get_column("email")?,
            })
        }
    }

    impl Model for User {
        const TABLE: &'static str = "users";
        const FILLABLE: &'static [&'static str] = &["name", "email"];

        type Key = i64;

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = Some(key);
        }

        fn fillable_values(&self) -> Vec<(String, Value)> {
            vec![
                ("name".to_string(), Value::from(self.name.clone())),
                ("email".to_string(), Value::from(self.email.clone())),
            ]
        }

        fn assign(&mut self, field: &str, value: Value) {
            match field {
                "name" => {
                    if let Some(v) = String::from_value(&value) {
                        self.name = v;
                    }
                }
                "email" => {
                    if let Some(v) = String::from_value(&value) {
                        self.email = v;
                    }
                }
                _ => {}
            }
        }
    }

    /// Records every statement it is handed; returns no rows and one
    /// affected row.
    #[derive(Default)]
    struct RecordingConn {
        statements: Mutex<Vec<String>>,
    }

    impl RecordingConn {
        fn record(&self, sql: &str) {
            self.statements.lock().unwrap().push(sql.to_string());
        }

        fn recorded(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl GenericClient for RecordingConn {
        async fn query(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
            self.record(sql);
            Ok(Vec::new())
        }

        async fn query_opt(
            &self,
            sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> DbResult<Option<Row>> {
            self.record(sql);
            Ok(None)
        }

        async fn execute(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
            self.record(sql);
            Ok(1)
        }
    }

    #[test]
    fn query_targets_the_model_table() {
        assert_eq!(User::query().to_sql().unwrap(), "SELECT * FROM users");
    }

    #[test]
    fn default_primary_key_is_id() {
        assert_eq!(User::PRIMARY_KEY, "id");
    }

    #[test]
    fn where_entry_point_applies_predicate() {
        let qb = User::where_("email", "LIKE", "%@x.test");
        assert_eq!(
            qb.to_sql().unwrap(),
            "SELECT * FROM users WHERE email LIKE :email"
        );
    }

    #[test]
    fn fillable_values_follow_field_state() {
        let user = User {
            id: None,
            name: "Ann".into(),
            email: "ann@x.test".into(),
        };
        let values = user.fillable_values();
        assert_eq!(values[0], ("name".to_string(), Value::Text("Ann".into())));
        assert_eq!(
            values[1],
            ("email".to_string(), Value::Text("ann@x.test".into()))
        );
    }

    #[test]
    fn assign_ignores_unknown_fields() {
        let mut user = User::default();
        user.assign("name", Value::from("Bo"));
        user.assign("ghost", Value::from("x"));
        assert_eq!(user.name, "Bo");
    }

    #[tokio::test]
    async fn find_queries_by_primary_key() {
        let conn = RecordingConn::default();
        let found = User::find(&conn, 7).await.unwrap();
        assert!(found.is_none());
        assert_eq!(
            conn.recorded(),
            vec!["SELECT * FROM users WHERE id = $1 LIMIT $2".to_string()]
        );
    }

    #[tokio::test]
    async fn find_many_with_no_keys_skips_the_database() {
        let conn = RecordingConn::default();
        let users = User::find_many(&conn, &[]).await.unwrap();
        assert!(users.is_empty());
        assert!(conn.recorded().is_empty());
    }

    #[tokio::test]
    async fn destroy_bounds_the_delete_to_one_row() {
        let conn = RecordingConn::default();
        let affected = User::destroy(&conn, 9).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            conn.recorded(),
            vec![
                "DELETE FROM users WHERE ctid IN (SELECT ctid FROM users WHERE id = $1 LIMIT $2)"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn destroy_many_bounds_to_the_key_count() {
        let conn = RecordingConn::default();
        User::destroy_many(&conn, &[3, 5, 8]).await.unwrap();
        assert_eq!(
            conn.recorded(),
            vec![
                "DELETE FROM users WHERE ctid IN \
                 (SELECT ctid FROM users WHERE id = $1 OR id = $2 OR id = $3 LIMIT $4)"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn destroy_many_with_no_keys_skips_the_database() {
        let conn = RecordingConn::default();
        let affected = User::destroy_many(&conn, &[]).await.unwrap();
        assert_eq!(affected, 0);
        assert!(conn.recorded().is_empty());
    }

    #[tokio::test]
    async fn save_updates_when_the_key_is_set() {
        let conn = RecordingConn::default();
        let mut user = User {
            id: Some(4),
            name: "Ann".into(),
            email: "ann@x.test".into(),
        };
        user.save(&conn).await.unwrap();
        assert_eq!(
            conn.recorded(),
            vec![
                "UPDATE users SET name = $1, email = $2 WHERE ctid IN \
                 (SELECT ctid FROM users WHERE id = $3 LIMIT $4)"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn save_inserts_when_the_key_is_unset() {
        let conn = RecordingConn::default();
        let mut user = User {
            id: None,
            name: "Ann".into(),
            email: "ann@x.test".into(),
        };
        user.save(&conn).await.unwrap();
        let recorded = conn.recorded();
        assert_eq!(recorded[0], "INSERT INTO users (name, email) VALUES ($1, $2)");
        assert_eq!(recorded[1], "SELECT lastval()");
        assert!(user.id.is_none());
    }

    #[tokio::test]
    async fn create_filters_to_fillable_fields() {
        let conn = RecordingConn::default();
        let created = User::create(
            &conn,
            &[
                ("name".to_string(), Value::from("Ann")),
                ("is_admin".to_string(), Value::from(true)),
            ],
        )
        .await
        .unwrap();
        assert!(created.is_none());
        assert_eq!(
            conn.recorded()[0],
            "INSERT INTO users (name) VALUES ($1)"
        );
    }

    #[tokio::test]
    async fn create_with_nothing_fillable_is_an_error() {
        let conn = RecordingConn::default();
        let err = User::create(&conn, &[("is_admin".to_string(), Value::from(true))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fillable"));
        assert!(conn.recorded().is_empty());
    }

    #[tokio::test]
    async fn update_attrs_requires_a_key() {
        let conn = RecordingConn::default();
        let mut user = User::default();
        let err = user
            .update_attrs(&conn, &[("name".to_string(), Value::from("Bo"))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("primary key"));
    }

    #[tokio::test]
    async fn update_attrs_assigns_then_updates() {
        let conn = RecordingConn::default();
        let mut user = User {
            id: Some(2),
            name: "Ann".into(),
            email: "ann@x.test".into(),
        };
        let affected = user
            .update_attrs(&conn, &[("name".to_string(), Value::from("Bo"))])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(user.name, "Bo");
        assert_eq!(
            conn.recorded(),
            vec![
                "UPDATE users SET name = $1, email = $2 WHERE ctid IN \
                 (SELECT ctid FROM users WHERE id = $3 LIMIT $4)"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn instance_delete_requires_a_key() {
        let conn = RecordingConn::default();
        let user = User::default();
        assert!(user.delete(&conn).await.is_err());
    }
}
