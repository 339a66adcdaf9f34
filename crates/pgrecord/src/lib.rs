//! # pgrecord
//!
//! A dynamic SQL query builder and thin active-record layer for Postgres.
//!
//! ## Features
//!
//! - **Validated dynamic SQL**: table names, column names, and operators are
//!   checked against strict rules before any SQL is assembled; values only
//!   ever travel as bound parameters
//! - **Named placeholders**: queries render with `:param` markers and are
//!   rewritten to positional `$n` markers at execution time
//! - **Type-safe mapping**: Row → struct via the `FromRow` trait
//! - **Active-record models**: `find` / `all` / `create` / `save` / `destroy`
//!   with a fillable-field whitelist
//! - **Transaction-friendly**: pass a transaction anywhere a `GenericClient`
//!   is expected
//! - **Loud failures**: every rejected identifier and operator in a chain is
//!   reported, together, when the query renders or runs
//!
//! ## Query builder
//!
//! ```ignore
//! use pgrecord::QueryBuilder;
//!
//! let rows = QueryBuilder::table("users")
//!     .select(&["id", "email"])
//!     .where_eq("status", "active")
//!     .or_where("role", "=", "admin")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get(&client)
//!     .await?;
//! ```
//!
//! ## Models
//!
//! ```ignore
//! use pgrecord::{FromRow, Model};
//!
//! #[derive(FromRow, Model)]
//! #[record(table = "users")]
//! struct User {
//!     #[record(key)]
//!     id: Option<i64>,
//!     #[record(fillable)]
//!     name: String,
//!     #[record(fillable)]
//!     email: String,
//! }
//!
//! let user = User::find(&client, 7).await?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod ident;
pub mod model;
pub mod query;
pub mod row;
pub mod value;

pub use builder::{Cond, QueryBuilder};
pub use client::GenericClient;
pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use exec::Statement;
pub use ident::{CmpOp, Sort};
pub use model::Model;
pub use query::{Query, query};
pub use row::{FromRow, RowExt};
pub use value::{FromValue, Params, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use config::pool_from_env;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};

#[cfg(feature = "validate")]
pub mod validate;

#[cfg(feature = "validate")]
pub use validate::{Format, Rule, ValidationErrors, Validator};

#[cfg(feature = "derive")]
pub use pgrecord_derive::{FromRow, Model};
