//! Derive macros for pgrecord
//!
//! Provides `#[derive(FromRow)]` and `#[derive(Model)]` macros.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod from_row;
mod model;

/// Derive the `FromRow` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use pgrecord::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     name: String,
///     #[record(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[record(column = "name")]` - Map a field to a different column name
#[proc_macro_derive(FromRow, attributes(record))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive the `Model` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use pgrecord::{FromRow, Model};
///
/// #[derive(FromRow, Model)]
/// #[record(table = "users")]
/// struct User {
///     #[record(key)]
///     id: Option<i64>,
///     #[record(fillable)]
///     name: String,
///     #[record(fillable)]
///     email: String,
///     created_at: Option<chrono::NaiveDateTime>,
/// }
/// ```
///
/// # Attributes
///
/// Struct level:
/// - `#[record(table = "users")]` - Backing table (required)
///
/// Field level:
/// - `#[record(key)]` - Primary key field; defaults to the field named `id`.
///   An `Option<T>` key reads as unset while `None`, which is how `save`
///   chooses between INSERT and UPDATE.
/// - `#[record(fillable)]` - Field participates in mass assignment
/// - `#[record(column = "name")]` - Column name when it differs from the
///   field name
#[proc_macro_derive(Model, attributes(record))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
