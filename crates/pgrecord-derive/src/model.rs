//! Model derive macro implementation.
//!
//! Expands a struct annotated with `#[record(table = "...")]` into an
//! `impl pgrecord::Model`: table and key metadata, the fillable whitelist,
//! and the `fillable_values` / `assign` plumbing mass assignment runs on.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

use crate::common::option_inner;

/// Parsed field-level `#[record(...)]` attribute.
struct FieldAttr {
    is_key: bool,
    fillable: bool,
    column: Option<String>,
}

impl syn::parse::Parse for FieldAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut is_key = false;
        let mut fillable = false;
        let mut column = None;

        loop {
            if input.is_empty() {
                break;
            }
            if input.peek(syn::Ident) {
                let ident: syn::Ident = input.parse()?;
                if ident == "key" {
                    is_key = true;
                } else if ident == "fillable" {
                    fillable = true;
                } else if ident == "column" {
                    let _: syn::Token![=] = input.parse()?;
                    let value: syn::LitStr = input.parse()?;
                    column = Some(value.value());
                } else {
                    return Err(syn::Error::new_spanned(
                        ident,
                        "expected `key`, `fillable`, or `column = \"...\"`",
                    ));
                }
            }
            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }

        Ok(FieldAttr {
            is_key,
            fillable,
            column,
        })
    }
}

fn field_attr(field: &syn::Field) -> Result<FieldAttr> {
    let mut merged = FieldAttr {
        is_key: false,
        fillable: false,
        column: None,
    };
    for attr in &field.attrs {
        if attr.path().is_ident("record") {
            let one: FieldAttr = attr.parse_args()?;
            merged.is_key |= one.is_key;
            merged.fillable |= one.fillable;
            if one.column.is_some() {
                merged.column = one.column;
            }
        }
    }
    Ok(merged)
}

/// Extract table name from the struct-level `#[record(table = "...")]`
/// attribute.
fn get_table_name(input: &DeriveInput) -> Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("record") {
            if let Ok(nested) = attr.parse_args::<syn::MetaNameValue>() {
                if nested.path.is_ident("table") {
                    if let syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(lit),
                        ..
                    }) = &nested.value
                    {
                        return Ok(lit.value());
                    }
                }
            }
        }
    }
    Err(syn::Error::new_spanned(
        input,
        "Model requires #[record(table = \"table_name\")] attribute",
    ))
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let table = get_table_name(&input)?;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model can only be derived for structs",
            ));
        }
    };

    let mut key_field: Option<(&syn::Field, String)> = None;
    let mut fallback_id: Option<(&syn::Field, String)> = None;
    let mut fillable: Vec<(&syn::Field, String)> = Vec::new();

    for field in fields {
        let ident = field.ident.as_ref().unwrap();
        let attr = field_attr(field)?;
        let column = attr.column.clone().unwrap_or_else(|| ident.to_string());
        if attr.is_key {
            if attr.fillable {
                return Err(syn::Error::new_spanned(
                    field,
                    "a key field cannot be fillable",
                ));
            }
            if key_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may carry #[record(key)]",
                ));
            }
            key_field = Some((field, column));
            continue;
        }
        if ident == "id" {
            fallback_id = Some((field, column.clone()));
        }
        if attr.fillable {
            fillable.push((field, column));
        }
    }

    let (key_field, key_column) = key_field.or(fallback_id).ok_or_else(|| {
        syn::Error::new_spanned(
            &input,
            "Model needs a #[record(key)] field or a field named `id`",
        )
    })?;

    let key_ident = key_field.ident.as_ref().unwrap();
    let key_ty = &key_field.ty;
    let (key_type, key_body, set_key_body) = match option_inner(key_ty) {
        Some(inner) => (
            quote! { #inner },
            quote! { self.#key_ident.clone() },
            quote! { self.#key_ident = Some(key); },
        ),
        None => (
            quote! { #key_ty },
            quote! { Some(self.#key_ident.clone()) },
            quote! { self.#key_ident = key; },
        ),
    };

    let fillable_columns: Vec<&str> = fillable.iter().map(|(_, c)| c.as_str()).collect();

    let fillable_values: Vec<_> = fillable
        .iter()
        .map(|(field, column)| {
            let ident = field.ident.as_ref().unwrap();
            quote! {
                (#column.to_string(), pgrecord::Value::from(self.#ident.clone()))
            }
        })
        .collect();

    let assign_arms: Vec<_> = fillable
        .iter()
        .map(|(field, column)| {
            let ident = field.ident.as_ref().unwrap();
            let ty = &field.ty;
            quote! {
                #column => {
                    if let Some(v) = <#ty as pgrecord::FromValue>::from_value(&value) {
                        self.#ident = v;
                    }
                }
            }
        })
        .collect();

    let assign_body = if assign_arms.is_empty() {
        quote! { let _ = (field, value); }
    } else {
        quote! {
            match field {
                #(#assign_arms)*
                _ => {}
            }
        }
    };

    Ok(quote! {
        impl #impl_generics pgrecord::Model for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table;
            const PRIMARY_KEY: &'static str = #key_column;
            const FILLABLE: &'static [&'static str] = &[#(#fillable_columns),*];

            type Key = #key_type;

            fn key(&self) -> Option<Self::Key> {
                #key_body
            }

            fn set_key(&mut self, key: Self::Key) {
                #set_key_body
            }

            fn fillable_values(&self) -> Vec<(String, pgrecord::Value)> {
                vec![#(#fillable_values),*]
            }

            fn assign(&mut self, field: &str, value: pgrecord::Value) {
                #assign_body
            }
        }
    })
}
