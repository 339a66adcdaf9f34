//! Bound parameter values.
//!
//! Parameters are carried as [`Value`], a small set of inferred binding kinds
//! (`Bool` / `Int` / `Null` / `Text`). The kind is inferred from the Rust
//! value at bind time via `From` impls; everything without a dedicated kind
//! binds as text. At execute time [`Value`] encodes itself against the wire
//! type of the target column, so a text value bound to an `int4` or `date`
//! column is parsed rather than rejected.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// A parameter value with an inferred binding kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Null,
    Text(String),
}

impl Value {
    /// Short kind name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Null => "null",
            Self::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! impl_value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(v as i64)
            }
        })*
    };
}

impl_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Text(v.to_rfc3339())
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Text(v.hyphenated().to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

type ToSqlError = Box<dyn std::error::Error + Sync + Send>;

fn out_of_range(v: i64, target: &Type) -> ToSqlError {
    format!("integer {v} out of range for {target}").into()
}

fn unparsable(s: &str, target: &Type) -> ToSqlError {
    format!("cannot bind text value {s:?} to a {target} column").into()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
    match *ty {
        Type::INT2 => s
            .trim()
            .parse::<i16>()
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::INT4 => s
            .trim()
            .parse::<i32>()
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::INT8 => s
            .trim()
            .parse::<i64>()
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::FLOAT4 => s
            .trim()
            .parse::<f32>()
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::FLOAT8 => s
            .trim()
            .parse::<f64>()
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::BOOL => parse_bool(s).ok_or_else(|| unparsable(s, ty))?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s.trim())
            .ok_or_else(|| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_timestamp(s.trim()).map(|dt| dt.and_utc()))
            .ok_or_else(|| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s.trim())
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .map_err(|_| unparsable(s, ty))?
            .to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        Type::NUMERIC => Err(unparsable(s, ty)),
        // Text family, enums, domains: raw text bytes.
        _ => s.to_sql(ty, out),
    }
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
    match *ty {
        Type::INT2 => i16::try_from(v)
            .map_err(|_| out_of_range(v, ty))?
            .to_sql(ty, out),
        Type::INT4 => i32::try_from(v)
            .map_err(|_| out_of_range(v, ty))?
            .to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            v.to_string().to_sql(ty, out)
        }
        _ => Err(format!("cannot bind integer value to a {ty} column").into()),
    }
}

fn encode_bool(v: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
    match *ty {
        Type::BOOL => v.to_sql(ty, out),
        Type::INT2 => (v as i16).to_sql(ty, out),
        Type::INT4 => (v as i32).to_sql(ty, out),
        Type::INT8 => (v as i64).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            (if v { "true" } else { "false" }).to_sql(ty, out)
        }
        _ => Err(format!("cannot bind boolean value to a {ty} column").into()),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => encode_bool(*v, ty, out),
            Self::Int(v) => encode_int(*v, ty, out),
            Self::Text(s) => encode_text(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Encoding is dispatched on the target type at runtime.
        true
    }

    to_sql_checked!();
}

/// Convert a [`Value`] back into a plain Rust value.
///
/// Used by the record layer's field assignment; `None` means the value does
/// not fit the target type and the assignment is skipped.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Null => None,
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Int(v) => (*v).try_into().ok(),
                    Value::Text(s) => s.trim().parse().ok(),
                    _ => None,
                }
            }
        })*
    };
}

impl_from_value_int!(i16, i32, i64);

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::Text(s) => parse_bool(s),
            Value::Null => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => parse_timestamp(s.trim()),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_timestamp(s.trim()).map(|dt| dt.and_utc())),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_value(v).map(Some),
        }
    }
}

/// Ordered parameter set for one statement.
///
/// Named and positional parameters are kept separately; a statement uses one
/// style or the other (see [`crate::exec`]). Named entries keep insertion
/// order and binding the same name twice replaces the earlier value, the way
/// a prepare/bind API behaves. A leading `:` on a name is accepted and
/// stripped.
#[derive(Debug, Clone, Default)]
pub struct Params {
    named: Vec<(String, Value)>,
    positional: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named parameter.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let name = name.strip_prefix(':').unwrap_or(name);
        let value = value.into();
        if let Some(slot) = self.named.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.named.push((name.to_string(), value));
        }
    }

    /// Bind the next positional parameter.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    pub(crate) fn named(&self) -> &[(String, Value)] {
        &self.named
    }

    pub(crate) fn positional(&self) -> &[Value] {
        &self.positional
    }
}
