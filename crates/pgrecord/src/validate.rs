//! Form-style input validation with database-backed uniqueness checks.
//!
//! A [`Validator`] holds per-field rule lists and checks them against string
//! input, the shape form data arrives in. [`Validator::check`] runs every
//! database-free rule; [`Validator::check_db`] additionally runs
//! [`Rule::Unique`] through a COUNT query. Fields that are absent or empty
//! are only flagged when they carry [`Rule::Required`], and each field
//! reports at most one problem per pass.

use crate::builder::QueryBuilder;
use crate::client::GenericClient;
use crate::error::DbResult;
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Text formats checked by [`Rule::Format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Email,
    /// `YYYY-MM-DD` calendar date.
    Date,
    Numeric,
    Int,
    /// Number with a fractional part; integral input fails.
    Float,
    Url,
}

/// A single validation rule.
#[derive(Clone, Debug)]
pub enum Rule {
    /// Field must be present and non-empty.
    Required,
    /// Numeric input: at most this value. Other input: at most this many
    /// characters.
    Max(usize),
    /// Numeric input: at least this value. Other input: at least this many
    /// characters.
    Min(usize),
    /// Must equal the named sibling field.
    Matches(&'static str),
    /// Must parse as the given format.
    Format(Format),
    /// No existing row may already hold this value.
    ///
    /// `ignore` excuses one row, matched by column and value, so an update
    /// does not collide with the record being edited.
    Unique {
        table: &'static str,
        column: &'static str,
        ignore: Option<(&'static str, Value)>,
    },
}

/// Field validator.
///
/// # Example
///
/// ```ignore
/// use pgrecord::validate::{Format, Rule, Validator};
///
/// let validator = Validator::new()
///     .field("email", &[Rule::Required, Rule::Format(Format::Email)])
///     .field("age", &[Rule::Format(Format::Int), Rule::Max(120)]);
/// let errors = validator.check(&[("email", "ann@x.test"), ("age", "34")]);
/// assert!(errors.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Validator {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rules for a field. Rules run in the order given.
    pub fn field(mut self, name: &str, rules: &[Rule]) -> Self {
        self.fields.push((name.to_string(), rules.to_vec()));
        self
    }

    /// Run every database-free rule.
    ///
    /// [`Rule::Unique`] needs a connection and is skipped here; use
    /// [`check_db`](Self::check_db) to include it.
    pub fn check(&self, input: &[(&str, &str)]) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        for (field, rules) in &self.fields {
            let value = lookup(input, field);
            if value.map(str::is_empty).unwrap_or(true) {
                if rules.iter().any(|r| matches!(r, Rule::Required)) {
                    errors.push(field, "Required.");
                }
                continue;
            }
            let value = value.unwrap_or_default();
            for rule in rules {
                if let Some(message) = apply_rule(rule, value, input) {
                    errors.push(field, &message);
                    break;
                }
            }
        }
        errors
    }

    /// Run every rule, including uniqueness checks against the database.
    ///
    /// Unique rules only run for fields that passed everything else, so a
    /// malformed value never costs a query.
    pub async fn check_db(
        &self,
        conn: &impl GenericClient,
        input: &[(&str, &str)],
    ) -> DbResult<ValidationErrors> {
        let mut errors = self.check(input);
        for (field, rules) in &self.fields {
            if errors.first_for(field).is_some() {
                continue;
            }
            let Some(value) = lookup(input, field).filter(|v| !v.is_empty()) else {
                continue;
            };
            for rule in rules {
                if let Rule::Unique {
                    table,
                    column,
                    ignore,
                } = rule
                {
                    let mut query = QueryBuilder::table(table).where_eq(column, value);
                    if let Some((key, key_value)) = ignore {
                        query = query.where_(key, "!=", key_value.clone());
                    }
                    if query.count(conn).await? > 0 {
                        errors.push(field, "Already taken.");
                        break;
                    }
                }
            }
        }
        Ok(errors)
    }
}

/// Accumulated `(field, message)` pairs, in rule order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationErrors {
    errors: Vec<(String, String)>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The first message recorded for `field`, if any.
    pub fn first_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }

    fn push(&mut self, field: &str, message: &str) {
        self.errors.push((field.to_string(), message.to_string()));
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

fn lookup<'a>(input: &[(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    input.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn apply_rule(rule: &Rule, value: &str, input: &[(&str, &str)]) -> Option<String> {
    match rule {
        // Presence was already checked before rules run.
        Rule::Required => None,
        Rule::Max(limit) => match parse_number(value) {
            Some(n) if n > *limit as f64 => Some(format!("Must not be greater than {limit}.")),
            Some(_) => None,
            None if value.chars().count() > *limit => {
                Some(format!("Must not be longer than {limit} characters."))
            }
            None => None,
        },
        Rule::Min(limit) => match parse_number(value) {
            Some(n) if n < *limit as f64 => Some(format!("Must not be less than {limit}.")),
            Some(_) => None,
            None if value.chars().count() < *limit => {
                Some(format!("Must not be shorter than {limit} characters."))
            }
            None => None,
        },
        Rule::Matches(other) => {
            let other_value = lookup(input, other).unwrap_or("");
            (value != other_value).then(|| format!("Must match {other}."))
        }
        Rule::Format(format) => check_format(*format, value).map(str::to_string),
        // Needs a connection; see check_db.
        Rule::Unique { .. } => None,
    }
}

fn check_format(format: Format, value: &str) -> Option<&'static str> {
    let ok = match format {
        Format::Email => is_email(value),
        Format::Date => is_date(value),
        Format::Numeric => parse_number(value).is_some(),
        Format::Int => value.trim().parse::<i64>().is_ok(),
        Format::Float => parse_number(value).is_some_and(|n| n.fract() != 0.0),
        Format::Url => is_url(value),
    };
    if ok {
        None
    } else {
        Some(match format {
            Format::Email => "Invalid email.",
            Format::Date => "Invalid date format (YYYY-MM-DD).",
            Format::Numeric => "Must be a number.",
            Format::Int => "Must be an integer.",
            Format::Float => "Must be a float.",
            Format::Url => "Invalid URL.",
        })
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let n: f64 = s.trim().parse().ok()?;
    n.is_finite().then_some(n)
}

/// Best-effort email validation.
///
/// This is intentionally not fully RFC-compliant.
pub fn is_email(s: &str) -> bool {
    static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid built-in email regex")
        })
        .is_match(s)
}

/// `YYYY-MM-DD` calendar date, including month and day range checks.
pub fn is_date(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

pub fn is_url(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbResult;
    use std::sync::Mutex;
    use tokio_postgres::Row;
    use tokio_postgres::types::ToSql;

    #[test]
    fn required_flags_missing_and_empty() {
        let validator = Validator::new().field("name", &[Rule::Required]);
        assert_eq!(validator.check(&[]).first_for("name"), Some("Required."));
        assert_eq!(
            validator.check(&[("name", "")]).first_for("name"),
            Some("Required.")
        );
        assert!(validator.check(&[("name", "Ann")]).is_empty());
    }

    #[test]
    fn optional_fields_skip_rules_when_absent() {
        let validator = Validator::new().field("website", &[Rule::Format(Format::Url)]);
        assert!(validator.check(&[]).is_empty());
        assert!(validator.check(&[("website", "")]).is_empty());
    }

    #[test]
    fn email_format() {
        let validator = Validator::new().field("email", &[Rule::Format(Format::Email)]);
        assert!(validator.check(&[("email", "ann@x.test")]).is_empty());
        assert_eq!(
            validator.check(&[("email", "not-an-email")]).first_for("email"),
            Some("Invalid email.")
        );
    }

    #[test]
    fn date_format() {
        let validator = Validator::new().field("born_on", &[Rule::Format(Format::Date)]);
        assert!(validator.check(&[("born_on", "1990-04-21")]).is_empty());
        assert_eq!(
            validator.check(&[("born_on", "1990-13-40")]).first_for("born_on"),
            Some("Invalid date format (YYYY-MM-DD).")
        );
    }

    #[test]
    fn int_rejects_decimals_but_numeric_accepts_them() {
        let validator = Validator::new()
            .field("count", &[Rule::Format(Format::Int)])
            .field("price", &[Rule::Format(Format::Numeric)]);
        let errors = validator.check(&[("count", "12.5"), ("price", "12.5")]);
        assert_eq!(errors.first_for("count"), Some("Must be an integer."));
        assert!(errors.first_for("price").is_none());
    }

    #[test]
    fn max_compares_numbers_numerically() {
        let validator = Validator::new().field("age", &[Rule::Max(18)]);
        assert_eq!(
            validator.check(&[("age", "30")]).first_for("age"),
            Some("Must not be greater than 18.")
        );
        assert!(validator.check(&[("age", "18")]).is_empty());
    }

    #[test]
    fn max_compares_text_by_length() {
        let validator = Validator::new().field("code", &[Rule::Max(3)]);
        assert_eq!(
            validator.check(&[("code", "abcdef")]).first_for("code"),
            Some("Must not be longer than 3 characters.")
        );
        assert!(validator.check(&[("code", "abc")]).is_empty());
    }

    #[test]
    fn min_compares_numbers_and_text() {
        let validator = Validator::new()
            .field("age", &[Rule::Min(18)])
            .field("password", &[Rule::Min(8)]);
        let errors = validator.check(&[("age", "12"), ("password", "short")]);
        assert_eq!(errors.first_for("age"), Some("Must not be less than 18."));
        assert_eq!(
            errors.first_for("password"),
            Some("Must not be shorter than 8 characters.")
        );
    }

    #[test]
    fn matches_compares_against_sibling_field() {
        let validator = Validator::new().field("confirm", &[Rule::Matches("password")]);
        assert!(
            validator
                .check(&[("password", "hunter2!"), ("confirm", "hunter2!")])
                .is_empty()
        );
        assert_eq!(
            validator
                .check(&[("password", "hunter2!"), ("confirm", "other")])
                .first_for("confirm"),
            Some("Must match password.")
        );
    }

    #[test]
    fn first_failing_rule_wins() {
        let validator = Validator::new()
            .field("email", &[Rule::Format(Format::Email), Rule::Max(5)]);
        let errors = validator.check(&[("email", "definitely not an email")]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.first_for("email"), Some("Invalid email."));
    }

    #[test]
    fn unique_is_skipped_without_a_connection() {
        let validator = Validator::new().field(
            "email",
            &[Rule::Unique {
                table: "users",
                column: "email",
                ignore: None,
            }],
        );
        assert!(validator.check(&[("email", "ann@x.test")]).is_empty());
    }

    #[test]
    fn float_requires_a_fractional_part() {
        let validator = Validator::new().field("price", &[Rule::Format(Format::Float)]);
        assert!(validator.check(&[("price", "42.5")]).is_empty());
        assert_eq!(
            validator.check(&[("price", "42")]).first_for("price"),
            Some("Must be a float.")
        );
        assert_eq!(
            validator.check(&[("price", "42.0")]).first_for("price"),
            Some("Must be a float.")
        );
    }

    #[test]
    fn display_lists_field_and_message() {
        let validator = Validator::new().field("name", &[Rule::Required]);
        let errors = validator.check(&[]);
        assert_eq!(errors.to_string(), "name: Required.");
    }

    /// Returns no rows, so every COUNT resolves to zero.
    #[derive(Default)]
    struct EmptyConn {
        statements: Mutex<Vec<String>>,
    }

    impl GenericClient for EmptyConn {
        async fn query(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(Vec::new())
        }

        async fn query_opt(
            &self,
            sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> DbResult<Option<Row>> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(None)
        }

        async fn execute(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(0)
        }
    }

    #[tokio::test]
    async fn check_db_counts_existing_rows_for_unique() {
        let validator = Validator::new().field(
            "email",
            &[
                Rule::Required,
                Rule::Unique {
                    table: "users",
                    column: "email",
                    ignore: None,
                },
            ],
        );
        let conn = EmptyConn::default();
        let errors = validator
            .check_db(&conn, &[("email", "ann@x.test")])
            .await
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(
            conn.statements.lock().unwrap().clone(),
            vec!["SELECT COUNT(*) FROM users WHERE email = $1".to_string()]
        );
    }

    #[tokio::test]
    async fn unique_excludes_the_ignored_row_from_the_count() {
        let validator = Validator::new().field(
            "email",
            &[Rule::Unique {
                table: "users",
                column: "email",
                ignore: Some(("id", Value::Int(7))),
            }],
        );
        let conn = EmptyConn::default();
        let errors = validator
            .check_db(&conn, &[("email", "ann@x.test")])
            .await
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(
            conn.statements.lock().unwrap().clone(),
            vec!["SELECT COUNT(*) FROM users WHERE email = $1 AND id != $2".to_string()]
        );
    }

    #[tokio::test]
    async fn check_db_skips_unique_when_another_rule_failed() {
        let validator = Validator::new().field(
            "email",
            &[
                Rule::Format(Format::Email),
                Rule::Unique {
                    table: "users",
                    column: "email",
                    ignore: None,
                },
            ],
        );
        let conn = EmptyConn::default();
        let errors = validator
            .check_db(&conn, &[("email", "bogus")])
            .await
            .unwrap();
        assert_eq!(errors.first_for("email"), Some("Invalid email."));
        assert!(conn.statements.lock().unwrap().is_empty());
    }
}
