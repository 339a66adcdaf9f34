//! Identifier and operator whitelists.
//!
//! Every table name, column name, and comparison operator that reaches a SQL
//! statement flows through this module first. Values never do; they are
//! always bound as parameters. The rules are deliberately narrow:
//!
//! - Columns: letters, underscore, `*`, and dots (`u.email`, `*`). No digits,
//!   no spaces, no quoting.
//! - Tables: letters only.
//! - Operators: a fixed comparator set, parsed into [`CmpOp`].
//!
//! Anything outside the whitelist is rejected; the query builder records the
//! rejection and refuses to render (see [`crate::builder::QueryBuilder`]).

/// Check a column name against the column rule.
///
/// Accepts qualified (`u.email`) and wildcard (`*`) forms.
pub fn is_valid_column(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphabetic() || c == '_' || c == '*' || c == '.')
}

/// Check a table name against the table rule (letters only).
pub fn is_valid_table(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

/// A whitelisted comparison operator.
///
/// Parsed from the caller's spelling via [`CmpOp::parse`]; rendered via
/// [`CmpOp::to_sql`]. The accepted spellings are:
/// `=`, `<`, `>`, `!=`, `<>`, `<=>`, `IS`, `IS NOT`, `IS NULL`,
/// `IS NOT NULL`, `LIKE`, `NOT LIKE` (case-insensitive).
///
/// The null-safe spellings (`<=>`, `IS`, `IS NOT`) render as
/// `IS [NOT] DISTINCT FROM`, which is the dialect's null-safe comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
    Ne,
    NullSafeEq,
    NullSafeNe,
    IsNull,
    IsNotNull,
    Like,
    NotLike,
}

impl CmpOp {
    /// Parse an operator spelling. Returns `None` for anything outside the
    /// whitelist (`SOUNDS LIKE`, `REGEXP`, subquery fragments, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.to_ascii_uppercase();
        let norm = upper.split_whitespace().collect::<Vec<_>>().join(" ");
        match norm.as_str() {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "!=" | "<>" => Some(Self::Ne),
            "<=>" | "IS" => Some(Self::NullSafeEq),
            "IS NOT" => Some(Self::NullSafeNe),
            "IS NULL" => Some(Self::IsNull),
            "IS NOT NULL" => Some(Self::IsNotNull),
            "LIKE" => Some(Self::Like),
            "NOT LIKE" => Some(Self::NotLike),
            _ => None,
        }
    }

    /// Render the operator as SQL.
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Ne => "<>",
            Self::NullSafeEq => "IS NOT DISTINCT FROM",
            Self::NullSafeNe => "IS DISTINCT FROM",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }

    /// Whether the operator consumes a right-hand value.
    ///
    /// The null checks render without a placeholder.
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    Asc,
    Desc,
}

impl Sort {
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_simple() {
        assert!(is_valid_column("first_name"));
    }

    #[test]
    fn column_qualified() {
        assert!(is_valid_column("u.email"));
    }

    #[test]
    fn column_star() {
        assert!(is_valid_column("*"));
    }

    #[test]
    fn column_rejects_injection() {
        assert!(!is_valid_column("col=1 OR 1=1"));
    }

    #[test]
    fn column_rejects_digits() {
        assert!(!is_valid_column("col2"));
    }

    #[test]
    fn column_rejects_empty() {
        assert!(!is_valid_column(""));
    }

    #[test]
    fn column_rejects_space() {
        assert!(!is_valid_column("first name"));
    }

    #[test]
    fn table_simple() {
        assert!(is_valid_table("users"));
    }

    #[test]
    fn table_rejects_injection() {
        assert!(!is_valid_table("users; DROP TABLE users"));
    }

    #[test]
    fn table_rejects_underscore() {
        assert!(!is_valid_table("user_accounts"));
    }

    #[test]
    fn table_rejects_dotted() {
        assert!(!is_valid_table("public.users"));
    }

    #[test]
    fn op_accepts_whole_set() {
        for raw in [
            "=", "<", ">", "!=", "<>", "<=>", "IS", "IS NOT", "IS NULL", "IS NOT NULL", "LIKE",
            "NOT LIKE",
        ] {
            assert!(CmpOp::parse(raw).is_some(), "operator {raw:?} should parse");
        }
    }

    #[test]
    fn op_case_and_spacing_normalized() {
        assert_eq!(CmpOp::parse("like"), Some(CmpOp::Like));
        assert_eq!(CmpOp::parse("is  not   null"), Some(CmpOp::IsNotNull));
        assert_eq!(CmpOp::parse(" not like "), Some(CmpOp::NotLike));
    }

    #[test]
    fn op_rejects_outside_whitelist() {
        assert_eq!(CmpOp::parse("SOUNDS LIKE"), None);
        assert_eq!(CmpOp::parse("REGEXP"), None);
        assert_eq!(CmpOp::parse(">="), None);
        assert_eq!(CmpOp::parse("= 1 OR 1"), None);
        assert_eq!(CmpOp::parse(""), None);
    }

    #[test]
    fn op_renders_null_safe_forms() {
        assert_eq!(CmpOp::parse("<=>").map(CmpOp::to_sql), Some("IS NOT DISTINCT FROM"));
        assert_eq!(CmpOp::parse("IS NOT").map(CmpOp::to_sql), Some("IS DISTINCT FROM"));
    }

    #[test]
    fn op_null_checks_take_no_value() {
        assert!(!CmpOp::IsNull.takes_value());
        assert!(!CmpOp::IsNotNull.takes_value());
        assert!(CmpOp::Eq.takes_value());
    }

    #[test]
    fn sort_renders() {
        assert_eq!(Sort::Asc.to_sql(), "ASC");
        assert_eq!(Sort::Desc.to_sql(), "DESC");
        assert_eq!(Sort::default(), Sort::Asc);
    }
}
