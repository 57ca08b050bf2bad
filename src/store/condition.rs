//! Parameterized filter conditions rendered into SQL `WHERE` clauses.

use rusqlite::types::{ToSql, ToSqlOutput};

/// Column names shared by every entity table.
pub mod entity_columns {
    /// Logical id.
    pub const ID: &str = "id";
    /// Iteration number.
    pub const ITERATION: &str = "iteration";
    /// Latest flag.
    pub const LATEST: &str = "latest";
}

/// Column names shared by every relation table.
pub mod dependent_columns {
    /// Logical dependent id.
    pub const ID: &str = "id";
    /// Owner (left side).
    pub const OWNER_ID: &str = "owner_id";
    /// Other side (right side).
    pub const OTHER_ID: &str = "other_id";
    /// Interval start.
    pub const FIRST_ITERATION: &str = "first_iteration";
    /// Interval end.
    pub const LAST_ITERATION: &str = "last_iteration";
}

/// A bound parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// Text.
    Text(String),
    /// Integer.
    Int(i64),
    /// Boolean stored as 0/1.
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlValue::Text(s) => s.to_sql(),
            SqlValue::Int(i) => i.to_sql(),
            SqlValue::Bool(b) => b.to_sql(),
        }
    }
}

/// Boolean filter over a single table.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `column = value`.
    Eq(&'static str, SqlValue),
    /// `column <= value`.
    Le(&'static str, SqlValue),
    /// `column >= value`.
    Ge(&'static str, SqlValue),
    /// `column IS NULL`.
    IsNull(&'static str),
    /// Disjunction; empty renders as false.
    Or(Vec<Condition>),
    /// Conjunction; empty renders as true.
    And(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// `column = value`.
    pub fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Condition::Eq(column, value.into())
    }

    /// `column <= value`.
    pub fn le(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Condition::Le(column, value.into())
    }

    /// `column >= value`.
    pub fn ge(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Condition::Ge(column, value.into())
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), right) => {
                left.push(right);
                Condition::And(left)
            }
            (left, right) => Condition::And(vec![left, right]),
        }
    }

    /// `self OR other`.
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut terms) => {
                terms.push(other);
                Condition::Or(terms)
            }
            left => Condition::Or(vec![left, other]),
        }
    }

    /// `NOT self`.
    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Appends SQL text to `sql` and the bound values to `params`.
    pub fn render(&self, sql: &mut String, params: &mut Vec<SqlValue>) {
        match self {
            Condition::Eq(col, value) => render_cmp(sql, params, col, "=", value),
            Condition::Le(col, value) => render_cmp(sql, params, col, "<=", value),
            Condition::Ge(col, value) => render_cmp(sql, params, col, ">=", value),
            Condition::IsNull(col) => {
                sql.push_str(col);
                sql.push_str(" IS NULL");
            }
            Condition::Or(terms) => render_joined(sql, params, terms, " OR ", "0"),
            Condition::And(terms) => render_joined(sql, params, terms, " AND ", "1"),
            Condition::Not(inner) => {
                sql.push_str("NOT (");
                inner.render(sql, params);
                sql.push(')');
            }
        }
    }
}

fn render_cmp(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    column: &str,
    op: &str,
    value: &SqlValue,
) {
    params.push(value.clone());
    sql.push_str(column);
    sql.push(' ');
    sql.push_str(op);
    sql.push_str(" ?");
    sql.push_str(&params.len().to_string());
}

fn render_joined(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    terms: &[Condition],
    joiner: &str,
    empty: &str,
) {
    if terms.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (idx, term) in terms.iter().enumerate() {
        if idx > 0 {
            sql.push_str(joiner);
        }
        term.render(sql, params);
    }
    sql.push(')');
}
