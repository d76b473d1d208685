//! Predicate pushdown tree: `{eq, and, or}` over typed columns.
//!
//! A [`Predicate`] is built by the filter translator (`vstat-aggregate`)
//! and consumed by the [`crate::reader::ColumnarReader`] in two ways: to
//! prove whole row groups unsatisfiable from min/max statistics without
//! decoding them, and to test individual rows before they are materialised.

use std::fmt;

/// A typed column value used in an [`Predicate::Eq`] clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Boolean column value.
    Bool(bool),
    /// 32-bit integer column value (`rule_id`).
    Int32(i32),
    /// 64-bit integer column value (`snapshot_id`).
    Int64(i64),
    /// UTF-8 string column value.
    Utf8(String),
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Bool(b) => write!(f, "{b}"),
            ColumnValue::Int32(i) => write!(f, "{i}"),
            ColumnValue::Int64(i) => write!(f, "{i}"),
            ColumnValue::Utf8(s) => write!(f, "{s}"),
        }
    }
}

/// A predicate tree over the fact schema's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always true; matches every row. The starting point for a filter with
    /// no fields set.
    True,
    /// `column = value`.
    Eq {
        /// Static column name (see [`crate::schema::columns`]).
        column: &'static str,
        /// Value to compare against.
        value: ColumnValue,
    },
    /// Logical conjunction.
    And(Box<Predicate>, Box<Predicate>),
    /// Logical disjunction.
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Build an equality clause.
    pub fn eq(column: &'static str, value: ColumnValue) -> Self {
        Predicate::Eq { column, value }
    }

    /// AND this predicate with another, short-circuiting on `True`.
    pub fn and(self, other: Predicate) -> Self {
        match (&self, &other) {
            (Predicate::True, _) => other,
            (_, Predicate::True) => self,
            _ => Predicate::And(Box::new(self), Box::new(other)),
        }
    }

    /// OR this predicate with another.
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }
}
