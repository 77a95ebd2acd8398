//! SQL literal rendering.
//!
//! Rendered literals are embedded verbatim into generated statements, so the
//! rules here are an output contract: integers stay bare, text is single-quoted
//! with embedded quotes doubled, and values without a literal form become an
//! annotated `NULL`.

use crate::error::{Error, Result};
use crate::model::ColumnDefinition;
use chrono::{NaiveDate, NaiveDateTime};
use std::borrow::Cow;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ORACLE_DATE_MASK: &str = "YYYY-MM-DD HH24:MI:SS";

/// Turns user input (a seed value) into a literal.
///
/// `"42"` -> `42`, `"ORD-0001"` -> `'ORD-0001'`, `"O'Brien"` -> `'O''Brien'`.
pub fn to_sql_literal(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Input("value must not be empty".to_string()));
    }
    if is_integer(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Ok(quote(trimmed))
    }
}

pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub fn is_integer(text: &str) -> bool {
    text.parse::<i64>().is_ok()
}

/// Quoted literals are text; everything else (numbers, `NULL`, expressions) is not.
pub fn is_text_literal(literal: &str) -> bool {
    literal.starts_with('\'')
}

/// Literal equality, treating `42` and `42.0` as the same number.
pub fn literals_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if is_text_literal(a) || is_text_literal(b) {
        return false;
    }
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Converts a numeric literal to the form a column of `kind` stores it in,
/// the way `WHERE text_col = 1001` converts implicitly.
///
/// `1001` against a text column -> `'1001'`; `'42'` against a number column -> `42`.
pub fn coerce_literal(literal: &str, kind: ValueKind) -> Cow<'_, str> {
    match kind {
        ValueKind::Text if !is_text_literal(literal) && literal.parse::<f64>().is_ok() => {
            Cow::Owned(quote(literal))
        }
        ValueKind::Number if is_text_literal(literal) && literal.len() >= 2 => {
            let inner = literal[1..literal.len() - 1].trim();
            if inner.parse::<f64>().is_ok() {
                Cow::Owned(inner.to_string())
            } else {
                Cow::Borrowed(literal)
            }
        }
        _ => Cow::Borrowed(literal),
    }
}

/// Raw cell value as read from a data source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Number(String),
    Text(String),
    /// Already an SQL expression, e.g. `TO_DATE('2024-01-01', 'YYYY-MM-DD')`.
    Expression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Date,
    Timestamp,
    Lob,
    Text,
}

impl ValueKind {
    pub fn of(data_type: &str) -> Self {
        let upper = data_type.trim().to_uppercase();
        match upper.as_str() {
            "NUMBER" | "FLOAT" | "BINARY_FLOAT" | "BINARY_DOUBLE" => Self::Number,
            "DATE" => Self::Date,
            "CLOB" | "BLOB" | "NCLOB" => Self::Lob,
            t if t.starts_with("TIMESTAMP") => Self::Timestamp,
            _ => Self::Text,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

/// Renders a cell according to its column's declared type.
pub fn render_value(value: &SqlValue, column: &ColumnDefinition) -> String {
    let kind = ValueKind::of(&column.data_type);
    match (value, kind) {
        (SqlValue::Null, _) => "NULL".to_string(),
        (_, ValueKind::Lob) => format!(
            "NULL /* {} value in {} not exportable */",
            column.data_type.to_uppercase(),
            column.name
        ),
        (SqlValue::Expression(expr), _) => expr.clone(),
        (SqlValue::Number(n), ValueKind::Number | ValueKind::Text) => n.clone(),
        (SqlValue::Text(s), ValueKind::Number) => {
            if s.trim().parse::<f64>().is_ok() {
                s.trim().to_string()
            } else {
                quote(s)
            }
        }
        (SqlValue::Text(s) | SqlValue::Number(s), ValueKind::Date) => match parse_datetime(s) {
            Some(ts) => format!(
                "TO_DATE('{}', '{}')",
                ts.format(DATE_FORMAT),
                ORACLE_DATE_MASK
            ),
            None => quote(s),
        },
        (SqlValue::Text(s) | SqlValue::Number(s), ValueKind::Timestamp) => {
            match parse_datetime(s) {
                Some(ts) => format!(
                    "TO_TIMESTAMP('{}', '{}')",
                    ts.format(DATE_FORMAT),
                    ORACLE_DATE_MASK
                ),
                None => quote(s),
            }
        }
        (SqlValue::Text(s), ValueKind::Text) => quote(s),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
