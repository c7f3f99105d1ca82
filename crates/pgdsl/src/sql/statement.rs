use std::borrow::Cow;
use std::fmt;

use crate::error::{DslError, DslResult};
use crate::value::{Param, Value};

/// How positional placeholders are written in rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (JDBC/ODBC style).
    #[default]
    Question,
    /// `$1, $2, ...` (PostgreSQL wire protocol).
    Dollar,
}

/// Byte offsets of every `?` outside string literals and quoted identifiers,
/// plus the quote still open at the end of `sql`, if any.
fn scan(sql: &str) -> (Vec<usize>, Option<u8>) {
    let mut positions = Vec::new();
    let mut quote: Option<u8> = None;
    for (idx, byte) in sql.bytes().enumerate() {
        match (quote, byte) {
            // a doubled quote closes and reopens: net effect is still "inside"
            (Some(open), b) if b == open => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(byte),
            (None, b'?') => positions.push(idx),
            (None, _) => {}
        }
    }
    (positions, quote)
}

pub(crate) fn placeholder_positions(sql: &str) -> Vec<usize> {
    scan(sql).0
}

pub(crate) fn count_placeholders(sql: &str) -> usize {
    placeholder_positions(sql).len()
}

/// Placeholder count of a caller-supplied fragment.
///
/// An unterminated literal or quoted identifier is rejected: it would hide
/// every `?` appended after it.
pub(crate) fn checked_placeholders(sql: &str) -> DslResult<usize> {
    match scan(sql) {
        (positions, None) => Ok(positions.len()),
        (_, Some(quote)) => Err(DslError::invalid(format!(
            "unterminated {} quote in `{sql}`",
            if quote == b'"' { "double" } else { "single" }
        ))),
    }
}

/// A fully bound statement: SQL text with one `?` per flattened parameter.
///
/// Produced by `Sql::bind`. The text always holds exactly `params().len()`
/// placeholders; range and collection parameters are already expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Expand each logical `?` of `template` with the matching parameter.
    pub(crate) fn expand(template: &str, params: Vec<Param>) -> Self {
        let positions = placeholder_positions(template);
        assert_eq!(
            positions.len(),
            params.len(),
            "slot count out of sync with placeholders in `{template}`"
        );

        let width: usize = params.iter().map(Param::width).sum();
        let mut sql = String::with_capacity(template.len() + width * 3);
        let mut flat = Vec::with_capacity(width);
        let mut last = 0;
        for (pos, param) in positions.into_iter().zip(params) {
            sql.push_str(&template[last..pos]);
            param.write_placeholders(&mut sql);
            param.flatten_into(&mut flat);
            last = pos + 1;
        }
        sql.push_str(&template[last..]);

        Self { sql, params: flat }
    }

    /// A statement without parameters.
    pub(crate) fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// SQL text with `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.sql)
    }

    /// SQL text in the requested placeholder style.
    pub fn render(&self, style: PlaceholderStyle) -> Cow<'_, str> {
        match style {
            PlaceholderStyle::Question => Cow::Borrowed(&self.sql),
            PlaceholderStyle::Dollar => {
                let positions = placeholder_positions(&self.sql);
                if positions.is_empty() {
                    return Cow::Borrowed(&self.sql);
                }
                let mut out = String::with_capacity(self.sql.len() + positions.len() * 2);
                let mut last = 0;
                for (i, pos) in positions.into_iter().enumerate() {
                    out.push_str(&self.sql[last..pos]);
                    out.push('$');
                    out.push_str(&(i + 1).to_string());
                    last = pos + 1;
                }
                out.push_str(&self.sql[last..]);
                Cow::Owned(out)
            }
        }
    }

    /// Append a trailing clause that carries no parameters.
    pub(crate) fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            sql: format!("{}{suffix}", self.sql),
            params: self.params.clone(),
        }
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
