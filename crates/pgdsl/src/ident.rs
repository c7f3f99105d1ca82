//! Validated SQL identifiers.
//!
//! Every column, table and alias name in a statement goes through [`Ident`], so
//! user-supplied names can never smuggle a placeholder or a statement fragment
//! into rendered SQL.
//!
//! - Unquoted segments match `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted segments allow anything except NUL; `"` is escaped as `""`
//! - Segments are joined with `.` (`schema.table`, `alias.column`)
//!
//! ```ignore
//! use pgdsl::Ident;
//!
//! let users = Ident::parse("public.users")?;
//! let camel = Ident::parse(r#""UserTable""#)?;
//! # Ok::<(), pgdsl::DslError>(())
//! ```

use std::fmt;

use crate::error::{DslError, DslResult};

/// One dot-separated segment of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Unquoted(String),
    Quoted(String),
}

impl Segment {
    /// The segment text without quoting.
    pub fn text(&self) -> &str {
        match self {
            Segment::Unquoted(s) | Segment::Quoted(s) => s,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Segment::Unquoted(s) => out.push_str(s),
            Segment::Quoted(s) => {
                out.push('"');
                out.push_str(&s.replace('"', "\"\""));
                out.push('"');
            }
        }
    }
}

/// A SQL identifier, possibly dotted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    segments: Vec<Segment>,
}

impl Ident {
    /// Build a single quoted segment from raw text.
    pub fn quoted(name: &str) -> DslResult<Self> {
        check_quoted(name)?;
        Ok(Self {
            segments: vec![Segment::Quoted(name.to_string())],
        })
    }

    /// Parse dotted, quoted or mixed identifier text.
    pub fn parse(text: &str) -> DslResult<Self> {
        if text.trim().is_empty() {
            return Err(DslError::invalid("identifier cannot be empty"));
        }
        if text.contains('\0') {
            return Err(DslError::invalid("identifier cannot contain NUL"));
        }

        let mut segments = Vec::new();
        let mut rest = text;
        loop {
            let (segment, tail) = match rest.strip_prefix('"') {
                Some(quoted) => split_quoted(quoted)?,
                None => split_unquoted(rest)?,
            };
            segments.push(segment);

            match tail.strip_prefix('.') {
                Some("") => return Err(DslError::invalid(format!("trailing '.' in '{text}'"))),
                Some(next) => rest = next,
                None if tail.is_empty() => break,
                None => {
                    return Err(DslError::invalid(format!(
                        "unexpected text after identifier segment in '{text}'"
                    )));
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The last segment: the name a result column carries.
    pub fn last(&self) -> &Segment {
        // parse/quoted never produce an empty list
        &self.segments[self.segments.len() - 1]
    }

    /// Split `a.b.c` into `(a.b, c)`; `None` for a single segment.
    pub(crate) fn split_last(&self) -> Option<(Ident, Ident)> {
        let (last, init) = self.segments.split_last()?;
        if init.is_empty() {
            return None;
        }
        Some((
            Ident {
                segments: init.to_vec(),
            },
            Ident {
                segments: vec![last.clone()],
            },
        ))
    }

    /// Whether a live column name refers to this identifier's last segment.
    ///
    /// Unquoted names fold case the way PostgreSQL does; quoted names compare exactly.
    pub fn matches_column(&self, column: &str) -> bool {
        match self.last() {
            Segment::Unquoted(name) => name.eq_ignore_ascii_case(column),
            Segment::Quoted(name) => name == column,
        }
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            segment.render(out);
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl std::str::FromStr for Ident {
    type Err = DslError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ident::parse(s)
    }
}

fn check_quoted(name: &str) -> DslResult<()> {
    if name.is_empty() {
        return Err(DslError::invalid("quoted identifier cannot be empty"));
    }
    if name.contains('\0') {
        return Err(DslError::invalid("identifier cannot contain NUL"));
    }
    Ok(())
}

/// Split a quoted segment (opening quote already consumed) from the remainder.
fn split_quoted(text: &str) -> DslResult<(Segment, &str)> {
    let mut name = String::new();
    let mut iter = text.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        if ch != '"' {
            name.push(ch);
            continue;
        }
        if matches!(iter.peek(), Some((_, '"'))) {
            iter.next();
            name.push('"');
            continue;
        }
        check_quoted(&name)?;
        return Ok((Segment::Quoted(name), &text[idx + 1..]));
    }
    Err(DslError::invalid("unclosed quoted identifier"))
}

fn split_unquoted(text: &str) -> DslResult<(Segment, &str)> {
    let end = text.find(|c: char| c == '.' || c == '"').unwrap_or(text.len());
    let name = &text[..end];

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(DslError::invalid("empty identifier segment")),
        Some(first) if !(first == '_' || first.is_ascii_alphabetic()) => {
            return Err(DslError::invalid(format!(
                "identifier '{name}' must start with a letter or '_'"
            )));
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|&c| !(c == '_' || c == '$' || c.is_ascii_alphanumeric())) {
        return Err(DslError::invalid(format!(
            "invalid character '{bad}' in identifier '{name}'"
        )));
    }

    Ok((Segment::Unquoted(name.to_string()), &text[end..]))
}

/// Convert an input into an [`Ident`].
pub trait IntoIdent {
    fn into_ident(self) -> DslResult<Ident>;
}

impl IntoIdent for Ident {
    fn into_ident(self) -> DslResult<Ident> {
        Ok(self)
    }
}

impl IntoIdent for &Ident {
    fn into_ident(self) -> DslResult<Ident> {
        Ok(self.clone())
    }
}

impl IntoIdent for &str {
    fn into_ident(self) -> DslResult<Ident> {
        Ident::parse(self)
    }
}

impl IntoIdent for String {
    fn into_ident(self) -> DslResult<Ident> {
        Ident::parse(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_dotted_names_render_unchanged() {
        for name in ["id", "public.users", "a.b.c", "my_var$1", "_x"] {
            assert_eq!(Ident::parse(name).unwrap().to_sql(), name);
        }
    }

    #[test]
    fn quoted_segments_keep_escapes() {
        let ident = Ident::parse(r#"public."User""Table".id"#).unwrap();
        assert_eq!(ident.to_sql(), r#"public."User""Table".id"#);
        assert_eq!(ident.segments()[1].text(), r#"User"Table"#);
    }

    #[test]
    fn quoted_constructor_escapes() {
        let ident = Ident::quoted("Has Space").unwrap();
        assert_eq!(ident.to_sql(), r#""Has Space""#);
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", "   ", "1table", "my table", "a..b", "a.", "\"open", "id?", "x\"y\""] {
            let err = Ident::parse(bad).unwrap_err();
            assert!(err.is_invalid_argument(), "{bad:?} gave {err}");
        }
    }

    #[test]
    fn column_matching_folds_unquoted_case() {
        assert!(Ident::parse("t.Name").unwrap().matches_column("name"));
        assert!(!Ident::parse(r#""Name""#).unwrap().matches_column("name"));
        assert!(Ident::parse(r#""Name""#).unwrap().matches_column("Name"));
    }
}
