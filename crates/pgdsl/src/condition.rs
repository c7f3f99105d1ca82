//! Boolean SQL fragments for `where`, `and`, `or` and `on` clauses.
//!
//! - [`Condition<T>`] holds exactly one logical placeholder; adding it to a
//!   statement appends the slot type `T` to the statement's parameter list.
//! - [`Predicate`] holds none (`x is null`, `a.id = b.id`).

use std::fmt;
use std::marker::PhantomData;

use crate::error::{DslError, DslResult};
use crate::sql::checked_placeholders;

/// A rendered boolean fragment that will bind one value of slot type `T`.
pub struct Condition<T> {
    text: String,
    _slot: PhantomData<fn() -> T>,
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        Self::rendered(self.text.clone())
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.text).finish()
    }
}

impl<T> Condition<T> {
    /// Wrap hand-written SQL, e.g. `Condition::<i64>::of("id % 2 = ?")`.
    ///
    /// The text must contain exactly one `?` outside quotes.
    pub fn of(text: impl Into<String>) -> DslResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DslError::invalid("condition text cannot be empty"));
        }
        match checked_placeholders(&text)? {
            1 => Ok(Self::rendered(text)),
            n => Err(DslError::invalid(format!(
                "condition must hold exactly one placeholder, found {n} in `{text}`"
            ))),
        }
    }

    pub(crate) fn rendered(text: String) -> Self {
        Self {
            text,
            _slot: PhantomData,
        }
    }

    pub fn expression(&self) -> &str {
        &self.text
    }

    pub fn not(&self) -> Condition<T> {
        Self::rendered(format!("not ({})", self.text))
    }
}

/// A rendered boolean fragment with no placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    text: String,
}

impl Predicate {
    /// Wrap hand-written SQL with no placeholders, e.g. `a.id = b.owner_id`.
    pub fn of(text: impl Into<String>) -> DslResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DslError::invalid("predicate text cannot be empty"));
        }
        if checked_placeholders(&text)? != 0 {
            return Err(DslError::invalid(format!(
                "predicate cannot hold placeholders: `{text}`"
            )));
        }
        Ok(Self::rendered(text))
    }

    pub(crate) fn rendered(text: String) -> Self {
        Self { text }
    }

    pub fn expression(&self) -> &str {
        &self.text
    }

    pub fn not(&self) -> Predicate {
        Self::rendered(format!("not ({})", self.text))
    }

    pub fn and(&self, other: &Predicate) -> Predicate {
        Self::rendered(format!("({}) and ({})", self.text, other.text))
    }

    pub fn or(&self, other: &Predicate) -> Predicate {
        Self::rendered(format!("({}) or ({})", self.text, other.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_requires_exactly_one_placeholder() {
        assert!(Condition::<i64>::of("id % 2 = ?").is_ok());
        for bad in ["", "  ", "id = 1", "id between ? and ?"] {
            assert!(Condition::<i64>::of(bad).unwrap_err().is_invalid_argument());
        }
    }

    #[test]
    fn quoted_question_marks_are_not_placeholders() {
        let cond = Condition::<String>::of("name = ? and note <> '?'").unwrap();
        assert_eq!(cond.expression(), "name = ? and note <> '?'");
    }

    #[test]
    fn negation_wraps_expression() {
        let cond = Condition::<i64>::of("id = ?").unwrap();
        assert_eq!(cond.not().expression(), "not (id = ?)");
    }

    #[test]
    fn predicates_reject_placeholders_and_combine() {
        assert!(Predicate::of("id = ?").is_err());
        let a = Predicate::of("a.id = b.id").unwrap();
        let b = Predicate::of("b.name is null").unwrap();
        assert_eq!(a.and(&b).expression(), "(a.id = b.id) and (b.name is null)");
        assert_eq!(a.or(&b).not().expression(), "not ((a.id = b.id) or (b.name is null))");
    }
}
