use std::fmt;
use std::marker::PhantomData;

use crate::condition::{Condition, Predicate};
use crate::error::{DslError, DslResult};
use crate::field::Column;
use crate::table::{FieldList, Table};
use crate::value::Slot;

use super::statement::{Statement, checked_placeholders};

/// Type-level append: `(A, B)` pushed with `C` is `(A, B, C)`.
pub trait Push<T> {
    type Output;
}

impl<T> Push<T> for () {
    type Output = (T,);
}

macro_rules! push_tuple {
    ($($ty:ident),+) => {
        impl<$($ty,)+ T> Push<T> for ($($ty,)+) {
            type Output = ($($ty,)+ T);
        }
    };
}

push_tuple!(A);
push_tuple!(A, B);
push_tuple!(A, B, C);
push_tuple!(A, B, C, D);
push_tuple!(A, B, C, D, E);
push_tuple!(A, B, C, D, E, F);
push_tuple!(A, B, C, D, E, F, G);

/// A statement under construction whose placeholders have slot types `P`.
///
/// Every builder method consumes `self` and returns a new builder; cloning a
/// builder is cheap and lets a common prefix be shared.
pub struct Sql<P = ()> {
    text: String,
    _slots: PhantomData<fn() -> P>,
}

impl<P> Clone for Sql<P> {
    fn clone(&self) -> Self {
        Self::with_text(self.text.clone())
    }
}

impl<P> fmt::Debug for Sql<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sql")
            .field("text", &self.text)
            .field("slots", &std::any::type_name::<P>())
            .finish()
    }
}

/// Start from hand-written SQL with no placeholders (DDL, fixed queries).
pub fn sql(text: impl Into<String>) -> DslResult<Sql<()>> {
    let text = text.into();
    if text.trim().is_empty() {
        return Err(DslError::invalid("SQL text cannot be empty"));
    }
    match checked_placeholders(&text)? {
        0 => Ok(Sql::with_text(text)),
        n => Err(DslError::invalid(format!(
            "raw SQL cannot hold placeholders (found {n}); use conditions to add bound values"
        ))),
    }
}

/// `select a, b, ...`
pub fn select(fields: impl FieldList) -> Sql<()> {
    let mut text = String::from("select ");
    write_columns(&mut text, &fields.columns(), Column::write_sql);
    Sql::with_text(text)
}

/// `insert into table`; follow with [`Sql::values`].
pub fn insert_into<F: FieldList>(table: &Table<F>) -> Sql<()> {
    let mut text = String::from("insert into ");
    table.write_reference(&mut text);
    Sql::with_text(text)
}

/// `update table`; follow with [`Sql::set`].
pub fn update<F: FieldList>(table: &Table<F>) -> Sql<()> {
    let mut text = String::from("update ");
    table.write_reference(&mut text);
    Sql::with_text(text)
}

/// `delete from table`
pub fn delete_from<F: FieldList>(table: &Table<F>) -> Sql<()> {
    let mut text = String::from("delete from ");
    table.write_reference(&mut text);
    Sql::with_text(text)
}

fn write_columns(out: &mut String, columns: &[Column], write: fn(&Column, &mut String)) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write(column, out);
    }
}

impl<P> Sql<P> {
    fn with_text(text: String) -> Self {
        Self {
            text,
            _slots: PhantomData,
        }
    }

    fn retype<Q>(self) -> Sql<Q> {
        Sql::with_text(self.text)
    }

    fn push(mut self, fragment: &str) -> Self {
        self.text.push_str(fragment);
        self
    }

    fn push_condition<T>(
        self,
        keyword: &str,
        condition: Condition<T>,
    ) -> Sql<<P as Push<T>>::Output>
    where
        P: Push<T>,
    {
        self.push(keyword).push(condition.expression()).retype()
    }

    /// SQL text so far, with one unexpanded `?` per slot.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append a fragment with no placeholders, e.g. `" for update"`.
    pub fn raw(self, fragment: &str) -> DslResult<Self> {
        if checked_placeholders(fragment)? != 0 {
            return Err(DslError::invalid(format!(
                "fragment cannot hold placeholders: `{fragment}`"
            )));
        }
        Ok(self.push(fragment))
    }

    pub fn from<F: FieldList>(self, table: &Table<F>) -> Self {
        let mut text = self.text;
        text.push_str(" from ");
        table.write_reference(&mut text);
        Self::with_text(text)
    }

    pub fn join<F: FieldList>(self, table: &Table<F>) -> Self {
        let mut text = self.text;
        text.push_str(" join ");
        table.write_reference(&mut text);
        Self::with_text(text)
    }

    pub fn left_join<F: FieldList>(self, table: &Table<F>) -> Self {
        let mut text = self.text;
        text.push_str(" left join ");
        table.write_reference(&mut text);
        Self::with_text(text)
    }

    pub fn on(self, predicate: &Predicate) -> Self {
        self.push(" on ").push(predicate.expression())
    }

    pub fn where_<T>(self, condition: Condition<T>) -> Sql<<P as Push<T>>::Output>
    where
        P: Push<T>,
    {
        self.push_condition(" where ", condition)
    }

    pub fn and<T>(self, condition: Condition<T>) -> Sql<<P as Push<T>>::Output>
    where
        P: Push<T>,
    {
        self.push_condition(" and ", condition)
    }

    pub fn or<T>(self, condition: Condition<T>) -> Sql<<P as Push<T>>::Output>
    where
        P: Push<T>,
    {
        self.push_condition(" or ", condition)
    }

    pub fn where_pred(self, predicate: &Predicate) -> Self {
        self.push(" where ").push(predicate.expression())
    }

    pub fn and_pred(self, predicate: &Predicate) -> Self {
        self.push(" and ").push(predicate.expression())
    }

    pub fn or_pred(self, predicate: &Predicate) -> Self {
        self.push(" or ").push(predicate.expression())
    }

    pub fn group_by(self, fields: impl FieldList) -> Self {
        let mut text = self.text;
        text.push_str(" group by ");
        write_columns(&mut text, &fields.columns(), Column::write_sql);
        Self::with_text(text)
    }

    pub fn order_by(self, fields: impl FieldList) -> Self {
        let mut text = self.text;
        text.push_str(" order by ");
        write_columns(&mut text, &fields.columns(), Column::write_sql);
        Self::with_text(text)
    }

    pub fn asc(self) -> Self {
        self.push(" asc")
    }

    pub fn desc(self) -> Self {
        self.push(" desc")
    }

    pub fn limit(self, count: u64) -> Self {
        self.push(&format!(" limit {count}"))
    }

    pub fn offset(self, count: u64) -> Self {
        self.push(&format!(" offset {count}"))
    }
}

impl Sql<()> {
    /// ` (a, b) values (?, ?)`: one slot per field, typed by the field.
    pub fn values<F: FieldList>(self, fields: F) -> Sql<F::Values> {
        let columns = fields.columns();
        let mut text = self.text;
        text.push_str(" (");
        write_columns(&mut text, &columns, Column::write_bare);
        text.push_str(") values (");
        for i in 0..columns.len() {
            if i > 0 {
                text.push_str(", ");
            }
            text.push('?');
        }
        text.push(')');
        Sql::with_text(text)
    }

    /// ` set a = ?, b = ?`: one slot per field, typed by the field.
    pub fn set<F: FieldList>(self, fields: F) -> Sql<F::Values> {
        let mut text = self.text;
        text.push_str(" set ");
        for (i, column) in fields.columns().iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            column.write_bare(&mut text);
            text.push_str(" = ?");
        }
        Sql::with_text(text)
    }

    pub fn bind(self) -> Statement {
        Statement::raw(self.text)
    }

    /// Same as `bind()` for statements without slots.
    pub fn build(self) -> Statement {
        self.bind()
    }
}

impl From<Sql<()>> for Statement {
    fn from(sql: Sql<()>) -> Self {
        sql.bind()
    }
}

macro_rules! bind_arity {
    ($($ty:ident $arg:ident),+) => {
        impl<$($ty: Slot),+> Sql<($($ty,)+)> {
            /// Supply one value per slot, in slot order.
            #[allow(clippy::too_many_arguments)]
            pub fn bind(self, $($arg: impl Into<$ty>),+) -> Statement {
                Statement::expand(&self.text, vec![$(<$ty as Slot>::into_param($arg.into())),+])
            }
        }
    };
}

bind_arity!(A a);
bind_arity!(A a, B b);
bind_arity!(A a, B b, C c);
bind_arity!(A a, B b, C c, D d);
bind_arity!(A a, B b, C c, D d, E e);
bind_arity!(A a, B b, C c, D d, E e, F f);
bind_arity!(A a, B b, C c, D d, E e, F f, G g);
bind_arity!(A a, B b, C c, D d, E e, F f, G g, H h);
