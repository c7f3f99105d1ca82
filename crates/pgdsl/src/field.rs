//! Typed column references.
//!
//! A [`Field<T>`] names a column whose values decode into `T`. Derived fields
//! (aggregates, aliases, table-qualified references) are new fields over the same
//! small expression tree; building them never touches a connection.
//!
//! ```ignore
//! use pgdsl::Field;
//!
//! let id = Field::<i64>::of("id")?;
//! let name = Field::<String>::of("name")?;
//!
//! assert_eq!(id.count().name(), "count(id)");
//! assert_eq!(name.eq().expression(), "name = ?");
//! # Ok::<(), pgdsl::DslError>(())
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::condition::{Condition, Predicate};
use crate::error::DslResult;
use crate::ident::{Ident, IntoIdent};
use crate::row::RowMetadata;
use crate::value::{Between, List, ToValue, Value};

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Column(Ident),
    Qualified { table: Ident, column: Ident },
    Function { name: &'static str, arg: Arc<Expr>, default: Option<Value> },
    Alias { expr: Arc<Expr>, alias: Ident },
}

impl Expr {
    fn write_sql(&self, out: &mut String) {
        match self {
            Expr::Column(column) => column.write_sql(out),
            Expr::Qualified { table, column } => {
                table.write_sql(out);
                out.push('.');
                column.write_sql(out);
            }
            Expr::Function { name, arg, default } => {
                out.push_str(name);
                out.push('(');
                arg.write_sql(out);
                if let Some(default) = default {
                    out.push_str(", ");
                    write_literal(default, out);
                }
                out.push(')');
            }
            Expr::Alias { expr, alias } => {
                expr.write_sql(out);
                out.push_str(" as ");
                alias.write_sql(out);
            }
        }
    }

    /// Name of the result column this expression produces.
    fn label(&self) -> &str {
        match self {
            Expr::Column(column) | Expr::Qualified { column, .. } => column.last().text(),
            Expr::Function { name, .. } => *name,
            Expr::Alias { alias, .. } => alias.last().text(),
        }
    }

    /// The column as written in an insert column list or `set` clause.
    fn write_bare(&self, out: &mut String) {
        match self {
            Expr::Column(column) | Expr::Qualified { column, .. } => column.write_sql(out),
            Expr::Alias { expr, .. } => expr.write_bare(out),
            other => other.write_sql(out),
        }
    }

    fn matches(&self, live: &str) -> bool {
        match self {
            Expr::Column(column) | Expr::Qualified { column, .. } => column.matches_column(live),
            Expr::Alias { alias, .. } => alias.matches_column(live),
            Expr::Function { name, .. } => name.eq_ignore_ascii_case(live),
        }
    }

    fn qualified_by(&self, table: &Ident) -> Expr {
        match self {
            Expr::Column(column) | Expr::Qualified { column, .. } => Expr::Qualified {
                table: table.clone(),
                column: column.clone(),
            },
            Expr::Function { name, arg, default } => Expr::Function {
                name: *name,
                arg: Arc::new(arg.qualified_by(table)),
                default: default.clone(),
            },
            Expr::Alias { expr, alias } => Expr::Alias {
                expr: Arc::new(expr.qualified_by(table)),
                alias: alias.clone(),
            },
        }
    }
}

fn write_literal(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::Int(v) => out.push_str(&v.to_string()),
        Value::Float(v) => out.push_str(&v.to_string()),
        Value::Bytes(v) => {
            out.push_str("'\\x");
            for byte in v {
                out.push_str(&format!("{byte:02x}"));
            }
            out.push('\'');
        }
        Value::Text(v) => quote_text(v, out),
        Value::Uuid(v) => quote_text(&v.to_string(), out),
        Value::Date(v) => quote_text(&v.to_string(), out),
        Value::Timestamp(v) => quote_text(&v.to_string(), out),
        Value::Json(v) => quote_text(&v.to_string(), out),
    }
}

fn quote_text(text: &str, out: &mut String) {
    out.push('\'');
    out.push_str(&text.replace('\'', "''"));
    out.push('\'');
}

/// Binary comparison operators available on fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl Compare {
    pub fn as_sql(self) -> &'static str {
        match self {
            Compare::Eq => "=",
            Compare::NotEq => "<>",
            Compare::Gt => ">",
            Compare::Gte => ">=",
            Compare::Lt => "<",
            Compare::Lte => "<=",
            Compare::Like => "like",
        }
    }
}

/// A column reference with its type erased.
#[derive(Clone, PartialEq)]
pub struct Column {
    expr: Arc<Expr>,
}

impl Column {
    /// Rendered SQL, e.g. `a.id` or `count(id) as total`.
    pub fn name(&self) -> String {
        let mut out = String::new();
        self.expr.write_sql(&mut out);
        out
    }

    /// Name of the result column this reference produces.
    pub fn label(&self) -> &str {
        self.expr.label()
    }

    /// Unqualified column name as used in insert lists and `set` clauses.
    pub fn bare_name(&self) -> String {
        let mut out = String::new();
        self.expr.write_bare(&mut out);
        out
    }

    /// Whether a live result column corresponds to this reference.
    pub fn matches(&self, live: &str) -> bool {
        self.expr.matches(live)
    }

    /// Position of this reference among the live columns.
    pub fn index_in(&self, metadata: &RowMetadata) -> Option<usize> {
        metadata
            .columns()
            .iter()
            .position(|column| column.name() == self.label())
            .or_else(|| metadata.columns().iter().position(|column| self.matches(column.name())))
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        self.expr.write_sql(out);
    }

    pub(crate) fn write_bare(&self, out: &mut String) {
        self.expr.write_bare(out);
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Column").field(&self.name()).finish()
    }
}

/// A typed column reference.
pub struct Field<T> {
    expr: Arc<Expr>,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self::from_expr(Arc::clone(&self.expr))
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Field<T> {
    /// Reference a column by name; dotted names (`t.id`) are table-qualified.
    pub fn of(name: impl IntoIdent) -> DslResult<Self> {
        let ident = name.into_ident()?;
        let expr = match ident.split_last() {
            Some((table, column)) => Expr::Qualified { table, column },
            None => Expr::Column(ident),
        };
        Ok(Self::from_expr(Arc::new(expr)))
    }

    fn from_expr(expr: Arc<Expr>) -> Self {
        Self {
            expr,
            _type: PhantomData,
        }
    }

    fn function<U>(&self, name: &'static str, default: Option<Value>) -> Field<U> {
        Field::from_expr(Arc::new(Expr::Function {
            name,
            arg: Arc::clone(&self.expr),
            default,
        }))
    }

    /// Rendered SQL for this field.
    pub fn name(&self) -> String {
        self.column().name()
    }

    /// Result-column name a row carries for this field.
    pub fn label(&self) -> &str {
        self.expr.label()
    }

    pub fn column(&self) -> Column {
        Column {
            expr: Arc::clone(&self.expr),
        }
    }

    pub fn count(&self) -> Field<i64> {
        self.function("count", None)
    }

    pub fn sum(&self) -> Field<T> {
        self.function("sum", None)
    }

    pub fn min(&self) -> Field<T> {
        self.function("min", None)
    }

    pub fn max(&self) -> Field<T> {
        self.function("max", None)
    }

    /// `avg(x)`; averages are fractional whatever the column type.
    pub fn avg(&self) -> Field<f64> {
        self.function("avg", None)
    }

    /// `coalesce(x, default)` with the default rendered as a SQL literal.
    pub fn coalesce(&self, default: T) -> Field<T>
    where
        T: ToValue,
    {
        self.function("coalesce", Some(default.to_value()))
    }

    /// `x as alias`.
    pub fn alias(&self, alias: &Ident) -> Field<T> {
        Field::from_expr(Arc::new(Expr::Alias {
            expr: Arc::clone(&self.expr),
            alias: alias.clone(),
        }))
    }

    /// The same column seen through `table` (`table.x`); replaces any existing qualifier.
    pub fn qualified_by(&self, table: &Ident) -> Field<T> {
        Field::from_expr(Arc::new(self.expr.qualified_by(table)))
    }

    fn compare<S>(&self, op: Compare) -> Condition<S> {
        Condition::rendered(format!("{} {} ?", self.name(), op.as_sql()))
    }

    pub fn eq(&self) -> Condition<T> {
        self.compare(Compare::Eq)
    }

    pub fn not_eq(&self) -> Condition<T> {
        self.compare(Compare::NotEq)
    }

    pub fn gt(&self) -> Condition<T> {
        self.compare(Compare::Gt)
    }

    pub fn gte(&self) -> Condition<T> {
        self.compare(Compare::Gte)
    }

    pub fn lt(&self) -> Condition<T> {
        self.compare(Compare::Lt)
    }

    pub fn lte(&self) -> Condition<T> {
        self.compare(Compare::Lte)
    }

    pub fn like(&self) -> Condition<T> {
        self.compare(Compare::Like)
    }

    /// `x in (?)`; the slot expands to one placeholder per bound element.
    pub fn in_list(&self) -> Condition<List<T>> {
        Condition::rendered(format!("{} in (?)", self.name()))
    }

    /// `x between ?`; the slot expands to `? and ?`.
    pub fn between(&self) -> Condition<Between<T>> {
        Condition::rendered(format!("{} between ?", self.name()))
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::rendered(format!("{} is null", self.name()))
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::rendered(format!("{} is not null", self.name()))
    }

    /// `x = other`, typically a join condition.
    pub fn eq_field(&self, other: &Field<T>) -> Predicate {
        Predicate::rendered(format!("{} = {}", self.name(), other.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Field<i64> {
        Field::of("id").unwrap()
    }

    #[test]
    fn of_rejects_empty_and_keeps_valid_names() {
        assert!(Field::<i64>::of("").unwrap_err().is_invalid_argument());
        for name in ["id", "name", "t.id", r#""Mixed Case""#] {
            assert_eq!(Field::<i64>::of(name).unwrap().name(), name);
        }
    }

    #[test]
    fn aggregates_render_functions() {
        assert_eq!(id().count().name(), "count(id)");
        assert_eq!(id().sum().name(), "sum(id)");
        assert_eq!(id().min().name(), "min(id)");
        assert_eq!(id().max().name(), "max(id)");
        assert_eq!(id().avg().name(), "avg(id)");
        assert_eq!(id().coalesce(1).name(), "coalesce(id, 1)");
        assert_eq!(
            Field::<String>::of("name").unwrap().coalesce("it's".into()).name(),
            "coalesce(name, 'it''s')"
        );
    }

    #[test]
    fn alias_and_qualifier_compose() {
        let a = Ident::parse("a").unwrap();
        let total = Ident::parse("total").unwrap();

        assert_eq!(id().qualified_by(&a).name(), "a.id");
        assert_eq!(id().count().alias(&total).name(), "count(id) as total");
        assert_eq!(id().count().qualified_by(&a).name(), "count(a.id)");
        assert_eq!(
            Field::<i64>::of("b.id").unwrap().qualified_by(&a).name(),
            "a.id"
        );
    }

    #[test]
    fn labels_follow_result_column_names() {
        let total = Ident::parse("total").unwrap();
        assert_eq!(Field::<i64>::of("t.id").unwrap().label(), "id");
        assert_eq!(id().count().label(), "count");
        assert_eq!(id().count().alias(&total).label(), "total");
        assert_eq!(id().alias(&total).column().bare_name(), "id");
    }

    #[test]
    fn comparisons_render_one_placeholder() {
        assert_eq!(id().eq().expression(), "id = ?");
        assert_eq!(id().not_eq().expression(), "id <> ?");
        assert_eq!(id().gt().expression(), "id > ?");
        assert_eq!(id().gte().expression(), "id >= ?");
        assert_eq!(id().lt().expression(), "id < ?");
        assert_eq!(id().lte().expression(), "id <= ?");
        assert_eq!(
            Field::<String>::of("name").unwrap().like().expression(),
            "name like ?"
        );
        assert_eq!(id().in_list().expression(), "id in (?)");
        assert_eq!(id().between().expression(), "id between ?");
    }

    #[test]
    fn predicates_render_without_placeholders() {
        let other = Field::<i64>::of("b.id").unwrap();
        assert_eq!(id().is_null().expression(), "id is null");
        assert_eq!(id().is_not_null().expression(), "id is not null");
        assert_eq!(
            id().qualified_by(&Ident::parse("a").unwrap()).eq_field(&other).expression(),
            "a.id = b.id"
        );
    }
}
