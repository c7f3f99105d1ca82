//! Table descriptors: a name plus an ordered tuple of typed fields.
//!
//! ```ignore
//! use pgdsl::{Field, Table};
//!
//! let id = Field::<i64>::of("id")?;
//! let name = Field::<String>::of("name")?;
//! let test = Table::new("test", (id, name))?;
//!
//! assert_eq!(test.as_alias(&"a".parse()?).reference(), "test as a");
//! # Ok::<(), pgdsl::DslError>(())
//! ```

use std::fmt;

use crate::error::DslResult;
use crate::field::{Column, Field};
use crate::ident::{Ident, IntoIdent};
use crate::row::{Row, RowMetadata};
use crate::value::FromValue;

/// An ordered, non-empty list of fields decoding into a tuple.
///
/// Implemented for a single field and for tuples of one to eight fields, owned or
/// borrowed. `Values` is both the decoded row type and the slot list a
/// `values(...)`/`set(...)` clause appends to a statement.
pub trait FieldList {
    type Values;

    fn columns(&self) -> Vec<Column>;

    fn decode(&self, row: &Row) -> DslResult<Self::Values>;
}

/// Field lists that can be re-seen through another table alias.
pub trait Requalify: Sized {
    fn qualified_by(&self, table: &Ident) -> Self;
}

impl<T: FromValue> FieldList for Field<T> {
    type Values = (T,);

    fn columns(&self) -> Vec<Column> {
        vec![self.column()]
    }

    fn decode(&self, row: &Row) -> DslResult<(T,)> {
        Ok((row.get(self)?,))
    }
}

impl<T> Requalify for Field<T> {
    fn qualified_by(&self, table: &Ident) -> Self {
        Field::qualified_by(self, table)
    }
}

impl<F: FieldList> FieldList for &F {
    type Values = F::Values;

    fn columns(&self) -> Vec<Column> {
        (**self).columns()
    }

    fn decode(&self, row: &Row) -> DslResult<F::Values> {
        (**self).decode(row)
    }
}

macro_rules! field_tuple {
    ($($ty:ident $idx:tt),+) => {
        impl<$($ty: FromValue),+> FieldList for ($(Field<$ty>,)+) {
            type Values = ($($ty,)+);

            fn columns(&self) -> Vec<Column> {
                vec![$(self.$idx.column()),+]
            }

            fn decode(&self, row: &Row) -> DslResult<Self::Values> {
                Ok(($(row.get(&self.$idx)?,)+))
            }
        }

        impl<'f, $($ty: FromValue),+> FieldList for ($(&'f Field<$ty>,)+) {
            type Values = ($($ty,)+);

            fn columns(&self) -> Vec<Column> {
                vec![$(self.$idx.column()),+]
            }

            fn decode(&self, row: &Row) -> DslResult<Self::Values> {
                Ok(($(row.get(self.$idx)?,)+))
            }
        }

        impl<$($ty),+> Requalify for ($(Field<$ty>,)+) {
            fn qualified_by(&self, table: &Ident) -> Self {
                ($(self.$idx.qualified_by(table),)+)
            }
        }
    };
}

field_tuple!(A 0);
field_tuple!(A 0, B 1);
field_tuple!(A 0, B 1, C 2);
field_tuple!(A 0, B 1, C 2, D 3);
field_tuple!(A 0, B 1, C 2, D 3, E 4);
field_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
field_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
field_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Every mismatch between a table's declared fields and a live result layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDrift {
    issues: Vec<String>,
}

impl SchemaDrift {
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<String> {
        self.issues
    }
}

impl fmt::Display for SchemaDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema drift: {}", self.issues.join("; "))
    }
}

impl std::error::Error for SchemaDrift {}

/// A named table and the fields it maps.
#[derive(Debug, Clone)]
pub struct Table<F> {
    name: Ident,
    alias: Option<Ident>,
    fields: F,
}

impl<F: FieldList> Table<F> {
    pub fn new(name: impl IntoIdent, fields: F) -> DslResult<Self> {
        Ok(Self {
            name: name.into_ident()?,
            alias: None,
            fields,
        })
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn alias(&self) -> Option<&Ident> {
        self.alias.as_ref()
    }

    /// How the table appears in a `from`/`join` clause: `test` or `test as a`.
    pub fn reference(&self) -> String {
        let mut out = String::new();
        self.write_reference(&mut out);
        out
    }

    pub(crate) fn write_reference(&self, out: &mut String) {
        self.name.write_sql(out);
        if let Some(alias) = &self.alias {
            out.push_str(" as ");
            alias.write_sql(out);
        }
    }

    pub fn fields(&self) -> &F {
        &self.fields
    }

    pub fn columns(&self) -> Vec<Column> {
        self.fields.columns()
    }

    pub fn decode(&self, row: &Row) -> DslResult<F::Values> {
        self.fields.decode(row)
    }

    /// A row mapper for `Program::query*` leaves.
    pub fn decoder(&self) -> impl Fn(&Row) -> DslResult<F::Values> + Send + Sync + 'static
    where
        F: Clone + Send + Sync + 'static,
    {
        let fields = self.fields.clone();
        move |row: &Row| fields.decode(row)
    }

    /// Compare declared fields with a live layout, collecting every mismatch.
    ///
    /// Each declared field without a live column yields `"<field> not found"`; each
    /// live column no field maps yields `"<column> not mapped"`.
    pub fn validate(&self, metadata: &RowMetadata) -> Result<(), SchemaDrift> {
        let columns = self.columns();
        let mut issues = Vec::new();

        for column in &columns {
            if column.index_in(metadata).is_none() {
                issues.push(format!("{} not found", column.label()));
            }
        }
        for live in metadata.columns() {
            if !columns.iter().any(|column| column.matches(live.name())) {
                issues.push(format!("{} not mapped", live.name()));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaDrift { issues })
        }
    }
}

impl<F: FieldList + Requalify> Table<F> {
    /// The same table under another alias; its fields render as `alias.column`.
    pub fn as_alias(&self, alias: &Ident) -> Table<F> {
        Table {
            name: self.name.clone(),
            alias: Some(alias.clone()),
            fields: self.fields.qualified_by(alias),
        }
    }

    /// Fields qualified by the table's own name (`test.id`).
    pub fn qualified(&self) -> Table<F> {
        let qualifier = self.alias.as_ref().unwrap_or(&self.name);
        Table {
            name: self.name.clone(),
            alias: self.alias.clone(),
            fields: self.fields.qualified_by(qualifier),
        }
    }
}
