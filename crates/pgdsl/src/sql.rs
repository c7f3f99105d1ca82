//! Typed statement builder.
//!
//! [`Sql<P>`] accumulates SQL text; `P` is a tuple listing the slot type of
//! every placeholder so far. Each `where_`/`and`/`or` call appends one slot type,
//! `values`/`set` append one per field, and `bind` takes exactly one value per
//! slot, producing a [`Statement`] whose range and collection parameters are
//! already expanded.
//!
//! ```ignore
//! use pgdsl::{Field, Table, select};
//!
//! let id = Field::<i64>::of("id")?;
//! let name = Field::<String>::of("name")?;
//! let test = Table::new("test", (id.clone(), name.clone()))?;
//!
//! let stmt = select(test.fields())
//!     .from(&test)
//!     .where_(id.in_list())
//!     .and(name.like())
//!     .bind(vec![1, 2, 3], "a%");
//!
//! assert_eq!(stmt.sql(), "select id, name from test where id in (?, ?, ?) and name like ?");
//! assert_eq!(stmt.params().len(), 4);
//! # Ok::<(), pgdsl::DslError>(())
//! ```

mod builder;
mod statement;

pub use builder::{Push, Sql, delete_from, insert_into, select, sql, update};
pub(crate) use statement::checked_placeholders;
pub use statement::{PlaceholderStyle, Statement};
