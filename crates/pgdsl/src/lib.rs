//! # pgdsl
//!
//! Typed SQL statements and composable database programs.
//!
//! ## Features
//!
//! - **Typed builders**: every `?` a builder writes adds one type to the statement's
//!   parameter list, and `bind` takes exactly those types, in order
//! - **Structured parameters**: ranges and collections expand to the right number of
//!   placeholders at bind time
//! - **Programs, not calls**: statements become [`Program`] leaves composed with
//!   [`Program::then`] and [`Program::and_then`]; nothing runs until a strategy is picked
//! - **One interpreter, several strategies**: direct, captured, deferred, or as an
//!   async stream
//! - **Schema drift checks**: compare declared tables with a live result layout
//!
//! ## Example
//!
//! ```ignore
//! use pgdsl::{Field, PgBackend, PgConfig, Program, Table, insert_into, select, sql};
//!
//! let id = Field::<i64>::of("id")?;
//! let name = Field::<String>::of("name")?;
//! let test = Table::new("test", (id.clone(), name.clone()))?;
//!
//! let program = Program::update(sql("create table test (id int8 primary key, name text)")?)
//!     .and_then(Program::update(insert_into(&test).values(test.fields()).bind(1, "a")))
//!     .and_then(Program::query_one(
//!         select(test.fields()).from(&test).where_(id.eq()).bind(1),
//!         test.decoder(),
//!     ));
//!
//! let backend = PgBackend::connect(PgConfig::from_env()?)?;
//! assert_eq!(program.run(&backend)?, Some((1, "a".to_string())));
//! ```

pub mod backend;
pub mod condition;
pub mod config;
pub mod error;
pub mod field;
pub mod ident;
pub mod program;
pub mod row;
pub mod sql;
pub mod strategy;
pub mod stream;
pub mod table;
pub mod value;

mod session;

#[cfg(feature = "pool")]
pub mod pg;
#[cfg(feature = "pool")]
pub mod pool;

pub use backend::{Backend, ConnectionSource, ReactiveBackend, RowStream};
pub use condition::{Condition, Predicate};
pub use config::PgConfig;
pub use error::{DslError, DslResult};
pub use field::{Column, Compare, Field};
pub use ident::{Ident, IntoIdent};
pub use program::{OpKind, Program};
pub use row::{ColumnMetadata, Row, RowCursor, RowMetadata};
pub use sql::{PlaceholderStyle, Sql, Statement, delete_from, insert_into, select, sql, update};
pub use strategy::{Captured, Defer, Deferred, Direct, Strategy};
pub use stream::{ProgramStream, query_stream};
pub use table::{FieldList, SchemaDrift, Table};
pub use value::{Between, FromValue, List, Param, Slot, ToValue, Value};

#[cfg(feature = "pool")]
pub use pg::{PgBackend, PgReactiveBackend};
#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, create_pool_with_manager_config, create_pool_with_tls};
