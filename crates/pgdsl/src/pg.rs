//! PostgreSQL backends on `tokio-postgres` and `deadpool-postgres`.
//!
//! Statements are rendered with `$n` placeholders. Queries are prepared first so
//! the result layout is known even when no rows come back.

mod blocking;
mod exec;
mod reactive;
mod types;

pub use blocking::PgBackend;
pub use reactive::PgReactiveBackend;
