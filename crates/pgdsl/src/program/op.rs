use std::fmt;
use std::sync::Arc;

use crate::error::DslResult;
use crate::field::Column;
use crate::row::{Row, RowMetadata};
use crate::sql::Statement;

/// Continuation fed with a leaf's raw result.
pub(crate) type Next<A, K> = Box<dyn FnOnce(A) -> DslResult<K> + Send>;

/// Which kind of database operation a leaf performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Update count, discarded.
    Update,
    /// Update inside a single-statement transaction, returning one column.
    UpdateReturning,
    /// Exactly one row.
    Query,
    /// Zero or one row.
    QueryOne,
    /// Zero or more rows.
    QueryIterable,
    /// Result layout only.
    QueryMeta,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Update => "update",
            OpKind::UpdateReturning => "update_returning",
            OpKind::Query => "query",
            OpKind::QueryOne => "query_one",
            OpKind::QueryIterable => "query_iterable",
            OpKind::QueryMeta => "query_meta",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database operation and the continuation consuming its result.
pub(crate) enum Op<K> {
    Update {
        statement: Statement,
        next: Next<u64, K>,
    },
    UpdateReturning {
        statement: Statement,
        column: Column,
        next: Next<Option<Row>, K>,
    },
    Query {
        statement: Statement,
        next: Next<Row, K>,
    },
    QueryOne {
        statement: Statement,
        next: Next<Option<Row>, K>,
    },
    QueryIterable {
        statement: Statement,
        next: Next<Vec<Row>, K>,
    },
    QueryMeta {
        statement: Statement,
        next: Next<Arc<RowMetadata>, K>,
    },
}

impl<K> Op<K> {
    pub(crate) fn kind(&self) -> OpKind {
        match self {
            Op::Update { .. } => OpKind::Update,
            Op::UpdateReturning { .. } => OpKind::UpdateReturning,
            Op::Query { .. } => OpKind::Query,
            Op::QueryOne { .. } => OpKind::QueryOne,
            Op::QueryIterable { .. } => OpKind::QueryIterable,
            Op::QueryMeta { .. } => OpKind::QueryMeta,
        }
    }

    pub(crate) fn statement(&self) -> &Statement {
        match self {
            Op::Update { statement, .. }
            | Op::UpdateReturning { statement, .. }
            | Op::Query { statement, .. }
            | Op::QueryOne { statement, .. }
            | Op::QueryIterable { statement, .. }
            | Op::QueryMeta { statement, .. } => statement,
        }
    }
}
