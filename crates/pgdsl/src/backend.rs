//! Backend adapter traits.
//!
//! A program runs against one of two adapter shapes:
//! - [`Backend`]: blocking calls, one connection per program run.
//! - [`ReactiveBackend`]: async calls, one connection per statement (pinned for the
//!   duration of a transaction), rows delivered as a [`RowStream`].
//!
//! Both share [`ConnectionSource`], whose `release` runs on every exit path,
//! including failures and dropped streams. A connection dropped while a
//! transaction is open goes to `discard` instead, so it is never reused.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::TryStreamExt;

use crate::error::{DslError, DslResult};
use crate::row::{Row, RowCursor, RowMetadata};
use crate::sql::Statement;

/// Where connections come from and go back to.
pub trait ConnectionSource: Send + Sync {
    type Connection: Send;

    /// Hand a connection back. The default drops it.
    fn release(&self, connection: Self::Connection) {
        drop(connection);
    }

    /// Get rid of a connection left in an unknown state, such as one abandoned
    /// mid-transaction. It must not be handed out again. The default drops it.
    fn discard(&self, connection: Self::Connection) {
        drop(connection);
    }
}

/// Blocking adapter: every call completes before returning.
pub trait Backend: ConnectionSource {
    fn acquire(&self) -> DslResult<Self::Connection>;

    fn begin(&self, connection: &mut Self::Connection) -> DslResult<()>;

    fn commit(&self, connection: &mut Self::Connection) -> DslResult<()>;

    fn rollback(&self, connection: &mut Self::Connection) -> DslResult<()>;

    /// Execute a statement and return the affected row count.
    fn execute_update(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> DslResult<u64>;

    /// Execute a statement and return `column` of the affected row, if any.
    ///
    /// Called between `begin` and `commit`.
    fn execute_update_returning(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>>;

    fn execute_query(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> DslResult<RowCursor>;

    /// The layout `statement` would produce. The default runs the query and
    /// keeps only its metadata; adapters that can describe a statement without
    /// executing it should override this.
    fn execute_query_metadata(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> DslResult<Arc<RowMetadata>> {
        Ok(self.execute_query(connection, statement)?.into_metadata())
    }
}

/// Async adapter; rows arrive incrementally.
pub trait ReactiveBackend: ConnectionSource {
    fn acquire(&self) -> impl Future<Output = DslResult<Self::Connection>> + Send;

    fn begin(
        &self,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = DslResult<()>> + Send;

    fn commit(
        &self,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = DslResult<()>> + Send;

    fn rollback(
        &self,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = DslResult<()>> + Send;

    fn execute_update(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> impl Future<Output = DslResult<u64>> + Send;

    fn execute_update_returning(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
        column: &str,
    ) -> impl Future<Output = DslResult<Option<Row>>> + Send;

    /// Start a query. The returned stream must not borrow the connection; dropping
    /// it before the end aborts the statement.
    fn query_stream(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> impl Future<Output = DslResult<RowStream>> + Send;

    /// The layout `statement` would produce. The default starts the query and
    /// drops the stream before reading a row.
    fn query_metadata(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> impl Future<Output = DslResult<Arc<RowMetadata>>> + Send {
        async move {
            let rows = self.query_stream(connection, statement).await?;
            Ok(Arc::clone(rows.metadata()))
        }
    }
}

/// A connection on loan from a [`ConnectionSource`]; released when dropped.
///
/// A lease marked dirty (a transaction was opened and not yet closed) is
/// discarded instead of released.
pub(crate) struct Lease<'s, S: ConnectionSource + ?Sized> {
    source: &'s S,
    connection: Option<S::Connection>,
    dirty: bool,
}

impl<'s, S: ConnectionSource + ?Sized> Lease<'s, S> {
    pub(crate) fn new(source: &'s S, connection: S::Connection) -> Self {
        Self {
            source,
            connection: Some(connection),
            dirty: false,
        }
    }

    pub(crate) fn source(&self) -> &'s S {
        self.source
    }

    pub(crate) fn connection(&mut self) -> DslResult<&mut S::Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| DslError::Connection("connection already released".to_string()))
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Release now instead of at drop.
    pub(crate) fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.dirty {
            tracing::warn!(
                target: "pgdsl.program",
                "discarding connection with an open transaction"
            );
            self.source.discard(connection);
        } else {
            tracing::trace!(target: "pgdsl.program", "releasing connection");
            self.source.release(connection);
        }
    }
}

impl<S: ConnectionSource + ?Sized> Drop for Lease<'_, S> {
    fn drop(&mut self) {
        self.give_back();
    }
}

/// A type-erased stream of rows plus the layout they share.
#[must_use = "streams do nothing unless polled"]
pub struct RowStream {
    metadata: Arc<RowMetadata>,
    inner: Pin<Box<dyn Stream<Item = DslResult<Row>> + Send>>,
}

impl RowStream {
    pub fn new<S>(metadata: Arc<RowMetadata>, stream: S) -> Self
    where
        S: Stream<Item = DslResult<Row>> + Send + 'static,
    {
        Self {
            metadata,
            inner: Box::pin(stream),
        }
    }

    /// A stream over rows already in memory.
    pub fn from_rows(metadata: Arc<RowMetadata>, rows: Vec<Row>) -> Self {
        Self::new(metadata, futures_util::stream::iter(rows.into_iter().map(Ok)))
    }

    pub fn metadata(&self) -> &Arc<RowMetadata> {
        &self.metadata
    }

    /// Drain the stream into a cursor.
    pub async fn into_cursor(self) -> DslResult<RowCursor> {
        let metadata = Arc::clone(&self.metadata);
        let rows: Vec<Row> = self.try_collect().await?;
        Ok(RowCursor::new(metadata, rows))
    }
}

impl Stream for RowStream {
    type Item = DslResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.metadata.column_names())
            .finish_non_exhaustive()
    }
}
