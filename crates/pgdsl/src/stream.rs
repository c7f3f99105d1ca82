//! Async execution against a [`ReactiveBackend`].
//!
//! Dropping a [`ProgramStream`] (or a stream from [`query_stream`]) before it
//! finishes aborts the in-flight statement and releases its connection.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_core::stream::{BoxStream, FusedStream};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, TryStreamExt};

use crate::backend::{Lease, ReactiveBackend, RowStream};
use crate::error::{DslError, DslResult};
use crate::program::Program;
use crate::row::Row;
use crate::session::{ReactiveSession, interpret};
use crate::sql::Statement;

impl<T: Send + 'static> Program<T> {
    /// Run against an async backend.
    ///
    /// Each leaf acquires its own connection; an update-returning leaf keeps
    /// one connection across its transaction.
    pub fn run_async<R: ReactiveBackend>(
        self,
        backend: &R,
    ) -> impl Future<Output = DslResult<T>> + Send + '_ {
        async move {
            let mut session = ReactiveSession::new(backend);
            interpret(&mut session, self).await
        }
    }

    /// Run as a stream that yields the program's single result, then ends.
    ///
    /// Nothing happens until the stream is polled.
    pub fn stream<R: ReactiveBackend>(self, backend: &R) -> ProgramStream<'_, T> {
        ProgramStream {
            pending: Some(self.run_async(backend).boxed()),
        }
    }
}

/// Single-result stream over a running program.
#[must_use = "streams do nothing unless polled"]
pub struct ProgramStream<'a, T> {
    pending: Option<BoxFuture<'a, DslResult<T>>>,
}

impl<T> Stream for ProgramStream<'_, T> {
    type Item = DslResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(pending) = self.pending.as_mut() else {
            return Poll::Ready(None);
        };
        match pending.as_mut().poll(cx) {
            Poll::Ready(result) => {
                self.pending = None;
                Poll::Ready(Some(result))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::from(self.pending.is_some());
        (remaining, Some(remaining))
    }
}

impl<T> FusedStream for ProgramStream<'_, T> {
    fn is_terminated(&self) -> bool {
        self.pending.is_none()
    }
}

impl<T> std::fmt::Debug for ProgramStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramStream")
            .field("terminated", &self.pending.is_none())
            .finish()
    }
}

/// Stream decoded rows as the backend produces them.
///
/// The connection is acquired on first poll and released when the rows run out,
/// when an error ends the stream, or when the stream is dropped.
pub fn query_stream<'b, R, T, F>(
    backend: &'b R,
    statement: impl Into<Statement>,
    mapper: F,
) -> BoxStream<'b, DslResult<T>>
where
    R: ReactiveBackend,
    T: Send + 'b,
    F: Fn(&Row) -> DslResult<T> + Send + 'b,
{
    let statement = statement.into();
    let opened = async move {
        tracing::debug!(
            target: "pgdsl.program",
            sql = statement.sql(),
            params = statement.params().len(),
            "streaming query"
        );
        let connection = backend.acquire().await?;
        let mut lease = Lease::new(backend, connection);
        let rows = backend.query_stream(lease.connection()?, &statement).await?;
        Ok::<_, DslError>(LeasedRows {
            lease: Some(lease),
            rows,
        })
    };

    futures_util::stream::once(opened)
        .try_flatten()
        .map(move |row| row.and_then(|row| mapper(&row)))
        .boxed()
}

/// Rows plus the connection they come from.
struct LeasedRows<'b, R: ReactiveBackend> {
    lease: Option<Lease<'b, R>>,
    rows: RowStream,
}

// The lease is never pinned; only `rows` is polled, and it is boxed.
impl<R: ReactiveBackend> Unpin for LeasedRows<'_, R> {}

impl<R: ReactiveBackend> Stream for LeasedRows<'_, R> {
    type Item = DslResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.lease.is_none() {
            return Poll::Ready(None);
        }
        let polled = Pin::new(&mut self.rows).poll_next(cx);
        match &polled {
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => {
                if let Some(lease) = self.lease.take() {
                    lease.release();
                }
            }
            _ => {}
        }
        polled
    }
}
