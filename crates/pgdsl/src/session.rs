//! The program interpreter.
//!
//! Every strategy drives the same fold ([`interpret`]) over a [`Session`]; the
//! strategies differ only in how a session reaches its backend and how the
//! fold's future is driven.

use std::future::Future;
use std::sync::Arc;

use crate::backend::{Backend, Lease, ReactiveBackend};
use crate::error::{DslError, DslResult};
use crate::program::{Cont, Node, Op, Program, unerase};
use crate::row::{Row, RowCursor, RowMetadata};
use crate::sql::Statement;

/// Backend capabilities the interpreter needs for one run.
pub(crate) trait Session: Send {
    fn begin(&mut self) -> impl Future<Output = DslResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DslResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DslResult<()>> + Send;

    fn update(&mut self, statement: &Statement) -> impl Future<Output = DslResult<u64>> + Send;

    fn update_returning(
        &mut self,
        statement: &Statement,
        column: &str,
    ) -> impl Future<Output = DslResult<Option<Row>>> + Send;

    fn query(&mut self, statement: &Statement) -> impl Future<Output = DslResult<RowCursor>> + Send;

    /// Result layout only; no row is read.
    fn query_meta(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = DslResult<Arc<RowMetadata>>> + Send;
}

/// Walk `program` leaf by leaf; the first failure ends the run.
///
/// Pending continuations live on an explicit stack, so neither the depth of a
/// bind chain nor its association grows the call stack.
pub(crate) async fn interpret<S, T>(session: &mut S, program: Program<T>) -> DslResult<T>
where
    S: Session,
    T: Send + 'static,
{
    let mut pending: Vec<Cont> = Vec::new();
    let mut current = program.into_node();
    loop {
        current = match current {
            Node::Pure(value) => match pending.pop() {
                Some(next) => next(value),
                None => return unerase(value),
            },
            Node::Fail(error) => return Err(error),
            Node::Suspend(thunk) => thunk(),
            Node::Step(op) => dispatch(session, op).await?,
            Node::Bind(head, conts) => {
                pending.extend(conts.into_iter().rev());
                *head
            }
        };
    }
}

async fn dispatch<S: Session, K>(session: &mut S, op: Op<K>) -> DslResult<K> {
    tracing::debug!(
        target: "pgdsl.program",
        kind = %op.kind(),
        sql = op.statement().sql(),
        params = op.statement().params().len(),
        "running leaf"
    );

    match op {
        Op::Update { statement, next } => {
            let count = session.update(&statement).await?;
            next(count)
        }
        Op::UpdateReturning {
            statement,
            column,
            next,
        } => {
            let row = in_transaction(session, &statement, &column.bare_name()).await?;
            next(row)
        }
        Op::Query { statement, next } => {
            let mut rows = session.query(&statement).await?;
            let row = rows
                .next()
                .ok_or_else(|| DslError::not_found(format!("no row for `{}`", statement.sql())))?;
            next(row)
        }
        Op::QueryOne { statement, next } => {
            let mut rows = session.query(&statement).await?;
            next(rows.next())
        }
        Op::QueryIterable { statement, next } => {
            let rows = session.query(&statement).await?;
            next(rows.collect())
        }
        Op::QueryMeta { statement, next } => {
            let metadata = session.query_meta(&statement).await?;
            next(metadata)
        }
    }
}

async fn in_transaction<S: Session>(
    session: &mut S,
    statement: &Statement,
    column: &str,
) -> DslResult<Option<Row>> {
    session.begin().await?;
    match session.update_returning(statement, column).await {
        Ok(row) => {
            session.commit().await?;
            Ok(row)
        }
        Err(error) => match session.rollback().await {
            Ok(()) => Err(error),
            Err(rollback) => {
                tracing::warn!(target: "pgdsl.program", error = %rollback, "rollback failed");
                Err(DslError::Other(format!("{error} (rollback failed: {rollback})")))
            }
        },
    }
}

/// One connection held for the whole run.
pub(crate) struct BlockingSession<'b, B: Backend> {
    lease: Lease<'b, B>,
}

impl<'b, B: Backend> BlockingSession<'b, B> {
    pub(crate) fn open(backend: &'b B) -> DslResult<Self> {
        let connection = backend.acquire()?;
        Ok(Self {
            lease: Lease::new(backend, connection),
        })
    }

    fn call<R>(
        &mut self,
        f: impl FnOnce(&B, &mut B::Connection) -> DslResult<R>,
    ) -> std::future::Ready<DslResult<R>> {
        let backend = self.lease.source();
        std::future::ready(self.lease.connection().and_then(|connection| f(backend, connection)))
    }

    /// A connection whose commit or rollback failed stays dirty.
    fn close_transaction(
        &mut self,
        done: std::future::Ready<DslResult<()>>,
    ) -> std::future::Ready<DslResult<()>> {
        let result = done.into_inner();
        if result.is_ok() {
            self.lease.mark_clean();
        }
        std::future::ready(result)
    }
}

impl<B: Backend> Session for BlockingSession<'_, B> {
    fn begin(&mut self) -> impl Future<Output = DslResult<()>> + Send {
        self.lease.mark_dirty();
        self.call(|backend, connection| backend.begin(connection))
    }

    fn commit(&mut self) -> impl Future<Output = DslResult<()>> + Send {
        let done = self.call(|backend, connection| backend.commit(connection));
        self.close_transaction(done)
    }

    fn rollback(&mut self) -> impl Future<Output = DslResult<()>> + Send {
        let done = self.call(|backend, connection| backend.rollback(connection));
        self.close_transaction(done)
    }

    fn update(&mut self, statement: &Statement) -> impl Future<Output = DslResult<u64>> + Send {
        self.call(|backend, connection| backend.execute_update(connection, statement))
    }

    fn update_returning(
        &mut self,
        statement: &Statement,
        column: &str,
    ) -> impl Future<Output = DslResult<Option<Row>>> + Send {
        self.call(|backend, connection| {
            backend.execute_update_returning(connection, statement, column)
        })
    }

    fn query(&mut self, statement: &Statement) -> impl Future<Output = DslResult<RowCursor>> + Send {
        self.call(|backend, connection| backend.execute_query(connection, statement))
    }

    fn query_meta(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = DslResult<Arc<RowMetadata>>> + Send {
        self.call(|backend, connection| backend.execute_query_metadata(connection, statement))
    }
}

/// A fresh connection per call, except between `begin` and `commit`/`rollback`,
/// where one connection stays pinned.
pub(crate) struct ReactiveSession<'r, R: ReactiveBackend> {
    backend: &'r R,
    pinned: Option<Lease<'r, R>>,
}

impl<'r, R: ReactiveBackend> ReactiveSession<'r, R> {
    pub(crate) fn new(backend: &'r R) -> Self {
        Self {
            backend,
            pinned: None,
        }
    }

    fn unpin(&mut self) -> DslResult<Lease<'r, R>> {
        self.pinned
            .take()
            .ok_or_else(|| DslError::Other("no transaction in progress".to_string()))
    }
}

async fn lease<R: ReactiveBackend>(backend: &R) -> DslResult<Lease<'_, R>> {
    let connection = backend.acquire().await?;
    Ok(Lease::new(backend, connection))
}

impl<R: ReactiveBackend> Session for ReactiveSession<'_, R> {
    async fn begin(&mut self) -> DslResult<()> {
        let mut lease = lease(self.backend).await?;
        lease.mark_dirty();
        self.backend.begin(lease.connection()?).await?;
        self.pinned = Some(lease);
        Ok(())
    }

    async fn commit(&mut self) -> DslResult<()> {
        let mut lease = self.unpin()?;
        self.backend.commit(lease.connection()?).await?;
        lease.mark_clean();
        Ok(())
    }

    async fn rollback(&mut self) -> DslResult<()> {
        let mut lease = self.unpin()?;
        self.backend.rollback(lease.connection()?).await?;
        lease.mark_clean();
        Ok(())
    }

    async fn update(&mut self, statement: &Statement) -> DslResult<u64> {
        let backend = self.backend;
        match self.pinned.as_mut() {
            Some(lease) => backend.execute_update(lease.connection()?, statement).await,
            None => {
                let mut lease = lease(backend).await?;
                backend.execute_update(lease.connection()?, statement).await
            }
        }
    }

    async fn update_returning(
        &mut self,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        let backend = self.backend;
        match self.pinned.as_mut() {
            Some(lease) => {
                backend
                    .execute_update_returning(lease.connection()?, statement, column)
                    .await
            }
            None => {
                let mut lease = lease(backend).await?;
                backend
                    .execute_update_returning(lease.connection()?, statement, column)
                    .await
            }
        }
    }

    async fn query(&mut self, statement: &Statement) -> DslResult<RowCursor> {
        let backend = self.backend;
        match self.pinned.as_mut() {
            Some(lease) => {
                let rows = backend.query_stream(lease.connection()?, statement).await?;
                rows.into_cursor().await
            }
            None => {
                let mut lease = lease(backend).await?;
                let rows = backend.query_stream(lease.connection()?, statement).await?;
                let cursor = rows.into_cursor().await;
                lease.release();
                cursor
            }
        }
    }

    async fn query_meta(&mut self, statement: &Statement) -> DslResult<Arc<RowMetadata>> {
        let backend = self.backend;
        match self.pinned.as_mut() {
            Some(lease) => backend.query_metadata(lease.connection()?, statement).await,
            None => {
                let mut lease = lease(backend).await?;
                let metadata = backend.query_metadata(lease.connection()?, statement).await;
                lease.release();
                metadata
            }
        }
    }
}
