//! Statement execution over a single `tokio_postgres::Client`, shared by both
//! PostgreSQL backends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_core::Stream;
use deadpool_postgres::Object;
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client};

use super::types::{metadata_of, read_row};
use crate::backend::RowStream;
use crate::config::PgConfig;
use crate::error::{DslError, DslResult};
use crate::row::{Row, RowMetadata};
use crate::sql::{PlaceholderStyle, Statement};

fn params_of(statement: &Statement) -> Vec<&(dyn ToSql + Sync)> {
    statement
        .params()
        .iter()
        .map(|value| value as &(dyn ToSql + Sync))
        .collect()
}

fn spawn_cancel(cancel_token: CancelToken) {
    // Outside a runtime there is nothing to run the request on.
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
        });
    }
}

async fn with_timeout<T, F>(client: &Client, config: &PgConfig, future: F) -> DslResult<T>
where
    F: Future<Output = DslResult<T>>,
{
    match config.query_timeout {
        Some(timeout) => tokio::time::timeout(timeout, future).await.map_err(|_| {
            spawn_cancel(client.cancel_token());
            DslError::Timeout(timeout)
        })?,
        None => future.await,
    }
}

fn log_sql(config: &PgConfig, sql: &str, params: usize, started: Instant, error: Option<&DslError>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match error {
        None => tracing::debug!(
            target: "pgdsl.sql",
            sql = %config.truncate_sql(sql),
            params,
            elapsed_ms,
            "statement executed"
        ),
        Some(error) => tracing::debug!(
            target: "pgdsl.sql",
            sql = %config.truncate_sql(sql),
            params,
            elapsed_ms,
            %error,
            "statement failed"
        ),
    }
}

/// `begin`, `commit`, `rollback`.
pub(super) async fn batch(client: &Client, config: &PgConfig, sql: &str) -> DslResult<()> {
    let started = Instant::now();
    let result = with_timeout(client, config, async {
        client.batch_execute(sql).await.map_err(DslError::from_db_error)
    })
    .await;
    log_sql(config, sql, 0, started, result.as_ref().err());
    result
}

pub(super) async fn execute(client: &Client, config: &PgConfig, statement: &Statement) -> DslResult<u64> {
    let sql = statement.render(PlaceholderStyle::Dollar);
    let params = params_of(statement);
    let started = Instant::now();
    let result = with_timeout(client, config, async {
        client
            .execute(sql.as_ref(), &params)
            .await
            .map_err(DslError::from_db_error)
    })
    .await;
    log_sql(config, &sql, params.len(), started, result.as_ref().err());
    result
}

/// Run `statement` with `returning <column>` appended and read the first row.
pub(super) async fn execute_returning(
    client: &Client,
    config: &PgConfig,
    statement: &Statement,
    column: &str,
) -> DslResult<Option<Row>> {
    let statement = statement.with_suffix(&format!(" returning {column}"));
    let sql = statement.render(PlaceholderStyle::Dollar);
    let params = params_of(&statement);
    let started = Instant::now();
    let result = with_timeout(client, config, async {
        client
            .query(sql.as_ref(), &params)
            .await
            .map_err(DslError::from_db_error)
    })
    .await;
    log_sql(config, &sql, params.len(), started, result.as_ref().err());

    let rows = result?;
    rows.first()
        .map(|row| read_row(&metadata_of(row.columns()), row))
        .transpose()
}

/// Prepare `statement` without running it and report the columns it yields.
pub(super) async fn describe(
    client: &Client,
    config: &PgConfig,
    statement: &Statement,
) -> DslResult<Arc<RowMetadata>> {
    let sql = statement.render(PlaceholderStyle::Dollar);
    let started = Instant::now();
    let result = with_timeout(client, config, async {
        let prepared = client
            .prepare(sql.as_ref())
            .await
            .map_err(DslError::from_db_error)?;
        Ok(metadata_of(prepared.columns()))
    })
    .await;
    log_sql(config, &sql, 0, started, result.as_ref().err());
    result
}

/// Detach a connection from its pool and close it.
pub(super) fn discard(connection: Object) {
    tracing::warn!(target: "pgdsl.sql", "closing connection left inside a transaction");
    drop(Object::take(connection));
}

/// Prepare and start `statement`; rows are decoded as they arrive.
pub(super) async fn query(client: &Client, config: &PgConfig, statement: &Statement) -> DslResult<RowStream> {
    let sql = statement.render(PlaceholderStyle::Dollar);
    let params = params_of(statement);
    let started = Instant::now();
    let opened = with_timeout(client, config, async {
        let prepared = client
            .prepare(sql.as_ref())
            .await
            .map_err(DslError::from_db_error)?;
        let rows = client
            .query_raw(&prepared, params.iter().copied())
            .await
            .map_err(DslError::from_db_error)?;
        Ok((metadata_of(prepared.columns()), rows))
    })
    .await;
    log_sql(config, &sql, params.len(), started, opened.as_ref().err());

    let (metadata, rows) = opened?;
    let deadline = config
        .query_timeout
        .map(|timeout| (timeout, Box::pin(tokio::time::sleep(timeout.saturating_sub(started.elapsed())))));

    Ok(RowStream::new(
        Arc::clone(&metadata),
        GuardedRows {
            inner: Box::pin(rows),
            metadata,
            cancel_token: Some(client.cancel_token()),
            deadline,
            sql: config.truncate_sql(&sql),
            started,
            rows: 0,
            done: false,
        },
    ))
}

/// Decodes rows and cancels the statement if the stream stops early.
struct GuardedRows {
    inner: Pin<Box<tokio_postgres::RowStream>>,
    metadata: Arc<RowMetadata>,
    cancel_token: Option<CancelToken>,
    deadline: Option<(Duration, Pin<Box<tokio::time::Sleep>>)>,
    sql: String,
    started: Instant,
    rows: usize,
    done: bool,
}

impl GuardedRows {
    fn finish(&mut self) {
        self.done = true;
        tracing::debug!(
            target: "pgdsl.sql",
            sql = %self.sql,
            rows = self.rows,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "rows streamed"
        );
    }

    fn abort(&mut self) {
        self.done = true;
        if let Some(cancel_token) = self.cancel_token.take() {
            spawn_cancel(cancel_token);
        }
    }
}

impl Stream for GuardedRows {
    type Item = DslResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        let expired = match self.deadline.as_mut() {
            Some((timeout, sleep)) => sleep.as_mut().poll(cx).is_ready().then_some(*timeout),
            None => None,
        };
        if let Some(timeout) = expired {
            self.abort();
            return Poll::Ready(Some(Err(DslError::Timeout(timeout))));
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => {
                self.rows += 1;
                let decoded = read_row(&self.metadata, &row);
                if decoded.is_err() {
                    self.abort();
                }
                Poll::Ready(Some(decoded))
            }
            Poll::Ready(Some(Err(error))) => {
                self.done = true;
                Poll::Ready(Some(Err(DslError::from_db_error(error))))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GuardedRows {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(target: "pgdsl.sql", sql = %self.sql, "row stream dropped early, cancelling");
            self.abort();
        }
    }
}
