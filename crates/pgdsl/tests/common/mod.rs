#![allow(dead_code)]

//! In-memory backend understanding just enough SQL to drive a two-column
//! `test (id int8, name text)` table.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_core::Stream;
use pgdsl::{
    Backend, ColumnMetadata, ConnectionSource, DslError, DslResult, Field, ReactiveBackend, Row,
    RowCursor, RowMetadata, RowStream, Statement, Table, Value,
};

pub type TestTable = Table<(Field<i64>, Field<String>)>;

pub struct Fixture {
    pub id: Field<i64>,
    pub name: Field<String>,
    pub table: TestTable,
}

pub fn fixture() -> Fixture {
    let id = Field::<i64>::of("id").expect("valid name");
    let name = Field::<String>::of("name").expect("valid name");
    let table = Table::new("test", (id.clone(), name.clone())).expect("valid name");
    Fixture { id, name, table }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    pub acquired: usize,
    pub released: usize,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
    /// Row streams dropped before they finished.
    pub aborted: usize,
    /// Connections thrown away instead of released.
    pub discarded: usize,
}

#[derive(Default)]
struct State {
    rows: BTreeMap<i64, Option<String>>,
    last_id: i64,
    counters: Counters,
    log: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<State>>,
    stall: bool,
    stall_writes: bool,
    fail_rollback: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedConnection {
    in_transaction: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query streams yield their rows, then never finish.
    pub fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    /// A stalling view of the same data.
    pub fn stalled(&self) -> Self {
        Self {
            stall: true,
            ..self.clone()
        }
    }

    /// Async updates returning a row never finish.
    pub fn stalling_writes() -> Self {
        Self {
            stall_writes: true,
            ..Self::default()
        }
    }

    /// Every rollback fails and leaves the transaction open.
    pub fn failing_rollback() -> Self {
        Self {
            fail_rollback: true,
            ..Self::default()
        }
    }

    pub fn counters(&self) -> Counters {
        self.state().counters.clone()
    }

    /// Every statement the backend saw, in order.
    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("state poisoned")
    }

    fn open(&self) -> ScriptedConnection {
        self.state().counters.acquired += 1;
        ScriptedConnection::default()
    }

    fn begin_on(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.state().counters.begun += 1;
        connection.in_transaction = true;
        Ok(())
    }

    fn end_on(&self, connection: &mut ScriptedConnection, commit: bool) -> DslResult<()> {
        if !connection.in_transaction {
            return Err(DslError::backend("no transaction in progress"));
        }
        if !commit && self.fail_rollback {
            return Err(DslError::Connection("connection reset during rollback".to_string()));
        }
        connection.in_transaction = false;
        let mut state = self.state();
        if commit {
            state.counters.committed += 1;
        } else {
            state.counters.rolled_back += 1;
        }
        Ok(())
    }

    fn returning_on(
        &self,
        connection: &ScriptedConnection,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        if !connection.in_transaction {
            return Err(DslError::backend("update returning outside a transaction"));
        }
        let (_, id) = self.update(statement)?;
        let Some(id) = id else { return Ok(None) };

        let state = self.state();
        let value = match column {
            "id" => Value::Int(id),
            "name" => state.rows[&id].clone().map_or(Value::Null, Value::Text),
            other => return Err(DslError::backend(format!("column {other} does not exist"))),
        };
        let metadata = Arc::new(RowMetadata::new(vec![column_metadata(column)?]));
        Row::new(metadata, vec![value]).map(Some)
    }

    /// Affected row count and the id of the last row touched.
    fn update(&self, statement: &Statement) -> DslResult<(u64, Option<i64>)> {
        let sql = statement.sql();
        let params = statement.params();
        let mut state = self.state();
        state.log.push(sql.to_string());

        if sql.contains("missing") {
            return Err(DslError::backend("relation \"missing\" does not exist"));
        }
        if sql.starts_with("create table") || sql.starts_with("drop table") {
            return Ok((0, None));
        }
        if let Some(rest) = sql.strip_prefix("insert into test (") {
            let columns = rest.split(')').next().unwrap_or_default().split(", ");
            let (mut id, mut name) = (None, None);
            for (column, value) in columns.zip(params) {
                match column {
                    "id" => id = Some(int(value)?),
                    "name" => name = text(value)?,
                    other => return Err(DslError::backend(format!("column {other} does not exist"))),
                }
            }
            let id = id.unwrap_or(state.last_id + 1);
            if state.rows.contains_key(&id) {
                return Err(DslError::UniqueViolation(format!("test_pkey: key (id)=({id}) already exists")));
            }
            state.rows.insert(id, name);
            state.last_id = state.last_id.max(id);
            return Ok((1, Some(id)));
        }
        if sql == "delete from test" {
            let removed = state.rows.len() as u64;
            state.rows.clear();
            return Ok((removed, None));
        }
        if sql == "delete from test where id = ?" {
            let id = int(&params[0])?;
            let removed = state.rows.remove(&id).map_or(0, |_| 1);
            return Ok((removed, Some(id)));
        }
        if sql == "update test set name = ? where id = ?" {
            let id = int(&params[1])?;
            let name = text(&params[0])?;
            return Ok(match state.rows.get_mut(&id) {
                Some(slot) => {
                    *slot = name;
                    (1, Some(id))
                }
                None => (0, None),
            });
        }
        Err(DslError::backend(format!("unsupported statement: {sql}")))
    }

    fn select(&self, statement: &Statement) -> DslResult<(Arc<RowMetadata>, Vec<Row>)> {
        let sql = statement.sql();
        let params = statement.params();
        let mut state = self.state();
        state.log.push(sql.to_string());

        if sql.contains("missing") {
            return Err(DslError::backend("relation \"missing\" does not exist"));
        }
        let (labels, rest) = sql
            .strip_prefix("select ")
            .and_then(|body| body.split_once(" from test"))
            .ok_or_else(|| DslError::backend(format!("unsupported statement: {sql}")))?;

        let mut rows: Vec<(i64, Option<String>)> =
            state.rows.iter().map(|(id, name)| (*id, name.clone())).collect();
        let rest = rest.trim();
        if rest.starts_with("where id = ?") {
            let id = int(&params[0])?;
            rows.retain(|(row_id, _)| *row_id == id);
        } else if rest.starts_with("where id in (") {
            let ids = params.iter().map(int).collect::<DslResult<Vec<_>>>()?;
            rows.retain(|(row_id, _)| ids.contains(row_id));
        }
        if rest.contains("order by id desc") {
            rows.reverse();
        }

        if labels == "count(id)" {
            let metadata = Arc::new(RowMetadata::new(vec![ColumnMetadata::new(
                "count",
                "int8",
                Some(false),
            )]));
            let row = Row::new(Arc::clone(&metadata), vec![Value::Int(rows.len() as i64)])?;
            return Ok((metadata, vec![row]));
        }

        let labels: Vec<&str> = labels.split(", ").collect();
        let metadata = Arc::new(RowMetadata::new(
            labels
                .iter()
                .map(|label| column_metadata(label))
                .collect::<DslResult<_>>()?,
        ));
        let decoded = rows
            .into_iter()
            .map(|(id, name)| {
                let values = labels
                    .iter()
                    .map(|label| match *label {
                        "id" => Value::Int(id),
                        _ => name.clone().map_or(Value::Null, Value::Text),
                    })
                    .collect();
                Row::new(Arc::clone(&metadata), values)
            })
            .collect::<DslResult<Vec<_>>>()?;
        Ok((metadata, decoded))
    }
}

fn column_metadata(label: &str) -> DslResult<ColumnMetadata> {
    match label {
        "id" => Ok(ColumnMetadata::new("id", "int8", Some(false))),
        "name" => Ok(ColumnMetadata::new("name", "text", Some(true))),
        other => Err(DslError::backend(format!("column {other} does not exist"))),
    }
}

fn int(value: &Value) -> DslResult<i64> {
    match value {
        Value::Int(v) => Ok(*v),
        other => Err(DslError::backend(format!("expected int8, got {other:?}"))),
    }
}

fn text(value: &Value) -> DslResult<Option<String>> {
    match value {
        Value::Text(v) => Ok(Some(v.clone())),
        Value::Null => Ok(None),
        other => Err(DslError::backend(format!("expected text, got {other:?}"))),
    }
}

impl ConnectionSource for ScriptedBackend {
    type Connection = ScriptedConnection;

    fn release(&self, connection: ScriptedConnection) {
        assert!(!connection.in_transaction, "released a connection inside a transaction");
        drop(connection);
        self.state().counters.released += 1;
    }

    fn discard(&self, connection: ScriptedConnection) {
        drop(connection);
        self.state().counters.discarded += 1;
    }
}

impl Backend for ScriptedBackend {
    fn acquire(&self) -> DslResult<ScriptedConnection> {
        Ok(self.open())
    }

    fn begin(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.begin_on(connection)
    }

    fn commit(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.end_on(connection, true)
    }

    fn rollback(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.end_on(connection, false)
    }

    fn execute_update(&self, _: &mut ScriptedConnection, statement: &Statement) -> DslResult<u64> {
        self.update(statement).map(|(count, _)| count)
    }

    fn execute_update_returning(
        &self,
        connection: &mut ScriptedConnection,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        self.returning_on(connection, statement, column)
    }

    fn execute_query(&self, _: &mut ScriptedConnection, statement: &Statement) -> DslResult<RowCursor> {
        let (metadata, rows) = self.select(statement)?;
        Ok(RowCursor::new(metadata, rows))
    }
}

impl ReactiveBackend for ScriptedBackend {
    async fn acquire(&self) -> DslResult<ScriptedConnection> {
        Ok(self.open())
    }

    async fn begin(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.begin_on(connection)
    }

    async fn commit(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.end_on(connection, true)
    }

    async fn rollback(&self, connection: &mut ScriptedConnection) -> DslResult<()> {
        self.end_on(connection, false)
    }

    async fn execute_update(&self, _: &mut ScriptedConnection, statement: &Statement) -> DslResult<u64> {
        self.update(statement).map(|(count, _)| count)
    }

    async fn execute_update_returning(
        &self,
        connection: &mut ScriptedConnection,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        if self.stall_writes {
            futures_util::future::pending::<()>().await;
        }
        self.returning_on(connection, statement, column)
    }

    async fn query_stream(&self, _: &mut ScriptedConnection, statement: &Statement) -> DslResult<RowStream> {
        let (metadata, rows) = self.select(statement)?;
        let rows = futures_util::stream::iter(rows.into_iter().map(Ok));
        let inner: Pin<Box<dyn Stream<Item = DslResult<Row>> + Send>> = if self.stall {
            Box::pin(futures_util::StreamExt::chain(rows, futures_util::stream::pending()))
        } else {
            Box::pin(rows)
        };
        Ok(RowStream::new(
            metadata,
            TrackedRows {
                inner,
                state: Arc::clone(&self.state),
                done: false,
            },
        ))
    }
}

/// Counts streams dropped before their end.
struct TrackedRows {
    inner: Pin<Box<dyn Stream<Item = DslResult<Row>> + Send>>,
    state: Arc<Mutex<State>>,
    done: bool,
}

impl Stream for TrackedRows {
    type Item = DslResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.done = true;
        }
        polled
    }
}

impl Drop for TrackedRows {
    fn drop(&mut self) {
        if !self.done {
            if let Ok(mut state) = self.state.lock() {
                state.counters.aborted += 1;
            }
        }
    }
}
