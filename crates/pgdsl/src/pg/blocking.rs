use std::sync::Arc;

use deadpool_postgres::{Object, Pool};
use tokio::runtime::Runtime;

use super::exec;
use crate::backend::{Backend, ConnectionSource};
use crate::config::PgConfig;
use crate::error::{DslError, DslResult};
use crate::pool::create_pool_with_config;
use crate::row::{Row, RowCursor, RowMetadata};
use crate::sql::Statement;

/// Blocking PostgreSQL backend.
///
/// Owns a small tokio runtime and blocks on it for every call, so it must not
/// be used (or dropped) from inside another async runtime.
#[derive(Clone)]
pub struct PgBackend {
    pool: Pool,
    runtime: Arc<Runtime>,
    config: PgConfig,
}

impl PgBackend {
    /// Build a pool from `config` and a runtime to drive it.
    ///
    /// No connection is opened until the first program runs.
    pub fn connect(config: PgConfig) -> DslResult<Self> {
        let pool = create_pool_with_config(&config)?;
        Self::with_pool(pool, config)
    }

    pub fn from_env() -> DslResult<Self> {
        Self::connect(PgConfig::from_env()?)
    }

    pub fn with_pool(pool: Pool, config: PgConfig) -> DslResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("pgdsl-worker")
            .enable_all()
            .build()
            .map_err(|e| DslError::Runtime(e.to_string()))?;
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
            config,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }
}

impl std::fmt::Debug for PgBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgBackend")
            .field("pool", &self.pool.status())
            .field("config", &self.config)
            .finish()
    }
}

impl ConnectionSource for PgBackend {
    type Connection = Object;

    fn discard(&self, connection: Object) {
        exec::discard(connection);
    }
}

impl Backend for PgBackend {
    fn acquire(&self) -> DslResult<Object> {
        Ok(self.runtime.block_on(self.pool.get())?)
    }

    fn begin(&self, connection: &mut Object) -> DslResult<()> {
        self.runtime
            .block_on(exec::batch(connection, &self.config, "begin"))
    }

    fn commit(&self, connection: &mut Object) -> DslResult<()> {
        self.runtime
            .block_on(exec::batch(connection, &self.config, "commit"))
    }

    fn rollback(&self, connection: &mut Object) -> DslResult<()> {
        self.runtime
            .block_on(exec::batch(connection, &self.config, "rollback"))
    }

    fn execute_update(&self, connection: &mut Object, statement: &Statement) -> DslResult<u64> {
        self.runtime
            .block_on(exec::execute(connection, &self.config, statement))
    }

    fn execute_update_returning(
        &self,
        connection: &mut Object,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        self.runtime.block_on(exec::execute_returning(
            connection,
            &self.config,
            statement,
            column,
        ))
    }

    fn execute_query(&self, connection: &mut Object, statement: &Statement) -> DslResult<RowCursor> {
        self.runtime.block_on(async {
            exec::query(connection, &self.config, statement)
                .await?
                .into_cursor()
                .await
        })
    }

    fn execute_query_metadata(
        &self,
        connection: &mut Object,
        statement: &Statement,
    ) -> DslResult<Arc<RowMetadata>> {
        self.runtime
            .block_on(exec::describe(connection, &self.config, statement))
    }
}
