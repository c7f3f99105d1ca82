use std::sync::Arc;

use deadpool_postgres::{Object, Pool};

use super::exec;
use crate::backend::{ConnectionSource, ReactiveBackend, RowStream};
use crate::config::PgConfig;
use crate::error::DslResult;
use crate::pool::create_pool_with_config;
use crate::row::{Row, RowMetadata};
use crate::sql::Statement;

/// Async PostgreSQL backend for the caller's tokio runtime.
#[derive(Clone)]
pub struct PgReactiveBackend {
    pool: Pool,
    config: PgConfig,
}

impl PgReactiveBackend {
    pub fn connect(config: PgConfig) -> DslResult<Self> {
        let pool = create_pool_with_config(&config)?;
        Ok(Self::with_pool(pool, config))
    }

    pub fn from_env() -> DslResult<Self> {
        Self::connect(PgConfig::from_env()?)
    }

    pub fn with_pool(pool: Pool, config: PgConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }
}

impl std::fmt::Debug for PgReactiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgReactiveBackend")
            .field("pool", &self.pool.status())
            .field("config", &self.config)
            .finish()
    }
}

impl ConnectionSource for PgReactiveBackend {
    type Connection = Object;

    fn discard(&self, connection: Object) {
        exec::discard(connection);
    }
}

impl ReactiveBackend for PgReactiveBackend {
    async fn acquire(&self) -> DslResult<Object> {
        Ok(self.pool.get().await?)
    }

    async fn begin(&self, connection: &mut Object) -> DslResult<()> {
        exec::batch(connection, &self.config, "begin").await
    }

    async fn commit(&self, connection: &mut Object) -> DslResult<()> {
        exec::batch(connection, &self.config, "commit").await
    }

    async fn rollback(&self, connection: &mut Object) -> DslResult<()> {
        exec::batch(connection, &self.config, "rollback").await
    }

    async fn execute_update(&self, connection: &mut Object, statement: &Statement) -> DslResult<u64> {
        exec::execute(connection, &self.config, statement).await
    }

    async fn execute_update_returning(
        &self,
        connection: &mut Object,
        statement: &Statement,
        column: &str,
    ) -> DslResult<Option<Row>> {
        exec::execute_returning(connection, &self.config, statement, column).await
    }

    async fn query_stream(&self, connection: &mut Object, statement: &Statement) -> DslResult<RowStream> {
        exec::query(connection, &self.config, statement).await
    }

    async fn query_metadata(
        &self,
        connection: &mut Object,
        statement: &Statement,
    ) -> DslResult<Arc<RowMetadata>> {
        exec::describe(connection, &self.config, statement).await
    }
}
