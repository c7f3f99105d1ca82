use std::time::Duration;

use crate::error::{DslError, DslResult};

/// Connection and execution settings for the PostgreSQL backends.
///
/// Defaults: 16 pooled connections, one runtime worker thread, no statement
/// timeout, SQL logged in full.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// `postgres://` connection string.
    pub database_url: String,
    /// Maximum number of pooled connections.
    pub max_pool_size: usize,
    /// Worker threads of the runtime owned by the blocking backend.
    pub worker_threads: usize,
    /// Per-statement timeout. `None` means no timeout (default).
    pub query_timeout: Option<Duration>,
    /// Truncate logged SQL to this many bytes.
    pub max_sql_log_length: Option<usize>,
}

impl PgConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_pool_size: 16,
            worker_threads: 1,
            query_timeout: None,
            max_sql_log_length: None,
        }
    }

    /// Read settings from the environment.
    ///
    /// `DATABASE_URL` is required; `PGDSL_POOL_SIZE`, `PGDSL_WORKER_THREADS` and
    /// `PGDSL_QUERY_TIMEOUT_MS` override the defaults when set.
    pub fn from_env() -> DslResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| DslError::invalid("DATABASE_URL is not set"))?;
        let mut config = Self::new(database_url);

        if let Some(size) = env_number("PGDSL_POOL_SIZE")? {
            config = config.with_max_pool_size(size);
        }
        if let Some(threads) = env_number("PGDSL_WORKER_THREADS")? {
            config = config.with_worker_threads(threads);
        }
        if let Some(millis) = env_number("PGDSL_QUERY_TIMEOUT_MS")? {
            config = config.with_query_timeout(Duration::from_millis(millis as u64));
        }
        Ok(config)
    }

    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size.max(1);
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Statements running longer than `timeout` are cancelled on the server and
    /// fail with [`DslError::Timeout`].
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_max_sql_log_length(mut self, max: usize) -> Self {
        self.max_sql_log_length = Some(max);
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_log_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn env_number(key: &str) -> DslResult<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DslError::invalid(format!("{key} must be a non-negative integer, got `{raw}`"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PgConfig::new("postgres://localhost/test");
        assert_eq!(config.max_pool_size, 16);
        assert_eq!(config.worker_threads, 1);
        assert!(config.query_timeout.is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let config = PgConfig::new("postgres://localhost/test").with_max_sql_log_length(8);
        assert_eq!(config.truncate_sql("select 1"), "select 1");
        assert_eq!(config.truncate_sql("select 'héllo'"), "select '...");
        assert_eq!(truncate_sql_bytes("é", 1), "");
    }

    #[test]
    fn sizes_are_at_least_one() {
        let config = PgConfig::new("x").with_max_pool_size(0).with_worker_threads(0);
        assert_eq!(config.max_pool_size, 1);
        assert_eq!(config.worker_threads, 1);
    }
}
