//! Managed connection and the client capability handed to metric handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{ConnError, ConnResult};
use crate::handle::DatabaseHandle;
use crate::queries::{QueryStorage, normalize_sql};
use crate::row::Row;

/// What a metric handler may do with a connection.
#[async_trait]
pub trait PostgresClient: Send + Sync {
    /// Run `sql` and return every row.
    async fn query(&self, sql: &str, params: &[&str]) -> ConnResult<Vec<Row>>;

    /// Run `sql` and return its first row, `None` when the result is empty.
    async fn query_row(&self, sql: &str, params: &[&str]) -> ConnResult<Option<Row>>;

    /// Like [`query`](Self::query) with SQL taken from the custom query table.
    async fn query_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Vec<Row>>;

    /// Like [`query_row`](Self::query_row) with SQL taken from the custom query table.
    async fn query_row_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Option<Row>>;

    /// Server version negotiated when the connection was created.
    fn postgres_version(&self) -> i32;
}

/// One live database handle plus the registry's bookkeeping for it.
///
/// The last-access stamp is stored as milliseconds since creation so reuse
/// can bump it through a shared reference.
pub struct ManagedConnection {
    handle: Arc<dyn DatabaseHandle>,
    version: i32,
    created_at: Instant,
    last_access_ms: AtomicU64,
    call_timeout: Duration,
    queries: Arc<QueryStorage>,
    address: String,
}

impl ManagedConnection {
    pub fn new(
        handle: Arc<dyn DatabaseHandle>,
        version: i32,
        call_timeout: Duration,
        queries: Arc<QueryStorage>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            version,
            created_at: Instant::now(),
            last_access_ms: AtomicU64::new(0),
            call_timeout,
            queries,
            address: address.into(),
        }
    }

    /// Record a use of this connection now.
    pub fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis();
        self.last_access_ms
            .store(u64::try_from(elapsed).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub fn last_access(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed))
    }

    /// Time since the last recorded use.
    pub fn idle_for(&self) -> Duration {
        self.last_access().elapsed()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn handle(&self) -> &Arc<dyn DatabaseHandle> {
        &self.handle
    }

    pub(crate) fn close(&self) {
        self.handle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn named_sql(&self, name: &str) -> ConnResult<String> {
        let sql = self
            .queries
            .get(name)
            .await
            .ok_or_else(|| ConnError::QueryNotFound(name.to_string()))?;
        Ok(normalize_sql(&sql).to_string())
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("address", &self.address)
            .field("version", &self.version)
            .field("idle_for", &self.idle_for())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PostgresClient for ManagedConnection {
    async fn query(&self, sql: &str, params: &[&str]) -> ConnResult<Vec<Row>> {
        self.handle
            .query(sql, params)
            .await
            .map_err(|e| ConnError::query(&self.address, e))
    }

    async fn query_row(&self, sql: &str, params: &[&str]) -> ConnResult<Option<Row>> {
        self.handle
            .query_opt(sql, params)
            .await
            .map_err(|e| ConnError::query(&self.address, e))
    }

    async fn query_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Vec<Row>> {
        let sql = self.named_sql(name).await?;
        self.query(&sql, params).await
    }

    async fn query_row_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Option<Row>> {
        let sql = self.named_sql(name).await?;
        self.query_row(&sql, params).await
    }

    fn postgres_version(&self) -> i32 {
        self.version
    }
}
