//! Driver seam.
//!
//! The registry never talks to a database directly: it asks a [`Connector`]
//! for a [`DatabaseHandle`] and keeps it in a
//! [`ManagedConnection`](crate::ManagedConnection). Production code uses
//! [`PgConnector`](crate::postgres::PgConnector); tests plug in mocks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dsn::ConnectSpec;
use crate::error::{BoxError, ConnResult};
use crate::row::Row;

/// One live database handle. Must tolerate concurrent queries.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Run `sql` with text parameters and collect every row.
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, BoxError>;

    /// Run `sql` and return its first row, if any.
    async fn query_opt(&self, sql: &str, params: &[&str]) -> Result<Option<Row>, BoxError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// `server_version_num` of the server behind this handle.
    async fn server_version_num(&self) -> Result<i32, BoxError> {
        let row = self
            .query_opt("select current_setting('server_version_num')", &[])
            .await?
            .ok_or("server_version_num returned no rows")?;
        row.get::<i64>(0)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| "server_version_num is not an integer".into())
    }

    /// Release the underlying connection. Queries issued afterwards fail.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens database handles.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ConnectSpec) -> ConnResult<Arc<dyn DatabaseHandle>>;
}
