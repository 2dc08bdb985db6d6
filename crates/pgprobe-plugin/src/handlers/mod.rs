//! Metric handlers.
//!
//! Each handler runs one or two catalogue queries through the
//! [`PostgresClient`] capability and shapes the result into a [`MetricValue`].
//! The table mapping [`MetricKey`] to its handler is built once when the
//! plugin is created.

mod archive;
mod bgwriter;
mod custom_query;
mod ping;
mod scalar;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pgprobe_conn::{FromValue, PostgresClient, Row, Value};

use crate::error::{PluginError, PluginResult};
use crate::metrics::MetricKey;
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

pub use archive::ArchiveHandler;
pub use bgwriter::BgwriterHandler;
pub use custom_query::CustomQueryHandler;
pub use ping::{PING_FAILED, PING_OK, PingHandler};
pub use scalar::{ScalarKind, ScalarQuery};

#[async_trait]
pub trait MetricHandler: Send + Sync {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        params: &EvaluatedParams,
    ) -> PluginResult<MetricValue>;
}

pub type HandlerTable = HashMap<MetricKey, Arc<dyn MetricHandler>>;

/// Resolve the handler of every metric in the catalogue.
pub fn handler_table() -> HandlerTable {
    MetricKey::ALL
        .into_iter()
        .map(|key| (key, handler_for(key)))
        .collect()
}

fn handler_for(key: MetricKey) -> Arc<dyn MetricHandler> {
    match key {
        MetricKey::Archive => Arc::new(ArchiveHandler),
        MetricKey::Bgwriter => Arc::new(BgwriterHandler),
        MetricKey::CustomQuery => Arc::new(CustomQueryHandler),
        MetricKey::Ping => Arc::new(PingHandler),
        MetricKey::Autovacuum => Arc::new(scalar::AUTOVACUUM),
        MetricKey::CacheHit => Arc::new(scalar::CACHE_HIT),
        MetricKey::Connections => Arc::new(scalar::CONNECTIONS),
        MetricKey::DbAge => Arc::new(scalar::DB_AGE),
        MetricKey::DbBloatingTables => Arc::new(scalar::DB_BLOATING_TABLES),
        MetricKey::DbDiscovery => Arc::new(scalar::DB_DISCOVERY),
        MetricKey::DbSize => Arc::new(scalar::DB_SIZE),
        MetricKey::OldestXid => Arc::new(scalar::OLDEST_XID),
        MetricKey::Uptime => Arc::new(scalar::UPTIME),
        MetricKey::Version => Arc::new(scalar::VERSION),
        MetricKey::WalStat => Arc::new(scalar::WAL_STAT),
    }
}

/// Run `sql` and return its first row.
async fn fetch_row(client: &dyn PostgresClient, sql: &str, params: &[&str]) -> PluginResult<Row> {
    client
        .query_row(sql, params)
        .await
        .map_err(PluginError::CannotFetchData)?
        .ok_or(PluginError::EmptyResult)
}

/// Read the first column of `row` as `T`.
fn scan<T: FromValue>(row: &Row) -> PluginResult<T> {
    match row.value(0) {
        None | Some(Value::Null) => Err(PluginError::EmptyResult),
        Some(value) => T::from_value(value)
            .ok_or_else(|| PluginError::UnexpectedResult(format!("cannot scan {value:?}"))),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pgprobe_conn::{ConnError, ConnResult, PostgresClient, Row, Value};

    /// Client answering queries whose SQL contains a registered fragment.
    #[derive(Default)]
    pub struct MockClient {
        pub version: i32,
        responses: Vec<(String, Result<Vec<Row>, String>)>,
        named: Vec<(String, Vec<Row>)>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockClient {
        pub fn new() -> Self {
            Self {
                version: 160_004,
                ..Self::default()
            }
        }

        pub fn with_version(mut self, version: i32) -> Self {
            self.version = version;
            self
        }

        pub fn respond(mut self, fragment: &str, rows: Vec<Row>) -> Self {
            self.responses.push((fragment.to_string(), Ok(rows)));
            self
        }

        pub fn respond_value(self, fragment: &str, value: Value) -> Self {
            self.respond(fragment, vec![Row::new().with("value", value)])
        }

        pub fn fail(mut self, fragment: &str, reason: &str) -> Self {
            self.responses.push((fragment.to_string(), Err(reason.to_string())));
            self
        }

        pub fn named(mut self, name: &str, rows: Vec<Row>) -> Self {
            self.named.push((name.to_string(), rows));
            self
        }

        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, sql: &str, params: &[&str]) {
            self.calls.lock().unwrap().push((
                sql.to_string(),
                params.iter().map(|p| p.to_string()).collect(),
            ));
        }
    }

    fn failure(reason: &str) -> ConnError {
        ConnError::Connection {
            address: "mock:5432".to_string(),
            reason: reason.to_string(),
        }
    }

    #[async_trait]
    impl PostgresClient for MockClient {
        async fn query(&self, sql: &str, params: &[&str]) -> ConnResult<Vec<Row>> {
            self.record(sql, params);
            match self.responses.iter().find(|(frag, _)| sql.contains(frag.as_str())) {
                Some((_, Ok(rows))) => Ok(rows.clone()),
                Some((_, Err(reason))) => Err(failure(reason)),
                None => Ok(Vec::new()),
            }
        }

        async fn query_row(&self, sql: &str, params: &[&str]) -> ConnResult<Option<Row>> {
            Ok(self.query(sql, params).await?.into_iter().next())
        }

        async fn query_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Vec<Row>> {
            self.record(name, params);
            self.named
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, rows)| rows.clone())
                .ok_or_else(|| ConnError::QueryNotFound(name.to_string()))
        }

        async fn query_row_by_name(&self, name: &str, params: &[&str]) -> ConnResult<Option<Row>> {
            Ok(self.query_by_name(name, params).await?.into_iter().next())
        }

        fn postgres_version(&self) -> i32 {
            self.version
        }
    }
}
