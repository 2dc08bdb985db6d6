//! Handlers that run one query and return its single value.

use async_trait::async_trait;
use pgprobe_conn::PostgresClient;

use super::{MetricHandler, fetch_row, scan};
use crate::error::PluginResult;
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

/// How the single value is scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Float,
    /// Plain text, including JSON documents rendered by the server.
    Text,
}

/// A query yielding one value, optionally bound to the request's database name.
#[derive(Clone, Copy, Debug)]
pub struct ScalarQuery {
    pub sql: &'static str,
    pub kind: ScalarKind,
    pub bind_database: bool,
}

impl ScalarQuery {
    const fn new(sql: &'static str, kind: ScalarKind) -> Self {
        Self {
            sql,
            kind,
            bind_database: false,
        }
    }

    const fn for_database(sql: &'static str, kind: ScalarKind) -> Self {
        Self {
            sql,
            kind,
            bind_database: true,
        }
    }
}

#[async_trait]
impl MetricHandler for ScalarQuery {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        params: &EvaluatedParams,
    ) -> PluginResult<MetricValue> {
        let bound = [params.database.as_str()];
        let args: &[&str] = if self.bind_database { &bound } else { &[] };

        let row = fetch_row(client, self.sql, args).await?;
        Ok(match self.kind {
            ScalarKind::Int => MetricValue::Int(scan(&row)?),
            ScalarKind::Float => MetricValue::Float(scan(&row)?),
            ScalarKind::Text => MetricValue::Text(scan(&row)?),
        })
    }
}

pub(super) const VERSION: ScalarQuery = ScalarQuery::new("SELECT version()", ScalarKind::Text);

pub(super) const UPTIME: ScalarQuery = ScalarQuery::new(
    "SELECT date_part('epoch', now() - pg_postmaster_start_time())",
    ScalarKind::Float,
);

pub(super) const AUTOVACUUM: ScalarQuery = ScalarQuery::new(
    "SELECT count(*)
       FROM pg_catalog.pg_stat_activity
      WHERE backend_type = 'autovacuum worker'
        AND state <> 'idle'
        AND pid <> pg_catalog.pg_backend_pid()",
    ScalarKind::Int,
);

pub(super) const CACHE_HIT: ScalarQuery = ScalarQuery::new(
    "SELECT round(sum(blks_hit) * 100 / nullif(sum(blks_hit + blks_read), 0), 2)
       FROM pg_catalog.pg_stat_database",
    ScalarKind::Float,
);

pub(super) const CONNECTIONS: ScalarQuery = ScalarQuery::new(
    "SELECT row_to_json(T)::text
       FROM (
         SELECT
           sum(CASE WHEN state = 'active' THEN 1 ELSE 0 END) AS active,
           sum(CASE WHEN state = 'idle' THEN 1 ELSE 0 END) AS idle,
           sum(CASE WHEN state = 'idle in transaction' THEN 1 ELSE 0 END) AS idle_in_transaction,
           sum(CASE WHEN state = 'idle in transaction (aborted)' THEN 1 ELSE 0 END) AS idle_in_transaction_aborted,
           sum(CASE WHEN state = 'fastpath function call' THEN 1 ELSE 0 END) AS fastpath_function_call,
           sum(CASE WHEN state = 'disabled' THEN 1 ELSE 0 END) AS disabled,
           count(*) AS total,
           count(*) * 100 / (SELECT current_setting('max_connections')::int) AS total_pct,
           sum(CASE WHEN wait_event IS NOT NULL THEN 1 ELSE 0 END) AS waiting,
           (SELECT count(*) FROM pg_prepared_xacts) AS prepared
         FROM pg_stat_activity
         WHERE datid IS NOT NULL AND state IS NOT NULL
       ) T",
    ScalarKind::Text,
);

pub(super) const DB_AGE: ScalarQuery = ScalarQuery::for_database(
    "SELECT age(datfrozenxid)
       FROM pg_catalog.pg_database
      WHERE datistemplate = false
        AND datname = $1",
    ScalarKind::Int,
);

pub(super) const DB_SIZE: ScalarQuery = ScalarQuery::for_database(
    "SELECT pg_database_size(datname::text)
       FROM pg_catalog.pg_database
      WHERE datistemplate = false
        AND datname = $1",
    ScalarKind::Int,
);

pub(super) const DB_BLOATING_TABLES: ScalarQuery = ScalarQuery::new(
    "SELECT count(*)
       FROM pg_catalog.pg_stat_all_tables
      WHERE (n_dead_tup / (n_live_tup + n_dead_tup)::float8) > 0.2
        AND (n_live_tup + n_dead_tup) > 50",
    ScalarKind::Int,
);

pub(super) const DB_DISCOVERY: ScalarQuery = ScalarQuery::new(
    "SELECT coalesce(json_agg(json_build_object('{#DBNAME}', d.datname)), '[]'::json)::text
       FROM pg_catalog.pg_database d
      WHERE NOT d.datistemplate
        AND d.datallowconn",
    ScalarKind::Text,
);

pub(super) const OLDEST_XID: ScalarQuery = ScalarQuery::new(
    "SELECT greatest(max(age(backend_xmin)), max(age(backend_xid)))
       FROM pg_catalog.pg_stat_activity",
    ScalarKind::Int,
);

pub(super) const WAL_STAT: ScalarQuery = ScalarQuery::new(
    "SELECT row_to_json(T)::text
       FROM (
         SELECT
           CASE
             WHEN pg_is_in_recovery() THEN 0
             ELSE pg_wal_lsn_diff(pg_current_wal_lsn(), '0/00000000')
           END AS write,
           CASE
             WHEN NOT pg_is_in_recovery() THEN 0
             ELSE pg_wal_lsn_diff(pg_last_wal_receive_lsn(), '0/00000000')
           END AS receive,
           count(*)
         FROM pg_ls_waldir() AS count
       ) T",
    ScalarKind::Text,
);

#[cfg(test)]
mod tests {
    use pgprobe_conn::Value;

    use super::*;
    use crate::config::PluginOptions;
    use crate::error::PluginError;
    use crate::handlers::mock::MockClient;
    use crate::metrics::MetricKey;
    use crate::params::evaluate;

    fn params(key: MetricKey, raw: &[&str]) -> EvaluatedParams {
        let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        evaluate(key, &raw, &PluginOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn database_metrics_bind_the_requested_database() {
        let client = MockClient::new().respond_value("pg_database_size", Value::Int(8_221_487));
        let v = DB_SIZE
            .handle(&client, &params(MetricKey::DbSize, &["", "", "", "sales"]))
            .await
            .unwrap();
        assert_eq!(v, MetricValue::Int(8_221_487));

        let calls = client.calls();
        assert_eq!(calls[0].1, vec!["sales".to_string()]);
    }

    #[tokio::test]
    async fn unbound_metrics_pass_no_params() {
        let client = MockClient::new().respond_value("autovacuum worker", Value::Int(2));
        let v = AUTOVACUUM
            .handle(&client, &params(MetricKey::Autovacuum, &[]))
            .await
            .unwrap();
        assert_eq!(v, MetricValue::Int(2));
        assert!(client.calls()[0].1.is_empty());
    }

    #[tokio::test]
    async fn float_metrics_accept_integral_values() {
        let client = MockClient::new().respond_value("pg_postmaster_start_time", Value::Int(3600));
        let v = UPTIME.handle(&client, &params(MetricKey::Uptime, &[])).await.unwrap();
        assert_eq!(v, MetricValue::Float(3600.0));
    }

    #[tokio::test]
    async fn missing_database_is_empty_result() {
        let client = MockClient::new();
        let err = DB_AGE
            .handle(&client, &params(MetricKey::DbAge, &["", "", "", "nope"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::EmptyResult));
    }

    #[tokio::test]
    async fn null_cache_hit_is_empty_result() {
        let client = MockClient::new().respond_value("blks_hit", Value::Null);
        let err = CACHE_HIT
            .handle(&client, &params(MetricKey::CacheHit, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::EmptyResult));
    }

    #[tokio::test]
    async fn json_documents_are_returned_verbatim() {
        let doc = r#"[{"{#DBNAME}":"postgres"},{"{#DBNAME}":"sales"}]"#;
        let client = MockClient::new().respond_value("{#DBNAME}", Value::Text(doc.into()));
        let v = DB_DISCOVERY
            .handle(&client, &params(MetricKey::DbDiscovery, &[]))
            .await
            .unwrap();
        assert_eq!(v, MetricValue::Text(doc.into()));
    }
}
