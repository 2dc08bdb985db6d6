use async_trait::async_trait;
use pgprobe_conn::PostgresClient;

use super::{MetricHandler, fetch_row, scan};
use crate::error::PluginResult;
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

/// First server version that moved checkpoint counters to `pg_stat_checkpointer`.
const CHECKPOINTER_VERSION: i32 = 170_000;

const BGWRITER_LEGACY: &str = "SELECT row_to_json(T)::text
       FROM (
         SELECT
           checkpoints_timed,
           checkpoints_req,
           checkpoint_write_time,
           checkpoint_sync_time,
           buffers_checkpoint,
           buffers_clean,
           maxwritten_clean,
           buffers_backend,
           buffers_backend_fsync,
           buffers_alloc
         FROM pg_catalog.pg_stat_bgwriter
       ) T";

const BGWRITER_CHECKPOINTER: &str = "SELECT row_to_json(T)::text
       FROM (
         SELECT
           psc.num_timed AS checkpoints_timed,
           psc.num_requested AS checkpoints_req,
           psc.write_time AS checkpoint_write_time,
           psc.sync_time AS checkpoint_sync_time,
           psc.buffers_written AS buffers_checkpoint,
           psb.buffers_clean AS buffers_clean,
           psb.maxwritten_clean AS maxwritten_clean,
           psb.buffers_alloc AS buffers_alloc
         FROM pg_catalog.pg_stat_checkpointer AS psc,
              pg_catalog.pg_stat_bgwriter AS psb
       ) T";

pub struct BgwriterHandler;

#[async_trait]
impl MetricHandler for BgwriterHandler {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        _params: &EvaluatedParams,
    ) -> PluginResult<MetricValue> {
        let sql = if client.postgres_version() >= CHECKPOINTER_VERSION {
            BGWRITER_CHECKPOINTER
        } else {
            BGWRITER_LEGACY
        };
        let doc: String = scan(&fetch_row(client, sql, &[]).await?)?;
        Ok(MetricValue::Text(doc))
    }
}

#[cfg(test)]
mod tests {
    use pgprobe_conn::Value;

    use super::*;
    use crate::config::PluginOptions;
    use crate::handlers::mock::MockClient;
    use crate::metrics::MetricKey;
    use crate::params::evaluate;

    async fn run(version: i32) -> (MetricValue, String) {
        let client = MockClient::new()
            .with_version(version)
            .respond_value("pg_stat_bgwriter", Value::Text(r#"{"buffers_clean":0}"#.into()));
        let params = evaluate(MetricKey::Bgwriter, &[], &PluginOptions::default()).unwrap();
        let value = BgwriterHandler.handle(&client, &params).await.unwrap();
        let sql = client.calls()[0].0.clone();
        (value, sql)
    }

    #[tokio::test]
    async fn query_follows_server_version() {
        let (value, sql) = run(160_004).await;
        assert_eq!(value, MetricValue::Text(r#"{"buffers_clean":0}"#.into()));
        assert!(!sql.contains("pg_stat_checkpointer"));

        let (_, sql) = run(170_000).await;
        assert!(sql.contains("pg_stat_checkpointer"));
    }
}
