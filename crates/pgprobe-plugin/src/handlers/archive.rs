use async_trait::async_trait;
use pgprobe_conn::PostgresClient;
use serde_json::{Map, Value as Json};

use super::{MetricHandler, fetch_row, scan};
use crate::error::{PluginError, PluginResult};
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

const ARCHIVE_COUNT: &str = "SELECT row_to_json(T)::text
       FROM (
         SELECT archived_count, failed_count
           FROM pg_stat_archiver
       ) T";

const ARCHIVE_SIZE: &str = "SELECT row_to_json(T)::text
       FROM (
         WITH values AS (
           SELECT
             4096 / (ceil(pg_settings.setting::numeric / 1024 / 1024))::int AS segment_parts_count,
             setting::bigint AS segment_size,
             ('x' || substring(pg_stat_archiver.last_archived_wal from 9 for 8))::bit(32)::int AS last_wal_div,
             ('x' || substring(pg_stat_archiver.last_archived_wal from 17 for 8))::bit(32)::int AS last_wal_mod,
             CASE WHEN pg_is_in_recovery() THEN NULL
               ELSE ('x' || substring(pg_walfile_name(pg_current_wal_lsn()) from 9 for 8))::bit(32)::int END AS current_wal_div,
             CASE WHEN pg_is_in_recovery() THEN NULL
               ELSE ('x' || substring(pg_walfile_name(pg_current_wal_lsn()) from 17 for 8))::bit(32)::int END AS current_wal_mod
           FROM pg_settings, pg_stat_archiver
           WHERE pg_settings.name = 'wal_segment_size')
         SELECT
           greatest(coalesce((segment_parts_count - last_wal_mod) + ((current_wal_div - last_wal_div - 1) * segment_parts_count) + current_wal_mod - 1, 0), 0) AS count_files,
           greatest(coalesce(((segment_parts_count - last_wal_mod) + ((current_wal_div - last_wal_div - 1) * segment_parts_count) + current_wal_mod - 1) * segment_size, 0), 0) AS size_files
         FROM values
       ) T";

/// Archiver counters merged with the pending WAL file count and size.
pub struct ArchiveHandler;

#[async_trait]
impl MetricHandler for ArchiveHandler {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        _params: &EvaluatedParams,
    ) -> PluginResult<MetricValue> {
        let counts: String = scan(&fetch_row(client, ARCHIVE_COUNT, &[]).await?)?;
        let sizes: String = scan(&fetch_row(client, ARCHIVE_SIZE, &[]).await?)?;

        let mut merged = json_object(&counts)?;
        merged.extend(json_object(&sizes)?);
        Ok(MetricValue::Text(Json::Object(merged).to_string()))
    }
}

fn json_object(doc: &str) -> PluginResult<Map<String, Json>> {
    match serde_json::from_str(doc) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(other) => Err(PluginError::UnexpectedResult(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(PluginError::UnexpectedResult(e.to_string())),
    }
}
