use async_trait::async_trait;
use pgprobe_conn::PostgresClient;

use super::MetricHandler;
use crate::error::{PluginError, PluginResult};
use crate::metrics::PARAM_QUERY_NAME;
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

/// Runs a named query from the custom query table and renders every row as
/// a JSON object. Trailing request parameters are bound as text.
pub struct CustomQueryHandler;

#[async_trait]
impl MetricHandler for CustomQueryHandler {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        params: &EvaluatedParams,
    ) -> PluginResult<MetricValue> {
        let name = params.extra(PARAM_QUERY_NAME.name).unwrap_or_default();
        let args: Vec<&str> = params.variadic.iter().map(String::as_str).collect();

        let rows = client
            .query_by_name(name, &args)
            .await
            .map_err(PluginError::CannotFetchData)?;

        serde_json::to_string(&rows)
            .map(MetricValue::Text)
            .map_err(|e| PluginError::UnexpectedResult(format!("cannot marshal results: {e}")))
    }
}
