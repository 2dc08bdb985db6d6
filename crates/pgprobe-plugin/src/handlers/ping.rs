use async_trait::async_trait;
use pgprobe_conn::PostgresClient;

use super::MetricHandler;
use crate::error::PluginResult;
use crate::params::EvaluatedParams;
use crate::value::MetricValue;

pub const PING_OK: i64 = 1;
pub const PING_FAILED: i64 = 0;

/// `1` when the server answers `SELECT 1`, `0` otherwise. Never fails.
pub struct PingHandler;

#[async_trait]
impl MetricHandler for PingHandler {
    async fn handle(
        &self,
        client: &dyn PostgresClient,
        _params: &EvaluatedParams,
    ) -> PluginResult<MetricValue> {
        let alive = match client.query_row("SELECT 1", &[]).await {
            Ok(Some(row)) => row.get::<i64>(0) == Some(PING_OK),
            Ok(None) => false,
            Err(err) => {
                tracing::debug!(error = %err, "ping failed");
                false
            }
        };
        Ok(MetricValue::Int(if alive { PING_OK } else { PING_FAILED }))
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

    fn params() -> EvaluatedParams {
        evaluate(MetricKey::Ping, &[], &PluginOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn answers_one_when_alive() {
        let client = MockClient::new().respond_value("SELECT 1", Value::Int(1));
        let v = PingHandler.handle(&client, &params()).await.unwrap();
        assert_eq!(v, MetricValue::Int(PING_OK));
    }

    #[tokio::test]
    async fn answers_zero_on_failure() {
        let client = MockClient::new().fail("SELECT 1", "terminating connection");
        let v = PingHandler.handle(&client, &params()).await.unwrap();
        assert_eq!(v, MetricValue::Int(PING_FAILED));
    }
}
