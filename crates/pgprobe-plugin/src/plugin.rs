//! Plugin lifecycle and request dispatch.

use std::sync::Arc;
use std::time::Duration;

use pgprobe_conn::{ConnError, ConnectionRegistry, Connector, PgConnector, QueryStorage};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::PluginOptions;
use crate::error::{PluginError, PluginResult};
use crate::handlers::{HandlerTable, PING_FAILED, handler_table};
use crate::metrics::MetricKey;
use crate::params::evaluate;
use crate::value::MetricValue;

/// The metrics plugin: validated options, the handler table, and, between
/// [`start`](Self::start) and [`stop`](Self::stop), a connection registry.
pub struct Plugin {
    options: PluginOptions,
    handlers: HandlerTable,
    connector: Arc<dyn Connector>,
    registry: RwLock<Option<Arc<ConnectionRegistry>>>,
}

impl Plugin {
    /// Create a plugin that dials real servers.
    pub fn new(options: PluginOptions) -> PluginResult<Self> {
        Self::with_connector(options, Arc::new(PgConnector))
    }

    pub fn with_connector(
        options: PluginOptions,
        connector: Arc<dyn Connector>,
    ) -> PluginResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            handlers: handler_table(),
            connector,
            registry: RwLock::new(None),
        })
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// Load custom queries and start the connection registry. No-op when
    /// already started.
    pub async fn start(&self) {
        let mut slot = self.registry.write().await;
        if slot.is_some() {
            return;
        }

        let queries = Arc::new(QueryStorage::load_or_empty(
            self.options.custom_queries_path.as_deref(),
        ));
        let registry = ConnectionRegistry::new(
            self.options.registry_config(),
            Arc::clone(&self.connector),
            queries,
        );
        *slot = Some(Arc::new(registry));
        info!("plugin started");
    }

    /// Close every connection and drop the registry. No-op when not started.
    pub async fn stop(&self) {
        let registry = self.registry.write().await.take();
        if let Some(registry) = registry {
            registry.shutdown().await;
            info!("plugin stopped");
        }
    }

    pub async fn is_started(&self) -> bool {
        self.registry.read().await.is_some()
    }

    /// Re-read the custom query directory. Returns the number of queries loaded.
    pub async fn reload_custom_queries(&self) -> PluginResult<usize> {
        let registry = self.registry().await?;
        registry
            .queries()
            .reload()
            .await
            .map_err(|e| PluginError::config(format!("cannot reload custom queries: {e}")))
    }

    /// Export metric `key` with the request's positional parameters.
    ///
    /// The handler runs under the larger of the configured call timeout and
    /// `request_timeout`.
    pub async fn export(
        &self,
        key: &str,
        raw_params: &[String],
        request_timeout: Option<Duration>,
    ) -> PluginResult<MetricValue> {
        let metric: MetricKey = key.parse()?;
        if metric == MetricKey::CustomQuery && !self.options.custom_queries_enabled {
            return Err(PluginError::MetricDisabled(key.to_string()));
        }
        let handler = self
            .handlers
            .get(&metric)
            .cloned()
            .ok_or_else(|| PluginError::UnknownMetric(key.to_string()))?;

        let params = evaluate(metric, raw_params, &self.options)?;
        let identity = params.identity_key()?;
        let registry = self.registry().await?;

        let conn = match registry.get_connection(&identity, &params.tls).await {
            Ok(conn) => conn,
            Err(err) if metric == MetricKey::Ping => {
                debug!(key, address = %identity.address(), error = %err, "ping cannot connect");
                return Ok(MetricValue::Int(PING_FAILED));
            }
            Err(err) => {
                error!(key, address = %identity.address(), error = %err, "cannot get connection");
                return Err(err.into());
            }
        };

        let limit = request_timeout.map_or(conn.call_timeout(), |t| t.max(conn.call_timeout()));
        match tokio::time::timeout(limit, handler.handle(conn.as_ref(), &params)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!(key, address = %conn.address(), error = %err, "metric export failed");
                Err(err)
            }
            Err(_) => {
                warn!(key, address = %conn.address(), timeout = ?limit, "metric export timed out");
                Err(ConnError::Timeout(limit).into())
            }
        }
    }

    async fn registry(&self) -> PluginResult<Arc<ConnectionRegistry>> {
        self.registry
            .read()
            .await
            .clone()
            .ok_or(PluginError::NotStarted)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
