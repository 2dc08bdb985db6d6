//! Connection registry — one managed connection per identity key.
//!
//! # Lookup
//!
//! ```text
//! get_connection(key)
//!   → lock, key present → bump last access, return it
//!   → miss → unlock, resolve TLS, dial, probe version (no lock held)
//!     → lock again
//!       → someone inserted key meanwhile → close ours, return theirs
//!       → otherwise insert ours
//! ```
//!
//! The map lock only ever guards map-local work, so slow dials to one server
//! never block lookups for another.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::ManagedConnection;
use crate::dsn::ConnectSpec;
use crate::error::{ConnError, ConnResult};
use crate::handle::{Connector, DatabaseHandle};
use crate::housekeeper;
use crate::identity::IdentityKey;
use crate::queries::QueryStorage;
use crate::tls::{TlsDetails, TlsParams};

/// Oldest server accepted (`server_version_num` of PostgreSQL 10).
pub const MIN_SUPPORTED_VERSION: i32 = 100_000;

/// Registry timing and version settings.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Connections unused for longer than this are closed (default: 300s).
    pub keep_alive: Duration,
    /// Bound on dial plus version probe (default: 3s).
    pub connect_timeout: Duration,
    /// Per-call budget handed to handlers through the connection (default: 3s).
    pub call_timeout: Duration,
    /// Housekeeper tick period (default: 10s).
    pub housekeeper_interval: Duration,
    /// Lowest `server_version_num` accepted.
    pub min_version: i32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(3),
            call_timeout: Duration::from_secs(3),
            housekeeper_interval: Duration::from_secs(10),
            min_version: MIN_SUPPORTED_VERSION,
        }
    }
}

/// State shared between the registry front end and its housekeeper.
pub(crate) struct RegistryState {
    connections: Mutex<HashMap<IdentityKey, Arc<ManagedConnection>>>,
    pub(crate) config: RegistryConfig,
    connector: Arc<dyn Connector>,
    queries: Arc<QueryStorage>,
}

impl RegistryState {
    /// Close and drop every connection idle longer than the keep-alive.
    pub(crate) async fn close_unused(&self) -> usize {
        let keep_alive = self.config.keep_alive;
        let mut connections = self.connections.lock().await;
        let before = connections.len();
        connections.retain(|key, conn| {
            if conn.idle_for() <= keep_alive {
                return true;
            }
            conn.close();
            debug!(address = %key.address(), "closed unused connection");
            false
        });
        let evicted = before - connections.len();
        if evicted > 0 {
            info!(evicted, remaining = connections.len(), "evicted idle connections");
        }
        evicted
    }

    /// Close and drop every connection regardless of age.
    pub(crate) async fn close_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let closed = connections.len();
        for (key, conn) in connections.drain() {
            conn.close();
            debug!(address = %key.address(), "closed connection");
        }
        closed
    }
}

/// Concurrency-safe map from [`IdentityKey`] to [`ManagedConnection`].
///
/// Construction spawns the housekeeper, so it must happen inside a Tokio
/// runtime. Dropping the registry signals the housekeeper, which then
/// closes every remaining connection.
pub struct ConnectionRegistry {
    state: Arc<RegistryState>,
    shutdown_tx: watch::Sender<bool>,
    housekeeper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionRegistry {
    pub fn new(
        config: RegistryConfig,
        connector: Arc<dyn Connector>,
        queries: Arc<QueryStorage>,
    ) -> Self {
        let state = Arc::new(RegistryState {
            connections: Mutex::new(HashMap::new()),
            config,
            connector,
            queries,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = housekeeper::spawn(Arc::clone(&state), shutdown_rx);

        info!(
            keep_alive = ?state.config.keep_alive,
            interval = ?state.config.housekeeper_interval,
            "connection registry started"
        );

        Self {
            state,
            shutdown_tx,
            housekeeper: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.state.config
    }

    pub fn queries(&self) -> &Arc<QueryStorage> {
        &self.state.queries
    }

    /// Return the connection for `key`, creating it on a miss.
    ///
    /// `tls` is only resolved on a miss; a cached connection is returned even
    /// if the TLS parameters of this request differ from the creating one.
    pub async fn get_connection(
        &self,
        key: &IdentityKey,
        tls: &TlsParams,
    ) -> ConnResult<Arc<ManagedConnection>> {
        if let Some(conn) = self.lookup(key).await {
            return Ok(conn);
        }

        let details = TlsDetails::resolve(tls)?;
        let conn = self.create(key, details).await?;
        Ok(self.insert(key, conn).await)
    }

    /// Cached connection for `key`. A connection whose handle has died is
    /// dropped here so the caller redials.
    async fn lookup(&self, key: &IdentityKey) -> Option<Arc<ManagedConnection>> {
        let mut connections = self.state.connections.lock().await;
        let conn = connections.get(key)?;
        if conn.is_closed() {
            conn.close();
            connections.remove(key);
            debug!(address = %key.address(), "dropped broken connection");
            return None;
        }
        conn.touch();
        Some(Arc::clone(conn))
    }

    /// Dial, probe and version-check a new connection. Runs without the map lock.
    async fn create(&self, key: &IdentityKey, tls: TlsDetails) -> ConnResult<ManagedConnection> {
        let config = &self.state.config;
        let spec = ConnectSpec::new(key, tls);
        let address = spec.address.clone();

        let handle = tokio::time::timeout(
            config.connect_timeout,
            self.state.connector.connect(&spec),
        )
        .await
        .map_err(|_| {
            ConnError::connection(
                &address,
                format!("connect timeout {:?} exceeded", config.connect_timeout),
            )
        })??;

        let version = match probe_version(handle.as_ref(), config.connect_timeout).await {
            Ok(v) => v,
            Err(reason) => {
                handle.close();
                return Err(ConnError::connection(
                    &address,
                    format!("failed to get server version: {reason}"),
                ));
            }
        };

        if version < config.min_version {
            handle.close();
            return Err(ConnError::UnsupportedVersion {
                address,
                version,
                minimum: config.min_version,
            });
        }

        debug!(address = %address, version, "created new connection");

        Ok(ManagedConnection::new(
            handle,
            version,
            config.call_timeout,
            Arc::clone(&self.state.queries),
            address,
        ))
    }

    /// Insert `conn` under `key` unless a concurrent caller won the race.
    async fn insert(&self, key: &IdentityKey, conn: ManagedConnection) -> Arc<ManagedConnection> {
        let mut connections = self.state.connections.lock().await;
        match connections.entry(key.clone()) {
            Entry::Occupied(existing) => {
                conn.close();
                debug!(address = %key.address(), "closed redundant connection");
                let existing = existing.get();
                existing.touch();
                Arc::clone(existing)
            }
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(conn))),
        }
    }

    /// Evict idle connections now, outside the housekeeper's schedule.
    pub async fn close_unused(&self) -> usize {
        self.state.close_unused().await
    }

    /// Stop the housekeeper and close every connection.
    ///
    /// Idempotent. The registry stays usable afterwards: a later
    /// [`get_connection`](Self::get_connection) dials afresh, but nothing
    /// evicts idle connections any more.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.housekeeper.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "housekeeper task ended abnormally");
            }
            info!("connection registry stopped");
        }
        // Catches connections inserted after the housekeeper's final pass.
        self.state.close_all().await;
    }

    pub async fn len(&self) -> usize {
        self.state.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &IdentityKey) -> bool {
        self.state.connections.lock().await.contains_key(key)
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.state.config)
            .finish_non_exhaustive()
    }
}

async fn probe_version(handle: &dyn DatabaseHandle, limit: Duration) -> Result<i32, String> {
    match tokio::time::timeout(limit, handle.server_version_num()).await {
        Ok(Ok(version)) => Ok(version),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timeout {limit:?} exceeded")),
    }
}
