//! Housekeeper — background loop that evicts idle connections.
//!
//! One task per registry. Each tick closes connections unused for longer
//! than the keep-alive; the shutdown signal closes everything and ends the
//! loop. Ticks are strictly sequential, and the registry lock serializes
//! them against concurrent inserts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::RegistryState;

pub(crate) fn spawn(state: Arc<RegistryState>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: Arc<RegistryState>, mut shutdown: watch::Receiver<bool>) {
    let period = state
        .config
        .housekeeper_interval
        .max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval = ?period, "housekeeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.close_unused().await;
            }
            // A dropped sender counts as shutdown too.
            _ = shutdown.changed() => {
                let closed = state.close_all().await;
                info!(closed, "housekeeper stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CacheMode, IdentityKey};
    use crate::queries::QueryStorage;
    use crate::registry::tests::MockConnector;
    use crate::registry::{ConnectionRegistry, RegistryConfig};
    use crate::tls::TlsParams;

    fn key() -> IdentityKey {
        IdentityKey::new("localhost", "alice", "", "postgres", CacheMode::Prepare).unwrap()
    }

    fn registry(keep_alive: u64, interval: u64) -> (ConnectionRegistry, Arc<MockConnector>) {
        let connector = Arc::new(MockConnector::new());
        let config = RegistryConfig {
            keep_alive: Duration::from_secs(keep_alive),
            housekeeper_interval: Duration::from_secs(interval),
            ..RegistryConfig::default()
        };
        let registry =
            ConnectionRegistry::new(config, connector.clone(), Arc::new(QueryStorage::empty()));
        (registry, connector)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_is_evicted_within_one_tick() {
        let (registry, connector) = registry(60, 10);
        let conn = registry.get_connection(&key(), &TlsParams::default()).await.unwrap();

        // Untouched for 60s is not yet "longer than" the keep-alive.
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(registry.contains(&key()).await);

        // The tick at 70s sees 70s of idleness.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!registry.contains(&key()).await);
        assert!(conn.is_closed());
        assert_eq!(connector.closed_handles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn used_connection_survives_sweeps() {
        let (registry, connector) = registry(60, 10);
        for _ in 0..10 {
            registry.get_connection(&key(), &TlsParams::default()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(45)).await;
        }
        assert!(registry.contains(&key()).await);
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_registry_closes_connections() {
        let (registry, connector) = registry(60, 10);
        let conn = registry.get_connection(&key(), &TlsParams::default()).await.unwrap();
        drop(registry);

        // Let the housekeeper observe the closed channel.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(conn.is_closed());
        assert_eq!(connector.closed_handles(), 1);
    }
}
