//! pgprobe connection manager.
//!
//! Maps a logical (endpoint, credentials, cache mode) identity to one live,
//! reused PostgreSQL connection:
//!
//! - [`identity`] — the [`IdentityKey`] connections are deduplicated on
//! - [`tls`] — TLS parameter normalization and validation
//! - [`dsn`] — the dial target handed to a [`Connector`]
//! - [`registry`] — the [`ConnectionRegistry`]: lookup, creation, race collapsing, shutdown
//! - `housekeeper` — the background loop evicting idle connections
//! - [`connection`] — the [`ManagedConnection`] and the [`PostgresClient`] capability
//! - [`postgres`] — the `tokio-postgres` driver behind [`PgConnector`]

pub mod connection;
pub mod dsn;
pub mod error;
pub mod handle;
mod housekeeper;
pub mod identity;
pub mod postgres;
pub mod queries;
pub mod registry;
pub mod row;
pub mod tls;

pub use connection::{ManagedConnection, PostgresClient};
pub use dsn::ConnectSpec;
pub use error::{BoxError, ConnError, ConnResult};
pub use handle::{Connector, DatabaseHandle};
pub use identity::{CacheMode, IdentityKey, Scheme};
pub use postgres::PgConnector;
pub use queries::QueryStorage;
pub use registry::{ConnectionRegistry, MIN_SUPPORTED_VERSION, RegistryConfig};
pub use row::{FromValue, Row, Value};
pub use tls::{TlsDetails, TlsMode, TlsParams};
