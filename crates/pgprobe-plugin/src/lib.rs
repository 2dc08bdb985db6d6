//! pgprobe plugin: turns metric requests into queries over managed
//! PostgreSQL connections.
//!
//! A request names a metric key (`pgsql.version`, `pgsql.db.size`, ...) and
//! carries positional parameters. [`Plugin::export`] resolves them against
//! the configured sessions, obtains a connection from the
//! [`ConnectionRegistry`](pgprobe_conn::ConnectionRegistry) and runs the
//! metric's handler under a deadline.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod params;
pub mod plugin;
pub mod value;

pub use config::{DEFAULT_GLOBAL_TIMEOUT, PluginOptions, Session};
pub use error::{PluginError, PluginResult};
pub use handlers::{HandlerTable, MetricHandler};
pub use metrics::{ExtraParam, MetricKey};
pub use params::{EvaluatedParams, evaluate};
pub use plugin::Plugin;
pub use value::MetricValue;
