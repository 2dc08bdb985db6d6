//! Plugin-level errors.

use pgprobe_conn::ConnError;
use thiserror::Error;

pub type PluginResult<T> = Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    /// Connection-manager failure, passed through unchanged in kind.
    #[error(transparent)]
    Conn(#[from] ConnError),

    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("key {0:?} is disabled")]
    MetricDisabled(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A handler's query failed.
    #[error("cannot fetch data: {0}")]
    CannotFetchData(#[source] ConnError),

    #[error("cannot fetch data: empty result")]
    EmptyResult,

    /// A query returned something the handler cannot interpret.
    #[error("cannot fetch data: unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("plugin is not started")]
    NotStarted,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PluginError {
    pub(crate) fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the request failed because its deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Conn(e) if e.is_timeout())
    }
}
