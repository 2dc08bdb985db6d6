//! Metric catalogue.

use std::fmt;
use std::str::FromStr;

use crate::error::PluginError;

/// A parameter a metric takes after the four connection parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtraParam {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub const PARAM_QUERY_NAME: ExtraParam = ExtraParam {
    name: "QueryName",
    description: "Name of a custom query (must be equal to a name of an SQL file without an extension).",
    required: true,
};

/// Every metric the plugin exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKey {
    Archive,
    Autovacuum,
    Bgwriter,
    CacheHit,
    Connections,
    CustomQuery,
    DbAge,
    DbBloatingTables,
    DbDiscovery,
    DbSize,
    OldestXid,
    Ping,
    Uptime,
    Version,
    WalStat,
}

impl MetricKey {
    pub const ALL: [MetricKey; 15] = [
        Self::Archive,
        Self::Autovacuum,
        Self::Bgwriter,
        Self::CacheHit,
        Self::Connections,
        Self::CustomQuery,
        Self::DbAge,
        Self::DbBloatingTables,
        Self::DbDiscovery,
        Self::DbSize,
        Self::OldestXid,
        Self::Ping,
        Self::Uptime,
        Self::Version,
        Self::WalStat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Archive => "pgsql.archive",
            Self::Autovacuum => "pgsql.autovacuum.count",
            Self::Bgwriter => "pgsql.bgwriter",
            Self::CacheHit => "pgsql.cache.hit",
            Self::Connections => "pgsql.connections",
            Self::CustomQuery => "pgsql.custom.query",
            Self::DbAge => "pgsql.db.age",
            Self::DbBloatingTables => "pgsql.db.bloating_tables",
            Self::DbDiscovery => "pgsql.db.discovery",
            Self::DbSize => "pgsql.db.size",
            Self::OldestXid => "pgsql.oldest.xid",
            Self::Ping => "pgsql.ping",
            Self::Uptime => "pgsql.uptime",
            Self::Version => "pgsql.version",
            Self::WalStat => "pgsql.wal.stat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Archive => "Returns info about size of archive files.",
            Self::Autovacuum => "Returns count of autovacuum workers.",
            Self::Bgwriter => "Returns JSON for sum of each type of bgwriter statistic.",
            Self::CacheHit => "Returns cache hit percent.",
            Self::Connections => "Returns JSON for sum of each type of connection.",
            Self::CustomQuery => "Returns result of a custom query.",
            Self::DbAge => "Returns age for specific database.",
            Self::DbBloatingTables => "Returns count of bloating tables for the database.",
            Self::DbDiscovery => "Returns JSON discovery rule with names of databases.",
            Self::DbSize => "Returns size in bytes for specific database.",
            Self::OldestXid => "Returns age of oldest xid.",
            Self::Ping => "Tests if connection is alive or not.",
            Self::Uptime => "Returns uptime.",
            Self::Version => "Returns PostgreSQL version.",
            Self::WalStat => "Returns JSON wal by type.",
        }
    }

    /// The parameter at position 5, if any.
    pub fn extra_param(&self) -> Option<ExtraParam> {
        match self {
            Self::CustomQuery => Some(PARAM_QUERY_NAME),
            _ => None,
        }
    }

    /// Whether any number of trailing parameters is accepted.
    pub fn is_variadic(&self) -> bool {
        matches!(self, Self::CustomQuery)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKey {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| PluginError::UnknownMetric(s.to_string()))
    }
}
