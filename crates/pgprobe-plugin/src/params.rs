//! Request parameter evaluation.
//!
//! Positional layout of a request:
//!
//! ```text
//! pgsql.<metric>[URI|session, User, Password, Database, <extra>, <variadic>...]
//! ```
//!
//! Each connection field resolves, first non-empty wins:
//! session value → positional value → `default` session → built-in default.
//! TLS fields and the cache mode are session-only and skip the positional step.

use std::collections::HashMap;

use pgprobe_conn::{CacheMode, ConnResult, IdentityKey, TlsParams};

use crate::config::{PluginOptions, Session};
use crate::error::{PluginError, PluginResult};
use crate::metrics::MetricKey;

pub const PARAM_URI: &str = "URI";
pub const PARAM_USER: &str = "User";
pub const PARAM_PASSWORD: &str = "Password";
pub const PARAM_DATABASE: &str = "Database";

pub const DEFAULT_URI: &str = "tcp://localhost:5432";
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DATABASE: &str = "postgres";

const CONN_PARAMS: usize = 4;
const MAX_PASSWORD_LEN: usize = 512;
const DB_NAME_LEN: std::ops::RangeInclusive<usize> = 1..=63;

/// Fully resolved parameters of one request.
#[derive(Clone, PartialEq, Eq)]
pub struct EvaluatedParams {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: TlsParams,
    pub cache_mode: CacheMode,
    /// Name of the session the first parameter referred to.
    pub session: Option<String>,
    /// Value of the metric's extra parameter, by parameter name.
    pub extra: HashMap<&'static str, String>,
    /// Trailing parameters of variadic metrics.
    pub variadic: Vec<String>,
}

impl EvaluatedParams {
    pub fn identity_key(&self) -> ConnResult<IdentityKey> {
        IdentityKey::new(
            &self.uri,
            &self.user,
            &self.password,
            &self.database,
            self.cache_mode,
        )
    }

    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str)
    }
}

impl std::fmt::Debug for EvaluatedParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatedParams")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("tls", &self.tls.connect)
            .field("cache_mode", &self.cache_mode)
            .field("session", &self.session)
            .field("extra", &self.extra)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// Resolve `raw` positional parameters for `key` against the configured
/// sessions and defaults.
pub fn evaluate(
    key: MetricKey,
    raw: &[String],
    options: &PluginOptions,
) -> PluginResult<EvaluatedParams> {
    let extra_param = key.extra_param();
    let fixed = CONN_PARAMS + usize::from(extra_param.is_some());
    if !key.is_variadic() && raw.len() > fixed {
        return Err(PluginError::invalid_params(format!(
            "too many parameters: {} given, at most {fixed} accepted",
            raw.len()
        )));
    }

    let positional = |idx: usize| raw.get(idx).map(|s| s.trim()).unwrap_or_default();

    let session_name = positional(0);
    let session = options.sessions.get(session_name);
    if session.is_some() {
        for (idx, name) in [(1, PARAM_USER), (2, PARAM_PASSWORD), (3, PARAM_DATABASE)] {
            if !positional(idx).is_empty() {
                return Err(PluginError::invalid_params(format!(
                    "{name} cannot be passed along with session {session_name:?}"
                )));
            }
        }
    }

    let default = &options.default;
    let unnamed = Session::default();
    let named = session.unwrap_or(&unnamed);
    // Positional connection values are ignored once a session is named.
    let from_request = |idx: usize| if session.is_some() { "" } else { positional(idx) };

    let uri = first_non_empty(&[
        named.uri.as_str(),
        from_request(0),
        default.uri.as_str(),
        DEFAULT_URI,
    ]);
    let user = first_non_empty(&[
        named.user.as_str(),
        from_request(1),
        default.user.as_str(),
        DEFAULT_USER,
    ]);
    let password = first_non_empty(&[
        named.password.as_str(),
        from_request(2),
        default.password.as_str(),
    ]);
    let database = first_non_empty(&[
        named.database.as_str(),
        from_request(3),
        default.database.as_str(),
        DEFAULT_DATABASE,
    ]);
    let tls = TlsParams {
        connect: first_non_empty(&[named.tls_connect.as_str(), default.tls_connect.as_str()]),
        ca_file: first_non_empty(&[named.tls_ca_file.as_str(), default.tls_ca_file.as_str()]),
        cert_file: first_non_empty(&[
            named.tls_cert_file.as_str(),
            default.tls_cert_file.as_str(),
        ]),
        key_file: first_non_empty(&[named.tls_key_file.as_str(), default.tls_key_file.as_str()]),
    };
    let cache_mode = first_non_empty(&[
        named.cache_mode.as_str(),
        default.cache_mode.as_str(),
        CacheMode::default().as_str(),
    ]);

    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(PluginError::invalid_params(format!(
            "{PARAM_PASSWORD} must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    if !DB_NAME_LEN.contains(&database.chars().count()) {
        return Err(PluginError::invalid_params(format!(
            "{PARAM_DATABASE} must be {}..={} characters",
            DB_NAME_LEN.start(),
            DB_NAME_LEN.end()
        )));
    }
    let cache_mode: CacheMode = cache_mode
        .parse()
        .map_err(|e: pgprobe_conn::ConnError| PluginError::invalid_params(e.to_string()))?;

    let mut extra = HashMap::new();
    if let Some(param) = extra_param {
        let value = positional(CONN_PARAMS);
        if param.required && value.is_empty() {
            return Err(PluginError::invalid_params(format!(
                "{} is required",
                param.name
            )));
        }
        extra.insert(param.name, value.to_string());
    }

    let variadic = raw.iter().skip(fixed).cloned().collect();

    Ok(EvaluatedParams {
        uri,
        user,
        password,
        database,
        tls,
        cache_mode,
        session: session.map(|_| session_name.to_string()),
        extra,
        variadic,
    })
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|v| !v.is_empty())
        .copied()
        .unwrap_or_default()
        .to_string()
}
