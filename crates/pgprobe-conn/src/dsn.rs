//! Dial target assembly.
//!
//! A [`ConnectSpec`] is everything a [`Connector`](crate::Connector) needs to
//! open one connection: the decoded endpoint of an [`IdentityKey`], its
//! credentials, the resolved [`TlsDetails`] and the statement cache mode.

use crate::identity::{CacheMode, IdentityKey};
use crate::tls::TlsDetails;

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectSpec {
    /// Host name, or socket directory for unix sockets.
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub tls: TlsDetails,
    pub cache_mode: CacheMode,
    /// Diagnostic address of the identity this spec was built from.
    pub address: String,
}

impl ConnectSpec {
    pub fn new(key: &IdentityKey, tls: TlsDetails) -> Self {
        Self {
            host: key.host(),
            port: key.port(),
            dbname: key.database(),
            user: key.user().to_string(),
            password: key.password().to_string(),
            tls,
            cache_mode: key.cache_mode(),
            address: key.address(),
        }
    }

    /// libpq-style `key=value` connection string.
    pub fn to_dsn(&self) -> String {
        self.render(&self.password)
    }

    /// Same as [`to_dsn`](Self::to_dsn) with the password masked, for logs.
    pub fn to_redacted_dsn(&self) -> String {
        if self.password.is_empty() {
            self.render("")
        } else {
            self.render("***")
        }
    }

    fn render(&self, password: &str) -> String {
        let mut dsn = format!(
            "host={} port={} dbname={} user={}",
            self.host, self.port, self.dbname, self.user
        );

        let tls_mode = if self.tls.is_enabled() {
            self.tls.mode.as_str()
        } else {
            ""
        };
        let optional = [
            ("password", password),
            ("sslmode", tls_mode),
            ("sslrootcert", self.tls.ca_file.as_deref().unwrap_or_default()),
            ("sslcert", self.tls.cert_file.as_deref().unwrap_or_default()),
            ("sslkey", self.tls.key_file.as_deref().unwrap_or_default()),
            ("statement_cache_mode", self.cache_mode.as_str()),
        ];
        for (name, value) in optional {
            if !value.is_empty() {
                dsn.push_str(&format!(" {name}={value}"));
            }
        }
        dsn
    }
}

impl std::fmt::Debug for ConnectSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectSpec")
            .field(&self.to_redacted_dsn())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::TlsMode;

    fn key(password: &str, mode: CacheMode) -> IdentityKey {
        IdentityKey::new("tcp://127.0.0.1:123", "foo", password, "postgres", mode).unwrap()
    }

    #[test]
    fn minimal_dsn() {
        let spec = ConnectSpec::new(&key("", CacheMode::Prepare), TlsDetails::default());
        assert_eq!(
            spec.to_dsn(),
            "host=127.0.0.1 port=123 dbname=postgres user=foo statement_cache_mode=prepare"
        );
    }

    #[test]
    fn password_is_included_and_redacted() {
        let spec = ConnectSpec::new(&key("bar", CacheMode::Describe), TlsDetails::default());
        assert!(spec.to_dsn().contains(" password=bar"));
        assert!(spec.to_dsn().ends_with("statement_cache_mode=describe"));
        assert!(spec.to_redacted_dsn().contains(" password=***"));
        assert!(!format!("{spec:?}").contains("bar"));
    }

    #[test]
    fn tls_material_is_rendered() {
        let tls = TlsDetails {
            mode: TlsMode::VerifyFull,
            ca_file: Some("path/to/ca".to_string()),
            cert_file: Some("path/to/cert".to_string()),
            key_file: Some("path/to/key".to_string()),
        };
        let dsn = ConnectSpec::new(&key("", CacheMode::Prepare), tls).to_dsn();
        for part in [
            "sslmode=verify-full",
            "sslrootcert=path/to/ca",
            "sslcert=path/to/cert",
            "sslkey=path/to/key",
        ] {
            assert!(dsn.contains(part), "{dsn} lacks {part}");
        }
    }

    #[test]
    fn unix_socket_spec() {
        let key = IdentityKey::new(
            "unix:///var/run/postgresql/.s.PGSQL.5433",
            "foo",
            "",
            "my db",
            CacheMode::Prepare,
        )
        .unwrap();
        let spec = ConnectSpec::new(&key, TlsDetails::default());
        assert_eq!(spec.host, "/var/run/postgresql");
        assert_eq!(spec.port, 5433);
        assert_eq!(spec.dbname, "my db");
        assert_eq!(spec.address, "/var/run/postgresql/.s.PGSQL.5433");
    }
}
