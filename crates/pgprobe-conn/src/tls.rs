//! TLS / session parameter resolution.
//!
//! Turns the raw `TLSConnect`, `TLSCAFile`, `TLSCertFile` and `TLSKeyFile`
//! strings of a request into a validated [`TlsDetails`]. Resolution is pure:
//! no files are opened here, only presence of the required paths is checked.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConnError, ConnResult};

/// Connection encryption mode, in increasing strength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum TlsMode {
    /// Plain text connection.
    #[default]
    Disable,
    /// Encrypted, server certificate not verified.
    Require,
    /// Encrypted, certificate chain verified against the CA file.
    VerifyCa,
    /// Encrypted, chain and host name verified.
    VerifyFull,
}

impl TlsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Whether this mode needs a CA file to validate the server certificate.
    pub fn requires_ca(&self) -> bool {
        *self >= Self::VerifyCa
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsMode {
    type Err = ConnError;

    /// Accepts canonical names and the legacy underscore spellings.
    /// An empty string means `disable`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_mode(s) {
            "disable" => Ok(Self::Disable),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(ConnError::config(format!(
                "unsupported TLS connection type {other:?}, allowed: disable, require, verify-ca, verify-full"
            ))),
        }
    }
}

/// Map spelling variants of a mode name to the canonical form.
pub fn normalize_mode(raw: &str) -> &str {
    match raw.trim() {
        "" => "disable",
        "required" => "require",
        "verify_ca" => "verify-ca",
        "verify_full" => "verify-full",
        other => other,
    }
}

/// Raw, unvalidated TLS parameters as they arrive with a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsParams {
    pub connect: String,
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
}

/// Which material is mandatory for which mode.
#[derive(Clone, Copy, Debug)]
pub struct TlsRequirements {
    /// Modes at or above this one need a CA file.
    pub ca_from: TlsMode,
    /// A certificate without a key (or a key without a certificate) is
    /// rejected for every mode except `disable`.
    pub cert_key_pair: bool,
}

impl Default for TlsRequirements {
    fn default() -> Self {
        Self {
            ca_from: TlsMode::VerifyCa,
            cert_key_pair: true,
        }
    }
}

/// Validated connection-security descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsDetails {
    pub mode: TlsMode,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

impl TlsDetails {
    /// Resolve raw parameters with the default requirements.
    pub fn resolve(params: &TlsParams) -> ConnResult<Self> {
        Self::resolve_with(params, TlsRequirements::default())
    }

    pub fn resolve_with(params: &TlsParams, req: TlsRequirements) -> ConnResult<Self> {
        let mode: TlsMode = params.connect.parse()?;

        // `disable` never looks at file paths.
        if mode == TlsMode::Disable {
            return Ok(Self::default());
        }

        let ca_file = non_empty(&params.ca_file);
        let cert_file = non_empty(&params.cert_file);
        let key_file = non_empty(&params.key_file);

        if mode >= req.ca_from && ca_file.is_none() {
            return Err(ConnError::config(format!(
                "missing TLS CA file for connection type {mode}"
            )));
        }

        if req.cert_key_pair {
            match (&cert_file, &key_file) {
                (Some(_), None) => {
                    return Err(ConnError::config(format!(
                        "missing TLS key file for connection type {mode}"
                    )));
                }
                (None, Some(_)) => {
                    return Err(ConnError::config(format!(
                        "missing TLS certificate file for connection type {mode}"
                    )));
                }
                _ => {}
            }
        }

        Ok(Self {
            mode,
            ca_file,
            cert_file,
            key_file,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != TlsMode::Disable
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(connect: &str, ca: &str, cert: &str, key: &str) -> TlsParams {
        TlsParams {
            connect: connect.to_string(),
            ca_file: ca.to_string(),
            cert_file: cert.to_string(),
            key_file: key.to_string(),
        }
    }

    #[test]
    fn legacy_spellings_normalize() {
        assert_eq!(normalize_mode("required"), "require");
        assert_eq!(normalize_mode("verify_ca"), "verify-ca");
        assert_eq!(normalize_mode("verify_full"), "verify-full");
        assert_eq!(normalize_mode("foobar"), "foobar");
        assert_eq!(normalize_mode(""), "disable");
    }

    #[test]
    fn empty_mode_defaults_to_disable() {
        let details = TlsDetails::resolve(&TlsParams::default()).unwrap();
        assert_eq!(details.mode, TlsMode::Disable);
        assert!(!details.is_enabled());
    }

    #[test]
    fn disable_never_requires_files() {
        let details = TlsDetails::resolve(&params("disable", "", "/cert.pem", "")).unwrap();
        assert_eq!(details, TlsDetails::default());
    }

    #[test]
    fn require_needs_no_ca() {
        let details = TlsDetails::resolve(&params("required", "", "", "")).unwrap();
        assert_eq!(details.mode, TlsMode::Require);
        assert!(details.ca_file.is_none());
    }

    #[test]
    fn require_keeps_an_optional_ca_file() {
        let details = TlsDetails::resolve(&params("require", "/ca.pem", "", "")).unwrap();
        assert_eq!(details.mode, TlsMode::Require);
        assert_eq!(details.ca_file.as_deref(), Some("/ca.pem"));
    }

    #[test]
    fn verify_ca_without_ca_file_is_rejected() {
        let err = TlsDetails::resolve(&params("verify-ca", "", "", "")).unwrap_err();
        assert!(matches!(err, ConnError::Configuration(_)));
        assert!(err.to_string().contains("CA file"));
    }

    #[test]
    fn verify_full_without_ca_file_is_rejected() {
        assert!(TlsDetails::resolve(&params("verify_full", "  ", "", "")).is_err());
    }

    #[test]
    fn verify_full_with_material() {
        let details = TlsDetails::resolve(&params(
            "verify-full",
            "/ca.pem",
            "/client.pem",
            "/client.key",
        ))
        .unwrap();
        assert_eq!(details.mode, TlsMode::VerifyFull);
        assert_eq!(details.ca_file.as_deref(), Some("/ca.pem"));
        assert_eq!(details.key_file.as_deref(), Some("/client.key"));
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let err = TlsDetails::resolve(&params("require", "", "/client.pem", "")).unwrap_err();
        assert!(err.to_string().contains("key file"));
        let err = TlsDetails::resolve(&params("require", "", "", "/client.key")).unwrap_err();
        assert!(err.to_string().contains("certificate file"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = TlsDetails::resolve(&params("prefer", "", "", "")).unwrap_err();
        assert!(err.to_string().contains("prefer"));
    }

    #[test]
    fn requirements_are_configurable() {
        let lenient = TlsRequirements {
            ca_from: TlsMode::VerifyFull,
            cert_key_pair: false,
        };
        let details =
            TlsDetails::resolve_with(&params("verify-ca", "", "/client.pem", ""), lenient).unwrap();
        assert_eq!(details.mode, TlsMode::VerifyCa);
        assert!(TlsDetails::resolve_with(&params("verify-full", "", "", ""), lenient).is_err());
    }
}
