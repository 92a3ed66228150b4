use std::str::FromStr;

use crate::error::Error;

/// Whether, and how strictly, the connection upgrades to TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Never attempt TLS, even if the server supports it.
    Disabled,

    /// Upgrade when the server advertises support; continue in the clear
    /// otherwise.
    #[default]
    Preferred,

    /// Fail the connection if TLS cannot be established.
    Required,

    /// Like `Required`, and verify the server certificate against the
    /// trusted roots.
    VerifyCa,

    /// Like `VerifyCa`, and verify that the certificate matches the host
    /// connected to.
    VerifyIdentity,
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match &*s.to_ascii_lowercase() {
            "disabled" => SslMode::Disabled,
            "preferred" => SslMode::Preferred,
            "required" => SslMode::Required,
            "verify_ca" | "verify-ca" => SslMode::VerifyCa,
            "verify_identity" | "verify-identity" => SslMode::VerifyIdentity,

            _ => {
                return Err(Error::misuse(format_args!("unknown SSL mode: {:?}", s)));
            }
        })
    }
}
