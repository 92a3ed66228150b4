//! Error and Result types.

use std::fmt::{self, Display, Formatter};
use std::io;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the ways a connection, exchange, or decode can fail.
///
/// Variants are split by fatality: [`Protocol`][Error::Protocol],
/// [`TerminatorNotFound`][Error::TerminatorNotFound] and
/// [`SequenceMismatch`][Error::SequenceMismatch] poison the connection;
/// [`Server`][Error::Server] fails only the current exchange and leaves the
/// connection usable; [`Misuse`][Error::Misuse] is raised synchronously
/// before any bytes are written.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error communicating with the server.
    #[error("error communicating with the server: {0}")]
    Io(#[from] io::Error),

    /// An error during the TLS upgrade.
    #[error("error during TLS upgrade: {0}")]
    Tls(Box<dyn std::error::Error + Send + Sync>),

    /// Unexpected or unsupported data on the wire: an unknown message
    /// header for the active decode context, a protocol version other
    /// than 10, or a capability the server is missing.
    #[error("protocol violation: {0}")]
    Protocol(Box<str>),

    /// A NUL-terminated string field was missing its terminator.
    #[error("expected NUL terminator in server message")]
    TerminatorNotFound,

    /// An envelope arrived with an unexpected sequence id.
    #[error("packets out of order: expected sequence id {expected}, received {received}")]
    SequenceMismatch { expected: u8, received: u8 },

    /// The server rejected authentication, or policy refused to continue
    /// (e.g. a cleartext plugin without TLS).
    #[error("authentication failed: {0}")]
    Auth(Box<str>),

    /// An `ERR` message during the command phase. The connection remains
    /// usable; only the active exchange is failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The caller misused the API: executing incomplete bindings, binding
    /// an out-of-range parameter, or referencing an unknown named
    /// parameter.
    #[error("{0}")]
    Misuse(Box<str>),

    /// The underlying stream ended. All in-flight and subsequent
    /// operations fail with this.
    #[error("connection closed by server")]
    Closed,

    /// Connecting to the server did not complete within the configured
    /// timeout.
    #[error("timed out while connecting to the server")]
    ConnectTimedOut,

    /// Connection URL was malformed.
    #[error("failed to parse connection URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A query that was expected to return at least one row returned
    /// none.
    #[error("no rows returned by a query that expected to return at least one row")]
    RowNotFound,

    /// Column was not found by name in a row.
    #[error("no column found with the name {0:?}")]
    ColumnNotFound(Box<str>),

    /// Column index was out of bounds.
    #[error("column index out of bounds: there are {len} columns but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// A column value could not be decoded as the requested type.
    #[error("error decoding column {index}: {message}")]
    ColumnDecode { index: usize, message: Box<str> },
}

impl Error {
    pub(crate) fn protocol(message: impl Display) -> Self {
        Error::Protocol(message.to_string().into_boxed_str())
    }

    pub(crate) fn auth(message: impl Display) -> Self {
        Error::Auth(message.to_string().into_boxed_str())
    }

    pub(crate) fn misuse(message: impl Display) -> Self {
        Error::Misuse(message.to_string().into_boxed_str())
    }

    #[cfg(feature = "tls")]
    pub(crate) fn tls(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Tls(Box::new(err))
    }

    pub(crate) fn column_decode(index: usize, message: impl Display) -> Self {
        Error::ColumnDecode {
            index,
            message: message.to_string().into_boxed_str(),
        }
    }
}

/// An error returned by the server in an `ERR` message.
#[derive(Debug, thiserror::Error)]
pub struct ServerError {
    /// The server-defined error code.
    pub code: u16,

    /// The five-character SQLSTATE, when the server sent one.
    pub sql_state: Option<Box<str>>,

    /// The human-readable error message.
    pub message: Box<str>,
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "{} ({}): {}", self.code, state, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

macro_rules! err_protocol {
    ($($args:tt)*) => {
        $crate::error::Error::protocol(format_args!($($args)*))
    };
}

pub(crate) use err_protocol;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_sql_state() {
        let err = ServerError {
            code: 1049,
            sql_state: Some("42000".into()),
            message: "Unknown database 'unknown'".into(),
        };

        assert_eq!(
            err.to_string(),
            "1049 (42000): Unknown database 'unknown'"
        );
    }

    #[test]
    fn err_protocol_formats_lazily() {
        let err = err_protocol!("unexpected packet identifier 0x{:02X}", 0xABu8);

        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(err.to_string(), "protocol violation: unexpected packet identifier 0xAB");
    }
}
