use std::collections::HashMap;

use crate::error::Result;
use crate::net::{MaybeTlsStream, Socket};
use crate::options::{ConnectOptions, ZeroDateBehavior};
use crate::protocol::text::{ColumnType, ComQuit};
use crate::protocol::{Capabilities, Status};
use crate::sql::{ParsedQuery, SqlMode};

mod establish;
mod executor;
mod stream;

pub use executor::QueryStream;

pub(crate) use stream::PacketStream;

/// Mutable per-connection state established during the handshake.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) connection_id: u32,
    pub(crate) server_version: String,
    pub(crate) server_capabilities: Capabilities,
    pub(crate) collation: u8,
    pub(crate) status: Status,
}

/// A single connection to a MySQL server.
///
/// All operations take `&mut self`: one connection carries at most one
/// exchange at a time, and requests hit the wire in call order. Run
/// connections in parallel, not queries on one connection.
pub struct Connection {
    pub(crate) stream: PacketStream<MaybeTlsStream>,
    pub(crate) session: Session,

    // the type vector sent with the previous execution, per statement;
    // a change forces the types to be re-sent
    pub(crate) last_statement_types: HashMap<u32, Vec<(ColumnType, bool)>>,

    pub(crate) zero_date: ZeroDateBehavior,
}

impl Connection {
    /// Opens a connection described by a `mysql://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let options: ConnectOptions = url.parse()?;

        Self::connect_with(&options).await
    }

    /// Opens a connection with explicit options.
    pub async fn connect_with(options: &ConnectOptions) -> Result<Self> {
        let socket = crate::net::connect_socket(options).await?;

        Self::establish(socket, options).await
    }

    /// Drives the handshake over a caller-provided transport. This is the
    /// seam for proxies and in-memory streams; network setup (and its
    /// timeout) is the caller's.
    pub async fn connect_over(
        socket: impl Socket + 'static,
        options: &ConnectOptions,
    ) -> Result<Self> {
        Self::establish(Box::new(socket), options).await
    }

    /// The server-assigned connection id.
    pub fn connection_id(&self) -> u32 {
        self.session.connection_id
    }

    /// The server version string from the handshake.
    pub fn server_version(&self) -> &str {
        &self.session.server_version
    }

    /// The capabilities both sides agreed on.
    pub fn capabilities(&self) -> Capabilities {
        self.stream.capabilities
    }

    /// Everything the server advertised, negotiated or not.
    pub fn server_capabilities(&self) -> Capabilities {
        self.session.server_capabilities
    }

    /// The collation id the session was established with.
    pub fn collation(&self) -> u8 {
        self.session.collation
    }

    /// The status flags from the most recent server response.
    pub fn status(&self) -> Status {
        self.session.status
    }

    /// Whether the connection was upgraded to TLS.
    pub fn is_tls(&self) -> bool {
        self.stream.transport_is_tls()
    }

    /// Scans a statement for `?` and `:name` placeholders under the
    /// session's current SQL mode.
    pub fn parse_query(&self, sql: &str) -> ParsedQuery {
        ParsedQuery::parse(
            sql,
            SqlMode {
                // ANSI_QUOTES is not reflected in the status flags; the
                // conservative default treats double quotes as identifiers
                ansi_quotes: false,
                no_backslash_escapes: self
                    .session
                    .status
                    .contains(Status::SERVER_STATUS_NO_BACKSLASH_ESCAPES),
            },
        )
    }

    /// Sends `COM_QUIT` and closes the transport. The quit message is
    /// fire-and-forget: the server answers by hanging up.
    pub async fn close(mut self) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComQuit, (), true).await?;
        self.stream.shutdown().await?;

        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.session.connection_id)
            .field("server_version", &self.session.server_version)
            .finish()
    }
}
