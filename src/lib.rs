//! An asynchronous MySQL client driver core.
//!
//! This crate implements the hard middle of a MySQL client: the envelope
//! framing codec (length-prefixed packet reassembly and slicing with
//! sequence-id discipline), the connection-phase state machine (handshake,
//! capability negotiation, pluggable authentication, the TLS hook), and
//! the command-phase exchange engine (text and prepared pipelines with
//! context-dependent decoding and demand-driven result streams).
//!
//! ```no_run
//! use myrtle::{ConnectOptions, Connection};
//!
//! # async fn run() -> Result<(), myrtle::Error> {
//! let options = ConnectOptions::new()
//!     .host("localhost")
//!     .username("app")
//!     .password("secret")
//!     .database("inventory");
//!
//! let mut conn = Connection::connect_with(&options).await?;
//!
//! let row = conn.fetch_one("SELECT 1").await?;
//! assert_eq!(row.try_get_i64(0)?, Some(1));
//!
//! let stmt = conn.prepare("INSERT INTO part(code, qty) VALUES(?, ?)").await?;
//! let mut bindings = stmt.bindings();
//! bindings.bind(0, "AX-7")?.bind(1, 12i64)?;
//! let result = conn.execute_prepared(&stmt, &bindings).await?;
//! assert_eq!(result.rows_affected(), 1);
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! One connection serializes its exchanges (`&mut self`); run connections
//! in parallel for parallel queries. Dropping a result stream mid-way
//! cancels the exchange: the connection drains and discards the rest of
//! the server's response before the next request is admitted.

mod error;

mod bindings;
mod column;
mod connection;
mod io;
mod net;
mod options;
mod query_result;
mod row;
mod sql;
mod statement;
mod value;

pub mod collation;
pub mod protocol;

pub use bindings::{BindValue, Bindings};
pub use column::Column;
pub use connection::{Connection, QueryStream};
pub use error::{Error, Result, ServerError};
pub use net::Socket;
pub use options::{ConnectOptions, SslMode, ZeroDateBehavior};
pub use protocol::text::{ColumnDefinition, ColumnFlags, ColumnType};
pub use protocol::{Capabilities, Status};
pub use query_result::QueryResult;
pub use row::{ColumnIndex, Row};
pub use sql::{ParsedQuery, SqlMode};
pub use statement::Statement;
pub use value::{DateTime, ValueFormat};

pub use either::Either;
