//! The MySQL client/server wire protocol, version 10.
//!
//! Client messages implement [`ProtocolEncode`][crate::io::ProtocolEncode];
//! server messages implement [`ProtocolDecode`][crate::io::ProtocolDecode].
//! Which server message a payload is depends on the active
//! [`DecodeContext`]: the same leading byte decodes as OK, EOF, a column
//! count, or a row depending on where the exchange stands.

mod capabilities;
mod context;
mod packet;
mod row;

pub(crate) mod auth;
pub(crate) mod connect;
pub(crate) mod response;
pub(crate) mod statement;
pub(crate) mod text;

pub use capabilities::Capabilities;
pub use response::Status;

pub(crate) use context::DecodeContext;
pub(crate) use packet::Packet;
pub(crate) use row::RowData;
