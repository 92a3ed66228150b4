use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::auth::AuthPlugin;
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_v10.html
// https://mariadb.com/kb/en/connection/#initial-handshake-packet
#[derive(Debug)]
pub(crate) struct Handshake {
    pub(crate) protocol_version: u8,
    pub(crate) server_version: String,
    pub(crate) connection_id: u32,
    pub(crate) server_capabilities: Capabilities,
    pub(crate) server_default_collation: u8,
    pub(crate) status: Status,
    pub(crate) auth_plugin: Option<AuthPlugin>,
    pub(crate) scramble: Vec<u8>,
}

impl ProtocolDecode for Handshake {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        // protocol version : int<1>
        let protocol_version = buf.checked_u8()?;

        if protocol_version != 10 {
            return Err(err_protocol!(
                "unsupported protocol version {}; this driver speaks version 10",
                protocol_version
            ));
        }

        // server version : string<NUL>
        let server_version = buf.get_str_nul()?;

        // connection id : int<4>
        let connection_id = buf.checked_u32_le()?;

        // scramble, first part : string<8>
        let scramble_1 = buf.get_bytes(8)?;

        // filler : int<1>
        buf.checked_advance(1)?;

        // capability flags, lower 16 bits : int<2>
        let capabilities_lo = buf.checked_u16_le()?;
        let mut capabilities = Capabilities::from_bits_truncate(capabilities_lo.into());

        // default collation : int<1>
        let server_default_collation = buf.checked_u8()?;

        // status flags : int<2>
        let status = Status::from_bits_truncate(buf.checked_u16_le()?);

        // capability flags, upper 16 bits : int<2>
        let capabilities_hi = buf.checked_u16_le()?;
        capabilities |= Capabilities::from_bits_truncate(u32::from(capabilities_hi) << 16);

        // length of the combined auth data : int<1>, only meaningful
        // under PLUGIN_AUTH
        let auth_data_len = buf.checked_u8()?;

        // reserved : string<10>
        buf.checked_advance(10)?;

        let mut scramble = scramble_1.to_vec();

        if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            // scramble, second part : string<n>,
            // n = max(12, auth data length - 9); a NUL pad follows
            let len = ((auth_data_len as isize) - 9).max(12) as usize;

            scramble.extend_from_slice(&buf.get_bytes(len)?);
            buf.checked_advance(1)?;
        }

        let auth_plugin = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // auth plugin name : string<NUL>
            Some(buf.get_str_nul()?.parse()?)
        } else {
            None
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            server_capabilities: capabilities,
            server_default_collation,
            status,
            auth_plugin,
            scramble,
        })
    }
}
