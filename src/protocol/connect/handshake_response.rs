use crate::error::{Error, Result};
use crate::io::{BufMutExt, ProtocolEncode};
use crate::protocol::auth::AuthPlugin;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_response.html
// https://mariadb.com/kb/en/connection/#handshake-response-packet
#[derive(Debug)]
pub(crate) struct HandshakeResponse<'a> {
    pub(crate) max_packet_size: u32,
    pub(crate) collation: u8,
    pub(crate) username: &'a str,
    pub(crate) database: Option<&'a str>,
    pub(crate) auth_plugin: Option<AuthPlugin>,
    pub(crate) auth_response: &'a [u8],
    pub(crate) attrs: &'a [(String, String)],
}

impl ProtocolEncode<Capabilities> for HandshakeResponse<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) -> Result<()> {
        use bytes::BufMut;

        // client capabilities : int<4>
        buf.put_u32_le(capabilities.bits());

        // max packet size : int<4>
        buf.put_u32_le(self.max_packet_size);

        // client collation : int<1>
        buf.put_u8(self.collation);

        // reserved : string<23>
        buf.resize(buf.len() + 23, 0);

        // username : string<NUL>
        buf.put_str_nul(self.username);

        if capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            // auth response : string<lenenc>
            buf.put_bytes_lenenc(self.auth_response);
        } else {
            // auth response length : int<1>
            //
            // without the lenenc capability the length must fit one byte;
            // reject before anything reaches the wire
            let len = u8::try_from(self.auth_response.len()).map_err(|_| {
                Error::protocol(format_args!(
                    "auth response is {} bytes but PLUGIN_AUTH_LENENC_CLIENT_DATA \
                     was not negotiated",
                    self.auth_response.len()
                ))
            })?;

            buf.put_u8(len);
            buf.extend_from_slice(self.auth_response);
        }

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            if let Some(database) = self.database {
                // database : string<NUL>
                buf.put_str_nul(database);
            }
        }

        if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            if let Some(plugin) = self.auth_plugin {
                // client auth plugin name : string<NUL>
                buf.put_str_nul(plugin.name());
            }
        }

        if capabilities.contains(Capabilities::CONNECT_ATTRS) {
            // attributes : (string<lenenc>, string<lenenc>)* wrapped in a
            // lenenc-sized block
            let mut attrs = Vec::new();

            for (key, value) in self.attrs {
                attrs.put_str_lenenc(key);
                attrs.put_str_lenenc(value);
            }

            buf.put_bytes_lenenc(&attrs);
        }

        Ok(())
    }
}
