use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode, ProtocolEncode};
use crate::protocol::auth::AuthPlugin;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_switch_request.html
//
// The server may demand a different plugin mid-exchange; the new scramble
// replaces the one from the initial handshake.
#[derive(Debug)]
pub(crate) struct AuthSwitchRequest {
    pub(crate) plugin: AuthPlugin,
    pub(crate) scramble: Vec<u8>,
}

impl ProtocolDecode for AuthSwitchRequest {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.checked_u8()?;
        if header != 0xFE {
            return Err(err_protocol!(
                "expected AUTH_SWITCH (0xFE); received 0x{:02X}",
                header
            ));
        }

        let plugin: AuthPlugin = buf.get_str_nul()?.parse()?;

        // scramble : string<EOF>, with a trailing NUL for the native
        // plugins that we do not feed into the hash
        let mut scramble = buf.to_vec();
        if scramble.last() == Some(&0) {
            scramble.pop();
        }

        Ok(Self { plugin, scramble })
    }
}

/// The raw bytes of a mid-exchange authentication reply. No header; the
/// payload is exactly what the active plugin produced.
#[derive(Debug)]
pub(crate) struct AuthResponse<'a>(pub(crate) &'a [u8]);

impl ProtocolEncode for AuthResponse<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        buf.extend_from_slice(self.0);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_a_switch_to_native_password() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(&[7u8; 20]);
        payload.push(0);

        let switch = AuthSwitchRequest::decode(Bytes::from(payload)).unwrap();

        assert_eq!(switch.plugin, AuthPlugin::MySqlNativePassword);
        assert_eq!(switch.scramble, vec![7u8; 20]);
    }
}
