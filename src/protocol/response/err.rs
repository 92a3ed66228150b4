use bytes::Bytes;

use crate::error::{err_protocol, Result, ServerError};
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_err_packet.html
// https://mariadb.com/kb/en/err_packet/
#[derive(Debug)]
pub(crate) struct ErrPacket {
    pub(crate) error_code: u16,
    pub(crate) sql_state: Option<String>,
    pub(crate) error_message: String,
}

impl ErrPacket {
    pub(crate) fn into_server_error(self) -> ServerError {
        ServerError {
            code: self.error_code,
            sql_state: self.sql_state.map(Into::into),
            message: self.error_message.into(),
        }
    }
}

impl ProtocolDecode<Capabilities> for ErrPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self> {
        let header = buf.checked_u8()?;
        if header != 0xFF {
            return Err(err_protocol!(
                "expected ERR (0xFF); received 0x{:02X}",
                header
            ));
        }

        let error_code = buf.checked_u16_le()?;

        // the SQL-state marker is only present after the connection phase,
        // even under PROTOCOL_41
        let sql_state = if capabilities.contains(Capabilities::PROTOCOL_41)
            && buf.first() == Some(&b'#')
        {
            buf.checked_advance(1)?;

            Some(buf.get_str(5)?)
        } else {
            None
        };

        let error_message = String::from_utf8_lossy(&buf).into_owned();

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERR_HANDSHAKE_UNKNOWN_DB: &[u8] = b"\xff\x19\x04#42000Unknown database 'unknown'";

    #[test]
    fn it_decodes_unknown_database() {
        let p = ErrPacket::decode_with(
            Bytes::from_static(ERR_HANDSHAKE_UNKNOWN_DB),
            Capabilities::PROTOCOL_41,
        )
        .unwrap();

        assert_eq!(p.error_code, 1049);
        assert_eq!(p.sql_state.as_deref(), Some("42000"));
        assert_eq!(p.error_message, "Unknown database 'unknown'");
    }

    #[test]
    fn it_decodes_without_sql_state() {
        // early connection-phase errors carry no state marker
        let p = ErrPacket::decode_with(
            Bytes::from_static(b"\xff\x15\x04Access denied"),
            Capabilities::PROTOCOL_41,
        )
        .unwrap();

        assert_eq!(p.error_code, 1045);
        assert_eq!(p.sql_state, None);
        assert_eq!(p.error_message, "Access denied");
    }
}
