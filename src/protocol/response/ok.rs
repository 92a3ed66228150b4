use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_ok_packet.html
// https://mariadb.com/kb/en/ok_packet/
#[derive(Debug)]
pub(crate) struct OkPacket {
    pub(crate) affected_rows: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) status: Status,
    pub(crate) warnings: u16,
    pub(crate) info: String,
}

impl OkPacket {
    /// Minimum payload size under PROTOCOL_41; used to disambiguate a
    /// 0xFE header from a column-count varint in command context.
    pub(crate) const MIN_LEN: usize = 7;
}

impl ProtocolDecode<Capabilities> for OkPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self> {
        let header = buf.checked_u8()?;
        if header != 0x00 && header != 0xFE {
            return Err(err_protocol!(
                "expected OK (0x00 or 0xFE); received 0x{:02X}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?.unwrap_or(0);
        let last_insert_id = buf.get_uint_lenenc()?.unwrap_or(0);

        let (status, warnings) = if capabilities.contains(Capabilities::PROTOCOL_41) {
            (
                Status::from_bits_truncate(buf.checked_u16_le()?),
                buf.checked_u16_le()?,
            )
        } else {
            (Status::empty(), 0)
        };

        // info : string<EOF>, or string<lenenc> when session tracking is
        // in play (the session-state block that follows is not retained)
        let info = if buf.is_empty() {
            String::new()
        } else if capabilities.contains(Capabilities::SESSION_TRACK) {
            buf.get_str_lenenc()?.unwrap_or_default()
        } else {
            String::from_utf8_lossy(&buf).into_owned()
        };

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_HANDSHAKE: &[u8] = b"\x00\x00\x00\x02\x40\x00\x00";

    #[test]
    fn it_decodes_the_handshake_ok() {
        let p = OkPacket::decode_with(
            Bytes::from_static(OK_HANDSHAKE),
            Capabilities::PROTOCOL_41,
        )
        .unwrap();

        assert_eq!(p.affected_rows, 0);
        assert_eq!(p.last_insert_id, 0);
        assert_eq!(p.warnings, 0);
        assert!(p.status.contains(Status::SERVER_STATUS_AUTOCOMMIT));
        assert!(p.status.contains(Status::SERVER_SESSION_STATE_CHANGED));
        assert!(p.info.is_empty());
    }

    #[test]
    fn it_decodes_affected_and_insert_id() {
        // 1 row affected, insert id 7, autocommit
        let p = OkPacket::decode_with(
            Bytes::from_static(b"\x00\x01\x07\x02\x00\x00\x00"),
            Capabilities::PROTOCOL_41,
        )
        .unwrap();

        assert_eq!(p.affected_rows, 1);
        assert_eq!(p.last_insert_id, 7);
    }

    #[test]
    fn it_accepts_the_deprecated_eof_header() {
        let p = OkPacket::decode_with(
            Bytes::from_static(b"\xFE\x00\x00\x02\x00\x00\x00"),
            Capabilities::PROTOCOL_41 | Capabilities::DEPRECATE_EOF,
        )
        .unwrap();

        assert_eq!(p.affected_rows, 0);
        assert!(p.status.contains(Status::SERVER_STATUS_AUTOCOMMIT));
    }
}
