use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_eof_packet.html
// https://mariadb.com/kb/en/eof_packet/
//
// Not sent when DEPRECATE_EOF is negotiated; metadata and result-set
// terminators are then OK messages with a 0xFE header.
#[derive(Debug)]
pub(crate) struct EofPacket {
    pub(crate) warnings: u16,
    pub(crate) status: Status,
}

impl EofPacket {
    /// An EOF payload never exceeds this; larger 0xFE-headed payloads are
    /// something else (OK or a row, depending on context).
    pub(crate) const MAX_LEN: usize = 9;
}

impl ProtocolDecode<Capabilities> for EofPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self> {
        let header = buf.checked_u8()?;
        if header != 0xFE {
            return Err(err_protocol!(
                "expected EOF (0xFE); received 0x{:02X}",
                header
            ));
        }

        let (warnings, status) = if capabilities.contains(Capabilities::PROTOCOL_41) {
            (
                buf.checked_u16_le()?,
                Status::from_bits_truncate(buf.checked_u16_le()?),
            )
        } else {
            (0, Status::empty())
        };

        Ok(Self { warnings, status })
    }
}
