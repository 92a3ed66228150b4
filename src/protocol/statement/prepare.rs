use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode, ProtocolEncode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html
#[derive(Debug)]
pub(crate) struct ComStmtPrepare<'a>(pub(crate) &'a str);

impl ProtocolEncode for ComStmtPrepare<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        // COM_STMT_PREPARE : int<1>
        buf.push(0x16);

        // sql : string<EOF>
        buf.extend_from_slice(self.0.as_bytes());

        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html#sect_protocol_com_stmt_prepare_response_ok
#[derive(Debug)]
pub(crate) struct PrepareOk {
    pub(crate) statement_id: u32,

    /// Number of columns in the result set, or 0 when the statement
    /// returns none.
    pub(crate) columns: u16,

    /// Number of `?` placeholders.
    pub(crate) params: u16,

    pub(crate) warnings: u16,
}

impl PrepareOk {
    /// The prepared-ok payload is exactly 12 bytes; anything else with a
    /// 0x00 header in wait-prepare context is a plain OK.
    pub(crate) const LEN: usize = 12;
}

impl ProtocolDecode for PrepareOk {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.checked_u8()?;

        if header != 0x00 {
            return Err(err_protocol!(
                "expected COM_STMT_PREPARE_OK (0x00); received 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.checked_u32_le()?;
        let columns = buf.checked_u16_le()?;
        let params = buf.checked_u16_le()?;

        // filler : int<1>
        buf.checked_advance(1)?;

        let warnings = buf.checked_u16_le()?;

        Ok(Self {
            statement_id,
            columns,
            params,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_encodes_com_stmt_prepare() {
        let mut buf = Vec::new();
        ComStmtPrepare("SELECT * FROM users WHERE username = ?")
            .encode_with(&mut buf, ())
            .unwrap();

        assert_eq!(&buf[..], &b"\x16SELECT * FROM users WHERE username = ?"[..]);
    }

    #[test]
    fn it_decodes_prepare_ok() {
        let ok = PrepareOk::decode(Bytes::from_static(
            b"\x00\x07\x00\x00\x00\x00\x00\x02\x00\x00\x00\x00",
        ))
        .unwrap();

        assert_eq!(ok.statement_id, 7);
        assert_eq!(ok.columns, 0);
        assert_eq!(ok.params, 2);
        assert_eq!(ok.warnings, 0);
    }
}
