use crate::error::Result;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_close.html
//
// Fire-and-forget: the server sends no reply.
#[derive(Debug)]
pub(crate) struct ComStmtClose {
    pub(crate) statement_id: u32,
}

impl ProtocolEncode for ComStmtClose {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        use bytes::BufMut;

        // COM_STMT_CLOSE : int<1>
        buf.push(0x19);

        // statement id : int<4>
        buf.put_u32_le(self.statement_id);

        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_reset.html
//
// Unlike close, the server answers with OK or ERR.
#[derive(Debug)]
pub(crate) struct ComStmtReset {
    pub(crate) statement_id: u32,
}

impl ProtocolEncode for ComStmtReset {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        use bytes::BufMut;

        // COM_STMT_RESET : int<1>
        buf.push(0x1A);

        // statement id : int<4>
        buf.put_u32_le(self.statement_id);

        Ok(())
    }
}
