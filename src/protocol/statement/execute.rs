use crate::bindings::WireBindings;
use crate::error::Result;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html
//
// `send_types` is the new-params-bound flag: 1 on the first execution of a
// statement and again whenever the bound type vector changes (a slot going
// NULL changes it), 0 otherwise.
#[derive(Debug)]
pub(crate) struct ComStmtExecute<'a> {
    pub(crate) statement_id: u32,
    pub(crate) bindings: &'a WireBindings,
    pub(crate) send_types: bool,
}

impl ProtocolEncode for ComStmtExecute<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        use bytes::BufMut;

        // COM_STMT_EXECUTE : int<1>
        buf.push(0x17);

        // statement id : int<4>
        buf.put_u32_le(self.statement_id);

        // cursor flags (none) : int<1>
        buf.put_u8(0x00);

        // iteration count (always 1) : int<4>
        buf.put_u32_le(1);

        if !self.bindings.types.is_empty() {
            // NULL bitmap : byte<(param count + 7) / 8>
            buf.extend_from_slice(&self.bindings.null_bitmap);

            // new-params-bound flag : int<1>
            buf.put_u8(self.send_types as u8);

            if self.send_types {
                for (r#type, unsigned) in &self.bindings.types {
                    // parameter type : int<1>, flags : int<1>
                    buf.put_u8(*r#type as u8);
                    buf.put_u8(if *unsigned { 0x80 } else { 0x00 });
                }
            }

            // non-NULL values, back to back
            buf.extend_from_slice(&self.bindings.values);
        }

        Ok(())
    }
}
