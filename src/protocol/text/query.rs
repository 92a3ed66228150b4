use crate::error::Result;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query.html
#[derive(Debug)]
pub(crate) struct ComQuery<'a>(pub(crate) &'a str);

impl ProtocolEncode for ComQuery<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        // COM_QUERY : int<1>
        buf.push(0x03);

        // sql : string<EOF>
        buf.extend_from_slice(self.0.as_bytes());

        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_init_db.html
#[derive(Debug)]
pub(crate) struct ComInitDb<'a>(pub(crate) &'a str);

impl ProtocolEncode for ComInitDb<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        // COM_INIT_DB : int<1>
        buf.push(0x02);

        // schema name : string<EOF>
        buf.extend_from_slice(self.0.as_bytes());

        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_ping.html
#[derive(Debug)]
pub(crate) struct ComPing;

impl ProtocolEncode for ComPing {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        // COM_PING : int<1>
        buf.push(0x0E);

        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_quit.html
//
// Fire-and-forget; the server replies by closing the stream.
#[derive(Debug)]
pub(crate) struct ComQuit;

impl ProtocolEncode for ComQuit {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        // COM_QUIT : int<1>
        buf.push(0x01);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_encodes_com_query() {
        let mut buf = Vec::new();
        ComQuery("SELECT 1").encode_with(&mut buf, ()).unwrap();

        assert_eq!(&buf[..], b"\x03SELECT 1");
    }

    #[test]
    fn it_encodes_com_ping_and_quit() {
        let mut buf = Vec::new();
        ComPing.encode_with(&mut buf, ()).unwrap();
        assert_eq!(buf, [0x0E]);

        let mut buf = Vec::new();
        ComQuit.encode_with(&mut buf, ()).unwrap();
        assert_eq!(buf, [0x01]);
    }
}
