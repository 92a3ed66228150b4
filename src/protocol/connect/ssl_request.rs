use crate::error::Result;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_ssl_request.html
//
// The 32-byte prefix of HandshakeResponse, sent alone to request the TLS
// upgrade before any credentials leave the client.
#[derive(Debug)]
pub(crate) struct SslRequest {
    pub(crate) max_packet_size: u32,
    pub(crate) collation: u8,
}

impl ProtocolEncode<Capabilities> for SslRequest {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) -> Result<()> {
        use bytes::BufMut;

        debug_assert!(capabilities.contains(Capabilities::SSL));

        // client capabilities : int<4>
        buf.put_u32_le(capabilities.bits());

        // max packet size : int<4>
        buf.put_u32_le(self.max_packet_size);

        // client collation : int<1>
        buf.put_u8(self.collation);

        // reserved : string<23>
        buf.resize(buf.len() + 23, 0);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_is_exactly_32_bytes() {
        let mut buf = Vec::new();

        SslRequest {
            max_packet_size: 16_777_216,
            collation: 224,
        }
        .encode_with(&mut buf, Capabilities::PROTOCOL_41 | Capabilities::SSL)
        .unwrap();

        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[..4], &0x0A00u32.to_le_bytes());
    }
}
