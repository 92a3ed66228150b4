use crate::error::Result;

/// Encode one client message into an outbound payload buffer.
///
/// Encoding is fallible: a message that cannot be represented under the
/// negotiated capabilities (e.g. an over-long auth response without
/// `PLUGIN_AUTH_LENENC_CLIENT_DATA`) must be rejected here, before any
/// bytes reach the wire.
pub(crate) trait ProtocolEncode<Context = ()> {
    fn encode_with(&self, buf: &mut Vec<u8>, context: Context) -> Result<()>;
}

impl ProtocolEncode for &'_ [u8] {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<()> {
        buf.extend_from_slice(self);

        Ok(())
    }
}
