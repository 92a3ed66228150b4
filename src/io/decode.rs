use bytes::Bytes;

use crate::error::Result;

/// Decode one server message from an assembled payload.
///
/// `Context` carries whatever the variant needs to interpret its bytes
/// correctly (usually the negotiated capabilities); the same leading byte
/// means different things in different contexts.
pub(crate) trait ProtocolDecode<Context = ()>
where
    Self: Sized,
{
    fn decode_with(buf: Bytes, context: Context) -> Result<Self>;

    fn decode(buf: Bytes) -> Result<Self>
    where
        Self: ProtocolDecode<()>,
    {
        Self::decode_with(buf, ())
    }
}

impl ProtocolDecode for Bytes {
    fn decode_with(buf: Bytes, _: ()) -> Result<Self> {
        Ok(buf)
    }
}
