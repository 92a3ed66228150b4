use bytes::Bytes;
use std::ops::Deref;

use crate::error::{Error, Result, ServerError};
use crate::io::ProtocolDecode;
use crate::protocol::response::{EofPacket, ErrPacket, OkPacket};
use crate::protocol::Capabilities;

/// One logical server message: the concatenation of the payloads of one or
/// more envelopes, after sequence verification and reassembly.
#[derive(Debug)]
pub(crate) struct Packet(pub(crate) Bytes);

impl Packet {
    /// The leading byte, which discriminates the message within the
    /// active decode context. A zero-length logical message has no
    /// meaning in any context.
    pub(crate) fn header(&self) -> Result<u8> {
        self.0
            .first()
            .copied()
            .ok_or_else(|| Error::protocol("received an empty logical message"))
    }

    pub(crate) fn ok(self, capabilities: Capabilities) -> Result<OkPacket> {
        OkPacket::decode_with(self.0, capabilities)
    }

    pub(crate) fn eof(self, capabilities: Capabilities) -> Result<EofPacket> {
        EofPacket::decode_with(self.0, capabilities)
    }

    pub(crate) fn err(self, capabilities: Capabilities) -> Result<ServerError> {
        Ok(ErrPacket::decode_with(self.0, capabilities)?.into_server_error())
    }

    /// True when this message terminates a metadata or row run: an EOF,
    /// or (under `DEPRECATE_EOF`) an OK wearing the 0xFE header.
    ///
    /// The length bound matters: in a text result a 0xFE first byte can
    /// also open an 8-byte length-encoded field, but such a row is at
    /// least 9 bytes long.
    pub(crate) fn is_terminator(&self, capabilities: Capabilities) -> bool {
        match self.0.first() {
            Some(&0xFE) if !capabilities.contains(Capabilities::DEPRECATE_EOF) => {
                self.0.len() <= EofPacket::MAX_LEN
            }

            Some(&0xFE) => {
                if self.0.len() < OkPacket::MIN_LEN {
                    // a malformed terminator is still a terminator for
                    // the pre-41 EOF shape
                    return self.0.len() <= EofPacket::MAX_LEN;
                }

                if self.0.len() <= EofPacket::MAX_LEN {
                    return true;
                }

                // tie-break against a text row whose first field is an
                // 8-byte length-encoded value
                !self.is_consistent_wide_row()
            }

            _ => false,
        }
    }

    // a 0xFE-led text row must announce a first field that actually fits
    fn is_consistent_wide_row(&self) -> bool {
        if self.0.len() < 9 {
            return false;
        }

        let mut size = [0u8; 8];
        size.copy_from_slice(&self.0[1..9]);
        let size = u64::from_le_bytes(size);

        (self.0.len() as u64).checked_sub(9).is_some_and(|rest| size <= rest)
    }
}

impl Deref for Packet {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.0
    }
}
