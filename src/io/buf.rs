use bytes::{Buf, Bytes};
use memchr::memchr;

use crate::error::{err_protocol, Error, Result};

/// Checked reads over a received payload.
///
/// Everything here validates the remaining length first; a short buffer is
/// a protocol violation, never a panic. Length-encoded ("lenenc") integers
/// are MySQL's variable-width form: one discriminator byte, then 0, 2, 3,
/// or 8 little-endian bytes.
pub(crate) trait BufExt: Buf {
    fn get_bytes(&mut self, n: usize) -> Result<Bytes>;

    fn get_bytes_nul(&mut self) -> Result<Bytes>;

    fn get_str(&mut self, n: usize) -> Result<String>;

    fn get_str_nul(&mut self) -> Result<String>;

    /// Reads a length-encoded integer. `None` is the NULL marker (0xFB),
    /// only meaningful in row contexts.
    fn get_uint_lenenc(&mut self) -> Result<Option<u64>>;

    fn get_bytes_lenenc(&mut self) -> Result<Option<Bytes>>;

    fn get_str_lenenc(&mut self) -> Result<Option<String>>;

    fn checked_advance(&mut self, n: usize) -> Result<()>;

    fn checked_u8(&mut self) -> Result<u8>;

    fn checked_u16_le(&mut self) -> Result<u16>;

    fn checked_u24_le(&mut self) -> Result<u32>;

    fn checked_u32_le(&mut self) -> Result<u32>;

    fn checked_u64_le(&mut self) -> Result<u64>;
}

impl BufExt for Bytes {
    fn get_bytes(&mut self, n: usize) -> Result<Bytes> {
        if self.remaining() < n {
            return Err(err_protocol!(
                "expected {} more bytes but only {} remain",
                n,
                self.remaining()
            ));
        }

        Ok(self.split_to(n))
    }

    fn get_bytes_nul(&mut self) -> Result<Bytes> {
        let nul = memchr(b'\0', self).ok_or(Error::TerminatorNotFound)?;
        let bytes = self.split_to(nul);

        self.advance(1);

        Ok(bytes)
    }

    fn get_str(&mut self, n: usize) -> Result<String> {
        let bytes = self.get_bytes(n)?;

        String::from_utf8(bytes.to_vec())
            .map_err(|err| err_protocol!("invalid UTF-8 in server string: {}", err))
    }

    fn get_str_nul(&mut self) -> Result<String> {
        let bytes = self.get_bytes_nul()?;

        String::from_utf8(bytes.to_vec())
            .map_err(|err| err_protocol!("invalid UTF-8 in server string: {}", err))
    }

    fn get_uint_lenenc(&mut self) -> Result<Option<u64>> {
        Ok(match self.checked_u8()? {
            0xFB => None,
            0xFC => Some(u64::from(self.checked_u16_le()?)),
            0xFD => Some(u64::from(self.checked_u24_le()?)),
            0xFE => Some(self.checked_u64_le()?),
            0xFF => {
                return Err(err_protocol!(
                    "0xFF is not a valid length-encoded integer header"
                ));
            }

            value => Some(u64::from(value)),
        })
    }

    fn get_bytes_lenenc(&mut self) -> Result<Option<Bytes>> {
        match self.get_uint_lenenc()? {
            Some(len) => self.get_bytes(len as usize).map(Some),
            None => Ok(None),
        }
    }

    fn get_str_lenenc(&mut self) -> Result<Option<String>> {
        match self.get_uint_lenenc()? {
            Some(len) => self.get_str(len as usize).map(Some),
            None => Ok(None),
        }
    }

    fn checked_advance(&mut self, n: usize) -> Result<()> {
        self.get_bytes(n).map(|_| ())
    }

    fn checked_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(err_protocol!("unexpected end of payload reading int<1>"));
        }

        Ok(self.get_u8())
    }

    fn checked_u16_le(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(err_protocol!("unexpected end of payload reading int<2>"));
        }

        Ok(self.get_u16_le())
    }

    fn checked_u24_le(&mut self) -> Result<u32> {
        if self.remaining() < 3 {
            return Err(err_protocol!("unexpected end of payload reading int<3>"));
        }

        Ok(self.get_uint_le(3) as u32)
    }

    fn checked_u32_le(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(err_protocol!("unexpected end of payload reading int<4>"));
        }

        Ok(self.get_u32_le())
    }

    fn checked_u64_le(&mut self) -> Result<u64> {
        if self.remaining() < 8 {
            return Err(err_protocol!("unexpected end of payload reading int<8>"));
        }

        Ok(self.get_u64_le())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reads_lenenc_one_byte() {
        let mut buf = Bytes::from_static(&[0xFA]);

        assert_eq!(buf.get_uint_lenenc().unwrap(), Some(250));
        assert!(buf.is_empty());
    }

    #[test]
    fn it_reads_lenenc_wide_forms() {
        let mut buf = Bytes::from_static(&[0xFC, 0x01, 0x01]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), Some(257));

        let mut buf = Bytes::from_static(&[0xFD, 0x01, 0x00, 0x01]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), Some(65537));

        let mut buf = Bytes::from_static(&[0xFE, 1, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(
            buf.get_uint_lenenc().unwrap(),
            Some(0x8000_0000_0000_0001)
        );
    }

    #[test]
    fn it_reads_lenenc_null_marker() {
        let mut buf = Bytes::from_static(&[0xFB]);

        assert_eq!(buf.get_uint_lenenc().unwrap(), None);
    }

    #[test]
    fn it_rejects_lenenc_err_header() {
        let mut buf = Bytes::from_static(&[0xFF]);

        assert!(buf.get_uint_lenenc().is_err());
    }

    #[test]
    fn it_reads_str_nul() {
        let mut buf = Bytes::from_static(b"mysql_native_password\0rest");

        assert_eq!(buf.get_str_nul().unwrap(), "mysql_native_password");
        assert_eq!(&buf[..], b"rest");
    }

    #[test]
    fn missing_nul_terminator_is_an_error() {
        let mut buf = Bytes::from_static(b"no terminator here");

        assert!(matches!(
            buf.get_str_nul().unwrap_err(),
            Error::TerminatorNotFound
        ));
    }

    #[test]
    fn short_buffer_is_a_protocol_error_not_a_panic() {
        let mut buf = Bytes::from_static(&[0xFC, 0x01]);

        assert!(buf.get_uint_lenenc().is_err());
    }
}
