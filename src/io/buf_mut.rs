use bytes::BufMut;

/// Write-side counterparts to [`BufExt`][super::BufExt].
///
/// The length-encoded encoder always emits the minimal-width form.
pub(crate) trait BufMutExt: BufMut {
    fn put_uint_lenenc(&mut self, value: u64);

    fn put_bytes_lenenc(&mut self, bytes: &[u8]);

    fn put_str_lenenc(&mut self, s: &str);

    fn put_str_nul(&mut self, s: &str);
}

impl BufMutExt for Vec<u8> {
    fn put_uint_lenenc(&mut self, value: u64) {
        if value <= 250 {
            self.put_u8(value as u8);
        } else if value <= 0xFF_FF {
            self.put_u8(0xFC);
            self.put_u16_le(value as u16);
        } else if value <= 0xFF_FF_FF {
            self.put_u8(0xFD);
            self.put_uint_le(value, 3);
        } else {
            self.put_u8(0xFE);
            self.put_u64_le(value);
        }
    }

    fn put_bytes_lenenc(&mut self, bytes: &[u8]) {
        self.put_uint_lenenc(bytes.len() as u64);
        self.extend_from_slice(bytes);
    }

    fn put_str_lenenc(&mut self, s: &str) {
        self.put_bytes_lenenc(s.as_bytes());
    }

    fn put_str_nul(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
        self.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufExt;
    use bytes::Bytes;

    #[test]
    fn it_round_trips_lenenc_at_every_width_boundary() {
        for value in [
            0u64,
            1,
            250,
            251,
            0xFF_FF,
            0x1_00_00,
            0xFF_FF_FF,
            0x1_00_00_00,
            u64::MAX,
        ] {
            let mut buf = Vec::new();
            buf.put_uint_lenenc(value);

            let mut bytes = Bytes::from(buf);
            assert_eq!(bytes.get_uint_lenenc().unwrap(), Some(value));
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn it_encodes_minimal_width() {
        let mut buf = Vec::new();
        buf.put_uint_lenenc(250);
        assert_eq!(buf, [250]);

        let mut buf = Vec::new();
        buf.put_uint_lenenc(251);
        assert_eq!(buf, [0xFC, 251, 0]);

        let mut buf = Vec::new();
        buf.put_uint_lenenc(0xFF_FF);
        assert_eq!(buf, [0xFC, 0xFF, 0xFF]);

        let mut buf = Vec::new();
        buf.put_uint_lenenc(0x10_00_00);
        assert_eq!(buf, [0xFD, 0x00, 0x00, 0x10]);

        let mut buf = Vec::new();
        buf.put_uint_lenenc(0x1_00_00_00);
        assert_eq!(buf, [0xFE, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn it_round_trips_str_nul() {
        let mut buf = Vec::new();
        buf.put_str_nul("utf8mb4");

        let mut bytes = Bytes::from(buf);
        assert_eq!(bytes.get_str_nul().unwrap(), "utf8mb4");
    }
}
