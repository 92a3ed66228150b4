use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::protocol::row::RowData;
use crate::protocol::text::ColumnType;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_binary_resultset.html#sect_protocol_binary_resultset_row
//
// 0x00 header, then a NULL bitmap with a two-bit offset, then the non-NULL
// values back to back, sized by column type.
pub(crate) struct BinaryRow(pub(crate) RowData);

impl BinaryRow {
    pub(crate) fn decode(mut buf: Bytes, columns: &[ColumnType]) -> Result<Self> {
        use bytes::Buf;

        if buf.first() != Some(&0x00) {
            return Err(err_protocol!(
                "expected binary row (0x00); received 0x{:02X}",
                buf.first().copied().unwrap_or(0)
            ));
        }

        buf.advance(1);

        // NULL bitmap : byte<(column count + 7 + 2) / 8>
        let bitmap_len = (columns.len() + 9) / 8;

        if buf.len() < bitmap_len {
            return Err(err_protocol!("binary row is shorter than its NULL bitmap"));
        }

        let bitmap = buf.split_to(bitmap_len);

        let mut values = Vec::with_capacity(columns.len());
        let mut index = 0;

        for (column, r#type) in columns.iter().enumerate() {
            let bit = column + 2;

            if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                values.push(None);
                continue;
            }

            let (prefix, len) = field_size(&buf, index, *r#type)?;

            let start = index + prefix;
            let end = start + len;

            if end > buf.len() {
                return Err(err_protocol!(
                    "binary row field of {} bytes overruns the payload",
                    len
                ));
            }

            values.push(Some(start..end));
            index = end;
        }

        Ok(BinaryRow(RowData {
            storage: buf,
            values,
        }))
    }
}

// (length-prefix size, value size) for the field starting at `index`
fn field_size(buf: &Bytes, index: usize, r#type: ColumnType) -> Result<(usize, usize)> {
    Ok(match r#type {
        ColumnType::Null => (0, 0),

        ColumnType::Tiny => (0, 1),
        ColumnType::Short | ColumnType::Year => (0, 2),
        ColumnType::Long | ColumnType::Int24 | ColumnType::Float => (0, 4),
        ColumnType::LongLong | ColumnType::Double => (0, 8),

        // temporal values carry their own one-byte length
        ColumnType::Date | ColumnType::Datetime | ColumnType::Timestamp | ColumnType::Time => {
            let len = *buf
                .get(index)
                .ok_or_else(|| err_protocol!("binary row ended before a temporal field"))?;

            (1, len as usize)
        }

        // everything else is a length-encoded byte run
        _ => {
            let header = *buf
                .get(index)
                .ok_or_else(|| err_protocol!("binary row ended before every column was read"))?;

            match header {
                0xFB => {
                    return Err(err_protocol!(
                        "NULL marker inside a binary row; NULLs belong in the bitmap"
                    ));
                }

                0xFC => (3, read_le(buf, index + 1, 2)? as usize),
                0xFD => (4, read_le(buf, index + 1, 3)? as usize),
                0xFE => (9, read_le(buf, index + 1, 8)? as usize),
                0xFF => {
                    return Err(err_protocol!(
                        "0xFF is not a valid field header in a binary row"
                    ));
                }

                short => (1, short as usize),
            }
        }
    })
}

fn read_le(buf: &Bytes, start: usize, width: usize) -> Result<u64> {
    let end = start + width;

    if end > buf.len() {
        return Err(err_protocol!(
            "binary row field length overruns the payload"
        ));
    }

    let mut out = [0u8; 8];
    out[..width].copy_from_slice(&buf[start..end]);

    Ok(u64::from_le_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_fixed_and_variable_fields() {
        // row: (42 as LONG, "hi" as VAR_STRING)
        let payload: &[u8] = &[0x00, 0x00, 42, 0, 0, 0, 0x02, b'h', b'i'];

        let row = BinaryRow::decode(
            Bytes::copy_from_slice(payload),
            &[ColumnType::Long, ColumnType::VarString],
        )
        .unwrap();

        assert_eq!(row.0.get(0), Some(&[42, 0, 0, 0][..]));
        assert_eq!(row.0.get(1), Some(&b"hi"[..]));
    }

    #[test]
    fn it_honors_the_null_bitmap_offset() {
        // first column NULL: bit 2 of the bitmap byte
        let payload: &[u8] = &[0x00, 0b0000_0100, 0x01, b'y'];

        let row = BinaryRow::decode(
            Bytes::copy_from_slice(payload),
            &[ColumnType::LongLong, ColumnType::VarString],
        )
        .unwrap();

        assert_eq!(row.0.get(0), None);
        assert_eq!(row.0.get(1), Some(&b"y"[..]));
    }

    #[test]
    fn it_decodes_short_fields() {
        let payload: &[u8] = &[0x00, 0x00, 0x39, 0x30];

        let row =
            BinaryRow::decode(Bytes::copy_from_slice(payload), &[ColumnType::Short]).unwrap();

        assert_eq!(row.0.get(0), Some(&[0x39, 0x30][..]));
    }

    #[test]
    fn it_decodes_temporal_length_prefixes() {
        // DATE 2026-08-01 in the four-byte layout
        let payload: &[u8] = &[0x00, 0x00, 0x04, 0xEA, 0x07, 0x08, 0x01];

        let row =
            BinaryRow::decode(Bytes::copy_from_slice(payload), &[ColumnType::Date]).unwrap();

        assert_eq!(row.0.get(0), Some(&[0xEA, 0x07, 0x08, 0x01][..]));
    }

    #[test]
    fn it_rejects_a_row_without_its_header() {
        assert!(BinaryRow::decode(Bytes::from_static(b"\x01\x00"), &[]).is_err());
    }
}
