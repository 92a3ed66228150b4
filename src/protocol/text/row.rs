use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::protocol::row::RowData;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_row.html
//
// One length-encoded byte run per column; 0xFB marks NULL. There is no
// header byte: the first byte of the payload already belongs to the first
// field, which is why a row can open with 0xFB or 0xFE.
pub(crate) struct TextRow(pub(crate) RowData);

impl TextRow {
    pub(crate) fn decode(buf: Bytes, columns: usize) -> Result<Self> {
        let mut values = Vec::with_capacity(columns);
        let mut index = 0;

        for _ in 0..columns {
            let header = *buf
                .get(index)
                .ok_or_else(|| err_protocol!("text row ended before every column was read"))?;

            let (prefix, len) = match header {
                0xFB => {
                    values.push(None);
                    index += 1;
                    continue;
                }

                0xFC => (3, read_le(&buf, index + 1, 2)? as usize),
                0xFD => (4, read_le(&buf, index + 1, 3)? as usize),
                0xFE => (9, read_le(&buf, index + 1, 8)? as usize),
                0xFF => {
                    return Err(err_protocol!(
                        "0xFF is not a valid field header in a text row"
                    ));
                }

                short => (1, short as usize),
            };

            let start = index + prefix;
            let end = start + len;

            if end > buf.len() {
                return Err(err_protocol!(
                    "text row field of {} bytes overruns the payload",
                    len
                ));
            }

            values.push(Some(start..end));
            index = end;
        }

        if index != buf.len() {
            return Err(err_protocol!(
                "text row has {} trailing bytes after the last column",
                buf.len() - index
            ));
        }

        Ok(TextRow(RowData {
            storage: buf,
            values,
        }))
    }
}

fn read_le(buf: &Bytes, start: usize, width: usize) -> Result<u64> {
    let end = start + width;

    if end > buf.len() {
        return Err(err_protocol!("text row field length overruns the payload"));
    }

    let mut out = [0u8; 8];
    out[..width].copy_from_slice(&buf[start..end]);

    Ok(u64::from_le_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_a_single_field_row() {
        let row = TextRow::decode(Bytes::from_static(b"\x011"), 1).unwrap();

        assert_eq!(row.0.get(0), Some(&b"1"[..]));
    }

    #[test]
    fn it_decodes_nulls_between_fields() {
        let row = TextRow::decode(Bytes::from_static(b"\x02hi\xfb\x011"), 3).unwrap();

        assert_eq!(row.0.get(0), Some(&b"hi"[..]));
        assert_eq!(row.0.get(1), None);
        assert_eq!(row.0.get(2), Some(&b"1"[..]));
    }

    #[test]
    fn a_lone_null_marker_is_a_one_field_row() {
        // the same byte that opens an EOF elsewhere
        let row = TextRow::decode(Bytes::from_static(b"\xfb"), 1).unwrap();

        assert_eq!(row.0.len(), 1);
        assert_eq!(row.0.get(0), None);
    }

    #[test]
    fn it_decodes_a_wide_field_header() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(&3u64.to_le_bytes());
        payload.extend_from_slice(b"abc");

        let row = TextRow::decode(Bytes::from(payload), 1).unwrap();

        assert_eq!(row.0.get(0), Some(&b"abc"[..]));
    }

    #[test]
    fn it_rejects_a_truncated_field() {
        assert!(TextRow::decode(Bytes::from_static(b"\x05ab"), 1).is_err());
    }

    #[test]
    fn it_rejects_trailing_garbage() {
        assert!(TextRow::decode(Bytes::from_static(b"\x011extra"), 1).is_err());
    }
}
