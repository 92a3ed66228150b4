//! Decoding of individual result fields.
//!
//! Text results carry every value as a decimal/printable byte run; binary
//! results use the fixed and length-prefixed layouts of the prepared
//! protocol. Only the core shapes are decoded here (integers, floats,
//! strings, bytes, temporal values); richer conversions belong to the
//! layers above the driver.

use crate::options::ZeroDateBehavior;
use crate::protocol::text::ColumnType;

/// Whether a row came from the text or the binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Text,
    Binary,
}

/// A calendar timestamp without zone, as MySQL transmits DATE, DATETIME,
/// and TIMESTAMP values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
}

impl DateTime {
    pub(crate) const ROUNDED_ZERO: DateTime = DateTime {
        year: 1,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
        micros: 0,
    };

    pub fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

type DecodeResult<T> = Result<T, String>;

pub(crate) fn decode_i64(
    raw: &[u8],
    r#type: ColumnType,
    format: ValueFormat,
) -> DecodeResult<i64> {
    match format {
        ValueFormat::Text => parse_text::<i64>(raw, "an integer"),

        ValueFormat::Binary => Ok(match (r#type, raw.len()) {
            (ColumnType::Tiny, 1) => i64::from(raw[0] as i8),
            (ColumnType::Short | ColumnType::Year, 2) => {
                i64::from(i16::from_le_bytes([raw[0], raw[1]]))
            }
            (ColumnType::Long | ColumnType::Int24, 4) => {
                i64::from(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            (ColumnType::LongLong, 8) => {
                i64::from_le_bytes(raw.try_into().expect("length was just checked"))
            }

            _ => {
                return Err(format!(
                    "cannot decode {:?} ({} bytes) as an integer",
                    r#type,
                    raw.len()
                ));
            }
        }),
    }
}

pub(crate) fn decode_u64(
    raw: &[u8],
    r#type: ColumnType,
    format: ValueFormat,
) -> DecodeResult<u64> {
    match format {
        ValueFormat::Text => parse_text::<u64>(raw, "an unsigned integer"),

        ValueFormat::Binary => Ok(match (r#type, raw.len()) {
            (ColumnType::Tiny, 1) => u64::from(raw[0]),
            (ColumnType::Short | ColumnType::Year, 2) => {
                u64::from(u16::from_le_bytes([raw[0], raw[1]]))
            }
            (ColumnType::Long | ColumnType::Int24, 4) => {
                u64::from(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            (ColumnType::LongLong, 8) => {
                u64::from_le_bytes(raw.try_into().expect("length was just checked"))
            }

            _ => {
                return Err(format!(
                    "cannot decode {:?} ({} bytes) as an unsigned integer",
                    r#type,
                    raw.len()
                ));
            }
        }),
    }
}

pub(crate) fn decode_f64(
    raw: &[u8],
    r#type: ColumnType,
    format: ValueFormat,
) -> DecodeResult<f64> {
    match format {
        ValueFormat::Text => parse_text::<f64>(raw, "a float"),

        ValueFormat::Binary => Ok(match (r#type, raw.len()) {
            (ColumnType::Float, 4) => {
                f64::from(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            (ColumnType::Double, 8) => {
                f64::from_le_bytes(raw.try_into().expect("length was just checked"))
            }

            // the server encodes decimals as printable text in both
            // protocols
            (ColumnType::NewDecimal | ColumnType::Decimal, _) => {
                parse_text::<f64>(raw, "a decimal")?
            }

            _ => {
                return Err(format!(
                    "cannot decode {:?} ({} bytes) as a float",
                    r#type,
                    raw.len()
                ));
            }
        }),
    }
}

pub(crate) fn decode_str(raw: &[u8]) -> DecodeResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|err| format!("invalid UTF-8 in value: {}", err))
}

pub(crate) fn decode_datetime(
    raw: &[u8],
    r#type: ColumnType,
    format: ValueFormat,
    zero_date: ZeroDateBehavior,
) -> DecodeResult<Option<DateTime>> {
    let value = match format {
        ValueFormat::Text => parse_text_datetime(raw)?,
        ValueFormat::Binary => parse_binary_datetime(raw, r#type)?,
    };

    if value.is_zero() {
        return match zero_date {
            ZeroDateBehavior::Exception => {
                Err("encountered a zero date (0000-00-00)".to_owned())
            }
            ZeroDateBehavior::UseNull => Ok(None),
            ZeroDateBehavior::UseRound => Ok(Some(DateTime::ROUNDED_ZERO)),
        };
    }

    Ok(Some(value))
}

fn parse_text<T: std::str::FromStr>(raw: &[u8], what: &str) -> DecodeResult<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            format!(
                "cannot parse {:?} as {}",
                String::from_utf8_lossy(raw),
                what
            )
        })
}

// "YYYY-MM-DD" or "YYYY-MM-DD hh:mm:ss[.ffffff]"
fn parse_text_datetime(raw: &[u8]) -> DecodeResult<DateTime> {
    let s = std::str::from_utf8(raw).map_err(|_| "temporal value is not UTF-8".to_owned())?;

    let bad = || format!("cannot parse {:?} as a date or datetime", s);

    let (date, time) = match s.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (s, None),
    };

    let mut parts = date.split('-');
    let year = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let month = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let day = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;

    let mut out = DateTime {
        year,
        month,
        day,
        hour: 0,
        minute: 0,
        second: 0,
        micros: 0,
    };

    if let Some(time) = time {
        let (hms, micros) = match time.split_once('.') {
            Some((hms, frac)) => {
                // fractional digits scale to microseconds
                let mut scaled: u32 = frac.parse().map_err(|_| bad())?;
                for _ in frac.len()..6 {
                    scaled *= 10;
                }

                (hms, scaled)
            }
            None => (time, 0),
        };

        let mut parts = hms.split(':');
        out.hour = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        out.minute = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        out.second = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        out.micros = micros;
    }

    Ok(out)
}

// 0, 4, 7, or 11 payload bytes depending on precision
fn parse_binary_datetime(raw: &[u8], r#type: ColumnType) -> DecodeResult<DateTime> {
    if !matches!(
        r#type,
        ColumnType::Date | ColumnType::Datetime | ColumnType::Timestamp
    ) {
        return Err(format!("cannot decode {:?} as a date or datetime", r#type));
    }

    let mut out = DateTime {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
        micros: 0,
    };

    match raw.len() {
        0 => {}

        4 | 7 | 11 => {
            out.year = u16::from_le_bytes([raw[0], raw[1]]);
            out.month = raw[2];
            out.day = raw[3];

            if raw.len() >= 7 {
                out.hour = raw[4];
                out.minute = raw[5];
                out.second = raw[6];
            }

            if raw.len() == 11 {
                out.micros = u32::from_le_bytes([raw[7], raw[8], raw[9], raw[10]]);
            }
        }

        n => {
            return Err(format!("invalid binary temporal length {}", n));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_text_integers() {
        assert_eq!(
            decode_i64(b"1", ColumnType::Long, ValueFormat::Text).unwrap(),
            1
        );
        assert_eq!(
            decode_i64(b"-42", ColumnType::Long, ValueFormat::Text).unwrap(),
            -42
        );
        assert!(decode_i64(b"x", ColumnType::Long, ValueFormat::Text).is_err());
    }

    #[test]
    fn it_decodes_binary_widths() {
        assert_eq!(
            decode_i64(&[0xFF], ColumnType::Tiny, ValueFormat::Binary).unwrap(),
            -1
        );
        assert_eq!(
            decode_i64(&[0x39, 0x30], ColumnType::Short, ValueFormat::Binary).unwrap(),
            12345
        );
        assert_eq!(
            decode_i64(&[42, 0, 0, 0], ColumnType::Long, ValueFormat::Binary).unwrap(),
            42
        );
        assert_eq!(
            decode_u64(&[0xFF; 8], ColumnType::LongLong, ValueFormat::Binary).unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn it_decodes_binary_datetime_layouts() {
        // 2026-08-01
        let date = decode_datetime(
            &[0xEA, 0x07, 8, 1],
            ColumnType::Date,
            ValueFormat::Binary,
            ZeroDateBehavior::Exception,
        )
        .unwrap()
        .unwrap();

        assert_eq!((date.year, date.month, date.day), (2026, 8, 1));

        // 2026-08-01 12:34:56.000007
        let ts = decode_datetime(
            &[0xEA, 0x07, 8, 1, 12, 34, 56, 7, 0, 0, 0],
            ColumnType::Datetime,
            ValueFormat::Binary,
            ZeroDateBehavior::Exception,
        )
        .unwrap()
        .unwrap();

        assert_eq!((ts.hour, ts.minute, ts.second, ts.micros), (12, 34, 56, 7));
    }

    #[test]
    fn it_decodes_text_datetime() {
        let ts = decode_datetime(
            b"2026-08-01 12:34:56.5",
            ColumnType::Datetime,
            ValueFormat::Text,
            ZeroDateBehavior::Exception,
        )
        .unwrap()
        .unwrap();

        assert_eq!((ts.year, ts.second), (2026, 56));
        assert_eq!(ts.micros, 500_000);
    }

    #[test]
    fn zero_dates_follow_the_configured_behavior() {
        let zero_text: &[u8] = b"0000-00-00";

        assert!(decode_datetime(
            zero_text,
            ColumnType::Date,
            ValueFormat::Text,
            ZeroDateBehavior::Exception,
        )
        .is_err());

        assert_eq!(
            decode_datetime(
                zero_text,
                ColumnType::Date,
                ValueFormat::Text,
                ZeroDateBehavior::UseNull,
            )
            .unwrap(),
            None
        );

        let rounded = decode_datetime(
            &[],
            ColumnType::Date,
            ValueFormat::Binary,
            ZeroDateBehavior::UseRound,
        )
        .unwrap()
        .unwrap();

        assert_eq!((rounded.year, rounded.month, rounded.day), (1, 1, 1));
    }
}
