//! Parameter bindings for prepared statements.

use crate::error::{Error, Result};
use crate::io::BufMutExt;
use crate::protocol::text::ColumnType;
use crate::sql::ParsedQuery;

/// One value bound to a `?` placeholder.
///
/// This is the closed set of wire-encodable shapes; richer type
/// conversions sit above the driver core.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl BindValue {
    // wire type and unsigned flag for the parameter type block
    fn r#type(&self) -> (ColumnType, bool) {
        match self {
            BindValue::Null => (ColumnType::Null, false),
            BindValue::Int(_) => (ColumnType::LongLong, false),
            BindValue::UInt(_) => (ColumnType::LongLong, true),
            BindValue::Double(_) => (ColumnType::Double, false),
            BindValue::Text(_) => (ColumnType::VarString, false),
            BindValue::Bytes(_) => (ColumnType::Blob, false),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        use bytes::BufMut;

        match self {
            BindValue::Null => {}
            BindValue::Int(v) => buf.put_i64_le(*v),
            BindValue::UInt(v) => buf.put_u64_le(*v),
            BindValue::Double(v) => buf.put_f64_le(*v),
            BindValue::Text(v) => buf.put_str_lenenc(v),
            BindValue::Bytes(v) => buf.put_bytes_lenenc(v),
        }
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        BindValue::Int(v.into())
    }
}

impl From<u64> for BindValue {
    fn from(v: u64) -> Self {
        BindValue::UInt(v)
    }
}

impl From<u32> for BindValue {
    fn from(v: u32) -> Self {
        BindValue::UInt(v.into())
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        BindValue::Double(v)
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        BindValue::Int(v.into())
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_owned())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<&[u8]> for BindValue {
    fn from(v: &[u8]) -> Self {
        BindValue::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(v: Vec<u8>) -> Self {
        BindValue::Bytes(v)
    }
}

impl<T> From<Option<T>> for BindValue
where
    T: Into<BindValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BindValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Unset,
    Bound(BindValue),
}

/// An ordered set of parameter slots for one execution of a prepared
/// statement. A binding set is complete when no slot is unset; executing
/// an incomplete set is a [`Misuse`][Error::Misuse] error before anything
/// is written.
#[derive(Debug, Clone)]
pub struct Bindings {
    slots: Vec<Slot>,
}

impl Bindings {
    pub fn new(params: usize) -> Self {
        Self {
            slots: vec![Slot::Unset; params],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Binds a value to the zero-based slot `index`.
    pub fn bind(&mut self, index: usize, value: impl Into<BindValue>) -> Result<&mut Self> {
        let len = self.slots.len();

        let slot = self.slots.get_mut(index).ok_or_else(|| {
            Error::misuse(format_args!(
                "cannot bind parameter {}; the statement has {} parameters",
                index, len
            ))
        })?;

        *slot = Slot::Bound(value.into());

        Ok(self)
    }

    pub fn bind_null(&mut self, index: usize) -> Result<&mut Self> {
        self.bind(index, BindValue::Null)
    }

    /// Binds every slot a named parameter maps to. Names come from
    /// [`ParsedQuery`]; one name may fan out to several positions.
    pub fn bind_named(
        &mut self,
        query: &ParsedQuery,
        name: &str,
        value: impl Into<BindValue>,
    ) -> Result<&mut Self> {
        let indexes = query.indexes_of(name);

        if indexes.is_empty() {
            return Err(Error::misuse(format_args!(
                "unknown named parameter :{}",
                name
            )));
        }

        let value = value.into();

        for &index in indexes {
            self.bind(index, value.clone())?;
        }

        Ok(self)
    }

    pub(crate) fn encode(&self) -> Result<WireBindings> {
        let mut types = Vec::with_capacity(self.slots.len());
        let mut null_bitmap = vec![0u8; self.slots.len().div_ceil(8)];
        let mut values = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            let value = match slot {
                Slot::Unset => {
                    return Err(Error::misuse(format_args!(
                        "parameter {} was never bound",
                        index
                    )));
                }

                Slot::Bound(value) => value,
            };

            if matches!(value, BindValue::Null) {
                null_bitmap[index / 8] |= 1 << (index % 8);
            }

            types.push(value.r#type());
            value.encode(&mut values);
        }

        Ok(WireBindings {
            types,
            null_bitmap,
            values,
        })
    }
}

/// The fully encoded form of one binding set, ready for
/// `COM_STMT_EXECUTE`. The type vector doubles as the change detector for
/// the new-params-bound flag.
#[derive(Debug, PartialEq)]
pub(crate) struct WireBindings {
    pub(crate) types: Vec<(ColumnType, bool)>,
    pub(crate) null_bitmap: Vec<u8>,
    pub(crate) values: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slot_is_a_misuse_error() {
        let mut bindings = Bindings::new(2);
        bindings.bind(0, 1i64).unwrap();

        assert!(matches!(bindings.encode(), Err(Error::Misuse(_))));
    }

    #[test]
    fn out_of_range_bind_is_a_misuse_error() {
        let mut bindings = Bindings::new(1);

        assert!(matches!(bindings.bind(1, 1i64), Err(Error::Misuse(_))));
    }

    #[test]
    fn it_encodes_the_null_bitmap_and_values() {
        let mut bindings = Bindings::new(2);
        bindings.bind_null(0).unwrap();
        bindings.bind(1, "y").unwrap();

        let wire = bindings.encode().unwrap();

        assert_eq!(wire.null_bitmap, [0b0000_0001]);
        assert_eq!(wire.types[0], (ColumnType::Null, false));
        assert_eq!(wire.types[1], (ColumnType::VarString, false));
        assert_eq!(wire.values, [1, b'y']);
    }

    #[test]
    fn type_vector_differs_when_a_slot_goes_null() {
        let mut first = Bindings::new(2);
        first.bind(0, 42i64).unwrap();
        first.bind(1, "hi").unwrap();

        let mut second = Bindings::new(2);
        second.bind_null(0).unwrap();
        second.bind(1, "y").unwrap();

        assert_ne!(
            first.encode().unwrap().types,
            second.encode().unwrap().types
        );
    }

    #[test]
    fn unsigned_is_part_of_the_type() {
        let mut bindings = Bindings::new(1);
        bindings.bind(0, u64::MAX).unwrap();

        let wire = bindings.encode().unwrap();

        assert_eq!(wire.types[0], (ColumnType::LongLong, true));
        assert_eq!(wire.values, [0xFF; 8]);
    }
}
