use std::sync::Arc;

use crate::column::{Column, ResultColumns};
use crate::error::{Error, Result};
use crate::protocol::RowData;
use crate::value::{self, DateTime, ValueFormat};

/// One decoded result row.
///
/// Fields are refcounted slices of the received payload; the payload is
/// released when every row that references it has been dropped. Columns
/// are shared across all rows of a window.
pub struct Row {
    pub(crate) data: RowData,
    pub(crate) format: ValueFormat,
    pub(crate) columns: Arc<ResultColumns>,
}

/// Resolves a column reference: a zero-based position, or a
/// case-insensitive name.
pub trait ColumnIndex {
    fn resolve(&self, row: &Row) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, row: &Row) -> Result<usize> {
        if *self >= row.len() {
            return Err(Error::ColumnIndexOutOfBounds {
                index: *self,
                len: row.len(),
            });
        }

        Ok(*self)
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, row: &Row) -> Result<usize> {
        row.columns.index_of(self)
    }
}

impl Row {
    /// Number of columns.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns.columns
    }

    /// The raw bytes of a field; `None` for SQL NULL.
    pub fn get_raw(&self, index: impl ColumnIndex) -> Result<Option<&[u8]>> {
        let index = index.resolve(self)?;

        Ok(self.data.get(index))
    }

    /// Decodes a field as a signed integer.
    pub fn try_get_i64(&self, index: impl ColumnIndex) -> Result<Option<i64>> {
        self.decode(index, |raw, column, format| {
            value::decode_i64(raw, column.r#type, format)
        })
    }

    /// Decodes a field as an unsigned integer.
    pub fn try_get_u64(&self, index: impl ColumnIndex) -> Result<Option<u64>> {
        self.decode(index, |raw, column, format| {
            value::decode_u64(raw, column.r#type, format)
        })
    }

    /// Decodes a field as a double, widening floats and parsing decimals.
    pub fn try_get_f64(&self, index: impl ColumnIndex) -> Result<Option<f64>> {
        self.decode(index, |raw, column, format| {
            value::decode_f64(raw, column.r#type, format)
        })
    }

    /// Decodes a field as UTF-8 text.
    pub fn try_get_str(&self, index: impl ColumnIndex) -> Result<Option<String>> {
        self.decode(index, |raw, _, _| value::decode_str(raw))
    }

    /// Copies a field out as raw bytes.
    pub fn try_get_bytes(&self, index: impl ColumnIndex) -> Result<Option<Vec<u8>>> {
        self.decode(index, |raw, _, _| Ok(raw.to_vec()))
    }

    /// Decodes a DATE, DATETIME, or TIMESTAMP field, applying the
    /// configured zero-date behavior. The outer `Option` is SQL NULL; the
    /// inner one is a zero date decoded under
    /// [`UseNull`][crate::ZeroDateBehavior::UseNull].
    pub fn try_get_datetime(&self, index: impl ColumnIndex) -> Result<Option<Option<DateTime>>> {
        let zero_date = self.columns.zero_date;

        self.decode(index, move |raw, column, format| {
            value::decode_datetime(raw, column.r#type, format, zero_date)
        })
    }

    fn decode<T>(
        &self,
        index: impl ColumnIndex,
        decode: impl FnOnce(&[u8], &Column, ValueFormat) -> std::result::Result<T, String>,
    ) -> Result<Option<T>> {
        let index = index.resolve(self)?;

        match self.data.get(index) {
            None => Ok(None),

            Some(raw) => decode(raw, &self.columns.columns[index], self.format)
                .map(Some)
                .map_err(|message| Error::column_decode(index, message)),
        }
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row").field("len", &self.len()).finish()
    }
}
