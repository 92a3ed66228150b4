use std::ops::Range;

use bytes::Bytes;

/// The decoded fields of one result row: ranges over the refcounted
/// payload storage. Nothing is copied out of the received envelope; the
/// storage is released when the last row referencing it drops.
#[derive(Debug)]
pub(crate) struct RowData {
    pub(crate) storage: Bytes,
    pub(crate) values: Vec<Option<Range<usize>>>,
}

impl RowData {
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// The raw bytes of one field; `None` for SQL NULL.
    pub(crate) fn get(&self, index: usize) -> Option<&[u8]> {
        self.values[index]
            .as_ref()
            .map(|range| &self.storage[range.start..range.end])
    }
}
