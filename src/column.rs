use std::sync::Arc;

use crate::error::{Error, Result};
use crate::options::ZeroDateBehavior;
use crate::protocol::text::{ColumnDefinition, ColumnFlags, ColumnType};

/// One column of a result set.
#[derive(Debug, Clone)]
pub struct Column {
    pub(crate) name: Option<String>,
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
}

impl Column {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn type_id(&self) -> ColumnType {
        self.r#type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub(crate) fn from_definition(def: &ColumnDefinition) -> Self {
        Self {
            name: def.name().map(ToOwned::to_owned),
            r#type: def.type_id(),
            flags: def.flags(),
        }
    }
}

/// The shared column set of one result window, plus the name index.
///
/// Lookup by name is case-insensitive: the entries are sorted by the
/// ASCII-folded name, equal folds ordered case-sensitively, and a lookup
/// resolves to the lowest column position among the fold-equal run.
#[derive(Debug)]
pub(crate) struct ResultColumns {
    pub(crate) columns: Vec<Column>,

    // (ascii-lowercased name, column position), sorted
    by_name: Vec<(String, usize)>,

    pub(crate) zero_date: ZeroDateBehavior,
}

impl ResultColumns {
    pub(crate) fn new(columns: Vec<Column>, zero_date: ZeroDateBehavior) -> Arc<Self> {
        let mut by_name: Vec<(String, usize)> = columns
            .iter()
            .enumerate()
            .filter_map(|(index, column)| {
                column
                    .name
                    .as_deref()
                    .map(|name| (name.to_ascii_lowercase(), index))
            })
            .collect();

        by_name.sort_by(|(a_fold, a_index), (b_fold, b_index)| {
            a_fold
                .cmp(b_fold)
                .then_with(|| columns[*a_index].name.cmp(&columns[*b_index].name))
                .then(a_index.cmp(b_index))
        });

        Arc::new(Self {
            columns,
            by_name,
            zero_date,
        })
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize> {
        let folded = name.to_ascii_lowercase();

        let start = self.by_name.partition_point(|(fold, _)| *fold < folded);

        self.by_name[start..]
            .iter()
            .take_while(|(fold, _)| *fold == folded)
            .map(|&(_, index)| index)
            .min()
            .ok_or_else(|| Error::ColumnNotFound(name.into()))
    }

    pub(crate) fn types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|column| column.r#type).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Arc<ResultColumns> {
        ResultColumns::new(
            names
                .iter()
                .map(|name| Column {
                    name: Some((*name).to_owned()),
                    r#type: ColumnType::Long,
                    flags: ColumnFlags::empty(),
                })
                .collect(),
            ZeroDateBehavior::Exception,
        )
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let columns = columns(&["user_id", "Name"]);

        assert_eq!(columns.index_of("USER_ID").unwrap(), 0);
        assert_eq!(columns.index_of("name").unwrap(), 1);
        assert!(matches!(
            columns.index_of("missing"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn collision_resolves_to_the_first_column_position() {
        // three case-insensitively equal names in one result
        let columns = columns(&["ID", "id", "Id"]);

        assert_eq!(columns.index_of("id").unwrap(), 0);
        assert_eq!(columns.index_of("ID").unwrap(), 0);
        assert_eq!(columns.index_of("iD").unwrap(), 0);
    }
}
