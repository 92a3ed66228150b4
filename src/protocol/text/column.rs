use bytes::Bytes;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, ProtocolDecode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/binary__log__types_8h.html
// https://mariadb.com/kb/en/result-set-packets/#field-types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    Datetime = 0x0C,
    Year = 0x0D,
    VarChar = 0x0F,
    Bit = 0x10,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl ColumnType {
    pub(crate) fn try_from_u8(id: u8) -> Result<Self> {
        Ok(match id {
            0x00 => ColumnType::Decimal,
            0x01 => ColumnType::Tiny,
            0x02 => ColumnType::Short,
            0x03 => ColumnType::Long,
            0x04 => ColumnType::Float,
            0x05 => ColumnType::Double,
            0x06 => ColumnType::Null,
            0x07 => ColumnType::Timestamp,
            0x08 => ColumnType::LongLong,
            0x09 => ColumnType::Int24,
            0x0A => ColumnType::Date,
            0x0B => ColumnType::Time,
            0x0C => ColumnType::Datetime,
            0x0D => ColumnType::Year,
            0x0F => ColumnType::VarChar,
            0x10 => ColumnType::Bit,
            0xF5 => ColumnType::Json,
            0xF6 => ColumnType::NewDecimal,
            0xF7 => ColumnType::Enum,
            0xF8 => ColumnType::Set,
            0xF9 => ColumnType::TinyBlob,
            0xFA => ColumnType::MediumBlob,
            0xFB => ColumnType::LongBlob,
            0xFC => ColumnType::Blob,
            0xFD => ColumnType::VarString,
            0xFE => ColumnType::String,
            0xFF => ColumnType::Geometry,

            _ => {
                return Err(err_protocol!("unknown column type 0x{:02X}", id));
            }
        })
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/group__group__cs__column__definition__flags.html
// https://mariadb.com/kb/en/result-set-packets/#field-details-flag
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColumnFlags: u16 {
        /// Field cannot be NULL.
        const NOT_NULL = 1;

        /// Field is part of a primary key.
        const PRIMARY_KEY = 2;

        /// Field is part of a unique key.
        const UNIQUE_KEY = 4;

        /// Field is part of a non-unique key.
        const MULTIPLE_KEY = 8;

        /// Field is a blob.
        const BLOB = 16;

        /// Field is unsigned.
        const UNSIGNED = 32;

        /// Field is zero-filled.
        const ZEROFILL = 64;

        /// Field is binary (set for strings).
        const BINARY = 128;

        /// Field is an enumeration.
        const ENUM = 256;

        /// Field auto-increments.
        const AUTO_INCREMENT = 512;

        /// Field is a timestamp.
        const TIMESTAMP = 1024;

        /// Field is a set.
        const SET = 2048;

        /// Field has no default value.
        const NO_DEFAULT_VALUE = 4096;

        /// Field is set to NOW on UPDATE.
        const ON_UPDATE_NOW = 8192;

        /// Field is a number.
        const NUM = 32768;
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_column_definition.html
// https://mariadb.com/kb/en/result-set-packets/#column-definition-packet
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub(crate) schema: Option<String>,
    pub(crate) table_alias: Option<String>,
    pub(crate) table: Option<String>,
    pub(crate) column_alias: Option<String>,
    pub(crate) column: Option<String>,
    pub(crate) collation: u16,
    pub(crate) max_size: u32,
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) decimals: u8,
}

impl ColumnDefinition {
    /// The display name: alias when the query provided one, otherwise the
    /// underlying column name. Anonymous expressions have neither.
    pub fn name(&self) -> Option<&str> {
        self.column_alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .or(self.column.as_deref().filter(|name| !name.is_empty()))
    }

    pub fn type_id(&self) -> ColumnType {
        self.r#type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The underlying table, preferring the query's alias.
    pub fn table(&self) -> Option<&str> {
        self.table_alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .or(self.table.as_deref())
    }

    /// The collation id of the column's character set; 63 is `binary`.
    pub fn collation(&self) -> u16 {
        self.collation
    }

    /// The maximum display width of the column.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Digits after the decimal point for numeric columns.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

impl ProtocolDecode for ColumnDefinition {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        // catalog : string<lenenc>, always "def"
        let catalog = buf.get_str_lenenc()?;

        if catalog.as_deref() != Some("def") {
            return Err(err_protocol!(
                "expected column definition catalog \"def\"; received {:?}",
                catalog
            ));
        }

        let schema = buf.get_str_lenenc()?;
        let table_alias = buf.get_str_lenenc()?;
        let table = buf.get_str_lenenc()?;
        let column_alias = buf.get_str_lenenc()?;
        let column = buf.get_str_lenenc()?;

        // length of the fixed fields : int<lenenc>, always 0x0C
        let fixed_len = buf.get_uint_lenenc()?.unwrap_or(0);

        if fixed_len != 0x0C {
            return Err(err_protocol!(
                "expected column definition fixed-length block (0x0C); received {}",
                fixed_len
            ));
        }

        let collation = buf.checked_u16_le()?;
        let max_size = buf.checked_u32_le()?;
        let type_id = buf.checked_u8()?;
        let flags = ColumnFlags::from_bits_truncate(buf.checked_u16_le()?);
        let decimals = buf.checked_u8()?;

        Ok(Self {
            schema,
            table_alias,
            table,
            column_alias,
            column,
            collation,
            max_size,
            r#type: ColumnType::try_from_u8(type_id)?,
            flags,
            decimals,
        })
    }
}
