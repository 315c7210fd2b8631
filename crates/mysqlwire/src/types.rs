//! MySQL column types and column definitions.
//!
//! Field type codes are the `MYSQL_TYPE_*` constants of the C API. They drive
//! both row decoders and the argument type tags of a statement execute.

use mysqlwire_core::Result;

use crate::protocol::{PacketReader, charset, protocol_error};

/// MySQL field type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
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
    DateTime = 0x0C,
    Year = 0x0D,
    /// Internal to the server, never sent to clients in practice
    NewDate = 0x0E,
    VarChar = 0x0F,
    Bit = 0x10,
    Timestamp2 = 0x11,
    DateTime2 = 0x12,
    Time2 = 0x13,
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

impl FieldType {
    /// Map a wire type code, `None` for codes this client does not know.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let ty = match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0x11 => FieldType::Timestamp2,
            0x12 => FieldType::DateTime2,
            0x13 => FieldType::Time2,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => return None,
        };
        Some(ty)
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Types whose values travel as length-encoded strings in both protocols.
    #[must_use]
    pub const fn is_string_like(self) -> bool {
        matches!(
            self,
            FieldType::VarChar
                | FieldType::VarString
                | FieldType::String
                | FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::Json
        )
    }
}

/// Column flags in result set metadata.
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
}

/// Column definition from a result set (the protocol's "Field").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name or alias
    pub name: String,
    pub org_name: String,
    /// Character set / collation id
    pub charset: u16,
    pub column_length: u32,
    /// Raw type code as sent by the server
    pub type_code: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDef {
    /// Known field type, `None` for unrecognized codes.
    #[must_use]
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_u8(self.type_code)
    }

    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.flags & column_flags::PRIMARY_KEY != 0
    }

    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    /// Values of this column are raw bytes rather than text.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.charset == charset::BINARY as u16
    }

    /// Parse a column definition packet (protocol 4.1 layout).
    #[allow(clippy::result_large_err)]
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let truncated = |field: &str| {
            protocol_error(format!("column definition truncated at {field}"), payload)
        };
        // catalog, schema, table and org_table are not kept
        for field in ["catalog", "schema", "table", "org_table"] {
            reader.skip_lenenc_string().ok_or_else(|| truncated(field))?;
        }
        let mut text = |field: &str| -> Result<String> {
            reader
                .read_lenenc_string()
                .map(Option::unwrap_or_default)
                .ok_or_else(|| truncated(field))
        };
        let name = text("name")?;
        let org_name = text("org_name")?;

        // length of the fixed-size block, always 0x0C
        reader.skip(1).ok_or_else(|| truncated("fixed length"))?;
        let charset = reader.read_u16_le().ok_or_else(|| truncated("charset"))?;
        let column_length = reader
            .read_u32_le()
            .ok_or_else(|| truncated("column length"))?;
        let type_code = reader.read_u8().ok_or_else(|| truncated("type"))?;
        let flags = reader.read_u16_le().ok_or_else(|| truncated("flags"))?;
        let decimals = reader.read_u8().ok_or_else(|| truncated("decimals"))?;

        Ok(ColumnDef {
            name,
            org_name,
            charset,
            column_length,
            type_code,
            flags,
            decimals,
        })
    }
}

/// Encode a column definition packet. Used to synthesize server streams.
pub fn encode_column_def(
    name: &str,
    field_type: FieldType,
    flags: u16,
    charset: u16,
) -> Vec<u8> {
    let mut writer = crate::protocol::PacketWriter::new();
    writer.write_lenenc_string("def");
    writer.write_lenenc_string("test");
    writer.write_lenenc_string("t");
    writer.write_lenenc_string("t");
    writer.write_lenenc_string(name);
    writer.write_lenenc_string(name);
    writer.write_u8(0x0C);
    writer.write_u16_le(charset);
    writer.write_u32_le(255);
    writer.write_u8(field_type.code());
    writer.write_u16_le(flags);
    writer.write_u8(0);
    writer.write_zeros(2);
    writer.into_bytes()
}
