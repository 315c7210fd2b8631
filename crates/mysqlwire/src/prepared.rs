//! Prepared statements: COM_STMT_PREPARE / EXECUTE / CLOSE / RESET payloads.
//!
//! # Protocol flow
//!
//! 1. **Prepare**: COM_STMT_PREPARE carries the SQL text. The server answers
//!    with statement id, column count and parameter count, then an
//!    EOF-terminated block of parameter definitions and one of column
//!    definitions (each only when its count is non-zero).
//! 2. **Execute**: COM_STMT_EXECUTE carries the id and the bound arguments in
//!    binary form. The reply is an OK packet or a binary-protocol result set.
//! 3. **Close**: COM_STMT_CLOSE frees the id on the server. No reply.

#![allow(clippy::cast_possible_truncation)]

use chrono::NaiveDate;
use mysqlwire_core::{ArgumentError, ArgumentErrorKind, Error, Result, Value};

use crate::protocol::codec::lenenc_int_len;
use crate::protocol::{Command, PacketWriter, protocol_error};
use crate::types::{ColumnDef, FieldType};

/// Type tag high byte marking an unsigned integer argument.
pub const UNSIGNED_FLAG: u8 = 0x80;

const CURSOR_TYPE_NO_CURSOR: u8 = 0x00;
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Fixed part of COM_STMT_PREPARE_OK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

impl PrepareOk {
    /// Parse the first packet of a prepare response.
    ///
    /// Layout: `0x00`, id(4), columns(2), params(2), reserved(1), warnings(2).
    #[allow(clippy::result_large_err)]
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload {
            [0x00, id @ ..] if id.len() >= 11 => Ok(PrepareOk {
                statement_id: u32::from_le_bytes([id[0], id[1], id[2], id[3]]),
                num_columns: u16::from_le_bytes([id[4], id[5]]),
                num_params: u16::from_le_bytes([id[6], id[7]]),
                warnings: u16::from_le_bytes([id[9], id[10]]),
            }),
            _ => Err(protocol_error("malformed COM_STMT_PREPARE response", payload)),
        }
    }
}

/// A server-side prepared statement.
///
/// The id stays allocated on the server until the statement is closed or the
/// connection ends.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub id: u32,
    pub sql: String,
    pub param_count: u16,
    pub column_count: u16,
    /// Result column definitions announced at prepare time
    pub columns: Vec<ColumnDef>,
}

impl PreparedStatement {
    pub fn new(ok: PrepareOk, sql: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            id: ok.statement_id,
            sql: sql.into(),
            param_count: ok.num_params,
            column_count: ok.num_columns,
            columns,
        }
    }
}

pub fn build_prepare(sql: &str) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtPrepare);
    writer.write_bytes(sql.as_bytes());
    writer.into_bytes()
}

pub fn build_close(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtClose);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

pub fn build_reset(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtReset);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Build a COM_STMT_EXECUTE payload.
///
/// Layout: command, statement id(4), cursor flags(1), iteration count(4) and,
/// only when there are arguments, the NULL bitmap `((n + 7) / 8)`, the
/// new-params-bound byte, one 2-byte type tag per argument, then the values
/// of the non-NULL arguments in order.
///
/// Every check runs before anything is encoded, so a rejected call never
/// reaches the wire.
#[allow(clippy::result_large_err)]
pub fn build_execute(
    stmt: &PreparedStatement,
    args: &[Value],
    max_arg_len: usize,
) -> Result<Vec<u8>> {
    if args.len() != usize::from(stmt.param_count) {
        return Err(Error::Argument(ArgumentError {
            kind: ArgumentErrorKind::CountMismatch {
                expected: usize::from(stmt.param_count),
                actual: args.len(),
            },
            message: format!(
                "statement expects {} arguments, got {}",
                stmt.param_count,
                args.len()
            ),
        }));
    }

    let encoded = args
        .iter()
        .enumerate()
        .map(|(i, arg)| encode_argument(i, arg, max_arg_len))
        .collect::<Result<Vec<_>>>()?;

    let values_len: usize = encoded.iter().map(|a| a.value.len()).sum();
    let mut writer = PacketWriter::with_capacity(14 + args.len() * 3 + values_len);
    writer.write_u8(Command::StmtExecute as u8);
    writer.write_u32_le(stmt.id);
    writer.write_u8(CURSOR_TYPE_NO_CURSOR);
    writer.write_u32_le(1);

    if !args.is_empty() {
        let mut bitmap = vec![0u8; args.len().div_ceil(8)];
        for (i, arg) in args.iter().enumerate() {
            if arg.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        writer.write_bytes(&bitmap);
        writer.write_u8(1);

        for arg in &encoded {
            writer.write_u8(arg.field_type.code());
            writer.write_u8(if arg.unsigned { UNSIGNED_FLAG } else { 0 });
        }
        for arg in &encoded {
            writer.write_bytes(&arg.value);
        }
    }

    Ok(writer.into_bytes())
}

/// One argument ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArgument {
    pub field_type: FieldType,
    pub unsigned: bool,
    /// Binary value; empty for NULL
    pub value: Vec<u8>,
}

/// Map a bound value to its type tag and binary encoding.
///
/// Dates and times travel as text under the STRING type.
#[allow(clippy::result_large_err)]
pub fn encode_argument(index: usize, arg: &Value, max_arg_len: usize) -> Result<EncodedArgument> {
    let fixed = |field_type, unsigned, value: &[u8]| EncodedArgument {
        field_type,
        unsigned,
        value: value.to_vec(),
    };

    let encoded = match arg {
        Value::Null => fixed(FieldType::Null, false, &[]),
        Value::TinyInt(v) => fixed(FieldType::Tiny, false, &v.to_le_bytes()),
        Value::UTinyInt(v) => fixed(FieldType::Tiny, true, &v.to_le_bytes()),
        Value::SmallInt(v) => fixed(FieldType::Short, false, &v.to_le_bytes()),
        Value::USmallInt(v) => fixed(FieldType::Short, true, &v.to_le_bytes()),
        Value::Int(v) => fixed(FieldType::Long, false, &v.to_le_bytes()),
        Value::UInt(v) => fixed(FieldType::Long, true, &v.to_le_bytes()),
        Value::BigInt(v) => fixed(FieldType::LongLong, false, &v.to_le_bytes()),
        Value::UBigInt(v) => fixed(FieldType::LongLong, true, &v.to_le_bytes()),
        Value::Float(v) if v.is_finite() => fixed(FieldType::Float, false, &v.to_le_bytes()),
        Value::Double(v) if v.is_finite() => fixed(FieldType::Double, false, &v.to_le_bytes()),
        Value::Float(_) | Value::Double(_) => {
            return Err(Error::Argument(ArgumentError {
                kind: ArgumentErrorKind::UnsupportedType,
                message: format!("argument {index} is a non-finite {}", arg.type_name()),
            }));
        }
        Value::Bytes(b) => length_prefixed(index, FieldType::LongBlob, b, max_arg_len)?,
        Value::Text(s) => length_prefixed(index, FieldType::String, s.as_bytes(), max_arg_len)?,
        Value::Date(d) => temporal_text(index, &format_date(d), max_arg_len)?,
        Value::Time(t) => temporal_text(index, &t.to_string(), max_arg_len)?,
        Value::DateTime(dt) => {
            temporal_text(index, &dt.format(DATETIME_FORMAT).to_string(), max_arg_len)?
        }
    };
    Ok(encoded)
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn temporal_text(index: usize, text: &str, max_arg_len: usize) -> Result<EncodedArgument> {
    length_prefixed(index, FieldType::String, text.as_bytes(), max_arg_len)
}

#[allow(clippy::result_large_err)]
fn length_prefixed(
    index: usize,
    field_type: FieldType,
    data: &[u8],
    max_arg_len: usize,
) -> Result<EncodedArgument> {
    if data.len() > max_arg_len {
        return Err(Error::Argument(ArgumentError {
            kind: ArgumentErrorKind::PayloadTooLarge {
                size: data.len(),
                limit: max_arg_len,
            },
            message: format!(
                "argument {index} is {} bytes, limit is {max_arg_len}",
                data.len()
            ),
        }));
    }
    let mut writer = PacketWriter::with_capacity(lenenc_int_len(data.len() as u64) + data.len());
    writer.write_lenenc_bytes(data);
    Ok(EncodedArgument {
        field_type,
        unsigned: false,
        value: writer.into_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysqlwire_core::SqlTime;

    fn stmt(params: u16) -> PreparedStatement {
        PreparedStatement::new(
            PrepareOk {
                statement_id: 7,
                num_columns: 0,
                num_params: params,
                warnings: 0,
            },
            "INSERT INTO t VALUES (?, ?, ?)",
            Vec::new(),
        )
    }

    #[test]
    fn test_parse_prepare_ok() {
        let payload = [0x00, 1, 0, 0, 0, 2, 0, 3, 0, 0, 1, 0];
        let ok = PrepareOk::parse(&payload).unwrap();
        assert_eq!(ok.statement_id, 1);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 3);
        assert_eq!(ok.warnings, 1);

        assert!(PrepareOk::parse(&payload[..11]).is_err());
        assert!(PrepareOk::parse(&[0xFF, 0, 0]).is_err());
    }

    #[test]
    fn test_execute_without_arguments() {
        let payload = build_execute(&stmt(0), &[], 1024).unwrap();
        assert_eq!(payload, vec![0x17, 7, 0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_execute_layout() {
        let args = [Value::Int(-1), Value::Null, Value::Text("ab".into())];
        let payload = build_execute(&stmt(3), &args, 1024).unwrap();

        assert_eq!(&payload[..10], &[0x17, 7, 0, 0, 0, 0, 1, 0, 0, 0]);
        // NULL bitmap marks argument 1, then new-params-bound
        assert_eq!(payload[10], 0b0000_0010);
        assert_eq!(payload[11], 1);
        assert_eq!(&payload[12..18], &[0x03, 0, 0x06, 0, 0xFE, 0]);
        assert_eq!(&payload[18..22], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&payload[22..], &[2, b'a', b'b']);
    }

    #[test]
    fn test_null_bitmap_spans_bytes() {
        let mut args = vec![Value::TinyInt(1); 9];
        args[8] = Value::Null;
        let payload = build_execute(&stmt(9), &args, 1024).unwrap();
        assert_eq!(&payload[10..12], &[0, 1]);
    }

    #[test]
    fn test_count_mismatch() {
        let err = build_execute(&stmt(3), &[Value::Int(1)], 1024).unwrap_err();
        assert!(matches!(
            err,
            Error::Argument(ArgumentError {
                kind: ArgumentErrorKind::CountMismatch {
                    expected: 3,
                    actual: 1
                },
                ..
            })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_payload_too_large() {
        let err = build_execute(&stmt(1), &[Value::Bytes(vec![0; 65])], 64).unwrap_err();
        assert!(matches!(
            err,
            Error::Argument(ArgumentError {
                kind: ArgumentErrorKind::PayloadTooLarge { size: 65, limit: 64 },
                ..
            })
        ));
        assert!(build_execute(&stmt(1), &[Value::Bytes(vec![0; 64])], 64).is_ok());
    }

    #[test]
    fn test_unsigned_and_width_tags() {
        let a = encode_argument(0, &Value::UBigInt(u64::MAX), 10).unwrap();
        assert_eq!(a.field_type, FieldType::LongLong);
        assert!(a.unsigned);
        assert_eq!(a.value, vec![0xFF; 8]);

        let a = encode_argument(0, &Value::SmallInt(-2), 10).unwrap();
        assert_eq!((a.field_type, a.unsigned), (FieldType::Short, false));
        assert_eq!(a.value, vec![0xFE, 0xFF]);

        let a = encode_argument(0, &Value::Bytes(vec![1, 2]), 10).unwrap();
        assert_eq!(a.field_type, FieldType::LongBlob);
        assert_eq!(a.value, vec![2, 1, 2]);

        let err = encode_argument(2, &Value::Double(f64::NAN), 10).unwrap_err();
        assert!(matches!(
            err,
            Error::Argument(ArgumentError {
                kind: ArgumentErrorKind::UnsupportedType,
                ..
            })
        ));
    }

    #[test]
    fn test_temporal_arguments_are_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let a = encode_argument(0, &Value::Date(date), 64).unwrap();
        assert_eq!(a.field_type, FieldType::String);
        assert_eq!(&a.value[1..], b"2024-03-09");

        let a = encode_argument(0, &Value::DateTime(date.and_hms_opt(1, 2, 3).unwrap()), 64)
            .unwrap();
        assert_eq!(&a.value[1..], b"2024-03-09 01:02:03.000000");

        let a = encode_argument(0, &Value::Time(SqlTime::new(true, 100, 0, 1, 0)), 64).unwrap();
        assert_eq!(&a.value[1..], b"-100:00:01");
    }

    #[test]
    fn test_close_and_reset_payloads() {
        assert_eq!(build_close(0x0102_0304), vec![0x19, 4, 3, 2, 1]);
        assert_eq!(build_reset(5), vec![0x1a, 5, 0, 0, 0]);
        assert_eq!(build_prepare("SELECT ?"), b"\x16SELECT ?".to_vec());
    }
}
