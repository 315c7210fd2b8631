//! Binary protocol rows (COM_STMT_EXECUTE results).
//!
//! Row layout:
//! - `0x00` header byte
//! - NULL bitmap of `(column_count + 7 + 2) / 8` bytes; column `i` is bit `i + 2`
//! - values of the non-NULL columns only, each in its type's binary form

#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;

use chrono::NaiveDate;
use mysqlwire_core::{ColumnInfo, Error, Result, Row, SqlTime, Value};

use crate::protocol::{PacketReader, protocol_error};
use crate::types::{ColumnDef, FieldType};

/// Bytes of NULL bitmap for a binary row with `columns` columns.
pub const fn null_bitmap_len(columns: usize) -> usize {
    (columns + 7 + 2) / 8
}

/// Is column `index` flagged NULL in a binary row bitmap?
pub fn is_null(bitmap: &[u8], index: usize) -> bool {
    let bit = index + 2;
    bitmap
        .get(bit >> 3)
        .is_some_and(|byte| (byte >> (bit & 7)) & 1 == 1)
}

/// Decode one binary-protocol row packet.
#[allow(clippy::result_large_err)]
pub fn decode_row(payload: &[u8], columns: &[ColumnDef], info: &Arc<ColumnInfo>) -> Result<Row> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0x00) {
        return Err(protocol_error("binary row must start with 0x00", payload));
    }
    let bitmap = reader
        .read_bytes(null_bitmap_len(columns.len()))
        .ok_or_else(|| protocol_error("binary row truncated in NULL bitmap", payload))?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if is_null(bitmap, i) {
            values.push(Value::Null);
            continue;
        }
        let value = decode_value(&mut reader, column).ok_or_else(|| {
            protocol_error(
                format!("binary row truncated at column '{}'", column.name),
                payload,
            )
        })??;
        values.push(value);
    }

    Ok(Row::with_columns(Arc::clone(info), values))
}

/// Decode one non-NULL value. The outer `None` means the packet ran out.
#[allow(clippy::result_large_err)]
fn decode_value(reader: &mut PacketReader<'_>, column: &ColumnDef) -> Option<Result<Value>> {
    let Some(field_type) = column.field_type() else {
        // Without a known width the rest of the row cannot be located.
        return Some(Err(unknown_type(column)));
    };
    let unsigned = column.is_unsigned();

    let value = match field_type {
        FieldType::Tiny => {
            let v = reader.read_u8()?;
            if unsigned { Value::UTinyInt(v) } else { Value::TinyInt(v as i8) }
        }
        FieldType::Short | FieldType::Year => {
            let v = reader.read_u16_le()?;
            if unsigned { Value::USmallInt(v) } else { Value::SmallInt(v as i16) }
        }
        FieldType::Long | FieldType::Int24 => {
            let v = reader.read_u32_le()?;
            if unsigned { Value::UInt(v) } else { Value::Int(v as i32) }
        }
        FieldType::LongLong => {
            let v = reader.read_u64_le()?;
            if unsigned { Value::UBigInt(v) } else { Value::BigInt(v as i64) }
        }
        FieldType::Float => Value::Float(reader.read_f32_le()?),
        FieldType::Double => Value::Double(reader.read_f64_le()?),
        FieldType::Null => Value::Null,

        FieldType::Date
        | FieldType::NewDate
        | FieldType::DateTime
        | FieldType::DateTime2
        | FieldType::Timestamp
        | FieldType::Timestamp2 => {
            let len = usize::try_from(reader.read_lenenc_int()?.unwrap_or(0)).ok()?;
            let body = reader.read_bytes(len)?;
            decode_datetime(column, field_type, body)
        }
        FieldType::Time | FieldType::Time2 => {
            let len = usize::try_from(reader.read_lenenc_int()?.unwrap_or(0)).ok()?;
            let body = reader.read_bytes(len)?;
            decode_time(column, body)
        }

        FieldType::Bit | FieldType::Geometry => {
            Value::Bytes(reader.read_lenenc_bytes()?.unwrap_or_default().to_vec())
        }
        _ if column.is_binary() && field_type.is_string_like() => {
            Value::Bytes(reader.read_lenenc_bytes()?.unwrap_or_default().to_vec())
        }
        // strings, decimals, enum, set, json
        _ => match reader.read_lenenc_bytes()? {
            Some(data) => Value::Text(String::from_utf8_lossy(data).into_owned()),
            None => Value::Null,
        },
    };
    Some(Ok(value))
}

/// `[year(2) month day [hour minute second [micros(4)]]]`; length 0 is the
/// zero date.
fn decode_datetime(column: &ColumnDef, field_type: FieldType, body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    let (date_part, clock) = body.split_at(body.len().min(4));
    let parsed = match date_part {
        [y0, y1, month, day] => {
            NaiveDate::from_ymd_opt(
                i32::from(u16::from_le_bytes([*y0, *y1])),
                u32::from(*month),
                u32::from(*day),
            )
        }
        _ => None,
    }
    .and_then(|date| match (field_type, clock) {
        (FieldType::Date | FieldType::NewDate, _) | (_, []) => {
            if matches!(field_type, FieldType::Date | FieldType::NewDate) {
                Some(Value::Date(date))
            } else {
                date.and_hms_opt(0, 0, 0).map(Value::DateTime)
            }
        }
        (_, [h, mi, s]) => date
            .and_hms_opt(u32::from(*h), u32::from(*mi), u32::from(*s))
            .map(Value::DateTime),
        (_, [h, mi, s, us @ ..]) if us.len() == 4 => date
            .and_hms_micro_opt(
                u32::from(*h),
                u32::from(*mi),
                u32::from(*s),
                u32::from_le_bytes([us[0], us[1], us[2], us[3]]),
            )
            .map(Value::DateTime),
        _ => None,
    });

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            column = %column.name,
            len = body.len(),
            "unrepresentable binary date, decoding as NULL"
        );
        Value::Null
    })
}

/// `[negative(1) days(4) hour minute second [micros(4)]]`; length 0 is
/// `00:00:00`.
fn decode_time(column: &ColumnDef, body: &[u8]) -> Value {
    match body {
        [] => Value::Time(SqlTime::default()),
        [neg, d0, d1, d2, d3, h, mi, s, rest @ ..] if rest.is_empty() || rest.len() == 4 => {
            let days = u32::from_le_bytes([*d0, *d1, *d2, *d3]);
            let micros = match rest {
                [a, b, c, d] => u32::from_le_bytes([*a, *b, *c, *d]),
                _ => 0,
            };
            Value::Time(SqlTime::new(
                *neg != 0,
                days.saturating_mul(24).saturating_add(u32::from(*h)),
                *mi,
                *s,
                micros,
            ))
        }
        _ => {
            tracing::warn!(
                column = %column.name,
                len = body.len(),
                "malformed binary time, decoding as NULL"
            );
            Value::Null
        }
    }
}

fn unknown_type(column: &ColumnDef) -> Error {
    protocol_error(
        format!(
            "column '{}' has unknown type code 0x{:02x} in a binary row",
            column.name, column.type_code
        ),
        &[column.type_code],
    )
}
