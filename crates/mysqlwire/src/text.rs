//! Text protocol rows (COM_QUERY results).
//!
//! Every value arrives as a length-encoded string, numeric columns included,
//! and is converted according to the column's declared type and `UNSIGNED`
//! flag. A NULL length marker decodes to `Value::Null`.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use mysqlwire_core::{ColumnInfo, Result, Row, SqlTime, Value};

use crate::protocol::{PacketReader, protocol_error};
use crate::types::{ColumnDef, FieldType};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Decode one text-protocol row packet.
#[allow(clippy::result_large_err)]
pub fn decode_row(payload: &[u8], columns: &[ColumnDef], info: &Arc<ColumnInfo>) -> Result<Row> {
    let mut reader = PacketReader::new(payload);
    let mut values = Vec::with_capacity(columns.len());

    for column in columns {
        let raw = reader.read_lenenc_bytes().ok_or_else(|| {
            protocol_error(
                format!("text row truncated at column '{}'", column.name),
                payload,
            )
        })?;
        values.push(match raw {
            None => Value::Null,
            Some(data) => decode_value(column, data),
        });
    }

    Ok(Row::with_columns(Arc::clone(info), values))
}

/// Convert one textual column value.
///
/// Numbers that fail to parse are kept as text. Temporal values the server
/// sends in a form chrono cannot represent (zero dates such as `0000-00-00`)
/// and unknown type codes become `Value::Null`.
pub fn decode_value(column: &ColumnDef, data: &[u8]) -> Value {
    let Some(field_type) = column.field_type() else {
        tracing::warn!(
            column = %column.name,
            type_code = column.type_code,
            "unknown column type, decoding as NULL"
        );
        return Value::Null;
    };

    if column.is_binary() && (field_type.is_string_like() || field_type == FieldType::Geometry) {
        return Value::Bytes(data.to_vec());
    }

    let text = String::from_utf8_lossy(data);
    let unsigned = column.is_unsigned();

    match field_type {
        FieldType::Tiny if unsigned => parse_or_text(&text, Value::UTinyInt),
        FieldType::Tiny => parse_or_text(&text, Value::TinyInt),
        FieldType::Short | FieldType::Year if unsigned => parse_or_text(&text, Value::USmallInt),
        FieldType::Short | FieldType::Year => parse_or_text(&text, Value::SmallInt),
        FieldType::Long | FieldType::Int24 if unsigned => parse_or_text(&text, Value::UInt),
        FieldType::Long | FieldType::Int24 => parse_or_text(&text, Value::Int),
        FieldType::LongLong if unsigned => parse_or_text(&text, Value::UBigInt),
        FieldType::LongLong => parse_or_text(&text, Value::BigInt),
        FieldType::Float => parse_or_text(&text, Value::Float),
        FieldType::Double => parse_or_text(&text, Value::Double),

        FieldType::Date | FieldType::NewDate => {
            let parsed = NaiveDate::parse_from_str(&text, DATE_FORMAT).ok();
            temporal(column, &text, parsed.map(Value::Date))
        }
        FieldType::DateTime
        | FieldType::DateTime2
        | FieldType::Timestamp
        | FieldType::Timestamp2 => temporal(
            column,
            &text,
            NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                .ok()
                .map(Value::DateTime),
        ),
        FieldType::Time | FieldType::Time2 => {
            temporal(column, &text, SqlTime::from_str(&text).ok().map(Value::Time))
        }

        FieldType::Bit => Value::Bytes(data.to_vec()),
        FieldType::Null => Value::Null,

        // decimal, enum, set, json, geometry and the string types
        _ => Value::Text(text.into_owned()),
    }
}

fn parse_or_text<T: FromStr>(text: &str, wrap: impl FnOnce(T) -> Value) -> Value {
    text.parse::<T>()
        .map_or_else(|_| Value::Text(text.to_string()), wrap)
}

fn temporal(column: &ColumnDef, text: &str, parsed: Option<Value>) -> Value {
    parsed.unwrap_or_else(|| {
        tracing::warn!(
            column = %column.name,
            value = text,
            "unrepresentable temporal value, decoding as NULL"
        );
        Value::Null
    })
}
