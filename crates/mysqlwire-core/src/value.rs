//! Dynamic SQL values.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// This enum is both what the decoders produce for each column and what
/// prepared-statement arguments are bound from. Every variant has exactly one
/// wire encoding, so binding never has to inspect runtime types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 8-bit signed integer
    TinyInt(i8),

    /// 8-bit unsigned integer
    UTinyInt(u8),

    /// 16-bit signed integer
    SmallInt(i16),

    /// 16-bit unsigned integer
    USmallInt(u16),

    /// 32-bit signed integer
    Int(i32),

    /// 32-bit unsigned integer
    UInt(u32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit unsigned integer
    UBigInt(u64),

    /// 32-bit floating point
    Float(f32),

    /// 64-bit floating point
    Double(f64),

    /// UTF-8 text
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// Calendar date
    Date(NaiveDate),

    /// Signed time interval (MySQL TIME)
    Time(SqlTime),

    /// Date and time without zone (DATETIME / TIMESTAMP)
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::TinyInt(_) => "TINYINT",
            Value::UTinyInt(_) => "TINYINT UNSIGNED",
            Value::SmallInt(_) => "SMALLINT",
            Value::USmallInt(_) => "SMALLINT UNSIGNED",
            Value::Int(_) => "INT",
            Value::UInt(_) => "INT UNSIGNED",
            Value::BigInt(_) => "BIGINT",
            Value::UBigInt(_) => "BIGINT UNSIGNED",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::DateTime(_) => "DATETIME",
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::UTinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::USmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::UInt(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to convert this value to a u64. Negative integers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UBigInt(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::UBigInt(v) => Some(*v as f64),
            Value::BigInt(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as raw bytes. Text is returned as its UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UTinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::USmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::TinyInt(i8::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<SqlTime> for Value {
    fn from(v: SqlTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A MySQL `TIME` value.
///
/// Unlike a time of day, `TIME` is a signed interval that can exceed 24 hours
/// (the server range is `-838:59:59` to `838:59:59`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqlTime {
    pub negative: bool,
    pub hours: u32,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

impl SqlTime {
    pub fn new(negative: bool, hours: u32, minutes: u8, seconds: u8, microseconds: u32) -> Self {
        Self {
            negative,
            hours,
            minutes,
            seconds,
            microseconds,
        }
    }

    /// Total length of the interval in microseconds, signed.
    pub fn total_microseconds(&self) -> i64 {
        let secs =
            i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds);
        let total = secs * 1_000_000 + i64::from(self.microseconds);
        if self.negative { -total } else { total }
    }
}

impl fmt::Display for SqlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        if self.microseconds != 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }
        Ok(())
    }
}

/// Error returned when text is not a valid `[-]H:MM:SS[.ffffff]` time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSqlTimeError(String);

impl fmt::Display for ParseSqlTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid TIME value '{}'", self.0)
    }
}

impl std::error::Error for ParseSqlTimeError {}

impl FromStr for SqlTime {
    type Err = ParseSqlTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSqlTimeError(s.to_string());
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (clock, fraction) = match rest.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (rest, None),
        };

        let mut parts = clock.split(':');
        let hours = parts.next().ok_or_else(err)?.parse::<u32>().map_err(|_| err())?;
        let minutes = parts.next().ok_or_else(err)?.parse::<u8>().map_err(|_| err())?;
        let seconds = parts.next().ok_or_else(err)?.parse::<u8>().map_err(|_| err())?;
        if parts.next().is_some() || minutes > 59 || seconds > 59 {
            return Err(err());
        }

        let microseconds = match fraction {
            None => 0,
            Some(digits) if digits.is_empty() || digits.len() > 6 => return Err(err()),
            Some(digits) => {
                let raw = digits.parse::<u32>().map_err(|_| err())?;
                // "5" means 500000us, not 5us
                let exponent = u32::try_from(6 - digits.len()).map_err(|_| err())?;
                raw * 10u32.pow(exponent)
            }
        };

        Ok(SqlTime::new(negative, hours, minutes, seconds, microseconds))
    }
}
