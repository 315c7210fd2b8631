//! Core types shared by the MySQL wire-protocol engine.
//!
//! - `Value` for decoded column values and bound statement arguments
//! - `Row` and `ColumnInfo` for name/index access to decoded rows
//! - `Error` taxonomy separating fatal transport/protocol failures from
//!   recoverable server and argument errors

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ArgumentError, ArgumentErrorKind, ConfigError, Error, HandshakeError, HandshakeErrorKind,
    ProtocolError, Result, ServerError, TransportError, TransportErrorKind, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::{ParseSqlTimeError, SqlTime, Value};
