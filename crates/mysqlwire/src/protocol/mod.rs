//! MySQL wire protocol primitives.
//!
//! MySQL packets have a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Maximum packet payload is 2^24 - 1 (16MB - 1). Larger payloads
//! are split into multiple packets.
//!
//! This module also interprets the leading byte of server responses
//! (OK / ERR / EOF / LOCAL INFILE / data).

pub mod codec;
pub mod reader;
pub mod writer;

use mysqlwire_core::{Error, ProtocolError, ServerError};

pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL capability flags (client and server).
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_COMPRESS: u32 = 1 << 5;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities the client asks for before intersecting with the server.
    pub const CLIENT_REQUESTED: u32 = CLIENT_PROTOCOL_41
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LOCAL_FILES
        | CLIENT_MULTI_STATEMENTS
        | CLIENT_MULTI_RESULTS;

    /// Upper 16 bits are kept from the client set regardless of what the
    /// server advertised in the low capability word.
    pub const UPPER_WORD_MASK: u32 = 0xFFFF_0000;
}

/// MySQL command codes (COM_xxx) sent by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Quit connection
    Quit = 0x01,
    /// Switch database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// Ping server
    Ping = 0x0e,
    /// Prepare statement
    StmtPrepare = 0x16,
    /// Execute prepared statement
    StmtExecute = 0x17,
    /// Close prepared statement
    StmtClose = 0x19,
    /// Reset prepared statement
    StmtReset = 0x1a,
}

/// MySQL server status flags.
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_NO_INDEX_USED: u16 = 0x0020;
}

/// MySQL character set codes.
pub mod charset {
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    /// Columns with this charset carry raw bytes, not text.
    pub const BINARY: u8 = 63;

    pub const DEFAULT_CHARSET: u8 = UTF8MB4_GENERAL_CI;
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Server response packet types, by leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// OK packet (0x00)
    Ok,
    /// Error packet (0xFF)
    Error,
    /// EOF marker (0xFE, payload of exactly 1 or 5 bytes)
    Eof,
    /// Local infile request (0xFB)
    LocalInfile,
    /// Anything else: result-set header, column definition or row
    Data,
}

impl PacketType {
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => PacketType::Ok,
            Some(0xFF) => PacketType::Error,
            Some(0xFE) if payload.len() == 1 || payload.len() == 5 => PacketType::Eof,
            Some(0xFB) => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }
}

/// Does this payload end a row sequence?
///
/// Stricter than `PacketType::Eof`: only the 5-byte form terminates rows, so
/// a row that happens to begin with `0xFE` is still read as data.
pub fn is_row_terminator(payload: &[u8]) -> bool {
    payload.len() == 5 && payload[0] == 0xFE
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    /// Zero when the packet stops after the status flags
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn more_results_exist(&self) -> bool {
        self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }
}

/// Parsed EOF packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EofPacket {
    pub fn more_results_exist(&self) -> bool {
        self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }
}

/// A server reply, classified by its leading byte.
#[derive(Debug)]
pub enum Response<'a> {
    Ok(OkPacket),
    Err(ServerError),
    Eof(EofPacket),
    /// The server asks the client to upload the named file
    LocalInfile(String),
    Data(&'a [u8]),
}

/// Classify and decode a response payload.
pub fn interpret(payload: &[u8]) -> Result<Response<'_>, Error> {
    match PacketType::classify(payload) {
        PacketType::Ok => parse_ok_packet(payload).map(Response::Ok),
        PacketType::Error => parse_err_packet(payload).map(Response::Err),
        PacketType::Eof => parse_eof_packet(payload).map(Response::Eof),
        PacketType::LocalInfile => Ok(Response::LocalInfile(
            String::from_utf8_lossy(&payload[1..]).into_owned(),
        )),
        PacketType::Data => Ok(Response::Data(payload)),
    }
}

/// Expect an OK packet, turning an ERR packet into `Error::Server` and
/// anything else into a protocol violation.
pub fn expect_ok(payload: &[u8]) -> Result<OkPacket, Error> {
    match interpret(payload)? {
        Response::Ok(ok) => Ok(ok),
        Response::Err(err) => Err(Error::Server(err)),
        _ => Err(protocol_error("expected OK or ERR packet", payload)),
    }
}

/// Decode an OK packet (`0x00`, lenenc affected rows, lenenc insert id,
/// status flags, then optional warnings and info).
pub fn parse_ok_packet(payload: &[u8]) -> Result<OkPacket, Error> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0x00) {
        return Err(protocol_error("OK packet must start with 0x00", payload));
    }
    let truncated = || protocol_error("truncated OK packet", payload);

    let affected_rows = reader.read_lenenc_int().flatten().ok_or_else(truncated)?;
    let last_insert_id = reader.read_lenenc_int().flatten().ok_or_else(truncated)?;
    let status_flags = reader.read_u16_le().ok_or_else(truncated)?;
    let warnings = reader.read_u16_le().unwrap_or(0);
    let info = reader.read_rest_string();

    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Decode an ERR packet.
///
/// Layout: `0xFF`, 2-byte error code, then optionally `#` plus a 5-byte
/// SQLSTATE, then the message to end of packet.
pub fn parse_err_packet(payload: &[u8]) -> Result<ServerError, Error> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0xFF) {
        return Err(protocol_error("ERR packet must start with 0xFF", payload));
    }
    let code = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("truncated ERR packet", payload))?;

    let sql_state = if reader.peek() == Some(b'#') {
        reader.skip(1);
        Some(
            reader
                .read_string(5)
                .ok_or_else(|| protocol_error("truncated SQLSTATE in ERR packet", payload))?,
        )
    } else {
        None
    };

    Ok(ServerError {
        code,
        sql_state,
        message: reader.read_rest_string(),
    })
}

/// Decode an EOF packet. The 1-byte form carries no warnings or status.
pub fn parse_eof_packet(payload: &[u8]) -> Result<EofPacket, Error> {
    match payload {
        [0xFE] => Ok(EofPacket::default()),
        [0xFE, w0, w1, s0, s1] => Ok(EofPacket {
            warnings: u16::from_le_bytes([*w0, *w1]),
            status_flags: u16::from_le_bytes([*s0, *s1]),
        }),
        _ => Err(protocol_error("malformed EOF packet", payload)),
    }
}

/// Build a protocol-violation error carrying the offending bytes.
pub(crate) fn protocol_error(message: impl Into<String>, raw: &[u8]) -> Error {
    const KEEP: usize = 64;
    Error::Protocol(ProtocolError {
        message: message.into(),
        raw_data: Some(raw[..raw.len().min(KEEP)].to_vec()),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_header_roundtrip() {
        let header = PacketHeader {
            payload_length: 0x0012_3456,
            sequence_id: 7,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [0x56, 0x34, 0x12, 7]);
        assert_eq!(PacketHeader::from_bytes(&bytes), header);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn test_packet_header_max_size() {
        let header = PacketHeader {
            payload_length: MAX_PACKET_SIZE as u32,
            sequence_id: 255,
        };
        assert_eq!(header.to_bytes(), [0xFF, 0xFF, 0xFF, 255]);
    }

    #[test]
    fn test_packet_type_detection() {
        assert_eq!(PacketType::classify(&[0x00, 0, 0, 0, 0]), PacketType::Ok);
        assert_eq!(PacketType::classify(&[0xFF, 1, 0]), PacketType::Error);
        assert_eq!(PacketType::classify(&[0xFE]), PacketType::Eof);
        assert_eq!(PacketType::classify(&[0xFE, 0, 0, 2, 0]), PacketType::Eof);
        assert_eq!(PacketType::classify(&[0xFE, 0, 0]), PacketType::Data);
        assert_eq!(PacketType::classify(&[0xFB, b'f']), PacketType::LocalInfile);
        assert_eq!(PacketType::classify(&[0x03]), PacketType::Data);
    }

    #[test]
    fn test_row_terminator_is_five_bytes_only() {
        assert!(is_row_terminator(&[0xFE, 0, 0, 0, 0]));
        assert!(!is_row_terminator(&[0xFE]));
        assert!(!is_row_terminator(&[0xFE, 0, 0, 0, 0, 0]));
        assert!(!is_row_terminator(&[0x00, 0, 0, 0, 0]));
    }

    #[test]
    fn test_parse_minimal_ok_packet() {
        let ok = parse_ok_packet(&[0x00, 0x02, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(ok.affected_rows, 2);
        assert_eq!(ok.last_insert_id, 0);
        assert_eq!(ok.status_flags, 0);
        assert_eq!(ok.warnings, 0);
        assert!(ok.info.is_empty());
    }

    #[test]
    fn test_parse_full_ok_packet() {
        let mut data = vec![0x00, 0xFC, 0x10, 0x27, 0x2A, 0x0A, 0x00, 0x01, 0x00];
        data.extend_from_slice(b"Rows matched: 1");
        let ok = parse_ok_packet(&data).unwrap();
        assert_eq!(ok.affected_rows, 10_000);
        assert_eq!(ok.last_insert_id, 42);
        assert!(ok.more_results_exist());
        assert_eq!(ok.warnings, 1);
        assert_eq!(ok.info, "Rows matched: 1");
    }

    #[test]
    fn test_parse_truncated_ok_packet() {
        let err = parse_ok_packet(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_parse_err_packet_with_sqlstate() {
        let mut data = vec![0xFF, 0x34, 0x12, b'#'];
        data.extend_from_slice(b"HY000");
        data.extend_from_slice(b"Something broke");
        let err = parse_err_packet(&data).unwrap();
        assert_eq!(err.code, 0x1234);
        assert_eq!(err.sql_state.as_deref(), Some("HY000"));
        assert_eq!(err.message, "Something broke");
    }

    #[test]
    fn test_parse_err_packet_without_sqlstate() {
        let mut data = vec![0xFF, 0x15, 0x04];
        data.extend_from_slice(b"Access denied");
        let err = parse_err_packet(&data).unwrap();
        assert_eq!(err.code, 1045);
        assert_eq!(err.sql_state, None);
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn test_parse_eof_packet() {
        let eof = parse_eof_packet(&[0xFE, 0x01, 0x00, 0x08, 0x00]).unwrap();
        assert_eq!(eof.warnings, 1);
        assert!(eof.more_results_exist());
        assert_eq!(parse_eof_packet(&[0xFE]).unwrap(), EofPacket::default());
        assert!(parse_eof_packet(&[0xFE, 0x00]).is_err());
    }

    #[test]
    fn test_interpret_and_expect_ok() {
        assert!(matches!(
            interpret(&[0x01]).unwrap(),
            Response::Data(&[0x01])
        ));
        match interpret(b"\xFBdata.csv").unwrap() {
            Response::LocalInfile(name) => assert_eq!(name, "data.csv"),
            other => panic!("unexpected response: {other:?}"),
        }

        let err = expect_ok(&[0xFF, 0x15, 0x04, b'x']).unwrap_err();
        assert_eq!(err.server_code(), Some(1045));
        assert!(!err.is_fatal());

        let err = expect_ok(&[0x42]).unwrap_err();
        assert!(err.is_fatal());
    }
}
