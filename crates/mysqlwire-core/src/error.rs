//! Error types for MySQL wire-protocol operations.

use std::fmt;

/// The primary error type for all protocol operations.
#[derive(Debug)]
pub enum Error {
    /// Transport failures (short reads, closed stream, socket errors)
    Transport(TransportError),
    /// Handshake or authentication failures
    Handshake(HandshakeError),
    /// An ERR packet sent by the server
    Server(ServerError),
    /// Caller-supplied statement arguments were rejected before sending
    Argument(ArgumentError),
    /// Unexpected bytes or lengths on the wire
    Protocol(ProtocolError),
    /// Configuration errors
    Config(ConfigError),
    /// Typed row access failed
    Type(TypeError),
}

#[derive(Debug)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Failed to establish the underlying stream
    Connect,
    /// The peer closed the stream before the requested bytes arrived
    UnexpectedEof,
    /// Any other read/write failure
    Io,
    /// A previous fatal error left the connection unusable
    Broken,
}

#[derive(Debug)]
pub struct HandshakeError {
    pub kind: HandshakeErrorKind,
    pub message: String,
    /// The server's own error packet, when authentication was rejected
    pub server: Option<ServerError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErrorKind {
    /// No handshake packet was received
    Missing,
    /// The handshake packet could not be parsed
    Malformed,
    /// The handshake carried no scramble bytes
    MissingScramble,
    /// The server rejected the credentials
    AuthFailed,
    /// The server asked for an authentication plugin we cannot speak
    UnsupportedPlugin,
}

/// A decoded `0xFF` error packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u16,
    /// Five-character SQLSTATE, present when the packet carried the `#` marker
    pub sql_state: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct ArgumentError {
    pub kind: ArgumentErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentErrorKind {
    /// Number of bound arguments differs from the statement's parameter count
    CountMismatch { expected: usize, actual: usize },
    /// The value cannot be represented on the wire
    UnsupportedType,
    /// A single string/blob argument exceeds the packet budget
    PayloadTooLarge { size: usize, limit: usize },
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Does this error leave the connection unusable?
    ///
    /// Transport, protocol and handshake failures mean the framing can no
    /// longer be trusted; the caller must reconnect. Server, argument, config
    /// and type errors leave the connection ready for the next command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Protocol(_) | Error::Handshake(_)
        )
    }

    /// MySQL error number, if the server sent one.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server(e) => Some(e.code),
            Error::Handshake(h) => h.server.as_ref().map(|e| e.code),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23000" for integrity violations)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(e) => e.sql_state.as_deref(),
            Error::Handshake(h) => h.server.as_ref().and_then(|e| e.sql_state.as_deref()),
            _ => None,
        }
    }

    /// Build a transport error without an underlying source.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Error::Transport(TransportError {
            kind,
            message: message.into(),
            source: None,
        })
    }
}

impl ServerError {
    /// ER_DUP_ENTRY
    pub fn is_duplicate_key(&self) -> bool {
        self.code == 1062
    }

    /// ER_NO_REFERENCED_ROW / ER_ROW_IS_REFERENCED (and their `_2` variants)
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self.code, 1216 | 1217 | 1451 | 1452)
    }

    /// ER_ACCESS_DENIED_ERROR
    pub fn is_access_denied(&self) -> bool {
        self.code == 1045
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Transport error: {}", e.message),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Server(e) => write!(f, "Server error: {}", e),
            Error::Argument(e) => write!(f, "Argument error: {}", e.message),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Handshake(e) => e
                .server
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server {
            Some(server) => write!(f, "{}: {}", self.message, server),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(state) = &self.sql_state {
            write!(f, "ERROR {} ({}): {}", self.code, state, self.message)
        } else {
            write!(f, "ERROR {}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServerError {}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportErrorKind::UnexpectedEof
        } else {
            TransportErrorKind::Io
        };
        Error::Transport(TransportError {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<ArgumentError> for Error {
    fn from(err: ArgumentError) -> Self {
        Error::Argument(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for wire-protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
