//! Connection configuration.

use std::time::Duration;

use crate::protocol::capabilities::{
    CLIENT_CONNECT_WITH_DB, CLIENT_PLUGIN_AUTH, CLIENT_REQUESTED, UPPER_WORD_MASK,
};
use crate::protocol::charset;

/// Max packet size announced in the handshake response.
pub const DEFAULT_MAX_ALLOWED_PACKET: u32 = 16_777_215;

/// Headroom kept free of argument data when marshaling a statement execute.
pub const PACKET_HEADROOM: usize = 1024 * 1024;

/// MySQL connection configuration.
#[derive(Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Default schema selected during the handshake
    pub database: Option<String>,
    /// Character set id sent in the handshake response
    pub charset: u8,
    pub connect_timeout: Duration,
    /// Socket read timeout; `None` blocks indefinitely
    pub read_timeout: Option<Duration>,
    /// Socket write timeout; `None` blocks indefinitely
    pub write_timeout: Option<Duration>,
    /// Max packet size announced to the server and used to reject
    /// oversized statement arguments
    pub max_allowed_packet: u32,
}

impl std::fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_allowed_packet", &self.max_allowed_packet)
            .finish()
    }
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: None,
            database: None,
            charset: charset::DEFAULT_CHARSET,
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
        }
    }
}

impl MySqlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn max_allowed_packet(mut self, size: u32) -> Self {
        self.max_allowed_packet = size;
        self
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Largest string/blob argument a prepared statement will accept.
    pub fn max_argument_len(&self) -> usize {
        (self.max_allowed_packet as usize).saturating_sub(PACKET_HEADROOM)
    }

    /// Capability flags to send in the handshake response.
    ///
    /// The fixed client set is intersected with the server's low capability
    /// word while the upper word passes through unchanged. Plugin
    /// negotiation is only requested when the server advertises it.
    pub fn capability_flags(&self, server_capabilities: u32) -> u32 {
        let mut flags = CLIENT_REQUESTED & ((server_capabilities & 0xFFFF) | UPPER_WORD_MASK);
        if self.database.is_some() {
            flags |= CLIENT_CONNECT_WITH_DB;
        }
        if server_capabilities & CLIENT_PLUGIN_AUTH != 0 {
            flags |= CLIENT_PLUGIN_AUTH;
        }
        flags
    }
}
