//! Connection-phase handshake and authentication.
//!
//! The negotiator walks `AwaitingHandshake -> AuthSent -> Authenticated`,
//! or ends in `AuthFailed` when the server rejects the credentials. Between
//! `AuthSent` and the final verdict the server may ask to switch plugins or,
//! for `caching_sha2_password`, run the fast/full authentication exchange.

use mysqlwire_core::{Error, HandshakeError, HandshakeErrorKind, Result, ServerError};

use crate::auth::{self, caching_sha2, plugins};
use crate::config::MySqlConfig;
use crate::framer::PacketFramer;
use crate::protocol::capabilities::{CLIENT_PLUGIN_AUTH, CLIENT_SECURE_CONNECTION};
use crate::protocol::{OkPacket, PacketReader, PacketWriter, parse_err_packet, parse_ok_packet};
use crate::transport::Transport;

/// Upper bound on server-driven auth round trips (switches, more-data).
const MAX_AUTH_ROUNDS: usize = 8;

/// Initial handshake (protocol version 10) sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    /// 20 bytes when the extended block is present, 8 otherwise
    pub scramble: Vec<u8>,
    /// Default plugin, when the server advertises `CLIENT_PLUGIN_AUTH`
    pub auth_plugin: Option<String>,
}

impl Handshake {
    /// Parse the server's initial handshake packet.
    #[allow(clippy::result_large_err)]
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload.first() {
            None => {
                return Err(handshake_error(
                    HandshakeErrorKind::Missing,
                    "empty handshake packet",
                ));
            }
            Some(0xFF) => {
                return Err(Error::Handshake(HandshakeError {
                    kind: HandshakeErrorKind::Missing,
                    message: "server refused the connection".to_string(),
                    server: parse_err_packet(payload).ok(),
                }));
            }
            Some(_) => {}
        }

        let mut reader = PacketReader::new(payload);
        let malformed = |field: &str| {
            handshake_error(
                HandshakeErrorKind::Malformed,
                format!("handshake truncated at {field}"),
            )
        };

        let protocol_version = reader.read_u8().ok_or_else(|| malformed("protocol version"))?;
        let server_version = reader
            .read_null_string()
            .ok_or_else(|| malformed("server version"))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| malformed("connection id"))?;
        let missing_scramble = || {
            handshake_error(
                HandshakeErrorKind::MissingScramble,
                "handshake carried no scramble",
            )
        };
        let mut scramble = reader.read_bytes(8).ok_or_else(missing_scramble)?.to_vec();
        reader.skip(1).ok_or_else(|| malformed("filler"))?;
        let caps_low = reader
            .read_u16_le()
            .ok_or_else(|| malformed("capability flags"))?;

        let mut handshake = Handshake {
            protocol_version,
            server_version,
            connection_id,
            capabilities: u32::from(caps_low),
            charset: 0,
            status_flags: 0,
            scramble: Vec::new(),
            auth_plugin: None,
        };

        if !reader.is_empty() {
            // charset(1) status(2) caps-high(2) auth-data-len(1) reserved(10)
            handshake.charset = reader.read_u8().ok_or_else(|| malformed("charset"))?;
            handshake.status_flags = reader.read_u16_le().ok_or_else(|| malformed("status"))?;
            let caps_high = reader
                .read_u16_le()
                .ok_or_else(|| malformed("capability flags"))?;
            handshake.capabilities |= u32::from(caps_high) << 16;
            reader.skip(11).ok_or_else(|| malformed("reserved bytes"))?;

            let part2 = reader.read_bytes(12).ok_or_else(missing_scramble)?;
            scramble.extend_from_slice(part2);

            if reader.peek() == Some(0) {
                reader.skip(1);
            }
            if handshake.capabilities & CLIENT_PLUGIN_AUTH != 0 && !reader.is_empty() {
                handshake.auth_plugin = reader.read_null_string().filter(|p| !p.is_empty());
            }
        }

        handshake.scramble = scramble;
        Ok(handshake)
    }
}

/// Authentication progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingHandshake,
    AuthSent,
    Authenticated,
    AuthFailed,
}

/// What a successful connection phase leaves behind.
#[derive(Debug, Clone)]
pub struct Session {
    pub handshake: Handshake,
    /// Capability flags agreed with the server
    pub capabilities: u32,
    /// Plugin that completed authentication
    pub auth_plugin: String,
    /// Final OK packet; a bare `0xFE` reply leaves this at its default
    pub ok: OkPacket,
}

/// Build the handshake response packet payload.
pub fn build_handshake_response(
    config: &MySqlConfig,
    capabilities: u32,
    plugin: &str,
    token: &[u8],
) -> Result<Vec<u8>> {
    let mut writer = PacketWriter::with_capacity(64 + config.user.len() + token.len());
    writer.write_u32_le(capabilities);
    writer.write_u32_le(config.max_allowed_packet);
    writer.write_u8(config.charset);
    writer.write_zeros(23);
    writer.write_null_string(&config.user);

    // Tokens are at most 32 bytes for the hashed plugins; the clear
    // password plugin is the only one that can exceed 255.
    if capabilities & CLIENT_SECURE_CONNECTION != 0 {
        let len = u8::try_from(token.len()).map_err(|_| {
            handshake_error(
                HandshakeErrorKind::Malformed,
                format!(
                    "auth response of {} bytes does not fit a 1-byte length",
                    token.len()
                ),
            )
        })?;
        writer.write_u8(len);
        writer.write_bytes(token);
    } else {
        writer.write_bytes(token);
        if token.last() != Some(&0) {
            writer.write_u8(0);
        }
    }

    if let Some(db) = &config.database {
        writer.write_null_string(db);
    }
    writer.write_null_string(plugin);
    Ok(writer.into_bytes())
}

/// Drives the connection phase over a freshly opened framer.
pub struct Negotiator<'a> {
    config: &'a MySqlConfig,
    state: AuthState,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a MySqlConfig) -> Self {
        Self {
            config,
            state: AuthState::AwaitingHandshake,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn password(&self) -> &str {
        self.config.password.as_deref().unwrap_or("")
    }

    /// Run the full connection phase.
    #[allow(clippy::result_large_err)]
    pub fn run<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<Session> {
        let result = self.negotiate(framer);
        if result.is_err() {
            self.state = AuthState::AuthFailed;
        }
        result
    }

    #[allow(clippy::result_large_err)]
    fn negotiate<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<Session> {
        let payload = framer.read_packet()?;
        let handshake = Handshake::parse(&payload)?;
        tracing::debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            capabilities = handshake.capabilities,
            plugin = handshake.auth_plugin.as_deref().unwrap_or(""),
            "received server handshake"
        );

        let capabilities = self.config.capability_flags(handshake.capabilities);
        let mut plugin = match handshake.auth_plugin.as_deref() {
            Some(p) if capabilities & CLIENT_PLUGIN_AUTH != 0 && auth::is_supported(p) => {
                p.to_string()
            }
            _ => plugins::MYSQL_NATIVE_PASSWORD.to_string(),
        };
        let mut scramble = handshake.scramble.clone();

        let token = auth::auth_response(&plugin, self.password(), &scramble)?;
        let response = build_handshake_response(self.config, capabilities, &plugin, &token)?;
        framer.write_packet(&response)?;
        self.state = AuthState::AuthSent;
        tracing::debug!(plugin = %plugin, "sent handshake response");

        let mut requested_key = false;
        for _ in 0..MAX_AUTH_ROUNDS {
            let reply = framer.read_packet()?;
            match reply.first().copied() {
                Some(0x00) => {
                    let ok = parse_ok_packet(&reply)?;
                    return Ok(self.authenticated(handshake, capabilities, plugin, ok));
                }
                Some(0xFF) => {
                    let server = parse_err_packet(&reply)?;
                    return Err(self.rejected(server));
                }
                Some(0xFE) if reply.len() == 1 => {
                    // Old-style switch request without a plugin name; the
                    // connection proceeds as authenticated.
                    return Ok(self.authenticated(
                        handshake,
                        capabilities,
                        plugin,
                        OkPacket::default(),
                    ));
                }
                Some(0xFE) => {
                    let mut reader = PacketReader::new(&reply[1..]);
                    let name = reader.read_null_string().unwrap_or_default();
                    if !auth::is_supported(&name) {
                        return Err(handshake_error(
                            HandshakeErrorKind::UnsupportedPlugin,
                            format!("server requested unsupported plugin '{name}'"),
                        ));
                    }
                    let data = reader.read_rest();
                    scramble = data.strip_suffix(&[0]).unwrap_or(data).to_vec();
                    plugin = name;
                    tracing::debug!(plugin = %plugin, "auth switch requested");
                    let token = auth::auth_response(&plugin, self.password(), &scramble)?;
                    framer.write_packet(&token)?;
                }
                Some(caching_sha2::MORE_DATA) if plugin == plugins::CACHING_SHA2_PASSWORD => {
                    let data = &reply[1..];
                    if requested_key {
                        let encrypted =
                            auth::encrypt_password_rsa(self.password(), &scramble, data)?;
                        framer.write_packet(&encrypted)?;
                        continue;
                    }
                    match data.first().copied() {
                        Some(caching_sha2::FAST_AUTH_SUCCESS) => {
                            tracing::debug!("caching_sha2 fast auth succeeded");
                        }
                        Some(caching_sha2::PERFORM_FULL_AUTH) => {
                            tracing::debug!("caching_sha2 full auth, requesting public key");
                            framer.write_packet(&[caching_sha2::REQUEST_PUBLIC_KEY])?;
                            requested_key = true;
                        }
                        _ => {
                            return Err(handshake_error(
                                HandshakeErrorKind::Malformed,
                                "unexpected caching_sha2_password message",
                            ));
                        }
                    }
                }
                _ => {
                    return Err(handshake_error(
                        HandshakeErrorKind::Malformed,
                        "unexpected packet during authentication",
                    ));
                }
            }
        }

        Err(handshake_error(
            HandshakeErrorKind::Malformed,
            "authentication did not complete",
        ))
    }

    fn authenticated(
        &mut self,
        handshake: Handshake,
        capabilities: u32,
        auth_plugin: String,
        ok: OkPacket,
    ) -> Session {
        self.state = AuthState::Authenticated;
        tracing::debug!(plugin = %auth_plugin, "authenticated");
        Session {
            handshake,
            capabilities,
            auth_plugin,
            ok,
        }
    }

    fn rejected(&mut self, server: ServerError) -> Error {
        self.state = AuthState::AuthFailed;
        tracing::debug!(code = server.code, "authentication rejected");
        Error::Handshake(HandshakeError {
            kind: HandshakeErrorKind::AuthFailed,
            message: "authentication failed".to_string(),
            server: Some(server),
        })
    }
}

fn handshake_error(kind: HandshakeErrorKind, message: impl Into<String>) -> Error {
    Error::Handshake(HandshakeError {
        kind,
        message: message.into(),
        server: None,
    })
}
