//! MySQL connection: one transport, one outstanding command at a time.
//!
//! A connection is `Ready` after the handshake. Transport, protocol and
//! handshake errors move it to `Broken`, after which every command fails
//! without touching the wire; server and argument errors leave it `Ready`.
//!
//! Rows of a lazily read response (`query_iter`, `query_prepared_iter`) stay
//! on the wire until consumed. Starting another command first drains whatever
//! the previous response still had pending.

use std::net::{TcpStream, ToSocketAddrs};

use mysqlwire_core::{ConfigError, Error, Result, Row, TransportError, TransportErrorKind, Value};

use crate::config::MySqlConfig;
use crate::framer::PacketFramer;
use crate::handshake::{Handshake, Negotiator};
use crate::prepared::{self, PrepareOk, PreparedStatement};
use crate::protocol::{Command, OkPacket, PacketType, PacketWriter, expect_ok, parse_err_packet};
use crate::result::{Cursor, ResultSet, ResultStatus, RowFormat};
use crate::transport::Transport;
use crate::types::ColumnDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Authenticated and able to accept a command
    Ready,
    /// A fatal error desynchronized the stream
    Broken,
    /// COM_QUIT was sent
    Closed,
}

pub struct MySqlConnection<T: Transport = TcpStream> {
    framer: PacketFramer<T>,
    state: ConnectionState,
    config: MySqlConfig,
    handshake: Handshake,
    capabilities: u32,
    auth_plugin: String,
    /// Response of the last command, possibly not fully read
    cursor: Option<Cursor>,
    affected_rows: u64,
    last_insert_id: u64,
    status_flags: u16,
    warnings: u16,
}

impl<T: Transport> std::fmt::Debug for MySqlConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("connection_id", &self.handshake.connection_id)
            .field("server_version", &self.handshake.server_version)
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection<TcpStream> {
    /// Open a TCP connection and authenticate.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(
        level = "debug",
        skip(config),
        fields(host = %config.host, port = config.port)
    )]
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        let addrs = config.socket_addr().to_socket_addrs().map_err(|e| {
            Error::Config(ConfigError {
                message: format!("cannot resolve {}: {e}", config.socket_addr()),
                source: Some(Box::new(e)),
            })
        })?;

        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let stream = stream.ok_or_else(|| {
            Error::Transport(TransportError {
                kind: TransportErrorKind::Connect,
                message: format!("failed to connect to {}", config.socket_addr()),
                source: last_err.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            })
        })?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;

        Self::establish(stream, config)
    }
}

impl<T: Transport> MySqlConnection<T> {
    /// Run the handshake over an already connected transport.
    #[allow(clippy::result_large_err)]
    pub fn establish(transport: T, config: MySqlConfig) -> Result<Self> {
        let mut framer = PacketFramer::new(transport);
        framer.set_max_payload(config.max_allowed_packet as usize);
        let session = match Negotiator::new(&config).run(&mut framer) {
            Ok(session) => session,
            Err(err) => {
                // best effort, the handshake error is what matters
                let _ = framer.close();
                return Err(err);
            }
        };
        tracing::debug!(
            connection_id = session.handshake.connection_id,
            plugin = %session.auth_plugin,
            "connection ready"
        );

        Ok(Self {
            framer,
            state: ConnectionState::Ready,
            config,
            capabilities: session.capabilities,
            auth_plugin: session.auth_plugin,
            handshake: session.handshake,
            cursor: None,
            affected_rows: session.ok.affected_rows,
            last_insert_id: session.ok.last_insert_id,
            status_flags: session.ok.status_flags,
            warnings: session.ok.warnings,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    pub fn connection_id(&self) -> u32 {
        self.handshake.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.handshake.server_version
    }

    /// Capability flags agreed during the handshake.
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    pub fn auth_plugin(&self) -> &str {
        &self.auth_plugin
    }

    /// Affected rows reported by the last completed statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Run a text query and read every result set it produces.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, sql), fields(sql_len = sql.len()))]
    pub fn query(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        self.send_query(sql)?;
        self.read_all(RowFormat::Text)
    }

    /// Run a text query and stream its rows.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, sql), fields(sql_len = sql.len()))]
    pub fn query_iter(&mut self, sql: &str) -> Result<ResultStream<'_, T>> {
        self.send_query(sql)?;
        self.open_stream(RowFormat::Text)
    }

    /// Run a statement for its side effects, discarding any rows.
    ///
    /// Returns the affected-row count of the last result.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, sql), fields(sql_len = sql.len()))]
    pub fn exec(&mut self, sql: &str) -> Result<u64> {
        self.send_query(sql)?;
        self.drain_response(RowFormat::Text)
    }

    /// Switch the default schema (COM_INIT_DB).
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn use_database(&mut self, database: &str) -> Result<()> {
        let mut writer = PacketWriter::command(Command::InitDb);
        writer.write_bytes(database.as_bytes());
        self.send_command(&writer.into_bytes())?;
        let ok = self.read_ok()?;
        self.record_ok(&ok);
        self.config.database = Some(database.to_string());
        Ok(())
    }

    /// Prepare a statement on the server.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, sql), fields(sql_len = sql.len()))]
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.send_command(&prepared::build_prepare(sql))?;
        let result = self.read_prepare_response(sql);
        self.checked(result)
    }

    /// Execute a prepared statement, discarding any rows.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(
        level = "debug",
        skip(self, stmt, args),
        fields(id = stmt.id, args = args.len())
    )]
    pub fn execute(&mut self, stmt: &PreparedStatement, args: &[Value]) -> Result<u64> {
        self.send_execute(stmt, args)?;
        self.drain_response(RowFormat::Binary)
    }

    /// Execute a prepared statement and read every result set.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(
        level = "debug",
        skip(self, stmt, args),
        fields(id = stmt.id, args = args.len())
    )]
    pub fn query_prepared(
        &mut self,
        stmt: &PreparedStatement,
        args: &[Value],
    ) -> Result<Vec<ResultSet>> {
        self.send_execute(stmt, args)?;
        self.read_all(RowFormat::Binary)
    }

    /// Execute a prepared statement and stream its rows.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(
        level = "debug",
        skip(self, stmt, args),
        fields(id = stmt.id, args = args.len())
    )]
    pub fn query_prepared_iter(
        &mut self,
        stmt: &PreparedStatement,
        args: &[Value],
    ) -> Result<ResultStream<'_, T>> {
        self.send_execute(stmt, args)?;
        self.open_stream(RowFormat::Binary)
    }

    /// Release a prepared statement on the server. The server does not reply.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, stmt), fields(id = stmt.id))]
    pub fn close_statement(&mut self, stmt: PreparedStatement) -> Result<()> {
        self.send_command(&prepared::build_close(stmt.id))
    }

    /// Reset a prepared statement's server-side state (COM_STMT_RESET).
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, stmt), fields(id = stmt.id))]
    pub fn reset_statement(&mut self, stmt: &PreparedStatement) -> Result<()> {
        self.send_command(&prepared::build_reset(stmt.id))?;
        let ok = self.read_ok()?;
        self.record_ok(&ok);
        Ok(())
    }

    /// Check that the server is alive (COM_PING).
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn ping(&mut self) -> Result<()> {
        self.send_command(&[Command::Ping as u8])?;
        self.read_ok().map(drop)
    }

    /// Send COM_QUIT and close the transport.
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    /// Like `close`, but keeps the connection value around in the `Closed`
    /// state. A broken connection is closed without sending anything.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let quit = if self.state == ConnectionState::Ready {
            self.cursor = None;
            self.framer.write_command(&[Command::Quit as u8])
        } else {
            Ok(())
        };
        self.state = ConnectionState::Closed;
        let closed = self.framer.close();
        quit.and(closed)
    }

    /// Give back the transport without closing it.
    pub fn into_transport(self) -> T {
        self.framer.into_inner()
    }

    // -- command plumbing --------------------------------------------------

    #[allow(clippy::result_large_err)]
    fn send_query(&mut self, sql: &str) -> Result<()> {
        let mut writer = PacketWriter::with_capacity(1 + sql.len());
        writer.write_u8(Command::Query as u8);
        writer.write_bytes(sql.as_bytes());
        self.send_command(&writer.into_bytes())
    }

    #[allow(clippy::result_large_err)]
    fn send_execute(&mut self, stmt: &PreparedStatement, args: &[Value]) -> Result<()> {
        // argument errors surface before anything reaches the wire
        let payload = prepared::build_execute(stmt, args, self.config.max_argument_len())?;
        self.send_command(&payload)
    }

    /// Make sure the connection can take a command, drain any pending
    /// response, then write `payload` with a fresh sequence.
    #[allow(clippy::result_large_err)]
    fn send_command(&mut self, payload: &[u8]) -> Result<()> {
        match self.state {
            ConnectionState::Ready => {}
            ConnectionState::Broken => {
                return Err(Error::transport(
                    TransportErrorKind::Broken,
                    "connection is broken",
                ));
            }
            ConnectionState::Closed => {
                return Err(Error::transport(
                    TransportErrorKind::Broken,
                    "connection is closed",
                ));
            }
        }

        if let Some(mut cursor) = self.cursor.take() {
            if !cursor.is_finished() {
                tracing::debug!("draining unread rows of the previous command");
                match cursor.drain(&mut self.framer) {
                    Ok(()) => self.record_status(cursor.status()),
                    // The error belongs to the abandoned command; the response
                    // is over, so the new command still goes out.
                    Err(err) if !err.is_fatal() => {
                        tracing::debug!(error = %err, "discarding error of the previous command");
                    }
                    Err(err) => return self.checked(Err(err)),
                }
            }
        }

        tracing::trace!(
            command = payload.first().copied().unwrap_or(0),
            len = payload.len(),
            "sending command"
        );
        let written = self.framer.write_command(payload);
        self.checked(written)
    }

    #[allow(clippy::result_large_err)]
    fn read_ok(&mut self) -> Result<OkPacket> {
        let result = self.framer.read_packet().and_then(|p| expect_ok(&p));
        self.checked(result)
    }

    #[allow(clippy::result_large_err)]
    fn read_all(&mut self, format: RowFormat) -> Result<Vec<ResultSet>> {
        let mut cursor = Cursor::new(format);
        let mut sets = Vec::new();
        loop {
            let set = cursor.collect(&mut self.framer);
            let set = self.checked(set)?;
            tracing::debug!(rows = set.rows.len(), columns = set.columns.len(), "result set read");
            let more = set.has_more_results;
            sets.push(set);
            if !more {
                break;
            }
        }
        self.record_status(cursor.status());
        Ok(sets)
    }

    #[allow(clippy::result_large_err)]
    fn drain_response(&mut self, format: RowFormat) -> Result<u64> {
        let mut cursor = Cursor::new(format);
        let drained = cursor.drain(&mut self.framer);
        self.checked(drained)?;
        self.record_status(cursor.status());
        Ok(self.affected_rows)
    }

    #[allow(clippy::result_large_err)]
    fn open_stream(&mut self, format: RowFormat) -> Result<ResultStream<'_, T>> {
        let mut cursor = Cursor::new(format);
        let header = cursor.read_header(&mut self.framer);
        self.checked(header)?;
        self.cursor = Some(cursor);
        Ok(ResultStream { conn: self })
    }

    #[allow(clippy::result_large_err)]
    fn read_prepare_response(&mut self, sql: &str) -> Result<PreparedStatement> {
        let payload = self.framer.read_packet()?;
        if payload.first() == Some(&0xFF) {
            return Err(Error::Server(parse_err_packet(&payload)?));
        }
        let ok = PrepareOk::parse(&payload)?;
        tracing::debug!(
            id = ok.statement_id,
            params = ok.num_params,
            columns = ok.num_columns,
            "statement prepared"
        );

        if ok.num_params > 0 {
            // parameter definitions are mandatory on the wire but never used
            self.read_definitions(usize::from(ok.num_params))?;
        }
        let columns = if ok.num_columns > 0 {
            self.read_definitions(usize::from(ok.num_columns))?
                .iter()
                .map(|p| ColumnDef::parse(p))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        self.warnings = ok.warnings;
        Ok(PreparedStatement::new(ok, sql, columns))
    }

    /// Read `count` definition packets and the EOF that closes the block.
    #[allow(clippy::result_large_err)]
    fn read_definitions(&mut self, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut packets = Vec::with_capacity(count);
        for _ in 0..count {
            packets.push(self.framer.read_packet()?);
        }
        let eof = self.framer.read_packet()?;
        if PacketType::classify(&eof) != PacketType::Eof {
            return Err(crate::protocol::protocol_error(
                "expected EOF after definition block",
                &eof,
            ));
        }
        Ok(packets)
    }

    /// Mark the connection broken when `result` carries a fatal error.
    #[allow(clippy::result_large_err)]
    fn checked<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.is_fatal() && self.state == ConnectionState::Ready {
                tracing::warn!(error = %err, "connection is now broken");
                self.state = ConnectionState::Broken;
                self.cursor = None;
            }
        }
        result
    }

    fn record_ok(&mut self, ok: &OkPacket) {
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
    }

    fn record_status(&mut self, status: &ResultStatus) {
        self.affected_rows = status.affected_rows;
        self.last_insert_id = status.last_insert_id;
        self.status_flags = status.status_flags;
        self.warnings = status.warnings;
    }
}

/// Lazy cursor over the rows of a command response.
///
/// Iterating yields the rows of the current result set; `next_result_set`
/// moves on to the next one. Dropping the stream early is allowed: the rows
/// left on the wire are drained when the connection sends its next command.
pub struct ResultStream<'c, T: Transport> {
    conn: &'c mut MySqlConnection<T>,
}

impl<T: Transport> ResultStream<'_, T> {
    fn cursor(&self) -> Option<&Cursor> {
        self.conn.cursor.as_ref()
    }

    /// Columns of the current result set; empty for an OK result.
    pub fn columns(&self) -> &[ColumnDef] {
        self.cursor().map(Cursor::columns).unwrap_or_default()
    }

    /// Has the current result set been read to its end?
    pub fn eof_reached(&self) -> bool {
        self.cursor().is_some_and(|c| c.status().eof_reached)
    }

    /// Does another result set follow? Only meaningful after `eof_reached`.
    pub fn has_more_results(&self) -> bool {
        self.cursor().is_some_and(|c| c.status().has_more_results)
    }

    /// Status of the current result set once it has ended.
    pub fn status(&self) -> Option<&ResultStatus> {
        self.cursor().map(Cursor::status)
    }

    /// Skip what is left of the current result set and read the header of
    /// the next. Returns `false` when the response is exhausted.
    #[allow(clippy::result_large_err)]
    pub fn next_result_set(&mut self) -> Result<bool> {
        while let Some(row) = self.next() {
            row?;
        }
        let conn = &mut *self.conn;
        let Some(cursor) = conn.cursor.as_mut() else {
            return Ok(false);
        };
        if cursor.is_finished() {
            return Ok(false);
        }
        let header = cursor.read_header(&mut conn.framer);
        conn.checked(header)?;
        Ok(true)
    }
}

impl<T: Transport> Iterator for ResultStream<'_, T> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let conn = &mut *self.conn;
        let cursor = conn.cursor.as_mut()?;
        match cursor.next_row(&mut conn.framer) {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                let status = cursor.status().clone();
                conn.record_status(&status);
                None
            }
            Err(err) => Some(conn.checked(Err(err))),
        }
    }
}
