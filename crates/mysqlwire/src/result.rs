//! Result sets and the cursor that reads them off the wire.
//!
//! One command response may carry several result sets. Each one walks
//! `HeaderPending -> ColumnsPending -> RowsPending -> Done`; when the final
//! status carries `SERVER_MORE_RESULTS_EXISTS` the cursor goes back to
//! `HeaderPending` for the next set instead of finishing.

use std::sync::Arc;

use mysqlwire_core::{ColumnInfo, Error, Result, Row};

use crate::framer::PacketFramer;
use crate::protocol::{
    EofPacket, OkPacket, PacketReader, PacketType, Response, expect_ok, interpret,
    is_row_terminator, parse_eof_packet, parse_err_packet, protocol_error, server_status,
};
use crate::transport::Transport;
use crate::types::ColumnDef;
use crate::{binary, text};

/// Row encoding of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// COM_QUERY: every value is a length-encoded string
    Text,
    /// COM_STMT_EXECUTE: NULL bitmap plus typed binary values
    Binary,
}

/// Where the cursor is within the current result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    HeaderPending,
    ColumnsPending,
    RowsPending,
    Done,
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
    pub eof_reached: bool,
    /// Only meaningful once `eof_reached` is true
    pub has_more_results: bool,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Completion status of the result set the cursor last finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultStatus {
    pub eof_reached: bool,
    pub has_more_results: bool,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl ResultStatus {
    fn from_ok(ok: OkPacket) -> Self {
        Self {
            eof_reached: true,
            has_more_results: ok.more_results_exist(),
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            status_flags: ok.status_flags,
            warnings: ok.warnings,
            info: ok.info,
        }
    }

    fn from_eof(eof: EofPacket) -> Self {
        Self {
            eof_reached: true,
            has_more_results: eof.more_results_exist(),
            status_flags: eof.status_flags,
            warnings: eof.warnings,
            ..Self::default()
        }
    }
}

/// Incremental reader for one command response.
#[derive(Debug)]
pub struct Cursor {
    format: RowFormat,
    phase: Phase,
    column_count: usize,
    columns: Vec<ColumnDef>,
    info: Arc<ColumnInfo>,
    status: ResultStatus,
}

impl Cursor {
    pub fn new(format: RowFormat) -> Self {
        Self {
            format,
            phase: Phase::HeaderPending,
            column_count: 0,
            columns: Vec::new(),
            info: Arc::new(ColumnInfo::new(Vec::new())),
            status: ResultStatus::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn status(&self) -> &ResultStatus {
        &self.status
    }

    /// Nothing left to read for this response.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done && !self.status.has_more_results
    }

    /// Read the header and column definitions of the next result set.
    ///
    /// Leaves the cursor in `RowsPending`, or in `Done` for a zero-column
    /// (OK) result.
    #[allow(clippy::result_large_err)]
    pub fn read_header<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<()> {
        if self.phase == Phase::Done && self.status.has_more_results {
            self.phase = Phase::HeaderPending;
        }
        if self.phase != Phase::HeaderPending {
            return Ok(());
        }

        self.columns.clear();
        self.status = ResultStatus::default();

        let payload = framer.read_packet()?;
        match interpret(&payload)? {
            Response::Ok(ok) => {
                self.finish_with_ok(ok);
                return Ok(());
            }
            Response::Err(err) => {
                self.abort();
                return Err(Error::Server(err));
            }
            Response::LocalInfile(file) => {
                tracing::debug!(file = %file, "refusing LOCAL INFILE request");
                // An empty packet tells the server no data follows.
                framer.write_packet(&[])?;
                let reply = framer.read_packet()?;
                match expect_ok(&reply) {
                    Ok(ok) => self.finish_with_ok(ok),
                    Err(err) => {
                        self.abort();
                        return Err(err);
                    }
                }
                return Ok(());
            }
            Response::Eof(_) => {
                return Err(protocol_error("unexpected EOF as result set header", &payload));
            }
            Response::Data(data) => {
                let count = PacketReader::new(data)
                    .read_lenenc_int()
                    .flatten()
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| protocol_error("invalid column count", data))?;
                self.column_count = count;
                self.phase = Phase::ColumnsPending;
            }
        }

        tracing::trace!(columns = self.column_count, "reading column definitions");
        self.columns.reserve(self.column_count);
        for _ in 0..self.column_count {
            let payload = framer.read_packet()?;
            self.columns.push(ColumnDef::parse(&payload)?);
        }
        let eof = framer.read_packet()?;
        if PacketType::classify(&eof) != PacketType::Eof {
            return Err(protocol_error("expected EOF after column definitions", &eof));
        }

        self.info = Arc::new(ColumnInfo::new(
            self.columns.iter().map(|c| c.name.clone()).collect(),
        ));
        self.phase = Phase::RowsPending;
        Ok(())
    }

    /// Read the next row of the current result set, `None` once it ends.
    #[allow(clippy::result_large_err)]
    pub fn next_row<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<Option<Row>> {
        if matches!(self.phase, Phase::HeaderPending | Phase::ColumnsPending) {
            self.read_header(framer)?;
        }
        if self.phase != Phase::RowsPending {
            return Ok(None);
        }

        let payload = framer.read_packet()?;
        if is_row_terminator(&payload) {
            let eof = parse_eof_packet(&payload)?;
            self.status = ResultStatus::from_eof(eof);
            self.phase = Phase::Done;
            tracing::trace!(
                status = self.status.status_flags,
                more = self.status.has_more_results,
                "result set finished"
            );
            return Ok(None);
        }
        if payload.first() == Some(&0xFF) {
            let err = parse_err_packet(&payload)?;
            self.abort();
            return Err(Error::Server(err));
        }

        let row = match self.format {
            RowFormat::Text => text::decode_row(&payload, &self.columns, &self.info)?,
            RowFormat::Binary => binary::decode_row(&payload, &self.columns, &self.info)?,
        };
        Ok(Some(row))
    }

    /// Read the rest of the current result set into memory.
    #[allow(clippy::result_large_err)]
    pub fn collect<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<ResultSet> {
        self.read_header(framer)?;
        let mut rows = Vec::new();
        while let Some(row) = self.next_row(framer)? {
            rows.push(row);
        }
        let status = self.status.clone();
        Ok(ResultSet {
            columns: self.columns.clone(),
            rows,
            eof_reached: status.eof_reached,
            has_more_results: status.has_more_results,
            affected_rows: status.affected_rows,
            last_insert_id: status.last_insert_id,
            status_flags: status.status_flags,
            warnings: status.warnings,
            info: status.info,
        })
    }

    /// Consume everything left in the response, keeping only the status of
    /// the last result set.
    #[allow(clippy::result_large_err)]
    pub fn drain<T: Transport>(&mut self, framer: &mut PacketFramer<T>) -> Result<()> {
        loop {
            while self.next_row(framer)?.is_some() {}
            if self.is_finished() {
                return Ok(());
            }
            self.read_header(framer)?;
        }
    }

    fn finish_with_ok(&mut self, ok: OkPacket) {
        self.status = ResultStatus::from_ok(ok);
        self.column_count = 0;
        self.info = Arc::new(ColumnInfo::new(Vec::new()));
        self.phase = Phase::Done;
        tracing::trace!(
            affected = self.status.affected_rows,
            more = self.status.has_more_results,
            "OK result"
        );
    }

    /// A server error ends the whole response.
    fn abort(&mut self) {
        self.status.has_more_results = false;
        self.status.status_flags &= !server_status::SERVER_MORE_RESULTS_EXISTS;
        self.phase = Phase::Done;
    }
}
