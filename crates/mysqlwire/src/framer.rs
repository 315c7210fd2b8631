//! Packet framing over a `Transport`.
//!
//! Owns the per-command sequence counter. Every packet sent or received
//! within one command exchange advances it by one; `reset_sequence` starts a
//! new exchange. Payloads of `MAX_PACKET_SIZE` bytes or more travel as a run
//! of full-size packets closed by a shorter (possibly empty) one. A joined
//! payload larger than `max_payload` is a protocol error.

#![allow(clippy::cast_possible_truncation)]

use mysqlwire_core::{Error, ProtocolError, Result};

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};
use crate::transport::Transport;

/// Largest `max_allowed_packet` a server accepts (1 GiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1 << 30;

#[derive(Debug)]
pub struct PacketFramer<T> {
    transport: T,
    sequence_id: u8,
    /// Payload bytes announced by the last header but not yet received.
    bytes_remaining: usize,
    max_payload: usize,
}

impl<T: Transport> PacketFramer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sequence_id: 0,
            bytes_remaining: 0,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Limit the size of a joined incoming payload.
    pub fn set_max_payload(&mut self, max: usize) {
        self.max_payload = max;
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sequence id the next packet (in either direction) must carry.
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Start a new command exchange.
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    /// Payload bytes still outstanding when a read was interrupted.
    pub fn bytes_remaining(&self) -> usize {
        self.bytes_remaining
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Frame and write one logical packet, splitting it if necessary.
    #[allow(clippy::result_large_err)]
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let chunks = payload.len() / MAX_PACKET_SIZE + 1;
        let mut buf = Vec::with_capacity(payload.len() + chunks * PacketHeader::SIZE);

        let mut rest = payload;
        loop {
            let take = rest.len().min(MAX_PACKET_SIZE);
            let header = PacketHeader {
                payload_length: take as u32,
                sequence_id: self.sequence_id,
            };
            buf.extend_from_slice(&header.to_bytes());
            buf.extend_from_slice(&rest[..take]);
            self.sequence_id = self.sequence_id.wrapping_add(1);
            rest = &rest[take..];
            // A full-size chunk always needs a follower, even an empty one.
            if take < MAX_PACKET_SIZE {
                break;
            }
        }

        tracing::trace!(
            len = payload.len(),
            next_seq = self.sequence_id,
            "writing packet"
        );
        self.transport.write_all(&buf)?;
        Ok(())
    }

    /// Reset the sequence and send a command payload.
    #[allow(clippy::result_large_err)]
    pub fn write_command(&mut self, payload: &[u8]) -> Result<()> {
        self.reset_sequence();
        self.write_packet(payload)
    }

    /// Read one logical packet, joining split continuations.
    #[allow(clippy::result_large_err)]
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let len = self.read_frame_into(&mut payload)?;
            if len < MAX_PACKET_SIZE {
                break;
            }
        }
        Ok(payload)
    }

    #[allow(clippy::result_large_err)]
    fn read_frame_into(&mut self, payload: &mut Vec<u8>) -> Result<usize> {
        let mut header_bytes = [0u8; PacketHeader::SIZE];
        self.transport.read_exactly(&mut header_bytes)?;
        let header = PacketHeader::from_bytes(&header_bytes);

        if header.sequence_id != self.sequence_id {
            return Err(Error::Protocol(ProtocolError {
                message: format!(
                    "packet out of order: expected sequence {}, got {}",
                    self.sequence_id, header.sequence_id
                ),
                raw_data: Some(header_bytes.to_vec()),
                source: None,
            }));
        }
        self.sequence_id = self.sequence_id.wrapping_add(1);

        let len = header.payload_length as usize;
        let start = payload.len();
        if start + len > self.max_payload {
            return Err(Error::Protocol(ProtocolError {
                message: format!(
                    "packet of at least {} bytes exceeds the {} byte limit",
                    start + len,
                    self.max_payload
                ),
                raw_data: Some(header_bytes.to_vec()),
                source: None,
            }));
        }
        self.bytes_remaining = len;
        payload.resize(start + len, 0);
        self.transport.read_exactly(&mut payload[start..])?;
        self.bytes_remaining = 0;

        tracing::trace!(len, seq = header.sequence_id, "read packet");
        Ok(len)
    }

    #[allow(clippy::result_large_err)]
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()?;
        Ok(())
    }
}
