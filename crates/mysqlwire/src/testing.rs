//! In-memory transport for exercising the protocol without a server.
//!
//! `ScriptedTransport` replays a prepared server byte stream and records
//! everything the client writes.

use std::io::{Error, ErrorKind};

use crate::protocol::PacketHeader;
use crate::transport::Transport;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    incoming: Vec<u8>,
    read_pos: usize,
    written: Vec<u8>,
    closed: bool,
}

impl ScriptedTransport {
    /// Replay `incoming` as the server side of the stream.
    pub fn new(incoming: Vec<u8>) -> Self {
        Self {
            incoming,
            ..Self::default()
        }
    }

    /// Frame `payload` as a single packet with sequence id `seq`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn packet(seq: u8, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id: seq,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    /// Queue another server packet.
    pub fn push_packet(&mut self, seq: u8, payload: &[u8]) {
        self.incoming.extend(Self::packet(seq, payload));
    }

    /// Raw bytes written by the client so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Client writes split back into `(sequence_id, payload)` frames.
    pub fn written_packets(&self) -> Vec<(u8, Vec<u8>)> {
        let mut packets = Vec::new();
        let mut rest = self.written.as_slice();
        while rest.len() >= PacketHeader::SIZE {
            let header = PacketHeader::from_bytes(&[rest[0], rest[1], rest[2], rest[3]]);
            let end = (PacketHeader::SIZE + header.payload_length as usize).min(rest.len());
            packets.push((header.sequence_id, rest[PacketHeader::SIZE..end].to_vec()));
            rest = &rest[end..];
        }
        packets
    }

    /// Server bytes not yet consumed by the client.
    pub fn unread(&self) -> usize {
        self.incoming.len() - self.read_pos
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for ScriptedTransport {
    fn read_exactly(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::NotConnected, "transport closed"));
        }
        let end = self.read_pos + buf.len();
        let Some(src) = self.incoming.get(self.read_pos..end) else {
            self.read_pos = self.incoming.len();
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "server stream ended early",
            ));
        };
        buf.copy_from_slice(src);
        self.read_pos = end;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::NotConnected, "transport closed"));
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
