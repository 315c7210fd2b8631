//! Byte-stream transport consumed by the protocol engine.
//!
//! The engine never opens sockets or sets socket options itself; it only
//! needs a blocking "read exactly N bytes" / "write these bytes" capability.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

/// A blocking, ordered byte stream.
pub trait Transport {
    /// Fill `buf` completely, blocking until enough bytes arrive.
    ///
    /// A stream that ends early must fail with
    /// `std::io::ErrorKind::UnexpectedEof`.
    fn read_exactly(&mut self, buf: &mut [u8]) -> std::io::Result<()>;

    /// Write all of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Close the stream. Further reads and writes fail.
    fn close(&mut self) -> std::io::Result<()>;
}

impl Transport for TcpStream {
    fn read_exactly(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        Read::read_exact(self, buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        Write::write_all(self, bytes)?;
        Write::flush(self)
    }

    fn close(&mut self) -> std::io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_exactly(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read_exactly(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).write_all(bytes)
    }

    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}
