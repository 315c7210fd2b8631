//! Cursor over a single packet payload.
//!
//! Thin stateful wrapper around the `codec` functions. Every read returns
//! `None` when the payload is shorter than the value being read, leaving the
//! caller to decide whether that is a protocol violation.

use crate::protocol::codec;

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek at the next byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    fn advance<T>(&mut self, width: usize, value: Option<T>) -> Option<T> {
        let value = value?;
        self.pos += width;
        Some(value)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = self.peek();
        self.advance(1, byte)
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        let v = codec::read_u16_le(self.rest());
        self.advance(2, v)
    }

    pub fn read_u24_le(&mut self) -> Option<u32> {
        let v = codec::read_u24_le(self.rest());
        self.advance(3, v)
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        let v = codec::read_u32_le(self.rest());
        self.advance(4, v)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        let v = codec::read_u64_le(self.rest());
        self.advance(8, v)
    }

    pub fn read_f32_le(&mut self) -> Option<f32> {
        let v = codec::read_f32_le(self.rest());
        self.advance(4, v)
    }

    pub fn read_f64_le(&mut self) -> Option<f64> {
        let v = codec::read_f64_le(self.rest());
        self.advance(8, v)
    }

    /// Read a length-encoded integer. The outer `None` means truncation; the
    /// inner `None` is the NULL marker.
    pub fn read_lenenc_int(&mut self) -> Option<Option<u64>> {
        let (value, consumed) = codec::decode_lenenc_int(self.rest())?;
        self.pos += consumed;
        Some(value)
    }

    /// Read a length-encoded byte string, borrowing from the payload.
    pub fn read_lenenc_bytes(&mut self) -> Option<Option<&'a [u8]>> {
        let (value, consumed) = codec::decode_lenenc_bytes(self.rest())?;
        self.pos += consumed;
        Some(value)
    }

    /// Read a length-encoded string as UTF-8 text.
    pub fn read_lenenc_string(&mut self) -> Option<Option<String>> {
        let (value, consumed) = codec::decode_lenenc_str(self.rest())?;
        self.pos += consumed;
        Some(value)
    }

    /// Skip a length-encoded string.
    pub fn skip_lenenc_string(&mut self) -> Option<()> {
        let consumed = codec::skip_lenenc_str(self.rest())?;
        self.pos += consumed;
        Some(())
    }

    /// Read a NUL-terminated string. A missing terminator reads to the end.
    pub fn read_null_string(&mut self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let rest = self.rest();
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += (len + 1).min(rest.len());
        Some(s)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.rest().get(..len);
        self.advance(len, bytes)
    }

    pub fn read_string(&mut self, len: usize) -> Option<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read all remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.rest();
        self.pos = self.data.len();
        rest
    }

    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    /// Skip a number of bytes, failing if fewer remain.
    pub fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() >= n {
            self.pos += n;
            Some(())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fixed() {
        let mut reader = PacketReader::new(&[0x42, 0x34, 0x12, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u8(), Some(0x42));
        assert_eq!(reader.read_u16_le(), Some(0x1234));
        assert_eq!(reader.read_u24_le(), Some(0x0012_3456));
        assert_eq!(reader.read_u8(), None);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_u32_le(), None);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16_le(), Some(0x0201));
    }

    #[test]
    fn test_read_lenenc() {
        let mut reader = PacketReader::new(&[0xFC, 0x34, 0x12, 0xFB, 0x02, b'h', b'i']);
        assert_eq!(reader.read_lenenc_int(), Some(Some(0x1234)));
        assert_eq!(reader.read_lenenc_string(), Some(None));
        assert_eq!(reader.read_lenenc_bytes(), Some(Some(&b"hi"[..])));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_null_string() {
        let mut reader = PacketReader::new(b"hello\0world");
        assert_eq!(reader.read_null_string(), Some("hello".to_string()));
        assert_eq!(reader.read_null_string(), Some("world".to_string()));
        assert_eq!(reader.read_null_string(), None);
    }

    #[test]
    fn test_read_bytes_and_rest() {
        let mut reader = PacketReader::new(b"abcdef");
        assert_eq!(reader.read_bytes(2), Some(&b"ab"[..]));
        assert_eq!(reader.read_bytes(10), None);
        assert_eq!(reader.skip(1), Some(()));
        assert_eq!(reader.read_rest_string(), "def");
        assert_eq!(reader.remaining(), 0);
    }
}
