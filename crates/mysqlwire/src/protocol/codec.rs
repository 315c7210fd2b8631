//! Length-encoded and fixed-width primitives.
//!
//! Every decoder here works on a plain byte slice and reports how many bytes
//! it consumed, so callers can walk a payload with their own cursor. A return
//! of `None` means the slice was too short for the value it announces.
//!
//! Protocol integers are little-endian. Big-endian readers exist for the few
//! places where a value is composed most-significant byte first.

#![allow(clippy::cast_possible_truncation)]

/// First byte of a length-encoded NULL.
pub const LENENC_NULL: u8 = 0xFB;

/// Decode a length-encoded integer.
///
/// Returns `(value, consumed)`. The value is `None` for the `0xFB` NULL
/// marker, which consumes a single byte. `0xFF` is not a valid prefix and
/// yields `None` for the whole result.
pub fn decode_lenenc_int(buf: &[u8]) -> Option<(Option<u64>, usize)> {
    let first = *buf.first()?;
    let rest = &buf[1..];
    match first {
        0x00..=0xFA => Some((Some(u64::from(first)), 1)),
        LENENC_NULL => Some((None, 1)),
        0xFC => read_u16_le(rest).map(|v| (Some(u64::from(v)), 3)),
        0xFD => read_u24_le(rest).map(|v| (Some(u64::from(v)), 4)),
        0xFE => read_u64_le(rest).map(|v| (Some(v), 9)),
        0xFF => None,
    }
}

/// Number of bytes `encode_lenenc_int` writes for `value`.
pub fn lenenc_int_len(value: u64) -> usize {
    if value < 0xFB {
        1
    } else if value < 0x1_0000 {
        3
    } else if value < 0x100_0000 {
        4
    } else {
        9
    }
}

/// Append a length-encoded integer to `out`.
pub fn encode_lenenc_int(value: u64, out: &mut Vec<u8>) {
    match lenenc_int_len(value) {
        1 => out.push(value as u8),
        3 => {
            out.push(0xFC);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        4 => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
        }
        _ => {
            out.push(0xFE);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Decode a length-encoded byte string without copying it.
///
/// A NULL marker yields `(None, 1)`.
pub fn decode_lenenc_bytes(buf: &[u8]) -> Option<(Option<&[u8]>, usize)> {
    let (len, header) = decode_lenenc_int(buf)?;
    let Some(len) = len else {
        return Some((None, header));
    };
    let len = usize::try_from(len).ok()?;
    let end = header.checked_add(len)?;
    let bytes = buf.get(header..end)?;
    Some((Some(bytes), end))
}

/// Decode a length-encoded string as UTF-8 text.
///
/// Invalid UTF-8 sequences are replaced rather than rejected; the consumed
/// count is always the full `header + n`.
pub fn decode_lenenc_str(buf: &[u8]) -> Option<(Option<String>, usize)> {
    let (bytes, consumed) = decode_lenenc_bytes(buf)?;
    Some((
        bytes.map(|b| String::from_utf8_lossy(b).into_owned()),
        consumed,
    ))
}

/// Walk over a length-encoded string without materializing it.
pub fn skip_lenenc_str(buf: &[u8]) -> Option<usize> {
    decode_lenenc_bytes(buf).map(|(_, consumed)| consumed)
}

/// Append a length-encoded byte string to `out`.
pub fn encode_lenenc_bytes(data: &[u8], out: &mut Vec<u8>) {
    encode_lenenc_int(data.len() as u64, out);
    out.extend_from_slice(data);
}

/// Append a length-encoded UTF-8 string to `out`.
pub fn encode_lenenc_str(s: &str, out: &mut Vec<u8>) {
    encode_lenenc_bytes(s.as_bytes(), out);
}

fn array<const N: usize>(buf: &[u8]) -> Option<[u8; N]> {
    buf.get(..N)?.try_into().ok()
}

pub fn read_u16_le(buf: &[u8]) -> Option<u16> {
    array(buf).map(u16::from_le_bytes)
}

pub fn read_u24_le(buf: &[u8]) -> Option<u32> {
    let b: [u8; 3] = array(buf)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], 0]))
}

pub fn read_u32_le(buf: &[u8]) -> Option<u32> {
    array(buf).map(u32::from_le_bytes)
}

pub fn read_u64_le(buf: &[u8]) -> Option<u64> {
    array(buf).map(u64::from_le_bytes)
}

pub fn read_u16_be(buf: &[u8]) -> Option<u16> {
    array(buf).map(u16::from_be_bytes)
}

pub fn read_u24_be(buf: &[u8]) -> Option<u32> {
    let b: [u8; 3] = array(buf)?;
    Some(u32::from_be_bytes([0, b[0], b[1], b[2]]))
}

pub fn read_u32_be(buf: &[u8]) -> Option<u32> {
    array(buf).map(u32::from_be_bytes)
}

pub fn read_u64_be(buf: &[u8]) -> Option<u64> {
    array(buf).map(u64::from_be_bytes)
}

/// IEEE-754 single precision, little-endian.
pub fn read_f32_le(buf: &[u8]) -> Option<f32> {
    array(buf).map(f32::from_le_bytes)
}

/// IEEE-754 double precision, little-endian.
pub fn read_f64_le(buf: &[u8]) -> Option<f64> {
    array(buf).map(f64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_int(value: u64, expected_len: usize) {
        let mut buf = Vec::new();
        encode_lenenc_int(value, &mut buf);
        assert_eq!(buf.len(), expected_len, "encoded length of {value}");
        assert_eq!(lenenc_int_len(value), expected_len);
        assert_eq!(
            decode_lenenc_int(&buf),
            Some((Some(value), expected_len)),
            "decode of {value}"
        );
    }

    #[test]
    fn test_lenenc_int_boundaries() {
        roundtrip_int(0, 1);
        roundtrip_int(250, 1);
        roundtrip_int(251, 3);
        roundtrip_int(65_535, 3);
        roundtrip_int(65_536, 4);
        roundtrip_int(16_777_215, 4);
        roundtrip_int(16_777_216, 9);
        roundtrip_int(u64::from(u32::MAX), 9);
        roundtrip_int(i64::MAX as u64, 9);
    }

    #[test]
    fn test_lenenc_int_prefix_bytes() {
        let mut buf = Vec::new();
        encode_lenenc_int(251, &mut buf);
        assert_eq!(buf, [0xFC, 0xFB, 0x00]);

        buf.clear();
        encode_lenenc_int(0x12_3456, &mut buf);
        assert_eq!(buf, [0xFD, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_lenenc_int_null_and_invalid() {
        assert_eq!(decode_lenenc_int(&[0xFB, 0x01]), Some((None, 1)));
        assert_eq!(decode_lenenc_int(&[0xFF]), None);
        assert_eq!(decode_lenenc_int(&[]), None);
        // truncated 2-byte form
        assert_eq!(decode_lenenc_int(&[0xFC, 0x01]), None);
    }

    #[test]
    fn test_lenenc_str_cases() {
        let mut buf = Vec::new();
        encode_lenenc_str("", &mut buf);
        assert_eq!(decode_lenenc_str(&buf), Some((Some(String::new()), 1)));

        let text = "naïve 日本語 🚀";
        buf.clear();
        encode_lenenc_str(text, &mut buf);
        let (decoded, consumed) = decode_lenenc_str(&buf).unwrap();
        assert_eq!(decoded.as_deref(), Some(text));
        assert_eq!(consumed, 1 + text.len());

        assert_eq!(decode_lenenc_str(&[0xFB]), Some((None, 1)));
    }

    #[test]
    fn test_lenenc_str_long_header() {
        let text = "x".repeat(300);
        let mut buf = Vec::new();
        encode_lenenc_str(&text, &mut buf);
        assert_eq!(&buf[..3], &[0xFC, 0x2C, 0x01]);
        assert_eq!(skip_lenenc_str(&buf), Some(303));
    }

    #[test]
    fn test_lenenc_str_truncated() {
        assert_eq!(decode_lenenc_bytes(&[0x05, b'a', b'b']), None);
        assert_eq!(skip_lenenc_str(&[0x05, b'a']), None);
    }

    #[test]
    fn test_fixed_width_endianness() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u16_le(&bytes), Some(0x0201));
        assert_eq!(read_u16_be(&bytes), Some(0x0102));
        assert_eq!(read_u24_le(&bytes), Some(0x03_0201));
        assert_eq!(read_u24_be(&bytes), Some(0x01_0203));
        assert_eq!(read_u32_le(&bytes), Some(0x0403_0201));
        assert_eq!(read_u32_be(&bytes), Some(0x0102_0304));
        assert_eq!(read_u64_le(&bytes), Some(0x0807_0605_0403_0201));
        assert_eq!(read_u64_be(&bytes), Some(0x0102_0304_0506_0708));
        assert_eq!(read_u32_le(&bytes[6..]), None);
    }

    #[test]
    fn test_float_readers() {
        assert_eq!(read_f32_le(&1.5f32.to_le_bytes()), Some(1.5));
        assert_eq!(read_f64_le(&(-2.25f64).to_le_bytes()), Some(-2.25));
        assert_eq!(read_f64_le(&[0; 4]), None);
    }
}
