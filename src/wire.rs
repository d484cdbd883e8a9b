//! sentinelmc/src/wire.rs
//! Primitive wire types and the length-prefixed packet frame.
//!
//! A frame is `VarInt(len) ++ body`, where `body` is `id byte ++ fields`
//! and `len` covers the id byte and the fields but not itself. The whole
//! declared body is buffered before any field is interpreted, so that an
//! ID mismatch or short field read never consumes bytes belonging to the
//! next frame (see DESIGN.md, wire.rs entry).

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum number of continuation bytes before a VarInt is rejected.
const VARINT_MAX_BYTES: usize = 5;

/// Decodes a VarInt from a plain byte slice (used once the frame body has
/// already been buffered).
pub fn decode_varint(buf: &[u8]) -> Result<(i32, usize)> {
    let mut result: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= VARINT_MAX_BYTES {
            return Err(Error::Protocol("VarInt too long".into()));
        }
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result as i32, i + 1));
        }
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "VarInt truncated",
    )))
}

/// Encodes a VarInt, appending its bytes to `buf`.
pub fn encode_varint(value: i32, buf: &mut Vec<u8>) {
    let mut v = value as u32;
    loop {
        let mut byte = (v & 0x7F) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if v == 0 {
            break;
        }
    }
}

/// Reads a VarInt directly off an async stream, one byte at a time.
pub async fn read_varint<R>(stream: &mut R) -> Result<i32>
where
    R: AsyncRead + Unpin,
{
    let mut result: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let byte = stream.read_u8().await?;
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(Error::Protocol("VarInt too long".into()))
}

/// Reads a length-prefixed UTF-8 string from a byte cursor.
pub fn read_string(buf: &[u8]) -> Result<(String, usize)> {
    let (len, consumed) = decode_varint(buf)?;
    if len < 0 {
        return Err(Error::Protocol("negative string length".into()));
    }
    let len = len as usize;
    let end = consumed
        .checked_add(len)
        .ok_or_else(|| Error::Protocol("string length overflows frame buffer".into()))?;
    let body = buf
        .get(consumed..end)
        .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short string")))?;
    let s = String::from_utf8(body.to_vec())
        .map_err(|e| Error::Protocol(format!("invalid utf-8 string: {e}")))?;
    Ok((s, consumed + len))
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_string(s: &str, buf: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    encode_varint(bytes.len() as i32, buf);
    buf.extend_from_slice(bytes);
}

/// Reads a big-endian unsigned 16-bit integer from a byte cursor.
pub fn read_unsigned_short(buf: &[u8]) -> Result<(u16, usize)> {
    let b = buf
        .get(0..2)
        .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short port")))?;
    Ok((u16::from_be_bytes([b[0], b[1]]), 2))
}

/// A decoded frame: the complete on-wire bytes (length prefix + body) and
/// the body alone (id byte + fields), ready for field-by-field decoding.
pub struct Frame {
    /// The complete encoded frame, including the VarInt length prefix.
    pub raw: Vec<u8>,
    /// The frame body: packet ID byte followed by fields.
    pub body: Vec<u8>,
}

impl Frame {
    /// The packet ID, i.e. the first byte of the body.
    pub fn id(&self) -> Result<u8> {
        self.body
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol("empty frame body".into()))
    }
}

/// Reads a complete frame: decodes the VarInt length, then reads exactly
/// that many bytes. Fails with `Error::Io` (short read) if the peer
/// closes before the declared length is satisfied; never blocks
/// indefinitely once the peer has closed.
pub async fn read_frame<R>(stream: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let len = read_varint(stream).await?;
    if len < 0 {
        return Err(Error::Protocol("negative frame length".into()));
    }
    let len = len as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    let mut raw = Vec::with_capacity(len + 5);
    encode_varint(len as i32, &mut raw);
    raw.extend_from_slice(&body);

    Ok(Frame { raw, body })
}

/// Writes a frame: `VarInt(len(id ++ fields)) ++ id ++ fields` in one
/// logical write. Partial writes are retried by the underlying stream.
pub async fn write_frame<W>(stream: &mut W, id: u8, fields: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut body = Vec::with_capacity(1 + fields.len());
    body.push(id);
    body.extend_from_slice(fields);

    let mut packet = Vec::with_capacity(body.len() + 5);
    encode_varint(body.len() as i32, &mut packet);
    packet.extend_from_slice(&body);

    stream.write_all(&packet).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips() {
        let cases: [(i32, usize); 7] = [
            (0, 1),
            (1, 1),
            (127, 1),
            (128, 2),
            (255, 2),
            (2147483647, 5),
            (-1, 5),
        ];
        for (v, expected_len) in cases {
            let mut buf = Vec::new();
            encode_varint(v, &mut buf);
            assert_eq!(buf.len(), expected_len, "encoded length for {v}");
            let (decoded, consumed) = decode_varint(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn string_round_trips_up_to_1000_bytes() {
        for len in [0usize, 1, 31, 127, 1000] {
            let s: String = "a".repeat(len);
            let mut buf = Vec::new();
            write_string(&s, &mut buf);
            let (decoded, consumed) = read_string(&buf).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn read_string_with_negative_length_is_protocol_error_not_panic() {
        // A VarInt-encoded -1 (the "INFO"/"Done" encoding for -1 is
        // 0xFF 0xFF 0xFF 0xFF 0x0F) used as a string length must be
        // rejected cleanly instead of overflowing `consumed + len`.
        let mut buf = Vec::new();
        encode_varint(-1, &mut buf);
        let err = read_string(&buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn read_string_with_huge_length_is_protocol_error_not_panic() {
        let mut buf = Vec::new();
        encode_varint(i32::MAX, &mut buf);
        buf.extend_from_slice(b"short");
        let err = read_string(&buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_) | Error::Io(_)));
    }

    #[test]
    fn decode_varint_too_long_fails() {
        let buf = [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode_varint(&buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn read_varint_too_long_fails() {
        let buf = [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_varint(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn frame_short_read_fails_without_hanging() {
        // Declares a 10-byte body but the peer only sends 3 then closes.
        let mut buf = Vec::new();
        encode_varint(10, &mut buf);
        buf.extend_from_slice(&[1, 2, 3]);
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn frame_write_then_read_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, 0x00, &[9, 9, 9]).await.unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame.id().unwrap(), 0x00);
        assert_eq!(&frame.body[1..], &[9, 9, 9]);
    }
}
