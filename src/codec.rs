//! Primitive encodings and packet framing for the handshake/status/login
//! phases.
//!
//! In-memory payloads are scanned with [`bytes::Buf`] and built with
//! [`bytes::BufMut`]; only frame boundaries touch the socket.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// A 32-bit VarInt never takes more than five bytes on the wire.
pub const MAX_VAR_INT_BYTES: usize = 5;

/// Largest frame body the protocol allows (three VarInt bytes).
pub const MAX_FRAME_LEN: i32 = 2_097_151;

/// 32767 UTF-16 units. One unit never needs more than three UTF-8 bytes;
/// four-byte characters take two units.
pub const MAX_STRING_BYTES: usize = 32_767 * 3;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("VarInt is longer than {MAX_VAR_INT_BYTES} bytes")]
    MalformedVarInt,
    #[error("frame length {0} is outside 1..={MAX_FRAME_LEN}")]
    InvalidFrameLength(i32),
    #[error("negative string length {0}")]
    InvalidStringLength(i32),
    #[error("string of {0} bytes exceeds the protocol maximum")]
    StringTooLong(usize),
    #[error("packet truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("expected packet {expected:#04x}, got {got:#04x}")]
    UnexpectedPacket { expected: i32, got: i32 },
    #[error("unknown next state {0}")]
    UnknownNextState(i32),
}

impl ProtocolError {
    /// True when the peer simply went away (EOF, reset, broken pipe).
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(err) => is_disconnect_kind(err.kind()),
            _ => false,
        }
    }
}

pub(crate) fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Number of bytes `value` occupies as a VarInt.
pub fn var_int_size(value: i32) -> usize {
    let mut value = value as u32;
    let mut size = 1;
    while value & !0x7F != 0 {
        value >>= 7;
        size += 1;
    }
    size
}

pub fn put_var_int<B: BufMut>(buf: &mut B, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}

pub fn get_var_int<B: Buf>(buf: &mut B) -> Result<i32, ProtocolError> {
    let mut value = 0u32;
    for position in 0..MAX_VAR_INT_BYTES {
        ensure_remaining(buf, 1)?;
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::MalformedVarInt)
}

/// Reads a VarInt straight off a stream, one byte at a time.
pub async fn read_var_int<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProtocolError> {
    let first = reader.read_u8().await?;
    continue_var_int(reader, first).await
}

async fn continue_var_int<R: AsyncRead + Unpin>(
    reader: &mut R,
    first: u8,
) -> Result<i32, ProtocolError> {
    let mut value = u32::from(first & 0x7F);
    if first & 0x80 == 0 {
        return Ok(value as i32);
    }
    for position in 1..MAX_VAR_INT_BYTES {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::MalformedVarInt)
}

pub fn put_string<B: BufMut>(buf: &mut B, value: &str) {
    put_var_int(buf, value.len() as i32);
    buf.put_slice(value.as_bytes());
}

pub fn get_string<B: Buf>(buf: &mut B) -> Result<String, ProtocolError> {
    let declared = get_var_int(buf)?;
    let len = usize::try_from(declared).map_err(|_| ProtocolError::InvalidStringLength(declared))?;
    if len > MAX_STRING_BYTES {
        return Err(ProtocolError::StringTooLong(len));
    }
    ensure_remaining(buf, len)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    Ok(String::from_utf8(raw)?)
}

pub fn get_u16<B: Buf>(buf: &mut B) -> Result<u16, ProtocolError> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

pub fn get_i64<B: Buf>(buf: &mut B) -> Result<i64, ProtocolError> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

pub fn put_uuid<B: BufMut>(buf: &mut B, value: &Uuid) {
    buf.put_slice(value.as_bytes());
}

pub fn get_uuid<B: Buf>(buf: &mut B) -> Result<Uuid, ProtocolError> {
    ensure_remaining(buf, 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

/// One length-prefixed packet: its id and the undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: i32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Frame {
            id,
            payload: payload.into(),
        }
    }

    /// Reads the next frame. A stream that closes before the first byte
    /// yields `Ok(None)`; closing anywhere later is an I/O error.
    pub async fn try_read_from<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<Option<Frame>, ProtocolError> {
        let mut first = [0u8; 1];
        if reader.read(&mut first).await? == 0 {
            return Ok(None);
        }
        let length = continue_var_int(reader, first[0]).await?;
        if !(1..=MAX_FRAME_LEN).contains(&length) {
            return Err(ProtocolError::InvalidFrameLength(length));
        }

        let mut body = vec![0u8; length as usize];
        reader.read_exact(&mut body).await?;
        let mut body = Bytes::from(body);
        let id = get_var_int(&mut body)?;
        Ok(Some(Frame { id, payload: body }))
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, ProtocolError> {
        match Self::try_read_from(reader).await? {
            Some(frame) => Ok(frame),
            None => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed before frame",
            ))),
        }
    }

    pub fn encode(&self) -> BytesMut {
        let body_len = var_int_size(self.id) + self.payload.len();
        let mut buf = BytesMut::with_capacity(var_int_size(body_len as i32) + body_len);
        put_var_int(&mut buf, body_len as i32);
        put_var_int(&mut buf, self.id);
        buf.put_slice(&self.payload);
        buf
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}
