// src/core/protocol/resp_frame.rs

//! The RESP frame exchanged with nodes, plus the `Encoder`/`Decoder` pair the
//! bundled TCP connection runs over its socket.

use crate::core::RouterError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits, shared with the server.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 256;

/// A single RESP2 frame. Replies from nodes are handed back to callers as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds the array-of-bulk-strings frame used to send a command.
    pub fn command<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespFrame::Array(
            parts
                .into_iter()
                .map(|p| RespFrame::BulkString(p.into()))
                .collect(),
        )
    }

    /// Returns the message of an error reply.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            RespFrame::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespFrame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Reads a simple or bulk string as text, replacing invalid UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            RespFrame::SimpleString(s) => Some(s.clone()),
            RespFrame::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Encodes the frame into a fresh `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, RouterError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = RouterError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => write_line(dst, b'+', s.as_bytes()),
            RespFrame::Error(s) => write_line(dst, b'-', s.as_bytes()),
            RespFrame::Integer(i) => write_line(dst, b':', i.to_string().as_bytes()),
            RespFrame::BulkString(b) => {
                write_line(dst, b'$', b.len().to_string().as_bytes());
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(arr) => {
                write_line(dst, b'*', arr.len().to_string().as_bytes());
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.reserve(body.len() + 3);
    dst.extend_from_slice(&[prefix]);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = RouterError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = &src[..];
        match decode_frame(&mut cursor, 0) {
            Ok(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            // Not enough bytes buffered yet; wait for the next read.
            Err(RouterError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn decode_frame(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, RouterError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(RouterError::Protocol(
            "RESP recursion depth limit exceeded".to_string(),
        ));
    }
    let Some((&prefix, rest)) = bytes.split_first() else {
        return Err(RouterError::IncompleteData);
    };
    *bytes = rest;

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(read_text_line(bytes)?)),
        b'-' => Ok(RespFrame::Error(read_text_line(bytes)?)),
        b':' => {
            let line = read_text_line(bytes)?;
            line.parse::<i64>()
                .map(RespFrame::Integer)
                .map_err(|_| RouterError::Protocol(format!("invalid integer reply '{line}'")))
        }
        b'$' => match read_length(bytes, MAX_BULK_STRING_SIZE)? {
            None => Ok(RespFrame::Null),
            Some(len) => {
                if bytes.len() < len + CRLF_LEN {
                    return Err(RouterError::IncompleteData);
                }
                if &bytes[len..len + CRLF_LEN] != CRLF {
                    return Err(RouterError::Protocol(
                        "bulk string is not terminated by CRLF".to_string(),
                    ));
                }
                let data = Bytes::copy_from_slice(&bytes[..len]);
                *bytes = &bytes[len + CRLF_LEN..];
                Ok(RespFrame::BulkString(data))
            }
        },
        b'*' => match read_length(bytes, MAX_FRAME_ELEMENTS)? {
            None => Ok(RespFrame::NullArray),
            Some(len) => {
                let mut frames = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    frames.push(decode_frame(bytes, depth + 1)?);
                }
                Ok(RespFrame::Array(frames))
            }
        },
        other => Err(RouterError::Protocol(format!(
            "unexpected frame prefix byte 0x{other:02x}"
        ))),
    }
}

/// Reads a `$`/`*` length header. `-1` denotes a null frame.
fn read_length(bytes: &mut &[u8], limit: usize) -> Result<Option<usize>, RouterError> {
    let line = read_text_line(bytes)?;
    let len = line
        .parse::<i64>()
        .map_err(|_| RouterError::Protocol(format!("invalid length header '{line}'")))?;
    match len {
        -1 => Ok(None),
        n if n < 0 || n as u64 > limit as u64 => Err(RouterError::Protocol(format!(
            "length {n} is out of bounds"
        ))),
        n => Ok(Some(n as usize)),
    }
}

fn read_text_line(bytes: &mut &[u8]) -> Result<String, RouterError> {
    let pos = bytes
        .windows(CRLF_LEN)
        .position(|window| window == CRLF)
        .ok_or(RouterError::IncompleteData)?;
    let line = String::from_utf8_lossy(&bytes[..pos]).into_owned();
    *bytes = &bytes[pos + CRLF_LEN..];
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<Option<RespFrame>, RouterError> {
        let mut buf = BytesMut::from(input);
        RespFrameCodec.decode(&mut buf)
    }

    #[test]
    fn decodes_error_reply() {
        let frame = decode_all(b"-MOVED 500 10.0.0.2:7000\r\n").unwrap().unwrap();
        assert_eq!(frame.as_error(), Some("MOVED 500 10.0.0.2:7000"));
    }

    #[test]
    fn partial_frames_wait_for_more_data() {
        assert_eq!(decode_all(b"*2\r\n$3\r\nfoo\r\n").unwrap(), None);
        assert_eq!(decode_all(b"$5\r\nhel").unwrap(), None);
    }

    #[test]
    fn decodes_nested_slot_reply() {
        let frame = decode_all(b"*1\r\n*3\r\n:0\r\n:100\r\n*2\r\n$9\r\n127.0.0.1\r\n:7000\r\n")
            .unwrap()
            .unwrap();
        let RespFrame::Array(ranges) = frame else {
            panic!("expected array");
        };
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn encoder_writes_command_array() {
        let bytes = RespFrame::command(["GET", "foo"]).encode_to_vec().unwrap();
        assert_eq!(bytes, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n".to_vec());
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(matches!(decode_all(b"?oops\r\n"), Err(RouterError::Protocol(_))));
    }
}
