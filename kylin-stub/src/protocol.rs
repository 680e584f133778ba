//! # RESP2 Framing
//!
//! Purpose: Split the inbound byte stream into command frames and encode
//! replies.
//!
//! ## Design Principles
//! 1. **Incremental Parsing**: a partial frame leaves the buffer untouched
//!    and returns `Ok(None)`; the caller reads more and retries.
//! 2. **Binary-Safe**: bulk arguments are raw bytes.
//! 3. **Fail Fast**: bad framing is a protocol error; the connection closes.

use bytes::{Buf, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RespError {
    Protocol,
}

/// Parses command frames out of a connection buffer.
#[derive(Debug, Default)]
pub(crate) struct RespParser;

impl RespParser {
    pub(crate) fn new() -> Self {
        RespParser
    }

    /// Consumes and returns one complete command, if the buffer holds one.
    pub(crate) fn parse(
        &mut self,
        buffer: &mut BytesMut,
    ) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        match parse_frame(buffer)? {
            Some((args, consumed)) => {
                buffer.advance(consumed);
                Ok(Some(args))
            }
            None => Ok(None),
        }
    }
}

fn parse_frame(data: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data[0] != b'*' {
        return parse_inline(data);
    }

    let (count, mut pos) = match read_line(data, 1) {
        Some((line, next)) => (parse_int(line)?, next),
        None => return Ok(None),
    };
    if count <= 0 {
        return Ok(Some((Vec::new(), pos)));
    }

    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= data.len() {
            return Ok(None);
        }
        if data[pos] != b'$' {
            return Err(RespError::Protocol);
        }
        let (len, next) = match read_line(data, pos + 1) {
            Some((line, next)) => (parse_int(line)?, next),
            None => return Ok(None),
        };
        if len < 0 {
            return Err(RespError::Protocol);
        }
        let end = next + len as usize;
        if end + 2 > data.len() {
            return Ok(None);
        }
        if &data[end..end + 2] != b"\r\n" {
            return Err(RespError::Protocol);
        }
        args.push(data[next..end].to_vec());
        pos = end + 2;
    }

    Ok(Some((args, pos)))
}

// Telnet-style `PING\r\n`.
fn parse_inline(data: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
    match read_line(data, 0) {
        Some((line, next)) => {
            let args = line
                .split(|b| b.is_ascii_whitespace())
                .filter(|part| !part.is_empty())
                .map(<[u8]>::to_vec)
                .collect();
            Ok(Some((args, next)))
        }
        None => Ok(None),
    }
}

fn read_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = data.get(start..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], start + idx + 2))
}

fn parse_int(data: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(RespError::Protocol)
}

/// A reply frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Simple(&'static str),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    pub(crate) fn ok() -> Self {
        Reply::Simple("OK")
    }

    pub(crate) fn err(message: impl AsRef<str>) -> Self {
        Reply::Error(format!("ERR {}", message.as_ref()))
    }

    pub(crate) fn wrong_type() -> Self {
        Reply::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        )
    }

    pub(crate) fn arity(command: &str) -> Self {
        Reply::err(format!("wrong number of arguments for '{}' command", command))
    }

    pub(crate) fn bulk_or_nil(value: Option<Vec<u8>>) -> Self {
        value.map_or(Reply::Nil, Reply::Bulk)
    }

    pub(crate) fn bulks<I: IntoIterator<Item = Vec<u8>>>(values: I) -> Self {
        Reply::Array(values.into_iter().map(Reply::Bulk).collect())
    }

    pub(crate) fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Simple(message) => {
                out.push(b'+');
                out.extend_from_slice(message.as_bytes());
            }
            Reply::Error(message) => {
                out.push(b'-');
                out.extend_from_slice(message.as_bytes());
            }
            Reply::Integer(value) => {
                out.push(b':');
                out.extend_from_slice(value.to_string().as_bytes());
            }
            Reply::Bulk(data) => {
                out.push(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
            }
            Reply::Nil => out.extend_from_slice(b"$-1"),
            Reply::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
                // Items already wrote their own terminators.
                return;
            }
        }
        out.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(data: &[u8]) -> BytesMut {
        BytesMut::from(data)
    }

    #[test]
    fn parses_complete_frame() {
        let mut buf = buffer(b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
        let args = RespParser::new().parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"key".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_leaves_buffer_untouched() {
        let mut buf = buffer(b"*2\r\n$3\r\nGET\r\n$3\r\nke");
        assert_eq!(RespParser::new().parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 19);
    }

    #[test]
    fn pipelined_frames_parse_one_at_a_time() {
        let mut buf = buffer(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n");
        let mut parser = RespParser::new();
        assert_eq!(parser.parse(&mut buf).unwrap().unwrap(), vec![b"PING".to_vec()]);
        assert_eq!(
            parser.parse(&mut buf).unwrap().unwrap(),
            vec![b"ECHO".to_vec(), b"hi".to_vec()]
        );
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn bulk_arguments_are_binary_safe() {
        let mut buf = buffer(b"*1\r\n$4\r\na\r\nb\r\n");
        let args = RespParser::new().parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"a\r\nb".to_vec()]);
    }

    #[test]
    fn inline_commands_are_accepted() {
        let mut buf = buffer(b"PING  hello\r\n");
        let args = RespParser::new().parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"PING".to_vec(), b"hello".to_vec()]);
    }

    #[test]
    fn bad_framing_is_a_protocol_error() {
        let mut buf = buffer(b"*1\r\n:5\r\n");
        assert_eq!(RespParser::new().parse(&mut buf), Err(RespError::Protocol));

        let mut buf = buffer(b"*x\r\n");
        assert_eq!(RespParser::new().parse(&mut buf), Err(RespError::Protocol));
    }

    #[test]
    fn encodes_nested_replies() {
        let reply = Reply::Array(vec![
            Reply::Bulk(b"a".to_vec()),
            Reply::Nil,
            Reply::Integer(-1),
            Reply::ok(),
        ]);
        let mut out = Vec::new();
        reply.encode(&mut out);
        assert_eq!(out, b"*4\r\n$1\r\na\r\n$-1\r\n:-1\r\n+OK\r\n".to_vec());
    }

    #[test]
    fn error_replies_carry_prefix() {
        let mut out = Vec::new();
        Reply::err("boom").encode(&mut out);
        assert_eq!(out, b"-ERR boom\r\n".to_vec());
        assert!(Reply::wrong_type().is_error());
    }
}
