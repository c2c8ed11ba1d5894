use bytes::{BufMut, Bytes, BytesMut};

use super::{corrupt, Codec};
use crate::buffer::DecodeCursor;
use crate::error::Result;

/// Newline-delimited UTF-8 text codec.
///
/// A message is everything up to (and not including) `\n`; a trailing `\r`
/// is stripped so both `\n` and `\r\n` peers work. Encoded messages get a
/// single `\n` appended.
#[derive(Debug, Default, Clone)]
pub struct LineCodec;

impl LineCodec {
    pub fn new() -> Self {
        LineCodec
    }
}

impl Codec for LineCodec {
    type Message = String;

    fn encode(&self, message: &String) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::with_capacity(message.len() + 1);
        buf.put_slice(message.as_bytes());
        buf.put_u8(b'\n');
        Ok(Some(buf.freeze()))
    }

    fn decode(&self, cursor: &mut DecodeCursor<'_>) -> Result<Option<String>> {
        let Some(newline) = cursor.find(b'\n') else {
            return Ok(None);
        };
        let mut line = &cursor.as_slice()[..newline];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let text = std::str::from_utf8(line)
            .map_err(|e| corrupt(format!("line is not valid utf-8: {e}")))?
            .to_owned();
        cursor.skip(newline + 1);
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &LineCodec, bytes: &[u8]) -> (Vec<String>, usize) {
        let mut cursor = DecodeCursor::new(bytes);
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(&mut cursor).unwrap() {
            out.push(msg);
        }
        (out, cursor.position())
    }

    #[test]
    fn round_trip() {
        let codec = LineCodec::new();
        let encoded = codec.encode(&"hello".to_string()).unwrap().unwrap();
        let mut cursor = DecodeCursor::new(&encoded);
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some("hello".into()));
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn partial_line_is_incomplete_and_unconsumed() {
        let codec = LineCodec::new();
        let mut cursor = DecodeCursor::new(b"no newline yet");
        assert_eq!(codec.decode(&mut cursor).unwrap(), None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn multiple_lines_and_crlf() {
        let codec = LineCodec::new();
        let (msgs, consumed) = decode_all(&codec, b"one\r\ntwo\nthr");
        assert_eq!(msgs, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(consumed, 9);
    }

    #[test]
    fn invalid_utf8_is_corrupt() {
        let codec = LineCodec::new();
        let mut cursor = DecodeCursor::new(&[0xff, 0xfe, b'\n']);
        assert!(codec.decode(&mut cursor).is_err());
    }
}
