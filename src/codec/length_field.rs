use bytes::{BufMut, Bytes, BytesMut};

use super::{corrupt, Codec};
use crate::buffer::DecodeCursor;
use crate::error::{Error, Result};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length-prefixed frame codec: a big-endian `i32` byte count followed by
/// the payload.
///
/// A negative length is corruption; a length above the configured limit is
/// rejected before the payload is buffered, so a hostile peer cannot make
/// the accumulator grow without bound.
#[derive(Debug, Clone)]
pub struct LengthFieldCodec {
    max_frame_size: usize,
}

impl LengthFieldCodec {
    pub fn new(max_frame_size: usize) -> Self {
        LengthFieldCodec { max_frame_size }
    }
}

impl Default for LengthFieldCodec {
    fn default() -> Self {
        LengthFieldCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Codec for LengthFieldCodec {
    type Message = Bytes;

    fn encode(&self, message: &Bytes) -> Result<Option<Bytes>> {
        if message.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                length: message.len(),
                limit: self.max_frame_size,
            });
        }
        let mut buf = BytesMut::with_capacity(4 + message.len());
        buf.put_i32(message.len() as i32);
        buf.put_slice(message);
        Ok(Some(buf.freeze()))
    }

    fn decode(&self, cursor: &mut DecodeCursor<'_>) -> Result<Option<Bytes>> {
        let Some(length) = cursor.peek_i32() else {
            return Ok(None);
        };
        if length < 0 {
            return Err(corrupt(format!("frame size {length} less than 0")));
        }
        let length = length as usize;
        if length > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                length,
                limit: self.max_frame_size,
            });
        }
        if cursor.remaining() < 4 + length {
            return Ok(None);
        }
        cursor.skip(4);
        let payload = cursor.take(length).expect("length checked above");
        Ok(Some(Bytes::copy_from_slice(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = LengthFieldCodec::default();
        let msg = Bytes::from_static(b"payload");
        let encoded = codec.encode(&msg).unwrap().unwrap();
        let mut cursor = DecodeCursor::new(&encoded);
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some(msg));
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn short_header_and_short_payload_are_incomplete() {
        let codec = LengthFieldCodec::default();
        let mut cursor = DecodeCursor::new(&[0, 0]);
        assert_eq!(codec.decode(&mut cursor).unwrap(), None);
        assert_eq!(cursor.position(), 0);

        let encoded = codec.encode(&Bytes::from_static(b"abcdef")).unwrap().unwrap();
        let mut cursor = DecodeCursor::new(&encoded[..7]);
        assert_eq!(codec.decode(&mut cursor).unwrap(), None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn negative_length_is_corrupt() {
        let codec = LengthFieldCodec::default();
        let raw = (-5i32).to_be_bytes();
        let mut cursor = DecodeCursor::new(&raw);
        assert!(matches!(
            codec.decode(&mut cursor),
            Err(Error::CorruptFrame(_))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_before_buffering() {
        let codec = LengthFieldCodec::new(16);
        let raw = 1024i32.to_be_bytes();
        let mut cursor = DecodeCursor::new(&raw);
        assert!(matches!(
            codec.decode(&mut cursor),
            Err(Error::FrameTooLarge { length: 1024, limit: 16 })
        ));
    }
}
