//! Pluggable Wire Format
//!
//! A [`Codec`] turns application messages into outbound bytes and inbound
//! bytes back into messages. The framework owns buffering and framing
//! mechanics; the codec only has to answer "is there a complete message at
//! the front of these bytes, and what is it".
//!
//! Two codecs ship with the crate: [`LineCodec`] for newline-delimited UTF-8
//! text and [`LengthFieldCodec`] for frames carrying a big-endian `i32`
//! length prefix.

use bytes::Bytes;

use crate::buffer::DecodeCursor;
use crate::error::{Error, Result};

pub use length_field::LengthFieldCodec;
pub use line::LineCodec;

mod length_field;
mod line;

/// Encode/decode pair defining the application wire format.
///
/// Decode contract: return `Ok(None)` when the cursor does not yet hold a
/// complete message, without consuming bytes — the remaining bytes stay
/// accumulated and decode is retried on the next readiness event. Return an
/// error only for corruption that cannot be recovered by waiting for more
/// bytes; the session is closed in response.
pub trait Codec: Send + Sync + 'static {
    type Message: Send + 'static;

    /// Encodes a message. `Ok(None)` means "do not send anything".
    fn encode(&self, message: &Self::Message) -> Result<Option<Bytes>>;

    /// Attempts to decode one message from the front of `cursor`.
    fn decode(&self, cursor: &mut DecodeCursor<'_>) -> Result<Option<Self::Message>>;
}

pub(crate) fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptFrame(reason.into())
}
