//! Framing correctness under fragmentation: feeding a byte stream into the
//! accumulator one arbitrary chunk at a time must decode to the same
//! message sequence as feeding the entire stream at once.

use bytes::Bytes;
use rstest::rstest;

use wireflow::{ByteBuf, Codec, LengthFieldCodec, LineCodec};

/// Mirrors the session read path: append a chunk, decode what is complete,
/// keep the rest accumulated.
fn decode_chunked<C: Codec>(codec: &C, stream: &[u8], chunk_size: usize) -> Vec<C::Message> {
    let mut acc = ByteBuf::new();
    let mut out = Vec::new();
    for chunk in stream.chunks(chunk_size.max(1)) {
        acc.append(chunk);
        let consumed = {
            let mut cursor = acc.cursor();
            loop {
                cursor.mark();
                match codec.decode(&mut cursor).unwrap() {
                    Some(message) => out.push(message),
                    None => {
                        cursor.reset();
                        break;
                    }
                }
            }
            cursor.position()
        };
        acc.consume(consumed);
    }
    assert!(acc.is_empty(), "stream fully consumed");
    out
}

fn line_stream(messages: &[String]) -> Vec<u8> {
    let codec = LineCodec::new();
    let mut stream = Vec::new();
    for message in messages {
        stream.extend_from_slice(&codec.encode(message).unwrap().unwrap());
    }
    stream
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(5)]
#[case(7)]
#[case(16)]
#[case(64)]
#[case(1024)]
fn line_decoding_is_fragmentation_invariant(#[case] chunk_size: usize) {
    let messages: Vec<String> = (0..200).map(|i| format!("message-{i}")).collect();
    let stream = line_stream(&messages);

    let chunked = decode_chunked(&LineCodec::new(), &stream, chunk_size);
    let whole = decode_chunked(&LineCodec::new(), &stream, stream.len());

    assert_eq!(chunked, messages);
    assert_eq!(whole, messages);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(4)]
#[case(9)]
#[case(32)]
#[case(513)]
fn length_field_decoding_is_fragmentation_invariant(#[case] chunk_size: usize) {
    let codec = LengthFieldCodec::default();
    // frame sizes chosen to straddle chunk boundaries, including empty
    let messages: Vec<Bytes> = (0..64)
        .map(|i| Bytes::from(vec![i as u8; (i * 7) % 96]))
        .collect();
    let mut stream = Vec::new();
    for message in &messages {
        stream.extend_from_slice(&codec.encode(message).unwrap().unwrap());
    }

    let chunked = decode_chunked(&codec, &stream, chunk_size);
    let whole = decode_chunked(&codec, &stream, stream.len());

    assert_eq!(chunked, messages);
    assert_eq!(whole, messages);
}

#[test]
fn round_trip_for_every_supported_message_shape() {
    let line = LineCodec::new();
    for message in ["", "a", "hello world", "trailing spaces  "] {
        let encoded = line.encode(&message.to_string()).unwrap().unwrap();
        let mut acc = ByteBuf::new();
        acc.append(&encoded);
        let mut cursor = acc.cursor();
        assert_eq!(line.decode(&mut cursor).unwrap(), Some(message.to_string()));
    }

    let framed = LengthFieldCodec::default();
    for payload in [&b""[..], &b"x"[..], &[0u8; 1000][..]] {
        let message = Bytes::copy_from_slice(payload);
        let encoded = framed.encode(&message).unwrap().unwrap();
        let mut acc = ByteBuf::new();
        acc.append(&encoded);
        let mut cursor = acc.cursor();
        assert_eq!(framed.decode(&mut cursor).unwrap(), Some(message));
    }
}

#[test]
fn partial_bytes_survive_across_appends() {
    let codec = LineCodec::new();
    let mut acc = ByteBuf::new();
    acc.append(b"hel");

    let consumed = {
        let mut cursor = acc.cursor();
        assert_eq!(codec.decode(&mut cursor).unwrap(), None);
        cursor.position()
    };
    acc.consume(consumed);
    assert_eq!(acc.remaining(), 3);

    acc.append(b"lo\nwor");
    let consumed = {
        let mut cursor = acc.cursor();
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some("hello".to_string()));
        assert_eq!(codec.decode(&mut cursor).unwrap(), None);
        cursor.position()
    };
    acc.consume(consumed);
    assert_eq!(acc.as_slice(), b"wor");
}
