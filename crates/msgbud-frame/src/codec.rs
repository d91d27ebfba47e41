use std::io::{BufRead, Read};

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FrameError, Result};

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Payload serialization contract.
///
/// A codec must be self-delimiting: `decode` consumes exactly the bytes that
/// one `encode` produced, so successive values can be read back off a stream
/// with no outer length field.
pub trait Codec: Send + Sync + 'static {
    /// Append the encoding of `value` to `dst`.
    ///
    /// On error `dst` is left as it was before the call.
    fn encode<T: Serialize + ?Sized>(&self, value: &T, dst: &mut BytesMut) -> Result<()>;

    /// Decode one value from the front of `src`.
    fn decode<T: DeserializeOwned>(&self, src: &mut dyn BufRead) -> Result<T>;
}

/// Newline-terminated compact JSON.
///
/// Compact `serde_json` output never contains a raw `\n` (string contents are
/// escaped), so the newline marks the end of each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonCodec {
    /// Maximum encoded payload size in bytes, excluding the terminator.
    pub max_payload_size: usize,
}

impl JsonCodec {
    /// Create a codec with an explicit payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        if let Err(err) = serde_json::to_writer((&mut *dst).writer(), value) {
            dst.truncate(start);
            return Err(FrameError::Encode(Box::new(err)));
        }

        let size = dst.len() - start;
        if size > self.max_payload_size {
            dst.truncate(start);
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }

        dst.put_u8(b'\n');
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, src: &mut dyn BufRead) -> Result<T> {
        let limit = u64::try_from(self.max_payload_size.saturating_add(1)).unwrap_or(u64::MAX);
        let mut line = Vec::new();
        let read = Read::take(&mut *src, limit)
            .read_until(b'\n', &mut line)
            .map_err(FrameError::Read)?;

        if read == 0 {
            return Err(FrameError::Truncated { what: "payload" });
        }
        if line.last() != Some(&b'\n') {
            if line.len() > self.max_payload_size {
                return Err(FrameError::PayloadTooLarge {
                    size: line.len(),
                    max: self.max_payload_size,
                });
            }
            return Err(FrameError::Truncated { what: "payload" });
        }

        serde_json::from_slice(&line).map_err(|err| FrameError::Decode(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
        tags: Vec<u8>,
    }

    #[test]
    fn encodes_compact_json_with_terminator() {
        let mut buf = BytesMut::new();
        JsonCodec::default().encode(&42i32, &mut buf).unwrap();
        assert_eq!(&buf[..], b"42\n");
    }

    #[test]
    fn successive_values_decode_in_order() {
        let codec = JsonCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&7u32, &mut buf).unwrap();
        codec
            .encode(
                &Probe {
                    name: "multi\nline".to_string(),
                    tags: vec![1, 2],
                },
                &mut buf,
            )
            .unwrap();
        codec.encode("tail", &mut buf).unwrap();

        let mut src = Cursor::new(buf.to_vec());
        let first: u32 = codec.decode(&mut src).unwrap();
        let second: Probe = codec.decode(&mut src).unwrap();
        let third: String = codec.decode(&mut src).unwrap();

        assert_eq!(first, 7);
        assert_eq!(second.name, "multi\nline");
        assert_eq!(second.tags, vec![1, 2]);
        assert_eq!(third, "tail");
        assert_eq!(src.position() as usize, buf.len());
    }

    #[test]
    fn decode_stops_at_value_boundary() {
        let codec = JsonCodec::default();
        let mut src = Cursor::new(b"{\"name\":\"a\",\"tags\":[]}\nREST".to_vec());

        let _: Probe = codec.decode(&mut src).unwrap();

        let mut rest = String::new();
        src.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "REST");
    }

    #[test]
    fn encode_rejects_oversized_payload_without_touching_buffer() {
        let codec = JsonCodec::with_max_payload(4);
        let mut buf = BytesMut::from(&b"hdr"[..]);

        let err = codec.encode("too long for four", &mut buf).unwrap_err();

        assert!(matches!(err, FrameError::PayloadTooLarge { max: 4, .. }));
        assert_eq!(&buf[..], b"hdr");
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let codec = JsonCodec::with_max_payload(4);
        let mut src = Cursor::new(b"\"abcdefgh\"\n".to_vec());

        let err = codec.decode::<String>(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn decode_type_mismatch_is_decode_error() {
        let codec = JsonCodec::default();
        let mut src = Cursor::new(b"\"not a number\"\n".to_vec());

        let err = codec.decode::<u32>(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn decode_at_end_of_stream_is_truncated() {
        let codec = JsonCodec::default();

        let mut empty = Cursor::new(Vec::<u8>::new());
        let err = codec.decode::<u32>(&mut empty).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { what: "payload" }));

        let mut partial = Cursor::new(b"{\"name\":".to_vec());
        let err = codec.decode::<Probe>(&mut partial).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
    }

    #[test]
    fn encode_failure_reports_encode_error() {
        use std::collections::HashMap;

        // JSON object keys must be strings.
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);

        let mut buf = BytesMut::new();
        let err = JsonCodec::default().encode(&map, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
        assert!(buf.is_empty());
    }
}
