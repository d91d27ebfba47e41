use bytes::{Buf, BufMut, BytesMut};

/// Frame header: request id (4) + type id (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Fixed-width header written immediately before every payload.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────────────┐
/// │ Request ID   │ Type ID      │ Payload                  │
/// │ (4B LE)      │ (4B LE)      │ (codec self-delimiting)  │
/// └──────────────┴──────────────┴──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header {
    /// Sender-assigned correlation sequence number. `0` is reserved.
    pub request_id: u32,
    /// Type directory identifier of the payload.
    pub type_id: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(request_id: u32, type_id: u32) -> Self {
        Self {
            request_id,
            type_id,
        }
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.request_id);
        dst.put_u32_le(self.type_id);
    }

    /// Parse a header from its wire form.
    pub fn decode(src: [u8; HEADER_SIZE]) -> Self {
        let mut buf = &src[..];
        let request_id = buf.get_u32_le();
        let type_id = buf.get_u32_le();
        Self {
            request_id,
            type_id,
        }
    }
}
