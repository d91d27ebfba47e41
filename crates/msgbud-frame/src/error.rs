type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Reading from the underlying stream failed.
    #[error("frame read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the underlying stream failed.
    #[error("frame write failed: {0}")]
    Write(#[source] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a header or payload.
    #[error("connection closed mid-frame ({what})")]
    Truncated { what: &'static str },

    /// A previous write left a partial frame on the stream.
    #[error("stream corrupted by an earlier partial write")]
    Corrupted,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The codec could not encode a value.
    #[error("payload encode failed: {0}")]
    Encode(#[source] BoxError),

    /// The payload bytes do not match the expected target type.
    #[error("payload decode failed: {0}")]
    Decode(#[source] BoxError),
}

impl FrameError {
    /// True for the clean end-of-stream condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
