use std::io::{BufRead, BufReader, ErrorKind, Read};

use serde::de::DeserializeOwned;

use crate::codec::Codec;
use crate::error::{FrameError, Result};
use crate::header::{Header, HEADER_SIZE};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads frame headers and payloads from any `Read` stream.
///
/// Reading is split in two steps because the payload type is only known once
/// the header has been routed: call [`read_header`](Self::read_header), then
/// decode exactly one payload from [`payload_source`](Self::payload_source).
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(INITIAL_BUFFER_CAPACITY, inner),
        }
    }

    /// Read the next frame header (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// frame boundary and `Err(FrameError::Truncated)` when it is reached
    /// part way through the header.
    pub fn read_header(&mut self) -> Result<Header> {
        let mut raw = [0u8; HEADER_SIZE];
        let mut filled = 0usize;

        while filled < HEADER_SIZE {
            match self.inner.read(&mut raw[filled..]) {
                Ok(0) if filled == 0 => return Err(FrameError::ConnectionClosed),
                Ok(0) => return Err(FrameError::Truncated { what: "header" }),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Read(err)),
            }
        }

        Ok(Header::decode(raw))
    }

    /// Decode the payload that follows the last header read.
    pub fn read_payload<C: Codec, T: DeserializeOwned>(&mut self, codec: &C) -> Result<T> {
        codec.decode(&mut self.inner)
    }

    /// The buffered stream positioned at the current payload.
    pub fn payload_source(&mut self) -> &mut dyn BufRead {
        &mut self.inner
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Any bytes already buffered but not yet consumed are lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}
