use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use serde::Serialize;
use tracing::error;

use crate::codec::Codec;
use crate::error::{FrameError, Result};
use crate::header::Header;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Header and payload are encoded into an internal buffer first, so an encode
/// failure never puts bytes on the stream. A write that fails after part of a
/// frame went out marks the writer corrupted: the peer can no longer find the
/// next header, so every later write fails with [`FrameError::Corrupted`].
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    corrupted: bool,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            corrupted: false,
        }
    }

    /// Encode and write one frame (blocking).
    pub fn write_frame<C, T>(&mut self, codec: &C, header: Header, payload: &T) -> Result<()>
    where
        C: Codec,
        T: Serialize + ?Sized,
    {
        if self.corrupted {
            return Err(FrameError::Corrupted);
        }

        self.buf.clear();
        header.encode(&mut self.buf);
        codec.encode(payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    let err = std::io::Error::from(ErrorKind::WriteZero);
                    return Err(self.fail(offset, err));
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(self.fail(offset, err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Write(err)),
            }
        }
    }

    /// True once a partial frame has been written.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn fail(&mut self, written: usize, err: std::io::Error) -> FrameError {
        if written > 0 {
            error!(
                written,
                frame_len = self.buf.len(),
                error = %err,
                "partial frame written, stream is corrupted"
            );
            self.corrupted = true;
        }
        FrameError::Write(err)
    }
}
