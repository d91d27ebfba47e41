use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use msgbud_frame::{Codec, FrameWriter, Header, JsonCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::directory::{TypeDirectory, TypeKey};
use crate::error::{MuxError, Result};
use crate::receiver::{ChannelReceiver, Pending, Receiver};
use crate::router::{lock, Router};

struct State<W> {
    writer: FrameWriter<W>,
    /// Last request id handed out. `0` until the first correlated send.
    last_id: u32,
}

/// Frames and writes outgoing messages, assigning request ids.
///
/// All operations serialize on one lock, so concurrent callers each put a
/// whole frame on the stream.
pub struct Dispatcher<W, C: Codec = JsonCodec> {
    state: Mutex<State<W>>,
    directory: Arc<dyn TypeDirectory>,
    codec: C,
}

impl<W: Write> Dispatcher<W> {
    /// Create a dispatcher encoding JSON payloads.
    pub fn new(writer: W, directory: Arc<dyn TypeDirectory>) -> Self {
        Self::with_codec(writer, directory, JsonCodec::default())
    }
}

impl<W: Write, C: Codec> Dispatcher<W, C> {
    /// Create a dispatcher with an explicit codec.
    pub fn with_codec(writer: W, directory: Arc<dyn TypeDirectory>, codec: C) -> Self {
        Self {
            state: Mutex::new(State {
                writer: FrameWriter::new(writer),
                last_id: 0,
            }),
            directory,
            codec,
        }
    }

    /// Send `payload` to whatever receiver the peer has for its type.
    ///
    /// The header carries the last request id issued (or `0`).
    pub fn send<T>(&self, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized + 'static,
    {
        let type_id = self.directory.classify(TypeKey::of::<T>())?;
        let mut state = lock(&self.state);
        let header = Header::new(state.last_id, type_id);
        state.writer.write_frame(&self.codec, header, payload)?;
        debug!(request_id = header.request_id, type_id, "frame sent");
        Ok(())
    }

    /// Send `payload` under an explicit request id, answering a correlated
    /// request from the peer.
    pub fn reply<T>(&self, request_id: u32, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized + 'static,
    {
        let type_id = self.directory.classify(TypeKey::of::<T>())?;
        let header = Header::new(request_id, type_id);
        lock(&self.state)
            .writer
            .write_frame(&self.codec, header, payload)?;
        debug!(request_id, type_id, "reply sent");
        Ok(())
    }

    /// Send `payload` under a fresh request id and register `receiver` for
    /// that id on `router`.
    ///
    /// The registration is in place before any byte is written, so a reply
    /// can never arrive ahead of it. If the write fails the registration is
    /// removed again. Returns the request id.
    pub fn send_listen<T, R>(
        &self,
        payload: &T,
        router: &Router<R, C>,
        receiver: Arc<dyn Receiver<C>>,
    ) -> Result<u32>
    where
        T: Serialize + ?Sized + 'static,
        R: Read,
    {
        let type_id = self.directory.classify(TypeKey::of::<T>())?;
        let mut state = lock(&self.state);
        let request_id = next_id(state.last_id);
        state.last_id = request_id;

        router.register_id(receiver, request_id);
        let header = Header::new(request_id, type_id);
        if let Err(err) = state.writer.write_frame(&self.codec, header, payload) {
            router.unregister_id(request_id);
            return Err(err.into());
        }

        debug!(request_id, type_id, "correlated frame sent");
        Ok(request_id)
    }

    /// Send `payload` and return a handle to its typed reply.
    pub fn request<T, U, R>(&self, payload: &T, router: &Router<R, C>) -> Result<Pending<U>>
    where
        T: Serialize + ?Sized + 'static,
        U: DeserializeOwned + Send + 'static,
        R: Read,
    {
        let (receiver, rx) = ChannelReceiver::<U>::new();
        let request_id = self.send_listen(payload, router, Arc::new(receiver))?;
        Ok(Pending::new(request_id, rx))
    }

    /// Send `payload` and wait up to `timeout` for its reply.
    ///
    /// On timeout the request id is unregistered, so a late reply is
    /// reported by the router as having no receiver.
    pub fn call<T, U, R>(
        &self,
        payload: &T,
        router: &Router<R, C>,
        timeout: Duration,
    ) -> Result<U>
    where
        T: Serialize + ?Sized + 'static,
        U: DeserializeOwned + Send + 'static,
        R: Read,
    {
        let pending = self.request(payload, router)?;
        match pending.wait_timeout(timeout) {
            Err(err @ MuxError::Timeout { .. }) => {
                router.unregister_id(pending.request_id());
                warn!(
                    request_id = pending.request_id(),
                    ?timeout,
                    "request timed out"
                );
                Err(err)
            }
            other => other,
        }
    }

    /// Last request id issued, `0` before the first correlated send.
    pub fn last_id(&self) -> u32 {
        lock(&self.state).last_id
    }

    /// True once a partial frame has been written. Every later send fails.
    pub fn is_corrupted(&self) -> bool {
        lock(&self.state).writer.is_corrupted()
    }

    /// Consume the dispatcher and return the inner stream.
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
            .into_inner()
    }
}

/// Next request id after `last`, wrapping at `u32::MAX` and skipping `0`.
fn next_id(last: u32) -> u32 {
    match last.wrapping_add(1) {
        0 => 1,
        id => id,
    }
}
