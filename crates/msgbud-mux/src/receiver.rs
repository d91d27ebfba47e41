//! Delivery endpoints for routed frames.
//!
//! The router only ever sees type-erased [`Receiver`]s. A receiver hands out a
//! fresh [`Target`] for each frame routed to it; the router decodes the
//! payload through that target on the read loop, then passes the boxed value
//! back to [`Receiver::receive`] on a delivery thread.

use std::any::{type_name, Any};
use std::io::BufRead;
use std::marker::PhantomData;
use std::sync::mpsc;
use std::time::Duration;

use msgbud_frame::{Codec, Header, JsonCodec};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{MuxError, Result};

/// Decoded value on its way from the read loop to a receiver.
pub type Value = Box<dyn Any + Send>;

/// A one-shot decode destination for a single payload.
pub trait Target<C>: Send {
    /// Decode one payload from `src` and return it boxed.
    fn decode(self: Box<Self>, codec: &C, src: &mut dyn BufRead) -> msgbud_frame::Result<Value>;
}

/// Destination that routes frames to some consumer.
///
/// `target` runs on the router's read loop and must not block. `receive`
/// runs on its own thread and owns the value.
pub trait Receiver<C: Codec = JsonCodec>: Send + Sync {
    /// Allocate a decode target for the next payload.
    fn target(&self) -> Box<dyn Target<C>>;

    /// Consume a value decoded through a target from [`target`](Self::target).
    fn receive(&self, header: Header, value: Value);
}

/// [`Target`] that decodes a `T`.
pub struct Slot<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> Slot<T> {
    /// A boxed target for `T`.
    pub fn boxed<C: Codec>() -> Box<dyn Target<C>> {
        Box::new(Self {
            _marker: PhantomData,
        })
    }
}

impl<C, T> Target<C> for Slot<T>
where
    C: Codec,
    T: DeserializeOwned + Send + 'static,
{
    fn decode(self: Box<Self>, codec: &C, src: &mut dyn BufRead) -> msgbud_frame::Result<Value> {
        let value: T = codec.decode(src)?;
        Ok(Box::new(value))
    }
}

fn unexpected_value<T>(header: Header) {
    warn!(
        request_id = header.request_id,
        type_id = header.type_id,
        expected = type_name::<T>(),
        "delivered value has unexpected type, dropping"
    );
}

/// Receiver that forwards every value into a channel.
pub struct ChannelReceiver<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> ChannelReceiver<T> {
    /// Create a receiver and the channel end its values arrive on.
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl<C, T> Receiver<C> for ChannelReceiver<T>
where
    C: Codec,
    T: DeserializeOwned + Send + 'static,
{
    fn target(&self) -> Box<dyn Target<C>> {
        Slot::<T>::boxed()
    }

    fn receive(&self, header: Header, value: Value) {
        match value.downcast::<T>() {
            Ok(value) => {
                if self.tx.send(*value).is_err() {
                    debug!(
                        request_id = header.request_id,
                        "receiver channel closed, dropping value"
                    );
                }
            }
            Err(_) => unexpected_value::<T>(header),
        }
    }
}

/// Receiver that calls a closure with the frame header and value.
pub struct FnReceiver<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> FnReceiver<T, F>
where
    F: Fn(Header, T) + Send + Sync + 'static,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<C, T, F> Receiver<C> for FnReceiver<T, F>
where
    C: Codec,
    T: DeserializeOwned + Send + 'static,
    F: Fn(Header, T) + Send + Sync + 'static,
{
    fn target(&self) -> Box<dyn Target<C>> {
        Slot::<T>::boxed()
    }

    fn receive(&self, header: Header, value: Value) {
        match value.downcast::<T>() {
            Ok(value) => (self.f)(header, *value),
            Err(_) => unexpected_value::<T>(header),
        }
    }
}

/// Reply to a correlated request that has not arrived yet.
#[derive(Debug)]
pub struct Pending<T> {
    request_id: u32,
    rx: mpsc::Receiver<T>,
}

impl<T> Pending<T> {
    pub(crate) fn new(request_id: u32, rx: mpsc::Receiver<T>) -> Self {
        Self { request_id, rx }
    }

    /// Request id the reply is correlated on.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Block until the reply arrives.
    ///
    /// With no reply and a live registration this blocks forever; use
    /// [`wait_timeout`](Self::wait_timeout) to bound it.
    pub fn wait(self) -> Result<T> {
        let request_id = self.request_id;
        self.rx.recv().map_err(|_| MuxError::Disconnected(request_id))
    }

    /// Block until the reply arrives or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(MuxError::Timeout {
                request_id: self.request_id,
                timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(MuxError::Disconnected(self.request_id))
            }
        }
    }
}
