//! Correlated and type-routed message dispatch.
//!
//! A [`Dispatcher`] writes frames onto one direction of a stream, a [`Router`]
//! reads them off the other and hands each decoded value to exactly one
//! [`Receiver`]: the one registered for the frame's request id if there is
//! one (single use), otherwise the one subscribed to its type (persistent).
//!
//! Request/response is built from one dispatcher and one router per side:
//! the caller registers its reply receiver on its own router while sending,
//! and the responder answers with [`Dispatcher::reply`] under the same id.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod receiver;
pub mod router;

pub use config::{ListenPolicy, RouterConfig};
pub use directory::{TypeDirectory, TypeKey, TypeRegistry};
pub use dispatcher::Dispatcher;
pub use error::{MuxError, Result};
pub use receiver::{ChannelReceiver, FnReceiver, Pending, Receiver, Slot, Target};
pub use router::Router;

pub use msgbud_frame::{Codec, Header, JsonCodec};
