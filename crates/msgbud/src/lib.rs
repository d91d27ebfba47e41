//! Typed request/response and type-routed messaging over one duplex byte
//! stream.
//!
//! msgbud frames each message with a request id and a type id, then either
//! routes it back to the call that is waiting for that request id or hands it
//! to whoever subscribed to its type.
//!
//! # Crate Structure
//!
//! - [`frame`]: Frame header wire format, codec contract, frame reader/writer
//! - [`mux`]: Type directory, receivers, dispatcher and router
//!
//! # Example
//!
//! ```no_run
//! use std::os::unix::net::UnixStream;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use msgbud::mux::{Dispatcher, Router, TypeRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = Arc::new(TypeRegistry::new().with::<u64>(1)?);
//! let stream = UnixStream::connect("/tmp/msgbud.sock")?;
//!
//! let router = Arc::new(Router::new(stream.try_clone()?, directory.clone()));
//! let dispatcher = Dispatcher::new(stream, directory);
//!
//! let listener = Arc::clone(&router);
//! std::thread::spawn(move || listener.listen());
//!
//! let doubled: u64 = dispatcher.call(&21u64, &*router, Duration::from_secs(5))?;
//! # let _ = doubled;
//! # Ok(())
//! # }
//! ```

/// Re-export frame types.
pub mod frame {
    pub use msgbud_frame::*;
}

/// Re-export routing types.
pub mod mux {
    pub use msgbud_mux::*;
}
