//! Message framing for msgbud.
//!
//! Every message on the stream is framed as:
//! - A 4-byte little-endian request id (correlation sequence number)
//! - A 4-byte little-endian type id (from the shared type directory)
//! - The codec's self-delimiting encoding of exactly one value
//!
//! There is no length prefix. The codec decides where a payload ends.

pub mod codec;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use codec::{Codec, JsonCodec, DEFAULT_MAX_PAYLOAD};
pub use error::{FrameError, Result};
pub use header::{Header, HEADER_SIZE};
pub use reader::FrameReader;
pub use writer::FrameWriter;
