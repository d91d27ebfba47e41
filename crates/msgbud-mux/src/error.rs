use msgbud_frame::FrameError;

/// Errors that can occur while dispatching or routing messages.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The type directory cannot classify the type.
    #[error("unknown message type {type_name}")]
    UnknownType { type_name: &'static str },

    /// A type id was registered for two different types.
    #[error("type id {type_id} already assigned to {existing}")]
    DuplicateTypeId {
        type_id: u32,
        existing: &'static str,
    },

    /// A frame arrived with neither a request id nor a type subscription.
    ///
    /// Its payload was not consumed.
    #[error("no receiver for request id {request_id}, type id {type_id}")]
    NoReceiver { request_id: u32, type_id: u32 },

    /// Frame-level error (I/O, codec, end of stream).
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A correlated call got no reply in time.
    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: u32,
        timeout: std::time::Duration,
    },

    /// The reply registration was dropped without a delivery.
    #[error("request {0} abandoned before a reply arrived")]
    Disconnected(u32),

    /// The delivery thread could not be started.
    #[error("failed to spawn delivery: {0}")]
    Spawn(#[source] std::io::Error),
}

impl MuxError {
    /// True for the clean end-of-stream condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, MuxError::Frame(err) if err.is_closed())
    }

    /// True when the error left the read position somewhere other than a
    /// frame boundary, so following frames will be misread.
    pub fn desyncs_stream(&self) -> bool {
        match self {
            MuxError::NoReceiver { .. } => true,
            MuxError::Frame(err) => matches!(
                err,
                FrameError::Decode(_)
                    | FrameError::Read(_)
                    | FrameError::Truncated { .. }
                    | FrameError::PayloadTooLarge { .. }
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
