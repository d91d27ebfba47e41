/// What [`Router::listen`](crate::Router::listen) does after a frame fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenPolicy {
    /// Log the error and read the next frame.
    #[default]
    Continue,
    /// Log the error and return it when the stream position is no longer
    /// known to be on a frame boundary.
    StopOnDesync,
}

/// Controls router behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Error handling in the listen loop.
    pub listen_policy: ListenPolicy,
    /// Drop outstanding request-id registrations when the stream ends, so
    /// callers waiting on them observe a disconnect.
    pub drain_pending_on_close: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen_policy: ListenPolicy::Continue,
            drain_pending_on_close: true,
        }
    }
}
