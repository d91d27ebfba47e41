use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use msgbud_frame::{Codec, FrameReader, Header, JsonCodec};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::{ListenPolicy, RouterConfig};
use crate::directory::{TypeDirectory, TypeKey};
use crate::error::{MuxError, Result};
use crate::receiver::{FnReceiver, Receiver, Value};

type Entry<C> = Arc<dyn Receiver<C>>;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Tables<C: Codec> {
    /// Single-use, consumed by the first frame carrying the id.
    by_id: HashMap<u32, Entry<C>>,
    /// Persistent until overwritten or removed.
    by_type: HashMap<u32, Entry<C>>,
}

impl<C: Codec> Default for Tables<C> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
        }
    }
}

/// Reads frames off a stream and routes each to one receiver.
///
/// Exactly one thread should drive [`accept`](Self::accept) or
/// [`listen`](Self::listen); registration is safe from any thread at any time.
pub struct Router<R, C: Codec = JsonCodec> {
    reader: Mutex<FrameReader<R>>,
    tables: Mutex<Tables<C>>,
    directory: Arc<dyn TypeDirectory>,
    codec: C,
    config: RouterConfig,
}

impl<R: Read> Router<R> {
    /// Create a router decoding JSON payloads.
    pub fn new(reader: R, directory: Arc<dyn TypeDirectory>) -> Self {
        Self::with_codec(reader, directory, JsonCodec::default())
    }
}

impl<R: Read, C: Codec> Router<R, C> {
    /// Create a router with an explicit codec.
    pub fn with_codec(reader: R, directory: Arc<dyn TypeDirectory>, codec: C) -> Self {
        Self {
            reader: Mutex::new(FrameReader::new(reader)),
            tables: Mutex::new(Tables::default()),
            directory,
            codec,
            config: RouterConfig::default(),
        }
    }

    /// Override router config.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Current router config.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route every future frame of type `T` without a request-id match to
    /// `receiver`. Replaces any earlier subscription for the same type.
    ///
    /// Returns the wire type id.
    pub fn register_type<T>(&self, receiver: Arc<dyn Receiver<C>>) -> Result<u32>
    where
        T: ?Sized + 'static,
    {
        let type_id = self.directory.classify(TypeKey::of::<T>())?;
        if lock(&self.tables)
            .by_type
            .insert(type_id, receiver)
            .is_some()
        {
            debug!(type_id, "replaced type subscription");
        }
        Ok(type_id)
    }

    /// Subscribe a closure to every future frame of type `T`.
    pub fn subscribe<T, F>(&self, f: F) -> Result<u32>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Header, T) + Send + Sync + 'static,
    {
        self.register_type::<T>(Arc::new(FnReceiver::new(f)))
    }

    /// Remove the subscription for `type_id`. Returns true if one existed.
    pub fn unregister_type(&self, type_id: u32) -> bool {
        lock(&self.tables).by_type.remove(&type_id).is_some()
    }

    /// Route the next frame carrying `request_id` to `receiver`, once.
    pub fn register_id(&self, receiver: Arc<dyn Receiver<C>>, request_id: u32) {
        if lock(&self.tables)
            .by_id
            .insert(request_id, receiver)
            .is_some()
        {
            warn!(request_id, "replaced pending receiver for request id");
        }
    }

    /// Drop the registration for `request_id`. Returns true if one existed.
    pub fn unregister_id(&self, request_id: u32) -> bool {
        lock(&self.tables).by_id.remove(&request_id).is_some()
    }

    /// True if a receiver is waiting for `request_id`.
    pub fn contains_id(&self, request_id: u32) -> bool {
        lock(&self.tables).by_id.contains_key(&request_id)
    }

    /// Number of request ids still waiting for a frame.
    pub fn pending_ids(&self) -> usize {
        lock(&self.tables).by_id.len()
    }

    /// Read one frame and hand it to its receiver.
    ///
    /// Lookup is by request id first (the entry is consumed), then by type id
    /// (the entry is kept). With no match this fails with
    /// [`MuxError::NoReceiver`] and leaves the payload unread. The decoded
    /// value is delivered on a new thread; this returns without waiting.
    pub fn accept(&self) -> Result<Header> {
        let mut reader = lock(&self.reader);
        let header = reader.read_header()?;
        let receiver = self.route(header)?;
        let value = receiver
            .target()
            .decode(&self.codec, reader.payload_source())?;
        drop(reader);

        debug!(
            request_id = header.request_id,
            type_id = header.type_id,
            "frame accepted"
        );
        deliver(receiver, header, value)?;
        Ok(header)
    }

    /// Accept frames until the stream ends.
    ///
    /// Clean end of stream returns `Ok(())`. Other errors are logged; under
    /// [`ListenPolicy::StopOnDesync`] an error that leaves the stream
    /// misaligned is returned instead of reading on.
    pub fn listen(&self) -> Result<()> {
        loop {
            match self.accept() {
                Ok(_) => {}
                Err(err) if err.is_closed() => {
                    debug!("stream closed, router stopping");
                    self.stop();
                    return Ok(());
                }
                Err(err) => {
                    error!(error = %err, "failed to accept frame");
                    if self.config.listen_policy == ListenPolicy::StopOnDesync
                        && err.desyncs_stream()
                    {
                        self.stop();
                        return Err(err);
                    }
                }
            }
        }
    }

    fn route(&self, header: Header) -> Result<Entry<C>> {
        let mut tables = lock(&self.tables);
        if let Some(receiver) = tables.by_id.remove(&header.request_id) {
            return Ok(receiver);
        }
        tables
            .by_type
            .get(&header.type_id)
            .cloned()
            .ok_or(MuxError::NoReceiver {
                request_id: header.request_id,
                type_id: header.type_id,
            })
    }

    fn stop(&self) {
        if !self.config.drain_pending_on_close {
            return;
        }
        let mut tables = lock(&self.tables);
        let dropped = tables.by_id.len();
        tables.by_id.clear();
        if dropped > 0 {
            debug!(dropped, "dropped pending request registrations");
        }
    }
}

fn deliver<C: Codec>(receiver: Entry<C>, header: Header, value: Value) -> Result<()> {
    thread::Builder::new()
        .name("msgbud-delivery".to_string())
        .spawn(move || receiver.receive(header, value))
        .map(drop)
        .map_err(MuxError::Spawn)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::Duration;

    use msgbud_frame::{FrameError, FrameWriter};
    use serde_json::{json, Value as Json};

    use super::*;
    use crate::directory::TypeRegistry;
    use crate::receiver::{ChannelReceiver, Pending};

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(50);

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::new()
                .with::<i32>(1)
                .and_then(|r| r.with::<String>(2))
                .unwrap(),
        )
    }

    fn router(frames: &[(u32, u32, Json)]) -> Router<Cursor<Vec<u8>>> {
        let codec = JsonCodec::default();
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        for (request_id, type_id, payload) in frames {
            writer
                .write_frame(&codec, Header::new(*request_id, *type_id), payload)
                .unwrap();
        }
        Router::new(Cursor::new(writer.into_inner().into_inner()), registry())
    }

    fn channel<T: Send + 'static>() -> (Arc<ChannelReceiver<T>>, mpsc::Receiver<T>) {
        let (receiver, rx) = ChannelReceiver::new();
        (Arc::new(receiver), rx)
    }

    #[test]
    fn request_id_entry_is_consumed_once() {
        let router = router(&[(1, 1, json!(42)), (1, 1, json!(43))]);
        let (receiver, rx) = channel::<i32>();
        router.register_id(receiver, 1);

        assert_eq!(router.accept().unwrap(), Header::new(1, 1));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
        assert!(!router.contains_id(1));

        let err = router.accept().unwrap_err();
        assert!(matches!(
            err,
            MuxError::NoReceiver {
                request_id: 1,
                type_id: 1
            }
        ));
    }

    #[test]
    fn type_subscription_persists() {
        let router = router(&[(0, 1, json!(1)), (0, 1, json!(2)), (0, 1, json!(3))]);
        let (receiver, rx) = channel::<i32>();
        assert_eq!(router.register_type::<i32>(receiver).unwrap(), 1);

        for _ in 0..3 {
            router.accept().unwrap();
        }

        let mut got: Vec<i32> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn later_type_registration_wins() {
        let router = router(&[(0, 2, json!("first")), (0, 2, json!("second"))]);
        let (old, old_rx) = channel::<String>();
        let (new, new_rx) = channel::<String>();

        router.register_type::<String>(old).unwrap();
        router.accept().unwrap();
        router.register_type::<String>(new).unwrap();
        router.accept().unwrap();

        assert_eq!(old_rx.recv_timeout(WAIT).unwrap(), "first");
        assert_eq!(new_rx.recv_timeout(WAIT).unwrap(), "second");
        assert!(old_rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn request_id_takes_precedence_over_type() {
        let router = router(&[(7, 1, json!(5)), (7, 1, json!(6))]);
        let (by_type, type_rx) = channel::<i32>();
        let (by_id, id_rx) = channel::<i32>();
        router.register_type::<i32>(by_type).unwrap();
        router.register_id(by_id, 7);

        router.accept().unwrap();
        assert_eq!(id_rx.recv_timeout(WAIT).unwrap(), 5);
        assert!(type_rx.recv_timeout(QUIET).is_err());

        // The id entry is gone, so the repeat falls through to the type.
        router.accept().unwrap();
        assert_eq!(type_rx.recv_timeout(WAIT).unwrap(), 6);
    }

    #[test]
    fn no_receiver_leaves_payload_unread() {
        let router = router(&[(3, 9, json!("x"))]);

        let err = router.accept().unwrap_err();
        assert!(matches!(
            err,
            MuxError::NoReceiver {
                request_id: 3,
                type_id: 9
            }
        ));
        assert!(err.desyncs_stream());

        // `"x"\n` is only four bytes, read as the start of a header.
        let err = router.accept().unwrap_err();
        assert!(matches!(
            err,
            MuxError::Frame(FrameError::Truncated { what: "header" })
        ));
    }

    #[test]
    fn decode_mismatch_is_reported() {
        let router = router(&[(0, 1, json!("not an int"))]);
        let (receiver, _rx) = channel::<i32>();
        router.register_type::<i32>(receiver).unwrap();

        let err = router.accept().unwrap_err();
        assert!(matches!(err, MuxError::Frame(FrameError::Decode(_))));
    }

    #[test]
    fn register_unknown_type_fails() {
        let router = router(&[]);
        let (receiver, _rx) = channel::<f64>();

        let err = router.register_type::<f64>(receiver).unwrap_err();
        assert!(matches!(err, MuxError::UnknownType { .. }));
    }

    #[test]
    fn subscribe_passes_header_to_closure() {
        let router = router(&[(12, 2, json!("hello"))]);
        let (tx, rx) = mpsc::channel();
        router
            .subscribe(move |header: Header, value: String| {
                let _ = tx.send((header, value));
            })
            .unwrap();

        router.accept().unwrap();

        let (header, value) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(header, Header::new(12, 2));
        assert_eq!(value, "hello");
    }

    #[test]
    fn unregister_removes_entries() {
        let router = router(&[(0, 1, json!(1))]);
        let (by_type, _type_rx) = channel::<i32>();
        let (by_id, _id_rx) = channel::<i32>();
        router.register_type::<i32>(by_type).unwrap();
        router.register_id(by_id, 4);

        assert!(router.unregister_id(4));
        assert!(!router.unregister_id(4));
        assert!(router.unregister_type(1));
        assert_eq!(router.pending_ids(), 0);
        assert!(matches!(
            router.accept(),
            Err(MuxError::NoReceiver { .. })
        ));
    }

    #[test]
    fn listen_stops_cleanly_at_end_of_stream() {
        let router = router(&[(0, 1, json!(10)), (0, 1, json!(20))]);
        let (receiver, rx) = channel::<i32>();
        router.register_type::<i32>(receiver).unwrap();

        router.listen().unwrap();

        let mut got = vec![
            rx.recv_timeout(WAIT).unwrap(),
            rx.recv_timeout(WAIT).unwrap(),
        ];
        got.sort_unstable();
        assert_eq!(got, vec![10, 20]);
    }

    #[test]
    fn listen_continues_past_frame_errors() {
        // The bad payload is a whole JSON line, so the stream stays aligned.
        let router = router(&[(0, 1, json!("bad")), (0, 1, json!(5))]);
        let (receiver, rx) = channel::<i32>();
        router.register_type::<i32>(receiver).unwrap();

        router.listen().unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 5);
    }

    #[test]
    fn listen_stops_on_desync_when_configured() {
        let router = router(&[(2, 9, json!(1)), (0, 1, json!(5))]).with_config(RouterConfig {
            listen_policy: ListenPolicy::StopOnDesync,
            ..RouterConfig::default()
        });
        let (receiver, rx) = channel::<i32>();
        router.register_type::<i32>(receiver).unwrap();

        let err = router.listen().unwrap_err();

        assert!(matches!(err, MuxError::NoReceiver { type_id: 9, .. }));
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn listen_drops_pending_requests_at_end_of_stream() {
        let router = router(&[]);
        let (receiver, rx) = ChannelReceiver::<i32>::new();
        router.register_id(Arc::new(receiver), 10);
        let pending = Pending::new(10, rx);

        router.listen().unwrap();

        assert!(!router.contains_id(10));
        assert!(matches!(pending.wait(), Err(MuxError::Disconnected(10))));
    }

    #[test]
    fn pending_requests_survive_close_when_drain_disabled() {
        let router = router(&[]).with_config(RouterConfig {
            drain_pending_on_close: false,
            ..RouterConfig::default()
        });
        let (receiver, _rx) = channel::<i32>();
        router.register_id(receiver, 10);

        router.listen().unwrap();

        assert!(router.contains_id(10));
    }
}
