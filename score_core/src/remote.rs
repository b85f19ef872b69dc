use std::collections::{BTreeMap, HashMap};
use std::io::BufReader;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use score_proto::{
    decode_server_frame, encode_client_frame, ClientFrame, PlayerMap, PlayerRecord, ServerFrame,
    StoreReply, StoreRequest,
};

use crate::network::{read_frame, write_frame};
use crate::store::{CollectionCallback, RecordCallback, SharedStore, StoreError, Subscription};

enum Listener {
    Record(RecordCallback),
    Collection(CollectionCallback),
}

struct RemoteInner {
    writer: Mutex<TcpStream>,
    next_request: AtomicU64,
    connected: AtomicBool,
    pending: Mutex<HashMap<u64, Sender<StoreReply>>>,
    listeners: Mutex<HashMap<u64, Listener>>,
}

impl Drop for RemoteInner {
    fn drop(&mut self) {
        // Unblocks the reader thread, which holds its own handle to the socket.
        let _ = self.writer.get_mut().shutdown(Shutdown::Both);
    }
}

/// [`SharedStore`] backed by a remote [`crate::network::StoreServer`].
///
/// Requests block until the server replies. Subscription callbacks run on the
/// connection's reader thread.
#[derive(Clone)]
pub struct RemoteStore {
    inner: Arc<RemoteInner>,
}

impl RemoteStore {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr)?;
        if let Err(err) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", err);
        }
        let reader = stream.try_clone()?;
        let inner = Arc::new(RemoteInner {
            writer: Mutex::new(stream),
            next_request: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&inner);
        thread::spawn(move || run_reader(reader, weak));
        Ok(Self { inner })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn next_request_id(&self) -> u64 {
        self.inner.next_request.fetch_add(1, Ordering::SeqCst)
    }

    fn send(&self, frame: &ClientFrame) -> Result<(), StoreError> {
        if !self.is_connected() {
            return Err(StoreError::Disconnected);
        }
        let bytes = encode_client_frame(frame)?;
        let mut writer = self.inner.writer.lock();
        write_frame(&mut *writer, &bytes)?;
        Ok(())
    }

    fn request_with_id(
        &self,
        request_id: u64,
        request: StoreRequest,
    ) -> Result<StoreReply, StoreError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.inner.pending.lock().insert(request_id, reply_tx);
        let frame = ClientFrame {
            request_id,
            request,
        };
        if let Err(err) = self.send(&frame) {
            self.inner.pending.lock().remove(&request_id);
            return Err(err);
        }
        match reply_rx.recv() {
            Ok(StoreReply::Failed(message)) => Err(StoreError::Rejected(message)),
            Ok(reply) => Ok(reply),
            Err(_) => Err(StoreError::Disconnected),
        }
    }

    fn request(&self, request: StoreRequest) -> Result<StoreReply, StoreError> {
        let request_id = self.next_request_id();
        self.request_with_id(request_id, request)
    }

    fn expect_done(
        &self,
        request: StoreRequest,
        operation: &'static str,
    ) -> Result<(), StoreError> {
        match self.request(request)? {
            StoreReply::Done => Ok(()),
            _ => Err(StoreError::UnexpectedReply(operation)),
        }
    }

    fn register(
        &self,
        request: StoreRequest,
        listener: Listener,
    ) -> Result<Subscription, StoreError> {
        let request_id = self.next_request_id();
        // Registered before the request goes out: the initial state may
        // arrive ahead of the reply.
        self.inner.listeners.lock().insert(request_id, listener);
        let reply = self.request_with_id(request_id, request);
        match reply {
            Ok(StoreReply::Subscribed(id)) if id == request_id => {
                let weak = Arc::downgrade(&self.inner);
                Ok(Subscription::new(request_id, move || {
                    unsubscribe(&weak, request_id)
                }))
            }
            other => {
                self.inner.listeners.lock().remove(&request_id);
                match other {
                    Err(err) => Err(err),
                    Ok(_) => Err(StoreError::UnexpectedReply("subscribe")),
                }
            }
        }
    }
}

fn unsubscribe(inner: &Weak<RemoteInner>, subscription: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner.listeners.lock().remove(&subscription);
    if !inner.connected.load(Ordering::SeqCst) {
        return;
    }
    let frame = ClientFrame {
        request_id: inner.next_request.fetch_add(1, Ordering::SeqCst),
        request: StoreRequest::Unsubscribe { subscription },
    };
    // Fire and forget; the reply is ignored by the reader.
    match encode_client_frame(&frame) {
        Ok(bytes) => {
            let mut writer = inner.writer.lock();
            if let Err(err) = write_frame(&mut *writer, &bytes) {
                log::warn!("Failed to send unsubscribe {}: {}", subscription, err);
            }
        }
        Err(err) => log::warn!("Failed to encode unsubscribe {}: {}", subscription, err),
    }
}

fn run_reader(stream: TcpStream, inner: Weak<RemoteInner>) {
    let mut reader = BufReader::new(stream);
    loop {
        let payload = match read_frame(&mut reader) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Store connection closed: {}", err);
                break;
            }
        };
        let frame = match decode_server_frame(&payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Ignoring undecodable store frame: {}", err);
                continue;
            }
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        dispatch(&inner, frame);
    }

    if let Some(inner) = inner.upgrade() {
        inner.connected.store(false, Ordering::SeqCst);
        // Dropping the reply senders wakes every blocked request.
        inner.pending.lock().clear();
    }
}

fn dispatch(inner: &RemoteInner, frame: ServerFrame) {
    match frame {
        ServerFrame::Reply { request_id, reply } => {
            if let Some(reply_tx) = inner.pending.lock().remove(&request_id) {
                let _ = reply_tx.send(reply);
            }
        }
        ServerFrame::RecordChanged {
            subscription,
            record,
            ..
        } => {
            let callback = match inner.listeners.lock().get(&subscription) {
                Some(Listener::Record(callback)) => Some(Arc::clone(callback)),
                _ => None,
            };
            if let Some(callback) = callback {
                callback(record);
            }
        }
        ServerFrame::CollectionChanged {
            subscription,
            players,
            ..
        } => {
            let callback = match inner.listeners.lock().get(&subscription) {
                Some(Listener::Collection(callback)) => Some(Arc::clone(callback)),
                _ => None,
            };
            if let Some(callback) = callback {
                callback(players);
            }
        }
    }
}

impl SharedStore for RemoteStore {
    fn write(&self, key: &str, record: PlayerRecord) -> Result<(), StoreError> {
        self.expect_done(
            StoreRequest::Write {
                key: key.to_string(),
                record,
            },
            "write",
        )
    }

    fn read_once(&self, key: &str) -> Result<Option<PlayerRecord>, StoreError> {
        match self.request(StoreRequest::ReadOnce {
            key: key.to_string(),
        })? {
            StoreReply::Record(record) => Ok(record),
            _ => Err(StoreError::UnexpectedReply("read_once")),
        }
    }

    fn read_collection(&self, prefix: &str) -> Result<PlayerMap, StoreError> {
        match self.request(StoreRequest::ReadCollection {
            prefix: prefix.to_string(),
        })? {
            StoreReply::Collection(players) => Ok(players),
            _ => Err(StoreError::UnexpectedReply("read_collection")),
        }
    }

    fn subscribe(&self, key: &str, callback: RecordCallback) -> Result<Subscription, StoreError> {
        self.register(
            StoreRequest::Subscribe {
                key: key.to_string(),
            },
            Listener::Record(callback),
        )
    }

    fn subscribe_collection(
        &self,
        prefix: &str,
        callback: CollectionCallback,
    ) -> Result<Subscription, StoreError> {
        self.register(
            StoreRequest::SubscribeCollection {
                prefix: prefix.to_string(),
            },
            Listener::Collection(callback),
        )
    }

    fn batch_write(&self, records: BTreeMap<String, PlayerRecord>) -> Result<(), StoreError> {
        self.expect_done(StoreRequest::BatchWrite { records }, "batch_write")
    }

    fn delete_subtree(&self, prefix: &str) -> Result<(), StoreError> {
        self.expect_done(
            StoreRequest::DeleteSubtree {
                prefix: prefix.to_string(),
            },
            "delete_subtree",
        )
    }
}
