use std::collections::HashMap;
use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use score_proto::{
    decode_client_frame, encode_server_frame, ClientFrame, PlayerMap, PlayerRecord, ServerFrame,
    StoreReply, StoreRequest,
};

use crate::store::{MemoryStore, SharedStore, StoreError, Subscription};

/// Upper bound on a single frame; anything larger is treated as corruption.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Serves a [`MemoryStore`] to remote clients over length-prefixed bincode frames.
pub struct StoreServer {
    local_addr: SocketAddr,
    store: MemoryStore,
}

impl StoreServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

pub fn start_store_server(bind_addr: SocketAddr, store: MemoryStore) -> Option<StoreServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            log::warn!("Store server bind failed at {}: {}", bind_addr, err);
            return None;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::warn!("Store server address lookup failed: {}", err);
            return None;
        }
    };

    let accept_store = store.clone();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Store client connected: {}", addr);
                if let Err(err) = stream.set_nodelay(true) {
                    log::warn!("Failed to set TCP_NODELAY: {}", err);
                }
                let store = accept_store.clone();
                thread::spawn(move || serve_client(stream, addr, store));
            }
            Err(err) => {
                log::error!("Error accepting store client: {}", err);
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }
    });

    Some(StoreServer { local_addr, store })
}

pub fn write_frame(stream: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    stream.write_all(&buffer)
}

pub fn read_frame(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

fn serve_client(stream: TcpStream, addr: SocketAddr, store: MemoryStore) {
    let writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            log::warn!("Failed to split store client {}: {}", addr, err);
            return;
        }
    };
    let (sender, receiver) = unbounded::<ServerFrame>();
    thread::spawn(move || run_writer(writer, addr, receiver));

    let mut subscriptions: HashMap<u64, Subscription> = HashMap::new();
    let mut reader = BufReader::new(stream);
    loop {
        let payload = match read_frame(&mut reader) {
            Ok(payload) => payload,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => {
                log::warn!("Store client {} read error: {}", addr, err);
                break;
            }
        };
        let frame = match decode_client_frame(&payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Dropping store client {}: bad frame: {}", addr, err);
                break;
            }
        };
        let request_id = frame.request_id;
        let reply = handle_request(&store, frame, &sender, &mut subscriptions);
        if sender.send(ServerFrame::Reply { request_id, reply }).is_err() {
            break;
        }
    }

    log::info!(
        "Store client disconnected: {} ({} subscriptions released)",
        addr,
        subscriptions.len()
    );
}

fn handle_request(
    store: &MemoryStore,
    frame: ClientFrame,
    sender: &Sender<ServerFrame>,
    subscriptions: &mut HashMap<u64, Subscription>,
) -> StoreReply {
    let ClientFrame {
        request_id,
        request,
    } = frame;
    let result: Result<StoreReply, StoreError> = match request {
        StoreRequest::Write { key, record } => store.write(&key, record).map(|_| StoreReply::Done),
        StoreRequest::ReadOnce { key } => store.read_once(&key).map(StoreReply::Record),
        StoreRequest::ReadCollection { prefix } => {
            store.read_collection(&prefix).map(StoreReply::Collection)
        }
        StoreRequest::Subscribe { key } => {
            let events = sender.clone();
            let event_key = key.clone();
            store
                .subscribe(
                    &key,
                    Arc::new(move |record: Option<PlayerRecord>| {
                        let _ = events.send(ServerFrame::RecordChanged {
                            subscription: request_id,
                            key: event_key.clone(),
                            record,
                        });
                    }),
                )
                .map(|subscription| {
                    subscriptions.insert(request_id, subscription);
                    StoreReply::Subscribed(request_id)
                })
        }
        StoreRequest::SubscribeCollection { prefix } => {
            let events = sender.clone();
            let event_prefix = prefix.clone();
            store
                .subscribe_collection(
                    &prefix,
                    Arc::new(move |players: PlayerMap| {
                        let _ = events.send(ServerFrame::CollectionChanged {
                            subscription: request_id,
                            prefix: event_prefix.clone(),
                            players,
                        });
                    }),
                )
                .map(|subscription| {
                    subscriptions.insert(request_id, subscription);
                    StoreReply::Subscribed(request_id)
                })
        }
        StoreRequest::Unsubscribe { subscription } => {
            subscriptions.remove(&subscription);
            Ok(StoreReply::Done)
        }
        StoreRequest::BatchWrite { records } => {
            store.batch_write(records).map(|_| StoreReply::Done)
        }
        StoreRequest::DeleteSubtree { prefix } => {
            store.delete_subtree(&prefix).map(|_| StoreReply::Done)
        }
    };
    result.unwrap_or_else(|err| StoreReply::Failed(err.to_string()))
}

fn run_writer(mut stream: TcpStream, addr: SocketAddr, receiver: Receiver<ServerFrame>) {
    for frame in receiver {
        let bytes = match encode_server_frame(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("Failed to encode store frame: {}", err);
                continue;
            }
        };
        if let Err(err) = write_frame(&mut stream, &bytes) {
            log::warn!("Dropping store client {}: {}", addr, err);
            break;
        }
    }
}
