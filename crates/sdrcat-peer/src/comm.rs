//! TCP comm adapters.
//!
//! Both adapters register under [`COMM`] and move raw bytes between a
//! [`LinkStream`] and the coordinator. Socket reads happen on a dedicated
//! thread that posts into the runtime inbox; writes happen inline when a
//! `Transmit` command is dispatched.

use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use bytes::Bytes;
use sdrcat_frame::{FrameConfig, FrameWriter};
use sdrcat_transport::{LinkStream, TcpEndpoint};
use tracing::{debug, info, warn};

use crate::config::CommConfig;
use crate::error::Result;
use crate::message::{Action, CommCommand, CommEvent, ConnectParams, Envelope, Target, COMM};
use crate::router::Handler;
use crate::runtime::RuntimeHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn information(text: String) -> Envelope {
    Envelope::new(COMM, Target::Broadcast, Action::Information(text))
}

struct ActiveLink {
    id: u64,
    writer: FrameWriter<LinkStream>,
}

/// The single link an adapter currently owns.
#[derive(Clone)]
struct Links {
    config: CommConfig,
    handle: RuntimeHandle,
    active: Arc<Mutex<Option<ActiveLink>>>,
    next_id: Arc<AtomicU64>,
}

impl Links {
    fn new(handle: RuntimeHandle, config: CommConfig) -> Self {
        Self {
            config,
            handle,
            active: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Make `stream` the active link. The returned reader must be started
    /// once the coordinator has been told about the connection.
    fn attach(&self, stream: LinkStream) -> Result<LinkReader> {
        let reader = stream.try_clone()?;
        let frame_config = FrameConfig {
            write_timeout: self.config.write_timeout,
            ..FrameConfig::default()
        };
        let writer = FrameWriter::with_config_link(stream, frame_config)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *lock(&self.active) = Some(ActiveLink { id, writer });
        info!(link = id, peer = ?reader.peer_addr().ok(), "link up");
        Ok(LinkReader {
            stream: reader,
            link_id: id,
            links: self.clone(),
        })
    }

    fn transmit(&self, bytes: &Bytes) {
        let mut active = lock(&self.active);
        let Some(link) = active.as_mut() else {
            debug!(len = bytes.len(), "no link, dropping transmit");
            return;
        };
        if let Err(err) = link.writer.write_raw(bytes) {
            warn!(link = link.id, error = %err, "write failed, closing link");
            let _ = link.writer.get_ref().shutdown();
        }
    }

    /// Shut the active link down. Its reader reports the disconnect.
    fn close(&self) {
        if let Some(link) = lock(&self.active).as_ref() {
            debug!(link = link.id, "closing link");
            if let Err(err) = link.writer.get_ref().shutdown() {
                warn!(link = link.id, error = %err, "shutdown failed");
            }
        }
    }

    fn detach(&self, link_id: u64) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|link| link.id == link_id) {
            *active = None;
        }
    }
}

struct LinkReader {
    stream: LinkStream,
    link_id: u64,
    links: Links,
}

impl LinkReader {
    fn spawn(self) {
        let name = format!("sdrcat-link-{}", self.link_id);
        let links = self.links.clone();
        let link_id = self.link_id;
        if let Err(err) = thread::Builder::new().name(name).spawn(move || self.run()) {
            warn!(link = link_id, error = %err, "cannot start link reader");
            links.close();
            links.detach(link_id);
        }
    }

    fn run(mut self) {
        let mut buf = vec![0u8; self.links.config.read_chunk_size.max(1)];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let event = CommEvent::Received(Bytes::copy_from_slice(&buf[..n]));
                    if self.links.handle.post(Envelope::from_comm(event)).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(link = self.link_id, error = %err, "link read failed");
                    break;
                }
            }
        }

        self.links.detach(self.link_id);
        info!(link = self.link_id, "link down");
        let _ = self
            .links
            .handle
            .post(Envelope::from_comm(CommEvent::Disconnected));
    }
}

/// Client-side adapter: connects out on `Connect`.
pub struct TcpClientComm {
    links: Links,
}

impl TcpClientComm {
    pub fn new(handle: RuntimeHandle, config: CommConfig) -> Self {
        Self {
            links: Links::new(handle, config),
        }
    }

    fn connect(&self, params: &ConnectParams) -> Vec<Envelope> {
        if self.links.is_active() {
            return vec![information(format!("already connected, ignoring {params}"))];
        }
        let stream = match TcpEndpoint::connect(&params.host, params.port) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%params, error = %err, "connect failed");
                return vec![information(format!("cannot connect to {params}: {err}"))];
            }
        };
        match self.links.attach(stream) {
            Ok(reader) => {
                reader.spawn();
                vec![Envelope::from_comm(CommEvent::Connected)]
            }
            Err(err) => {
                warn!(%params, error = %err, "cannot set up link");
                vec![information(format!("cannot set up link to {params}: {err}"))]
            }
        }
    }
}

impl Handler for TcpClientComm {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        match &envelope.action {
            Action::ToComm(CommCommand::Connect(params)) => self.connect(params),
            Action::ToComm(CommCommand::Transmit(bytes)) => {
                self.links.transmit(bytes);
                Vec::new()
            }
            Action::ToComm(CommCommand::Disconnect) | Action::Shutdown => {
                self.links.close();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

/// Address a [`TcpDeviceComm`] listens on, once bound.
#[derive(Debug, Clone, Default)]
pub struct BoundAddr(Arc<Mutex<Option<SocketAddr>>>);

impl BoundAddr {
    pub fn get(&self) -> Option<SocketAddr> {
        *lock(&self.0)
    }

    fn set(&self, addr: SocketAddr) {
        *lock(&self.0) = Some(addr);
    }
}

/// Device-side adapter: listens on `Connect` and serves one link at a time.
///
/// A connection arriving while a link is up is closed immediately.
pub struct TcpDeviceComm {
    links: Links,
    bound: BoundAddr,
    stopping: Arc<AtomicBool>,
}

impl TcpDeviceComm {
    pub fn new(handle: RuntimeHandle, config: CommConfig) -> Self {
        Self {
            links: Links::new(handle, config),
            bound: BoundAddr::default(),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared view of the listening address. Clone it before registering.
    pub fn bound_addr(&self) -> BoundAddr {
        self.bound.clone()
    }

    fn listen(&self, params: &ConnectParams) -> Vec<Envelope> {
        if let Some(addr) = self.bound.get() {
            return vec![information(format!("already listening on {addr}"))];
        }
        let endpoint = match TcpEndpoint::bind(&params.host, params.port) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(%params, error = %err, "bind failed");
                return vec![information(format!("cannot listen on {params}: {err}"))];
            }
        };
        let addr = endpoint.local_addr();
        self.bound.set(addr);
        info!(%addr, "device listening");

        let links = self.links.clone();
        let stopping = Arc::clone(&self.stopping);
        let spawned = thread::Builder::new()
            .name("sdrcat-accept".into())
            .spawn(move || accept_loop(endpoint, links, stopping));
        match spawned {
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "cannot start accept thread");
                vec![information(format!("cannot accept on {addr}: {err}"))]
            }
        }
    }

    fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.links.close();
        if let Some(addr) = self.bound.get() {
            // Wake the accept thread so it sees the flag.
            let host = match addr.ip() {
                ip if ip.is_unspecified() && ip.is_ipv4() => "127.0.0.1".to_owned(),
                ip if ip.is_unspecified() => "::1".to_owned(),
                ip => ip.to_string(),
            };
            let _ = TcpEndpoint::connect(&host, addr.port());
        }
    }
}

fn accept_loop(endpoint: TcpEndpoint, links: Links, stopping: Arc<AtomicBool>) {
    loop {
        let stream = match endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => {
                if !stopping.load(Ordering::SeqCst) {
                    warn!(error = %err, "accept failed, no longer listening");
                }
                return;
            }
        };
        if stopping.load(Ordering::SeqCst) {
            debug!("accept loop stopping");
            return;
        }
        if links.is_active() {
            warn!(peer = ?stream.peer_addr().ok(), "link busy, refusing connection");
            let _ = stream.shutdown();
            continue;
        }
        match links.attach(stream) {
            Ok(reader) => {
                if links
                    .handle
                    .post(Envelope::from_comm(CommEvent::Connected))
                    .is_err()
                {
                    return;
                }
                reader.spawn();
            }
            Err(err) => warn!(error = %err, "cannot set up link"),
        }
    }
}

impl Handler for TcpDeviceComm {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        match &envelope.action {
            Action::ToComm(CommCommand::Connect(params)) => self.listen(params),
            Action::ToComm(CommCommand::Transmit(bytes)) => {
                self.links.transmit(bytes);
                Vec::new()
            }
            Action::ToComm(CommCommand::Disconnect) => {
                self.links.close();
                Vec::new()
            }
            Action::Shutdown => {
                self.stop();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
